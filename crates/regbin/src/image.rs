//! Parsed regbin tree: header, configurations, blocks.

use alloc::vec::Vec;
use core::fmt;
use core::str::FromStr;

use serde::Serialize;
use tas_platform::config::{CONFIG_NAME_LEN, MAX_CONFIGS, NAMED_CONFIG_VERSION};

use crate::error::BlockError;

/// Fixed header length: 36 bytes of fields plus the 64-slot size table.
pub const HEADER_LEN: usize = 36 + 4 * MAX_CONFIGS;

/// Length of a block header.
pub const BLOCK_HEADER_LEN: usize = 12;

/// Power-state phase a block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockType {
    /// DSP coefficients.
    Coefficient,
    /// Run after the amplifier powered up.
    PostPowerUp,
    /// Run before the amplifier shuts down.
    PreShutdown,
    /// Run before the amplifier powers up.
    PrePowerUp,
    /// Run after the amplifier shut down.
    PostShutdown,
}

impl BlockType {
    /// All types in wire order.
    pub const ALL: [BlockType; 5] = [
        BlockType::Coefficient,
        BlockType::PostPowerUp,
        BlockType::PreShutdown,
        BlockType::PrePowerUp,
        BlockType::PostShutdown,
    ];

    /// Wire value (1..=5).
    pub const fn raw(self) -> u8 {
        match self {
            BlockType::Coefficient => 1,
            BlockType::PostPowerUp => 2,
            BlockType::PreShutdown => 3,
            BlockType::PrePowerUp => 4,
            BlockType::PostShutdown => 5,
        }
    }

    /// Decode a wire value.
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(BlockType::Coefficient),
            2 => Some(BlockType::PostPowerUp),
            3 => Some(BlockType::PreShutdown),
            4 => Some(BlockType::PrePowerUp),
            5 => Some(BlockType::PostShutdown),
            _ => None,
        }
    }

    /// Label used in diagnostic listings.
    pub const fn label(self) -> &'static str {
        match self {
            BlockType::Coefficient => "COEFF",
            BlockType::PostPowerUp => "POST_POWER_UP",
            BlockType::PreShutdown => "PRE_SHUTDOWN",
            BlockType::PrePowerUp => "PRE_POWER_UP",
            BlockType::PostShutdown => "POST_SHUTDOWN",
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Unrecognised block type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown block type name")]
pub struct UnknownBlockType;

impl FromStr for BlockType {
    type Err = UnknownBlockType;

    /// Accepts the listing label (`PRE_POWER_UP`) or its kebab-case form
    /// (`pre-power-up`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlockType::ALL
            .into_iter()
            .find(|ty| {
                let label = ty.label();
                label.len() == s.len()
                    && label
                        .bytes()
                        .zip(s.bytes())
                        .all(|(l, c)| l == c.to_ascii_uppercase() || (l == b'_' && c == b'-'))
            })
            .ok_or(UnknownBlockType)
    }
}

/// Devices a block or sub-block addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceSelector {
    /// Selector 0: every device currently marked as loading.
    All,
    /// Selector N: device N − 1 only.
    Device(u8),
}

impl DeviceSelector {
    /// Decode a selector byte.
    pub const fn from_raw(raw: u8) -> Self {
        match raw.checked_sub(1) {
            Some(index) => DeviceSelector::Device(index),
            None => DeviceSelector::All,
        }
    }

    /// Wire value.
    pub const fn raw(self) -> u8 {
        match self {
            DeviceSelector::All => 0,
            DeviceSelector::Device(index) => index.saturating_add(1),
        }
    }

    /// Bitmask of the devices addressed, out of `device_count`.
    pub fn mask(self, device_count: usize) -> u8 {
        match self {
            DeviceSelector::All => {
                let count = u32::try_from(device_count).unwrap_or(u32::MAX).min(8);
                #[allow(clippy::cast_possible_truncation)] // count <= 8
                let mask = (1u16 << count).saturating_sub(1) as u8;
                mask
            }
            DeviceSelector::Device(index) => 1u8.checked_shl(u32::from(index)).unwrap_or(0),
        }
    }
}

/// Regbin file header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    /// Total image length.
    pub image_size: u32,
    /// Image checksum (carried, not verified).
    pub checksum: u32,
    /// Format version, `>= 0x103`.
    pub format_version: u32,
    /// Driver firmware version.
    pub driver_fw_version: u32,
    /// Build timestamp.
    pub timestamp: u32,
    /// Platform type.
    pub platform_type: u8,
    /// Device family.
    pub device_family: u8,
    /// Reserved byte.
    pub reserved: u8,
    /// Devices the image was built for.
    pub device_count: u8,
    /// Device id per slot.
    pub device_ids: [u8; 8],
    /// Configurations present.
    pub config_count: u32,
    /// Size of every config section; always 64 slots.
    pub config_sizes: heapless::Vec<u32, MAX_CONFIGS>,
}

impl Header {
    /// Whether configs carry a 64-byte name.
    pub fn has_config_names(&self) -> bool {
        self.format_version >= NAMED_CONFIG_VERSION
    }
}

/// One block: a sub-block program for one power phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    /// Devices addressed.
    pub selector: DeviceSelector,
    /// Raw block type byte.
    pub raw_type: u8,
    /// Block checksum (carried, not verified).
    pub checksum: u16,
    /// Declared payload length.
    pub payload_len: u32,
    /// Declared number of sub-blocks.
    pub subblock_count: u32,
    /// Owned copy of the sub-block stream.
    #[serde(skip_serializing)]
    pub payload: Vec<u8>,
}

impl Block {
    /// Typed block type, `None` outside 1..=5.
    pub fn block_type(&self) -> Option<BlockType> {
        BlockType::from_raw(self.raw_type)
    }
}

/// A named set of blocks (one profile).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Name, when the format carries one.
    pub name: Option<heapless::String<CONFIG_NAME_LEN>>,
    /// Declared block count.
    pub declared_blocks: u32,
    /// Blocks parsed successfully, in file order.
    pub blocks: Vec<Block>,
    /// Bitmask of devices addressed by pre-power-up blocks.
    pub active_devices: u8,
    /// Why the block list stopped early, if it did.
    pub truncated: Option<BlockError>,
}

impl Config {
    /// Blocks actually available.
    pub fn real_nblocks(&self) -> usize {
        self.blocks.len()
    }

    /// Name or the empty string.
    pub fn name_str(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Blocks of one phase, in order.
    pub fn blocks_of(&self, ty: BlockType) -> impl Iterator<Item = &Block> {
        self.blocks
            .iter()
            .filter(move |block| block.block_type() == Some(ty))
    }
}

/// A fully parsed regbin image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegBin {
    pub(crate) header: Header,
    pub(crate) configs: Vec<Config>,
}

impl RegBin {
    /// File header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// All configurations.
    pub fn configs(&self) -> &[Config] {
        &self.configs
    }

    /// One configuration.
    pub fn config(&self, index: usize) -> Option<&Config> {
        self.configs.get(index)
    }

    /// Number of configurations.
    pub fn config_count(&self) -> usize {
        self.configs.len()
    }

    /// Index of the first configuration whose name contains `needle`.
    pub fn find_config(&self, needle: &str) -> Option<usize> {
        self.configs
            .iter()
            .position(|config| config.name_str().contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_len_is_fixed() {
        assert_eq!(HEADER_LEN, 292);
    }

    #[test]
    fn selector_zero_is_all_devices() {
        assert_eq!(DeviceSelector::from_raw(0), DeviceSelector::All);
        assert_eq!(DeviceSelector::from_raw(2), DeviceSelector::Device(1));
        assert_eq!(DeviceSelector::from_raw(2).raw(), 2);
        assert_eq!(DeviceSelector::All.mask(2), 0b11);
        assert_eq!(DeviceSelector::All.mask(8), 0xFF);
        assert_eq!(DeviceSelector::Device(3).mask(4), 0b1000);
        assert_eq!(DeviceSelector::Device(9).mask(4), 0);
    }

    #[test]
    fn block_type_parses_label_and_kebab_case() {
        assert_eq!("PRE_POWER_UP".parse::<BlockType>(), Ok(BlockType::PrePowerUp));
        assert_eq!("pre-shutdown".parse::<BlockType>(), Ok(BlockType::PreShutdown));
        assert_eq!("coeff".parse::<BlockType>(), Ok(BlockType::Coefficient));
        assert_eq!("power-up".parse::<BlockType>(), Err(UnknownBlockType));
    }

    #[test]
    fn block_type_raw_round_trip() {
        for ty in BlockType::ALL {
            assert_eq!(BlockType::from_raw(ty.raw()), Some(ty));
        }
        assert_eq!(BlockType::from_raw(0), None);
        assert_eq!(BlockType::from_raw(6), None);
    }
}
