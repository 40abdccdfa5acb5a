//! Regbin image builder for tests and host tools.
//!
//! Produces byte-exact images in the layout [`crate::RegBin::parse`]
//! accepts, with knobs to declare inconsistent lengths and counts so callers
//! can exercise the error paths.

#![cfg(any(test, feature = "std"))]

use alloc::string::String;
use alloc::vec::Vec;

use tas_platform::config::{CONFIG_NAME_LEN, MAX_CONFIGS, NAMED_CONFIG_VERSION};

use crate::image::{BlockType, HEADER_LEN};

/// Sub-block encoders. Each returns one complete sub-block, selector first.
pub mod subblock {
    use alloc::vec;
    use alloc::vec::Vec;

    use tas_platform::RegAddr;

    /// Opcode 0x1: independent register writes.
    pub fn single_write(selector: u8, writes: &[(RegAddr, u8)]) -> Vec<u8> {
        let mut out = vec![selector, 0x01];
        let count = u16::try_from(writes.len()).unwrap_or(u16::MAX);
        out.extend_from_slice(&count.to_be_bytes());
        for (reg, value) in writes {
            out.extend_from_slice(&[reg.book(), reg.page(), reg.reg(), *value]);
        }
        out
    }

    /// Opcode 0x2: burst from `reg`.
    pub fn burst(selector: u8, reg: RegAddr, data: &[u8]) -> Vec<u8> {
        let len = u16::try_from(data.len()).unwrap_or(u16::MAX);
        burst_with_len(selector, reg, len, data)
    }

    /// Opcode 0x2 with an arbitrary declared length.
    pub fn burst_with_len(selector: u8, reg: RegAddr, len: u16, data: &[u8]) -> Vec<u8> {
        let mut out = vec![selector, 0x02];
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&[reg.book(), reg.page(), reg.reg(), 0x00]);
        out.extend_from_slice(data);
        out
    }

    /// Opcode 0x3: sleep `ms`.
    pub fn delay(selector: u8, ms: u16) -> Vec<u8> {
        let mut out = vec![selector, 0x03];
        out.extend_from_slice(&ms.to_be_bytes());
        out
    }

    /// Opcode 0x4: masked write.
    pub fn field_write(selector: u8, reg: RegAddr, mask: u8, value: u8) -> Vec<u8> {
        vec![
            selector,
            0x04,
            0x00,
            mask,
            reg.book(),
            reg.page(),
            reg.reg(),
            value,
        ]
    }
}

/// One block under construction.
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    selector: u8,
    raw_type: u8,
    checksum: u16,
    payload: Vec<u8>,
    subblocks: u32,
    payload_len: Option<u32>,
    subblock_count: Option<u32>,
}

impl BlockBuilder {
    /// Empty block for `selector` in phase `ty`.
    pub fn new(selector: u8, ty: BlockType) -> Self {
        Self::raw(selector, ty.raw())
    }

    /// Empty block with an arbitrary type byte.
    pub fn raw(selector: u8, raw_type: u8) -> Self {
        Self {
            selector,
            raw_type,
            checksum: 0,
            payload: Vec::new(),
            subblocks: 0,
            payload_len: None,
            subblock_count: None,
        }
    }

    /// Append one encoded sub-block.
    #[must_use]
    pub fn sub(mut self, bytes: Vec<u8>) -> Self {
        self.payload.extend_from_slice(&bytes);
        self.subblocks = self.subblocks.saturating_add(1);
        self
    }

    /// Append raw bytes without counting a sub-block.
    #[must_use]
    pub fn trailing(mut self, bytes: &[u8]) -> Self {
        self.payload.extend_from_slice(bytes);
        self
    }

    /// Write `len` into the payload length field instead of the real length.
    #[must_use]
    pub fn declare_payload_len(mut self, len: u32) -> Self {
        self.payload_len = Some(len);
        self
    }

    /// Write `count` into the sub-block count field instead of the real count.
    #[must_use]
    pub fn declare_subblocks(mut self, count: u32) -> Self {
        self.subblock_count = Some(count);
        self
    }

    /// Set the checksum field.
    #[must_use]
    pub fn checksum(mut self, checksum: u16) -> Self {
        self.checksum = checksum;
        self
    }

    fn encode(&self, out: &mut Vec<u8>) {
        let len = self
            .payload_len
            .unwrap_or_else(|| u32::try_from(self.payload.len()).unwrap_or(u32::MAX));
        out.push(self.selector);
        out.push(self.raw_type);
        out.extend_from_slice(&self.checksum.to_be_bytes());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&self.subblock_count.unwrap_or(self.subblocks).to_be_bytes());
        out.extend_from_slice(&self.payload);
    }
}

/// One configuration under construction.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    name: String,
    blocks: Vec<BlockBuilder>,
    declared_blocks: Option<u32>,
}

impl ConfigBuilder {
    /// Empty config called `name` (written only for format >= 0x105).
    pub fn named(name: &str) -> Self {
        Self {
            name: String::from(name),
            ..Self::default()
        }
    }

    /// Append a block.
    #[must_use]
    pub fn block(mut self, block: BlockBuilder) -> Self {
        self.blocks.push(block);
        self
    }

    /// Write `count` into the block count field instead of the real count.
    #[must_use]
    pub fn declare_blocks(mut self, count: u32) -> Self {
        self.declared_blocks = Some(count);
        self
    }

    fn encode(&self, version: u32) -> Vec<u8> {
        let mut out = Vec::new();
        if version >= NAMED_CONFIG_VERSION {
            let mut name = [0u8; CONFIG_NAME_LEN];
            // Leave room for the terminating NUL.
            for (slot, byte) in name
                .iter_mut()
                .zip(self.name.bytes().take(CONFIG_NAME_LEN.saturating_sub(1)))
            {
                *slot = byte;
            }
            out.extend_from_slice(&name);
        }
        let count = self
            .declared_blocks
            .unwrap_or_else(|| u32::try_from(self.blocks.len()).unwrap_or(u32::MAX));
        out.extend_from_slice(&count.to_be_bytes());
        for block in &self.blocks {
            block.encode(&mut out);
        }
        out
    }
}

/// Whole image under construction.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    version: u32,
    device_count: u8,
    device_ids: [u8; 8],
    checksum: u32,
    driver_fw_version: u32,
    timestamp: u32,
    configs: Vec<ConfigBuilder>,
}

impl ImageBuilder {
    /// Empty image of format `version` for `device_count` devices.
    pub fn new(version: u32, device_count: u8) -> Self {
        Self {
            version,
            device_count,
            device_ids: [0; 8],
            checksum: 0,
            driver_fw_version: 0,
            timestamp: 0,
            configs: Vec::new(),
        }
    }

    /// Append a configuration.
    #[must_use]
    pub fn config(mut self, config: ConfigBuilder) -> Self {
        self.configs.push(config);
        self
    }

    /// Set the device id table.
    #[must_use]
    pub fn device_ids(mut self, ids: [u8; 8]) -> Self {
        self.device_ids = ids;
        self
    }

    /// Set the driver firmware version and timestamp fields.
    #[must_use]
    pub fn stamp(mut self, driver_fw_version: u32, timestamp: u32) -> Self {
        self.driver_fw_version = driver_fw_version;
        self.timestamp = timestamp;
        self
    }

    /// Serialize. Configs beyond the 64-slot table are dropped.
    pub fn build(&self) -> Vec<u8> {
        let sections: Vec<Vec<u8>> = self
            .configs
            .iter()
            .take(MAX_CONFIGS)
            .map(|config| config.encode(self.version))
            .collect();
        let body: usize = sections.iter().map(Vec::len).sum();
        let total = HEADER_LEN.saturating_add(body);

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&u32::try_from(total).unwrap_or(u32::MAX).to_be_bytes());
        out.extend_from_slice(&self.checksum.to_be_bytes());
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.driver_fw_version.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&[0x00, 0x00, 0x00, self.device_count]);
        out.extend_from_slice(&self.device_ids);
        let count = u32::try_from(sections.len()).unwrap_or(u32::MAX);
        out.extend_from_slice(&count.to_be_bytes());
        for slot in 0..MAX_CONFIGS {
            let size = sections.get(slot).map_or(0, Vec::len);
            out.extend_from_slice(&u32::try_from(size).unwrap_or(u32::MAX).to_be_bytes());
        }
        for section in &sections {
            out.extend_from_slice(section);
        }
        out
    }
}
