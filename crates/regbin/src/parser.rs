//! Regbin image parser.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! [0..4]     image_size        u32  == buffer length
//! [4..8]     checksum          u32
//! [8..12]    format_version    u32  >= 0x103
//! [12..16]   driver_fw_version u32
//! [16..20]   timestamp         u32
//! [20]       platform_type     u8
//! [21]       device_family     u8
//! [22]       reserved          u8
//! [23]       device_count      u8   == caller's device count
//! [24..32]   device_ids        [u8; 8]
//! [32..36]   config_count      u32  <= 64
//! [36..292]  config_sizes      [u32; 64]
//! [292..]    config sections, back to back
//! ```
//!
//! Header and config-section errors reject the image. A malformed block only
//! cuts its own config short; sibling configs are unaffected.

use alloc::vec::Vec;

use tas_platform::config::{
    CONFIG_NAME_LEN, MAX_CONFIGS, MAX_FIRMWARE_DEVICES, MIN_FORMAT_VERSION,
};

use crate::cursor::Cursor;
use crate::error::{BlockError, Error};
use crate::image::{
    Block, BlockType, Config, DeviceSelector, Header, RegBin, BLOCK_HEADER_LEN, HEADER_LEN,
};

enum BlockFailure {
    Truncate(BlockError),
    Fatal(Error),
}

impl RegBin {
    /// Parse `image` for a codec driving `device_count` devices.
    pub fn parse(image: &[u8], device_count: usize) -> Result<Self, Error> {
        let mut cur = Cursor::new(image);
        let header = parse_header(&mut cur, image.len(), device_count)?;

        let count = usize::try_from(header.config_count).map_err(|_| Error::TooManyConfigs {
            count: header.config_count,
        })?;
        let mut configs = Vec::new();
        configs
            .try_reserve_exact(count)
            .map_err(|_| Error::OutOfMemory)?;
        for (index, size) in header.config_sizes.iter().take(count).enumerate() {
            let len = usize::try_from(*size).map_err(|_| Error::ConfigTruncated {
                index,
                needed: usize::MAX,
                available: cur.remaining(),
            })?;
            let section = cur.take(len).map_err(|t| Error::ConfigTruncated {
                index,
                needed: t.needed,
                available: t.available,
            })?;
            let config = parse_config(section, index, &header, device_count)?;
            configs.push(config);
        }

        tracing::debug!(
            version = header.format_version,
            configs = configs.len(),
            "regbin parsed"
        );
        Ok(RegBin { header, configs })
    }
}

fn parse_header(cur: &mut Cursor<'_>, actual: usize, device_count: usize) -> Result<Header, Error> {
    let image_size = cur.read_be32()?;
    if usize::try_from(image_size).ok() != Some(actual) {
        return Err(Error::ImageSizeMismatch {
            declared: image_size,
            actual,
        });
    }
    let checksum = cur.read_be32()?;
    let format_version = cur.read_be32()?;
    if format_version < MIN_FORMAT_VERSION {
        return Err(Error::VersionTooOld {
            version: format_version,
        });
    }
    let driver_fw_version = cur.read_be32()?;
    let timestamp = cur.read_be32()?;
    let [platform_type, device_family, reserved, declared_devices] = cur.read_array::<4>()?;
    if usize::from(declared_devices) != device_count {
        return Err(Error::DeviceCountMismatch {
            declared: declared_devices,
            expected: device_count,
        });
    }
    let device_ids = cur.read_array::<MAX_FIRMWARE_DEVICES>()?;
    let config_count = cur.read_be32()?;
    if usize::try_from(config_count).map_or(true, |n| n > MAX_CONFIGS) {
        return Err(Error::TooManyConfigs {
            count: config_count,
        });
    }

    let mut config_sizes = heapless::Vec::new();
    let mut total: u64 = 0;
    for _ in 0..MAX_CONFIGS {
        let size = cur.read_be32()?;
        total = total.saturating_add(u64::from(size));
        // Capacity is MAX_CONFIGS and the loop pushes exactly MAX_CONFIGS.
        let _ = config_sizes.push(size);
    }
    let expected = u64::from(image_size).checked_sub(total);
    if expected != u64::try_from(HEADER_LEN).ok() {
        return Err(Error::ConfigSizeMismatch {
            header: HEADER_LEN,
            configs: total,
            image: image_size,
        });
    }

    Ok(Header {
        image_size,
        checksum,
        format_version,
        driver_fw_version,
        timestamp,
        platform_type,
        device_family,
        reserved,
        device_count: declared_devices,
        device_ids,
        config_count,
        config_sizes,
    })
}

fn parse_config(
    section: &[u8],
    index: usize,
    header: &Header,
    device_count: usize,
) -> Result<Config, Error> {
    let mut cur = Cursor::new(section);
    let truncated = |t: crate::cursor::Truncated| Error::ConfigTruncated {
        index,
        needed: t.needed,
        available: t.available,
    };

    let name = if header.has_config_names() {
        let raw = cur.take(CONFIG_NAME_LEN).map_err(truncated)?;
        Some(decode_name(raw))
    } else {
        None
    };
    let declared_blocks = cur.read_be32().map_err(truncated)?;

    // Cap the up-front reservation by what the section can physically hold.
    let plausible = cur.remaining() / BLOCK_HEADER_LEN;
    let hint = usize::try_from(declared_blocks)
        .unwrap_or(usize::MAX)
        .min(plausible);
    let mut blocks = Vec::new();
    blocks
        .try_reserve_exact(hint)
        .map_err(|_| Error::OutOfMemory)?;

    let mut active_devices = 0u8;
    let mut stopped = None;
    for block_index in 0..declared_blocks {
        match parse_block(&mut cur, block_index) {
            Ok(block) => {
                if block.block_type() == Some(BlockType::PrePowerUp) {
                    active_devices |= block.selector.mask(device_count);
                }
                blocks.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
                blocks.push(block);
            }
            Err(BlockFailure::Truncate(err)) => {
                tracing::error!(config = index, "{}", err);
                stopped = Some(err);
                break;
            }
            Err(BlockFailure::Fatal(err)) => return Err(err),
        }
    }

    Ok(Config {
        name,
        declared_blocks,
        blocks,
        active_devices,
        truncated: stopped,
    })
}

fn parse_block(cur: &mut Cursor<'_>, index: u32) -> Result<Block, BlockFailure> {
    let available = cur.remaining();
    let header = cur
        .read_array::<BLOCK_HEADER_LEN>()
        .map_err(|_| BlockFailure::Truncate(BlockError::HeaderTruncated { index, available }))?;
    let [selector, raw_type, c0, c1, l0, l1, l2, l3, n0, n1, n2, n3] = header;
    let payload_len = u32::from_be_bytes([l0, l1, l2, l3]);

    let available = cur.remaining();
    let overflow = || {
        BlockFailure::Truncate(BlockError::PayloadOverflow {
            index,
            declared: payload_len,
            available,
        })
    };
    let bytes = usize::try_from(payload_len)
        .ok()
        .and_then(|len| cur.take(len).ok())
        .ok_or_else(overflow)?;

    let mut payload = Vec::new();
    payload
        .try_reserve_exact(bytes.len())
        .map_err(|_| BlockFailure::Fatal(Error::OutOfMemory))?;
    payload.extend_from_slice(bytes);

    Ok(Block {
        selector: DeviceSelector::from_raw(selector),
        raw_type,
        checksum: u16::from_be_bytes([c0, c1]),
        payload_len,
        subblock_count: u32::from_be_bytes([n0, n1, n2, n3]),
        payload,
    })
}

/// Config names are NUL-terminated; anything after the first NUL or the
/// first invalid UTF-8 byte is dropped.
fn decode_name(raw: &[u8]) -> heapless::String<CONFIG_NAME_LEN> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let bytes = raw.get(..end).unwrap_or_default();
    let text = match core::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => core::str::from_utf8(bytes.get(..err.valid_up_to()).unwrap_or_default())
            .unwrap_or_default(),
    };
    let mut name = heapless::String::new();
    // Never longer than CONFIG_NAME_LEN bytes.
    let _ = name.push_str(text);
    name
}
