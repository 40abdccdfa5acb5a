//! Parse and decode errors.

use crate::cursor::Truncated;
use crate::subblock::Opcode;

/// Fatal regbin parse error: the whole image is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Header ended early.
    #[error("header truncated: need {needed} bytes at offset {offset}, {available} left")]
    Truncated {
        /// Offset of the failed read.
        offset: usize,
        /// Bytes wanted.
        needed: usize,
        /// Bytes left.
        available: usize,
    },
    /// `image_size` does not match the buffer.
    #[error("image size field {declared} does not match {actual} bytes received")]
    ImageSizeMismatch {
        /// Header value.
        declared: u32,
        /// Buffer length.
        actual: usize,
    },
    /// Format older than the oldest supported one.
    #[error("regbin format 0x{version:04x} is older than 0x0103")]
    VersionTooOld {
        /// Header value.
        version: u32,
    },
    /// Image built for a different number of devices.
    #[error("image built for {declared} devices, {expected} present")]
    DeviceCountMismatch {
        /// Header value.
        declared: u8,
        /// Devices the caller drives.
        expected: usize,
    },
    /// More configs than size slots.
    #[error("{count} configs exceed the 64-entry size table")]
    TooManyConfigs {
        /// Header value.
        count: u32,
    },
    /// Header plus config sizes do not add up to the image.
    #[error("header {header} + config sizes {configs} != image size {image}")]
    ConfigSizeMismatch {
        /// Header length.
        header: usize,
        /// Sum of the size table.
        configs: u64,
        /// Header `image_size`.
        image: u32,
    },
    /// A config section is too short for its name or block count.
    #[error("config {index} truncated: need {needed} bytes, {available} left")]
    ConfigTruncated {
        /// Config index.
        index: usize,
        /// Bytes wanted.
        needed: usize,
        /// Bytes left in the section.
        available: usize,
    },
    /// Allocation of the parsed tree failed.
    #[error("out of memory while building the config tree")]
    OutOfMemory,
}

impl From<Truncated> for Error {
    fn from(t: Truncated) -> Self {
        Error::Truncated {
            offset: t.offset,
            needed: t.needed,
            available: t.available,
        }
    }
}

/// Non-fatal block error: the config keeps the blocks parsed before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, serde::Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockError {
    /// Fewer than 12 bytes left for a block header.
    #[error("block {index}: header needs 12 bytes, {available} left")]
    HeaderTruncated {
        /// Block index in its config.
        index: u32,
        /// Bytes left in the config section.
        available: usize,
    },
    /// Payload runs past the end of the config section.
    #[error("block {index}: payload of {declared} bytes overruns the config ({available} left)")]
    PayloadOverflow {
        /// Block index in its config.
        index: u32,
        /// Declared payload length.
        declared: u32,
        /// Bytes left in the config section.
        available: usize,
    },
}

/// A sub-block could not be decoded; nothing was sent to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubBlockError {
    /// Not even the selector and opcode bytes are left.
    #[error("sub-block header truncated: {available} bytes left")]
    HeaderTruncated {
        /// Bytes left in the block.
        available: usize,
    },
    /// Opcode byte outside 0x1..=0x4.
    #[error("unknown sub-block opcode 0x{0:02x}")]
    UnknownOpcode(u8),
    /// Command extends past the end of the block.
    #[error("{opcode}: out of boundary, need {needed} bytes, {available} left")]
    OutOfBounds {
        /// Command being decoded.
        opcode: Opcode,
        /// Bytes the command needs.
        needed: usize,
        /// Bytes left in the block.
        available: usize,
    },
    /// Burst length not a multiple of 4.
    #[error("burst length {len} is not a multiple of 4")]
    MisalignedBurst {
        /// Declared burst length.
        len: u16,
    },
}
