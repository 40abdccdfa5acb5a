//! Driver errors.

use core::fmt;

use tas_platform::RegAddr;

/// Register operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusOpKind {
    /// Book-select write.
    BookSelect,
    /// Page-select write after an address switch.
    PageSelect,
    /// Single write.
    Write,
    /// Single read.
    Read,
    /// Burst write.
    BulkWrite,
    /// Burst read.
    BulkRead,
    /// Read-modify-write.
    UpdateBits,
}

impl fmt::Display for BusOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BusOpKind::BookSelect => "book select",
            BusOpKind::PageSelect => "page select",
            BusOpKind::Write => "write",
            BusOpKind::Read => "read",
            BusOpKind::BulkWrite => "bulk write",
            BusOpKind::BulkRead => "bulk read",
            BusOpKind::UpdateBits => "update bits",
        })
    }
}

/// Failure of one transport operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Device index outside the configured devices. Never retried.
    #[error("channel {channel} out of range, {devices} devices configured")]
    NoSuchChannel {
        /// Requested device index.
        channel: usize,
        /// Devices present.
        devices: usize,
    },
    /// Every attempt of a bus operation failed.
    #[error("{op} of {reg} on channel {channel} failed after {attempts} attempts")]
    TransportFailed {
        /// Operation attempted.
        op: BusOpKind,
        /// Device index.
        channel: usize,
        /// Register addressed.
        reg: RegAddr,
        /// Attempts made.
        attempts: u8,
    },
}

/// Codec-level error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A bus operation failed after retries.
    #[error("{op} of {reg} on channel {channel} failed")]
    TransportFailed {
        /// Operation attempted.
        op: BusOpKind,
        /// Device index.
        channel: usize,
        /// Register addressed.
        reg: RegAddr,
    },
    /// Device index out of range.
    #[error("channel {channel} out of range")]
    NoSuchChannel {
        /// Requested device index.
        channel: usize,
    },
    /// Firmware image rejected.
    #[error("firmware rejected: {0}")]
    Format(#[from] regbin::Error),
    /// Allocation failed.
    #[error("out of memory")]
    OutOfMemory,
    /// Operation needs firmware and none is loaded.
    #[error("no firmware loaded")]
    NoFirmware,
    /// Codec built with zero or too many devices.
    #[error("{count} devices requested, 1..={max} supported")]
    InvalidDeviceCount {
        /// Devices requested.
        count: usize,
        /// Upper bound.
        max: usize,
    },
    /// Control index or device outside the control list.
    #[error("control {index} out of range")]
    ControlOutOfRange {
        /// Requested control index.
        index: usize,
    },
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NoSuchChannel { channel, .. } => Error::NoSuchChannel { channel },
            TransportError::TransportFailed {
                op, channel, reg, ..
            } => Error::TransportFailed { op, channel, reg },
        }
    }
}

/// Non-fatal findings of a selector pass. Logged and counted, never returned
/// as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Diagnostic {
    /// Bytes consumed by a block's sub-blocks differ from its declared length.
    #[error("config {config} block {block}: consumed {consumed}, declared {declared}, size is not same")]
    SizeMismatch {
        /// Config index.
        config: usize,
        /// Block index in the config.
        block: usize,
        /// Bytes the interpreter consumed.
        consumed: usize,
        /// Declared payload length.
        declared: u32,
    },
}
