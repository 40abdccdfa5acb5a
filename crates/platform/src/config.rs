//! Driver-wide limits and timing constants
//!
//! Every layer (parser, transport, codec, diagnostics) references these
//! values rather than hardcoding them.

/// Devices one codec instance can drive on a shared bus.
pub const MAX_DEVICES: usize = 4;

/// Device id slots in a regbin header.
pub const MAX_FIRMWARE_DEVICES: usize = 8;

/// Config size slots in a regbin header (always present, used or not).
pub const MAX_CONFIGS: usize = 64;

/// Attempts per register transaction before giving up.
pub const RETRY_COUNT: u8 = 3;

/// Sleep after each failed attempt, in microseconds.
pub const RETRY_BACKOFF_US: u32 = 5000;

/// Oldest regbin format the parser accepts.
pub const MIN_FORMAT_VERSION: u32 = 0x103;

/// First regbin format carrying a 64-byte name per config.
pub const NAMED_CONFIG_VERSION: u32 = 0x105;

/// Length of a config name field.
pub const CONFIG_NAME_LEN: usize = 64;

/// Registers printed by one regdump request (one full page).
pub const REGDUMP_REGISTERS: usize = 128;

/// Length of the reset pulse on the hardware reset line, in microseconds.
pub const HW_RESET_PULSE_US: u32 = 500;

/// Upper bound of a regbin file name (`<prefix>-<chip>-<n>amp-reg.bin`).
pub const REGBIN_FILENAME_LEN: usize = 64;
