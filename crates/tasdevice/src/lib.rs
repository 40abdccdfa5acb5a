//! Register-program engine for TAS2xxx / TAS58xx / PCM9211 audio devices
//!
//! Drives up to four chips of one variant on a shared bus: retried register
//! transactions with per-device book caching, execution of regbin register
//! programs, configuration selection on stream events, mixer controls, and
//! text diagnostics.
//!
//! # Layers
//!
//! ```text
//! TasCodec (coarse lock: firmware, profile, streams)
//!     ├─ selector  → interpreter → ProgramTarget
//!     └─ node      (diagnostic text)
//!               ↓
//! Transport (fine lock: retry, book switching)
//!               ↓
//! tas_platform::RegisterBus
//! ```
//!
//! # Example
//!
//! ```no_run
//! use embassy_sync::blocking_mutex::raw::NoopRawMutex;
//! use tasdevice::{Stream, TasCodec};
//! use tas_platform::{ChipVariant, RegisterBus};
//!
//! fn bring_up<B: RegisterBus, D: embedded_hal::delay::DelayNs>(
//!     bus: B,
//!     delay: D,
//!     image: &[u8],
//! ) -> Result<(), tasdevice::Error> {
//!     let codec: TasCodec<NoopRawMutex, _, _> =
//!         TasCodec::new(ChipVariant::Tas2764, bus, delay, &[0x38, 0x39])?;
//!     codec.load_firmware(image)?;
//!     codec.mute(Stream::Playback, false);
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `defmt`: `defmt::Format` derives on errors and reports

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)]
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::print_stdout)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

extern crate alloc;

pub mod codec;
pub mod error;
pub mod interpreter;
pub mod node;
pub mod selector;
pub mod transport;

pub use codec::{
    ControlInfo, ControlKind, ControlName, LatchReading, LoadReport, Stream, TasCodec,
    INIT_CONFIG, PROFILE_CONTROL,
};
pub use error::{BusOpKind, Diagnostic, Error, TransportError};
pub use interpreter::{process_block, Processed, ProgramTarget};
pub use node::{CommandError, ConfigListCommand, RegCommand, RegDumpCommand};
pub use selector::{select, SelectReport};
pub use transport::{Device, RetryPolicy, Transport};
