//! Hardware abstraction layer for TAS2xxx / TAS58xx / PCM9211 audio devices
//!
//! This crate provides the pieces every layer above shares: flat
//! book/page/register addressing, the register bus trait and its paged I2C
//! implementation, and the per-chip register map.
//!
//! # Architecture Layers
//!
//! ```text
//! Codec / diagnostics (tasdevice crate)
//!         ↓
//! Register programs (regbin crate → tasdevice interpreter)
//!         ↓
//! Retry + book switching (tasdevice transport)
//!         ↓
//! RegisterBus (this crate) → embedded_hal::i2c::I2c
//! ```
//!
//! # Features
//!
//! - `std`: host mocks ([`mocks::RecordingBus`], [`mocks::RecordingDelay`])
//! - `defmt`: `defmt::Format` derives on all plain-data types
//!
//! # Example
//!
//! ```no_run
//! use tas_platform::{I2cRegmap, RegAddr, RegisterBus};
//!
//! fn mute<I: embedded_hal::i2c::I2c>(i2c: I) -> Result<(), I::Error> {
//!     let mut bus = I2cRegmap::new(i2c, 0x2C);
//!     bus.update_bits(RegAddr::new(0, 0, 0x03).page_reg(), 0x08, 0x08)
//! }
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this HAL crate:
#![allow(clippy::doc_markdown)] // register and part names in doc comments
#![allow(clippy::must_use_candidate)] // register accessors, callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod bus;
pub mod chip;
pub mod config;
pub mod i2c_regmap;
pub mod mocks;
pub mod reg;

pub use bus::RegisterBus;
pub use chip::{
    ChipFamily, ChipProfile, ChipVariant, MixerAccess, MixerControl, MixerScope, ResetPolarity,
    ResetStrategy,
};
pub use i2c_regmap::I2cRegmap;
pub use reg::{RegAddr, BOOK_SELECT, PAGE_SELECT, SW_RESET};
