//! Regbin register-program images.
//!
//! A regbin image is a big-endian container of named configurations, each a
//! list of blocks tagged with a power phase and a device selector. Blocks
//! carry a stream of sub-block commands (register writes, bursts, delays,
//! masked writes) that the `tasdevice` crate executes against the bus.
//!
//! This crate only parses and decodes; it never touches hardware.
//!
//! ```no_run
//! use regbin::{BlockType, RegBin};
//!
//! fn pre_power_up_blocks(image: &[u8]) -> Result<usize, regbin::Error> {
//!     let bin = RegBin::parse(image, 2)?;
//!     Ok(bin
//!         .configs()
//!         .iter()
//!         .map(|c| c.blocks_of(BlockType::PrePowerUp).count())
//!         .sum())
//! }
//! ```
//!
//! # Features
//!
//! - `std`: [`builder`] for host tools and tests
//! - `defmt`: `defmt::Format` derives

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
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

pub mod builder;
pub mod cursor;
pub mod error;
pub mod image;
mod parser;
pub mod subblock;

pub use cursor::{Cursor, Truncated};
pub use error::{BlockError, Error, SubBlockError};
pub use image::{
    Block, BlockType, Config, DeviceSelector, Header, RegBin, UnknownBlockType,
    BLOCK_HEADER_LEN, HEADER_LEN,
};
pub use subblock::{decode, Command, Opcode, RegWrite, SingleWrites, SubBlock};
