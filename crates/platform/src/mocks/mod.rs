//! Mock implementations for testing
//!
//! This module provides a register-level bus and a delay source that record
//! everything the driver does, for use in unit and integration tests and in
//! host tools that dry-run firmware programs.

#![cfg(any(test, feature = "std"))]

extern crate std;

use std::collections::BTreeMap;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;

use crate::bus::RegisterBus;
use crate::reg::BOOK_SELECT;

/// One completed transfer seen by [`RecordingBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    /// Single register write.
    Write {
        /// Device address.
        addr: u8,
        /// In-book offset.
        offset: u16,
        /// Value written.
        value: u8,
    },
    /// Single register read.
    Read {
        /// Device address.
        addr: u8,
        /// In-book offset.
        offset: u16,
    },
    /// Burst write.
    BulkWrite {
        /// Device address.
        addr: u8,
        /// First in-book offset.
        offset: u16,
        /// Payload.
        data: Vec<u8>,
    },
    /// Burst read.
    BulkRead {
        /// Device address.
        addr: u8,
        /// First in-book offset.
        offset: u16,
        /// Bytes read.
        len: usize,
    },
}

impl BusOp {
    /// True for writes to the book-select register.
    pub fn is_book_select(&self) -> bool {
        matches!(self, BusOp::Write { offset, .. } if *offset == BOOK_SELECT.page_reg())
    }

    /// Device address the transfer went to.
    pub fn addr(&self) -> u8 {
        match self {
            BusOp::Write { addr, .. }
            | BusOp::Read { addr, .. }
            | BusOp::BulkWrite { addr, .. }
            | BusOp::BulkRead { addr, .. } => *addr,
        }
    }
}

/// Error returned by [`RecordingBus`] when failure injection is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockBusError;

/// In-memory register file that logs every transfer.
///
/// Register contents are kept per device and per book, the book being
/// whatever was last written to the book-select register. Unwritten
/// registers read as 0.
#[derive(Debug, Default)]
pub struct RecordingBus {
    addr: u8,
    books: BTreeMap<u8, u8>,
    regs: BTreeMap<(u8, u8, u16), u8>,
    ops: Vec<BusOp>,
    attempts: usize,
    fail_next: usize,
    fail_all: bool,
}

impl RecordingBus {
    /// Empty bus pointing at address 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful transfers, in order.
    pub fn ops(&self) -> &[BusOp] {
        &self.ops
    }

    /// Drop the transfer log, keeping register contents.
    pub fn clear_ops(&mut self) {
        self.ops.clear();
        self.attempts = 0;
    }

    /// Transfer attempts including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Fail the next `n` transfers.
    pub fn fail_next(&mut self, n: usize) {
        self.fail_next = n;
    }

    /// Fail every transfer until switched off.
    pub fn fail_all(&mut self, fail: bool) {
        self.fail_all = fail;
    }

    /// Current content of a register of device `addr` in `book`.
    pub fn register(&self, addr: u8, book: u8, offset: u16) -> u8 {
        self.regs.get(&(addr, book, offset)).copied().unwrap_or(0)
    }

    /// Preload a register.
    pub fn set_register(&mut self, addr: u8, book: u8, offset: u16, value: u8) {
        self.regs.insert((addr, book, offset), value);
    }

    /// Book last selected on device `addr`.
    pub fn book(&self, addr: u8) -> u8 {
        self.books.get(&addr).copied().unwrap_or(0)
    }

    /// Writes carrying data, i.e. everything except book selects.
    pub fn data_writes(&self) -> Vec<BusOp> {
        self.ops
            .iter()
            .filter(|op| matches!(op, BusOp::Write { .. } | BusOp::BulkWrite { .. }))
            .filter(|op| !op.is_book_select())
            .cloned()
            .collect()
    }

    fn attempt(&mut self) -> Result<(), MockBusError> {
        self.attempts = self.attempts.saturating_add(1);
        if self.fail_all {
            return Err(MockBusError);
        }
        if self.fail_next > 0 {
            self.fail_next = self.fail_next.saturating_sub(1);
            return Err(MockBusError);
        }
        Ok(())
    }

    fn store(&mut self, offset: u16, value: u8) {
        if offset == BOOK_SELECT.page_reg() {
            self.books.insert(self.addr, value);
        }
        let book = self.book(self.addr);
        self.regs.insert((self.addr, book, offset), value);
    }
}

impl RegisterBus for RecordingBus {
    type Error = MockBusError;

    fn set_address(&mut self, addr: u8) {
        self.addr = addr;
    }

    fn address(&self) -> u8 {
        self.addr
    }

    fn write(&mut self, offset: u16, value: u8) -> Result<(), Self::Error> {
        self.attempt()?;
        self.store(offset, value);
        self.ops.push(BusOp::Write {
            addr: self.addr,
            offset,
            value,
        });
        Ok(())
    }

    fn read(&mut self, offset: u16) -> Result<u8, Self::Error> {
        self.attempt()?;
        self.ops.push(BusOp::Read {
            addr: self.addr,
            offset,
        });
        Ok(self.register(self.addr, self.book(self.addr), offset))
    }

    fn bulk_write(&mut self, offset: u16, data: &[u8]) -> Result<(), Self::Error> {
        self.attempt()?;
        let mut at = offset;
        for &byte in data {
            self.store(at, byte);
            at = at.wrapping_add(1);
        }
        self.ops.push(BusOp::BulkWrite {
            addr: self.addr,
            offset,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn bulk_read(&mut self, offset: u16, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.attempt()?;
        let book = self.book(self.addr);
        let mut at = offset;
        for slot in buf.iter_mut() {
            *slot = self.register(self.addr, book, at);
            at = at.wrapping_add(1);
        }
        self.ops.push(BusOp::BulkRead {
            addr: self.addr,
            offset,
            len: buf.len(),
        });
        Ok(())
    }
}

/// Delay source that only records what was asked of it.
#[derive(Debug, Default, Clone)]
pub struct RecordingDelay {
    calls: Vec<u64>,
}

impl RecordingDelay {
    /// No delays recorded yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requested delays in nanoseconds, in call order.
    pub fn calls_ns(&self) -> &[u64] {
        &self.calls
    }

    /// Sum of all requested delays in nanoseconds.
    pub fn total_ns(&self) -> u64 {
        self.calls.iter().fold(0u64, |acc, ns| acc.saturating_add(*ns))
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.calls.push(u64::from(ns));
    }

    fn delay_us(&mut self, us: u32) {
        self.calls.push(u64::from(us).saturating_mul(1_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.calls.push(u64::from(ms).saturating_mul(1_000_000));
    }
}
