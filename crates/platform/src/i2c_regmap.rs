//! Paged register map over a blocking `embedded_hal::i2c::I2c` bus.
//!
//! Registers are 8-bit addresses inside a 128-register window; the page is
//! chosen by writing register 0. The adapter remembers the last page written
//! for the current device and only re-selects it when a transfer lands on a
//! different page. Bulk transfers are split at page boundaries.

use embedded_hal::i2c::I2c;

use crate::bus::RegisterBus;
use crate::reg::{split_page_reg, PAGE_SIZE};

/// Page-select register inside every page.
const PAGE_REG: u8 = 0;

/// [`RegisterBus`] implementation for any blocking I2C peripheral.
pub struct I2cRegmap<I> {
    i2c: I,
    addr: u8,
    page: Option<u8>,
}

impl<I: I2c> I2cRegmap<I> {
    /// Wrap `i2c`, initially pointing at `addr` with no page known.
    pub fn new(i2c: I, addr: u8) -> Self {
        Self {
            i2c,
            addr,
            page: None,
        }
    }

    /// Give the peripheral back.
    pub fn release(self) -> I {
        self.i2c
    }

    /// Forget the cached page, e.g. after the chip was reset.
    pub fn invalidate_page(&mut self) {
        self.page = None;
    }

    fn select_page(&mut self, page: u8) -> Result<(), I::Error> {
        if self.page == Some(page) {
            return Ok(());
        }
        tracing::trace!(addr = self.addr, from = ?self.page, to = page, "page select");
        self.i2c.write(self.addr, &[PAGE_REG, page])?;
        self.page = Some(page);
        Ok(())
    }

    /// Registers left in the page starting at `reg`.
    fn room(reg: u8) -> usize {
        usize::from(PAGE_SIZE.saturating_sub(u16::from(reg)))
    }
}

impl<I: I2c> RegisterBus for I2cRegmap<I> {
    type Error = I::Error;

    fn set_address(&mut self, addr: u8) {
        if addr != self.addr {
            self.addr = addr;
            self.page = None;
        }
    }

    fn address(&self) -> u8 {
        self.addr
    }

    fn write(&mut self, offset: u16, value: u8) -> Result<(), Self::Error> {
        let (page, reg) = split_page_reg(offset);
        if reg == PAGE_REG {
            // Register 0 is the page select on every page.
            self.i2c.write(self.addr, &[PAGE_REG, value])?;
            tracing::trace!(addr = self.addr, to = value, "page set by direct write");
            self.page = Some(value);
            return Ok(());
        }
        self.select_page(page)?;
        self.i2c.write(self.addr, &[reg, value])?;
        Ok(())
    }

    fn read(&mut self, offset: u16) -> Result<u8, Self::Error> {
        let (page, reg) = split_page_reg(offset);
        self.select_page(page)?;
        let mut value = [0u8; 1];
        self.i2c.write_read(self.addr, &[reg], &mut value)?;
        Ok(value[0])
    }

    fn bulk_write(&mut self, offset: u16, data: &[u8]) -> Result<(), Self::Error> {
        // One register byte plus at most one page of data.
        let mut frame = [0u8; 1 + PAGE_SIZE as usize];
        let mut offset = offset;
        let mut rest = data;
        while !rest.is_empty() {
            let (page, reg) = split_page_reg(offset);
            let (chunk, tail) = rest.split_at(Self::room(reg).min(rest.len()));
            self.select_page(page)?;
            // SAFETY: chunk.len() <= PAGE_SIZE so 1 + chunk.len() <= frame.len().
            #[allow(clippy::indexing_slicing)]
            {
                frame[0] = reg;
                frame[1..=chunk.len()].copy_from_slice(chunk);
                self.i2c.write(self.addr, &frame[..=chunk.len()])?;
            }
            if reg == PAGE_REG {
                self.page = chunk.first().copied();
            }
            #[allow(clippy::cast_possible_truncation)] // chunk.len() <= 128
            let advanced = chunk.len() as u16;
            offset = offset.wrapping_add(advanced) & 0x7FFF;
            rest = tail;
        }
        Ok(())
    }

    fn bulk_read(&mut self, offset: u16, buf: &mut [u8]) -> Result<(), Self::Error> {
        let mut offset = offset;
        let mut rest = buf;
        while !rest.is_empty() {
            let (page, reg) = split_page_reg(offset);
            let take = Self::room(reg).min(rest.len());
            let (chunk, tail) = core::mem::take(&mut rest).split_at_mut(take);
            self.select_page(page)?;
            self.i2c.write_read(self.addr, &[reg], chunk)?;
            #[allow(clippy::cast_possible_truncation)] // take <= 128
            let advanced = take as u16;
            offset = offset.wrapping_add(advanced) & 0x7FFF;
            rest = tail;
        }
        Ok(())
    }
}
