//! Retrying, book-switching register transport.
//!
//! Every operation names a device index (`chn`) and a flat [`RegAddr`].
//! Before the transfer the transport points the bus at the device and
//! selects the register's book, using the per-device book cache to skip
//! redundant book-select writes. Each bus call is retried according to the
//! [`RetryPolicy`], sleeping after every failed attempt.
//!
//! The transport takes `&mut self` everywhere and holds no lock; the codec
//! wraps it in its fine-grained mutex.

use embedded_hal::delay::DelayNs;
use tas_platform::config::{MAX_DEVICES, RETRY_BACKOFF_US, RETRY_COUNT};
use tas_platform::{ChipVariant, RegAddr, RegisterBus, BOOK_SELECT, PAGE_SELECT};

use crate::error::{BusOpKind, TransportError};

/// Attempts and backoff for one bus operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RetryPolicy {
    /// Attempts before giving up, at least 1.
    pub attempts: u8,
    /// Sleep after each failed attempt, in microseconds.
    pub backoff_us: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: RETRY_COUNT,
            backoff_us: RETRY_BACKOFF_US,
        }
    }
}

/// One physical device on the shared bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Device {
    /// 7-bit bus address.
    pub addr: u8,
    /// Chip variant.
    pub chip: ChipVariant,
    /// Book last selected on the chip, `None` when unknown.
    pub book: Option<u8>,
    /// Set by a selector pass targeting the device; never cleared.
    pub is_loading: bool,
}

impl Device {
    /// Device at `addr` with an unknown book.
    pub const fn new(addr: u8, chip: ChipVariant) -> Self {
        Self {
            addr,
            chip,
            book: None,
            is_loading: false,
        }
    }
}

/// Register transport over one bus shared by up to [`MAX_DEVICES`] devices.
pub struct Transport<B, D> {
    bus: B,
    delay: D,
    devices: heapless::Vec<Device, MAX_DEVICES>,
    retry: RetryPolicy,
}

impl<B: RegisterBus, D: DelayNs> Transport<B, D> {
    /// Transport for `devices`, all of variant `chip`.
    ///
    /// Returns `None` for zero devices or more than [`MAX_DEVICES`].
    pub fn new(chip: ChipVariant, bus: B, delay: D, addresses: &[u8]) -> Option<Self> {
        if addresses.is_empty() {
            return None;
        }
        let mut devices = heapless::Vec::new();
        for &addr in addresses {
            devices.push(Device::new(addr, chip)).ok()?;
        }
        Some(Self {
            bus,
            delay,
            devices,
            retry: RetryPolicy::default(),
        })
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Current retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Devices in index order.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Number of devices.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// One device.
    pub fn device(&self, chn: usize) -> Option<&Device> {
        self.devices.get(chn)
    }

    /// Mark a device as targeted by a selector pass.
    pub fn set_loading(&mut self, chn: usize) {
        if let Some(device) = self.devices.get_mut(chn) {
            device.is_loading = true;
        }
    }

    /// Forget the cached book of one device, e.g. after it was reset.
    pub fn invalidate_book(&mut self, chn: usize) {
        if let Some(device) = self.devices.get_mut(chn) {
            device.book = None;
        }
    }

    /// Forget every cached book.
    pub fn invalidate_books(&mut self) {
        for device in &mut self.devices {
            device.book = None;
        }
    }

    /// Underlying bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Underlying bus, mutably. Bypasses the book cache.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Delay source.
    pub fn delay_mut(&mut self) -> &mut D {
        &mut self.delay
    }

    /// Give back the bus and delay source.
    pub fn release(self) -> (B, D) {
        (self.bus, self.delay)
    }

    /// Sleep for `ms` milliseconds.
    pub fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    /// Write one register.
    pub fn write(&mut self, chn: usize, reg: RegAddr, value: u8) -> Result<(), TransportError> {
        self.change_book(chn, reg.book())?;
        self.attempt(chn, BusOpKind::Write, reg, |bus| {
            bus.write(reg.page_reg(), value)
        })?;
        tracing::debug!(channel = chn, "write {} = 0x{:02x}", reg, value);
        Ok(())
    }

    /// Read one register.
    pub fn read(&mut self, chn: usize, reg: RegAddr) -> Result<u8, TransportError> {
        self.change_book(chn, reg.book())?;
        let value = self.attempt(chn, BusOpKind::Read, reg, |bus| bus.read(reg.page_reg()))?;
        tracing::debug!(channel = chn, "read {} = 0x{:02x}", reg, value);
        Ok(value)
    }

    /// Write consecutive registers starting at `reg`.
    pub fn bulk_write(
        &mut self,
        chn: usize,
        reg: RegAddr,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.change_book(chn, reg.book())?;
        self.attempt(chn, BusOpKind::BulkWrite, reg, |bus| {
            bus.bulk_write(reg.page_reg(), data)
        })?;
        tracing::debug!(channel = chn, "bulk write {} len {}", reg, data.len());
        Ok(())
    }

    /// Read consecutive registers starting at `reg`.
    pub fn bulk_read(
        &mut self,
        chn: usize,
        reg: RegAddr,
        buf: &mut [u8],
    ) -> Result<(), TransportError> {
        self.change_book(chn, reg.book())?;
        self.attempt(chn, BusOpKind::BulkRead, reg, |bus| {
            bus.bulk_read(reg.page_reg(), buf)
        })?;
        tracing::debug!(channel = chn, "bulk read {} len {}", reg, buf.len());
        Ok(())
    }

    /// Read-modify-write of the bits in `mask`.
    pub fn update_bits(
        &mut self,
        chn: usize,
        reg: RegAddr,
        mask: u8,
        value: u8,
    ) -> Result<(), TransportError> {
        self.change_book(chn, reg.book())?;
        self.attempt(chn, BusOpKind::UpdateBits, reg, |bus| {
            bus.update_bits(reg.page_reg(), mask, value)
        })?;
        tracing::debug!(
            channel = chn,
            "update {} mask 0x{:02x} = 0x{:02x}",
            reg,
            mask,
            value
        );
        Ok(())
    }

    /// Point the bus at device `chn` and select `book` on it.
    fn change_book(&mut self, chn: usize, book: u8) -> Result<(), TransportError> {
        let device = *self.devices.get(chn).ok_or(TransportError::NoSuchChannel {
            channel: chn,
            devices: self.devices.len(),
        })?;

        let switched = self.bus.address() != device.addr;
        if switched {
            self.bus.set_address(device.addr);
        }

        if device.book == Some(book) {
            // Page select is shared across books; put it back to a known state
            // whenever another device was addressed in between.
            if switched {
                self.attempt(chn, BusOpKind::PageSelect, PAGE_SELECT, |bus| {
                    bus.write(PAGE_SELECT.page_reg(), 0)
                })?;
            }
            return Ok(());
        }

        self.attempt(chn, BusOpKind::BookSelect, BOOK_SELECT, |bus| {
            bus.write(BOOK_SELECT.page_reg(), book)
        })?;
        if let Some(device) = self.devices.get_mut(chn) {
            device.book = Some(book);
        }
        Ok(())
    }

    fn attempt<T>(
        &mut self,
        chn: usize,
        op: BusOpKind,
        reg: RegAddr,
        mut f: impl FnMut(&mut B) -> Result<T, B::Error>,
    ) -> Result<T, TransportError> {
        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            match f(&mut self.bus) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::warn!(
                        channel = chn,
                        attempt,
                        "{} of {} failed: {:?}",
                        op,
                        reg,
                        err
                    );
                    self.delay.delay_us(self.retry.backoff_us);
                }
            }
        }
        tracing::error!(channel = chn, "{} of {} failed after {} attempts", op, reg, attempts);
        Err(TransportError::TransportFailed {
            op,
            channel: chn,
            reg,
            attempts,
        })
    }
}

impl<B, D> core::fmt::Debug for Transport<B, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Transport")
            .field("devices", &self.devices)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
