//! Register bus abstraction.
//!
//! A [`RegisterBus`] reaches one device at a time on a shared control bus and
//! addresses registers by their in-book offset (`page * 128 + reg`). Page
//! selection belongs to the implementation; book selection and retries are
//! layered on top by the driver.
//!
//! Implementations:
//! - [`crate::i2c_regmap::I2cRegmap`]: any `embedded_hal::i2c::I2c`
//! - [`crate::mocks::RecordingBus`]: host tests (`std` feature)

/// Byte-wide register access to the device currently selected on the bus.
pub trait RegisterBus {
    /// Bus-level error type.
    type Error: core::fmt::Debug;

    /// Point subsequent transfers at the 7-bit device address `addr`.
    fn set_address(&mut self, addr: u8);

    /// Device address transfers currently go to.
    fn address(&self) -> u8;

    /// Write one register.
    fn write(&mut self, offset: u16, value: u8) -> Result<(), Self::Error>;

    /// Read one register.
    fn read(&mut self, offset: u16) -> Result<u8, Self::Error>;

    /// Write consecutive registers starting at `offset`.
    fn bulk_write(&mut self, offset: u16, data: &[u8]) -> Result<(), Self::Error>;

    /// Read consecutive registers starting at `offset`.
    fn bulk_read(&mut self, offset: u16, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Read-modify-write of the bits selected by `mask`.
    ///
    /// The write is skipped when the register already holds the value.
    fn update_bits(&mut self, offset: u16, mask: u8, value: u8) -> Result<(), Self::Error> {
        let old = self.read(offset)?;
        let new = (old & !mask) | (value & mask);
        if new != old {
            self.write(offset, new)?;
        }
        Ok(())
    }
}

impl<T: RegisterBus + ?Sized> RegisterBus for &mut T {
    type Error = T::Error;

    fn set_address(&mut self, addr: u8) {
        T::set_address(self, addr);
    }

    fn address(&self) -> u8 {
        T::address(self)
    }

    fn write(&mut self, offset: u16, value: u8) -> Result<(), Self::Error> {
        T::write(self, offset, value)
    }

    fn read(&mut self, offset: u16) -> Result<u8, Self::Error> {
        T::read(self, offset)
    }

    fn bulk_write(&mut self, offset: u16, data: &[u8]) -> Result<(), Self::Error> {
        T::bulk_write(self, offset, data)
    }

    fn bulk_read(&mut self, offset: u16, buf: &mut [u8]) -> Result<(), Self::Error> {
        T::bulk_read(self, offset, buf)
    }

    fn update_bits(&mut self, offset: u16, mask: u8, value: u8) -> Result<(), Self::Error> {
        T::update_bits(self, offset, mask, value)
    }
}
