//! Block interpreter.
//!
//! Executes one sub-block of a block payload against the devices its block
//! selector addresses. Decoding is delegated to [`regbin::decode`], which
//! bounds-checks the whole command before anything reaches the bus.
//! Register failures are logged and counted; they never stop the program.

use regbin::{decode, Command, DeviceSelector, SubBlockError};
use tas_platform::config::MAX_DEVICES;
use tas_platform::{RegAddr, RegisterBus};

use embedded_hal::delay::DelayNs;

use crate::error::TransportError;
use crate::transport::Transport;

/// Devices and delay source a register program runs against.
pub trait ProgramTarget {
    /// Devices present.
    fn device_count(&self) -> usize;

    /// Whether device `chn` was targeted by a selector pass.
    fn is_loading(&self, chn: usize) -> bool;

    /// Mark device `chn` as targeted.
    fn set_loading(&mut self, chn: usize);

    /// Write one register.
    fn write(&mut self, chn: usize, reg: RegAddr, value: u8) -> Result<(), TransportError>;

    /// Write consecutive registers.
    fn bulk_write(&mut self, chn: usize, reg: RegAddr, data: &[u8])
        -> Result<(), TransportError>;

    /// Read-modify-write.
    fn update_bits(
        &mut self,
        chn: usize,
        reg: RegAddr,
        mask: u8,
        value: u8,
    ) -> Result<(), TransportError>;

    /// Sleep.
    fn delay_ms(&mut self, ms: u32);
}

impl<B: RegisterBus, D: DelayNs> ProgramTarget for Transport<B, D> {
    fn device_count(&self) -> usize {
        Transport::device_count(self)
    }

    fn is_loading(&self, chn: usize) -> bool {
        self.device(chn).is_some_and(|device| device.is_loading)
    }

    fn set_loading(&mut self, chn: usize) {
        Transport::set_loading(self, chn);
    }

    fn write(&mut self, chn: usize, reg: RegAddr, value: u8) -> Result<(), TransportError> {
        Transport::write(self, chn, reg, value)
    }

    fn bulk_write(
        &mut self,
        chn: usize,
        reg: RegAddr,
        data: &[u8],
    ) -> Result<(), TransportError> {
        Transport::bulk_write(self, chn, reg, data)
    }

    fn update_bits(
        &mut self,
        chn: usize,
        reg: RegAddr,
        mask: u8,
        value: u8,
    ) -> Result<(), TransportError> {
        Transport::update_bits(self, chn, reg, mask, value)
    }

    fn delay_ms(&mut self, ms: u32) {
        Transport::delay_ms(self, ms);
    }
}

/// Outcome of one executed sub-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Processed {
    /// Bytes consumed from the payload, selector and opcode included.
    pub consumed: usize,
    /// Register operations that failed after retries.
    pub write_failures: usize,
}

/// Device indices `selector` addresses, in index order.
///
/// `All` picks every device currently loading; `Device(n)` picks `n`
/// whatever its flag, even when out of range, so the transport reports it.
pub fn targets<T: ProgramTarget + ?Sized>(
    target: &T,
    selector: DeviceSelector,
) -> heapless::Vec<usize, MAX_DEVICES> {
    let mut out = heapless::Vec::new();
    match selector {
        DeviceSelector::All => {
            for chn in (0..target.device_count()).filter(|&chn| target.is_loading(chn)) {
                if out.push(chn).is_err() {
                    break;
                }
            }
        }
        DeviceSelector::Device(index) => {
            // Capacity is MAX_DEVICES >= 1.
            let _ = out.push(usize::from(index));
        }
    }
    out
}

fn record(failures: &mut usize, result: Result<(), TransportError>) {
    if let Err(err) = result {
        tracing::error!("{}", err);
        *failures = failures.saturating_add(1);
    }
}

/// Execute the sub-block at the start of `stream` for the devices
/// `selector` resolves to.
///
/// `stream` runs to the end of the block payload. On a decode error nothing
/// is sent to the bus and the caller should abandon the block.
pub fn process_block<T: ProgramTarget + ?Sized>(
    target: &mut T,
    stream: &[u8],
    selector: DeviceSelector,
) -> Result<Processed, SubBlockError> {
    let sub = decode(stream).inspect_err(|err| tracing::error!("{}", err))?;
    let mut failures = 0usize;

    match &sub.command {
        Command::Delay { ms } => {
            if targets(target, selector).is_empty() {
                tracing::debug!("delay {} ms skipped, no device loading", ms);
            } else {
                tracing::debug!("delay {} ms", ms);
                target.delay_ms(u32::from(*ms));
            }
        }
        command => {
            for chn in targets(target, selector) {
                match command {
                    Command::SingleWrite(writes) => {
                        for write in writes.clone() {
                            let result = target.write(chn, write.reg, write.value);
                            record(&mut failures, result);
                        }
                    }
                    Command::Burst { reg, data } => {
                        let result = target.bulk_write(chn, *reg, data);
                        record(&mut failures, result);
                    }
                    Command::FieldWrite { reg, mask, value } => {
                        let result = target.update_bits(chn, *reg, *mask, *value);
                        record(&mut failures, result);
                    }
                    Command::Delay { .. } => {}
                }
            }
        }
    }

    Ok(Processed {
        consumed: sub.len,
        write_failures: failures,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use regbin::builder::subblock;
    use regbin::Opcode;
    use tas_platform::mocks::{BusOp, RecordingBus, RecordingDelay};
    use tas_platform::ChipVariant;

    fn transport(n: usize) -> Transport<RecordingBus, RecordingDelay> {
        let addresses = [0x38, 0x39, 0x3A, 0x3B];
        Transport::new(
            ChipVariant::Tas2562,
            RecordingBus::new(),
            RecordingDelay::new(),
            &addresses[..n],
        )
        .unwrap()
    }

    #[test]
    fn selector_zero_reaches_only_loading_devices() {
        let mut t = transport(3);
        t.set_loading(0);
        t.set_loading(2);
        let sub = subblock::single_write(0, &[(RegAddr::new(0, 0, 2), 0x11)]);
        let done = process_block(&mut t, &sub, DeviceSelector::All).unwrap();
        assert_eq!(done.consumed, 8);
        assert_eq!(t.bus().register(0x38, 0, 2), 0x11);
        assert_eq!(t.bus().register(0x39, 0, 2), 0);
        assert_eq!(t.bus().register(0x3A, 0, 2), 0x11);
    }

    #[test]
    fn explicit_selector_ignores_loading_flag() {
        let mut t = transport(2);
        let sub = subblock::field_write(0, RegAddr::new(0, 0, 3), 0x0F, 0x05);
        t.bus_mut().set_register(0x39, 0, 3, 0xF0);
        process_block(&mut t, &sub, DeviceSelector::Device(1)).unwrap();
        assert_eq!(t.bus().register(0x39, 0, 3), 0xF5);
        assert!(t.bus().ops().iter().all(|op| op.addr() == 0x39));
    }

    #[test]
    fn burst_is_one_bulk_write_per_device() {
        let mut t = transport(2);
        t.set_loading(0);
        t.set_loading(1);
        let sub = subblock::burst(0, RegAddr::new(0, 0, 0x10), &[1, 2, 3, 4, 5, 6, 7, 8]);
        let done = process_block(&mut t, &sub, DeviceSelector::All).unwrap();
        assert_eq!(done.consumed, 16);
        let bursts: Vec<u8> = t
            .bus()
            .ops()
            .iter()
            .filter_map(|op| match op {
                BusOp::BulkWrite { addr, data, .. } if data.len() == 8 => Some(*addr),
                _ => None,
            })
            .collect();
        assert_eq!(bursts, [0x38, 0x39]);
    }

    #[test]
    fn delay_sleeps_once() {
        let mut t = transport(2);
        t.set_loading(0);
        t.set_loading(1);
        let done = process_block(&mut t, &subblock::delay(0, 20), DeviceSelector::All).unwrap();
        assert_eq!(done.consumed, 4);
        assert_eq!(t.delay_mut().calls_ns(), [20_000_000]);
        assert!(t.bus().ops().is_empty());
    }

    #[test]
    fn delay_without_loading_devices_does_not_sleep() {
        let mut t = transport(2);
        let done = process_block(&mut t, &subblock::delay(0, 20), DeviceSelector::All).unwrap();
        assert_eq!(done.consumed, 4);
        assert!(t.delay_mut().calls_ns().is_empty());

        process_block(&mut t, &subblock::delay(0, 20), DeviceSelector::Device(1)).unwrap();
        assert_eq!(t.delay_mut().calls_ns(), [20_000_000]);
    }

    #[test]
    fn out_of_bounds_touches_nothing() {
        let mut t = transport(1);
        t.set_loading(0);
        let mut sub = subblock::burst(0, RegAddr::new(0, 0, 0x10), &[1, 2, 3, 4]);
        sub.pop();
        let err = process_block(&mut t, &sub, DeviceSelector::All).unwrap_err();
        assert!(matches!(
            err,
            SubBlockError::OutOfBounds {
                opcode: Opcode::Burst,
                ..
            }
        ));
        assert_eq!(t.bus().attempts(), 0);
    }

    #[test]
    fn failed_writes_are_counted_and_skipped() {
        let mut t = transport(1);
        t.set_loading(0);
        t.write(0, RegAddr::new(0, 0, 1), 0).unwrap();
        t.bus_mut().fail_next(3);
        let sub = subblock::single_write(
            0,
            &[(RegAddr::new(0, 0, 2), 0xAA), (RegAddr::new(0, 0, 3), 0xBB)],
        );
        let done = process_block(&mut t, &sub, DeviceSelector::All).unwrap();
        assert_eq!(done.write_failures, 1);
        assert_eq!(t.bus().register(0x38, 0, 2), 0);
        assert_eq!(t.bus().register(0x38, 0, 3), 0xBB);
    }

    #[test]
    fn missing_device_counts_as_failure() {
        let mut t = transport(1);
        let sub = subblock::single_write(0, &[(RegAddr::new(0, 0, 2), 1)]);
        let done = process_block(&mut t, &sub, DeviceSelector::Device(3)).unwrap();
        assert_eq!(done.write_failures, 1);
        assert_eq!(t.bus().attempts(), 0);
    }
}
