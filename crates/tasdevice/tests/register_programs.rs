//! End-to-end register programs: regbin image in, bus transactions out.
//!
//! Every test drives the public codec API against the recording bus, so the
//! assertions are on what the devices would actually see.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_hal::delay::DelayNs;
use regbin::builder::{subblock, BlockBuilder, ConfigBuilder, ImageBuilder};
use regbin::BlockType;
use tas_platform::mocks::{BusOp, RecordingBus, RecordingDelay};
use tas_platform::{ChipVariant, I2cRegmap, RegAddr, BOOK_SELECT, PAGE_SELECT};
use tasdevice::{Error, TasCodec, Transport};

type Codec<D = RecordingDelay> = TasCodec<NoopRawMutex, RecordingBus, D>;

fn codec(addresses: &[u8]) -> Codec {
    TasCodec::new(
        ChipVariant::Tas2562,
        RecordingBus::new(),
        RecordingDelay::new(),
        addresses,
    )
    .unwrap()
}

fn book_selects(ops: &[BusOp]) -> Vec<(u8, u8)> {
    ops.iter()
        .filter_map(|op| match op {
            BusOp::Write {
                addr,
                offset,
                value,
            } if *offset == BOOK_SELECT.page_reg() => Some((*addr, *value)),
            _ => None,
        })
        .collect()
}

/// Writes that change device state: no book selects, no page resets.
fn payload_writes(ops: &[BusOp]) -> Vec<BusOp> {
    ops.iter()
        .filter(|op| !op.is_book_select())
        .filter(|op| !matches!(op, BusOp::Write { offset, .. } if *offset == PAGE_SELECT.page_reg()))
        .filter(|op| !matches!(op, BusOp::Read { .. }))
        .cloned()
        .collect()
}

#[test]
fn book_is_selected_once_per_change() {
    let c = codec(&[0x38]);
    c.write(0, RegAddr::new(2, 0, 0x10), 1).unwrap();
    c.write(0, RegAddr::new(2, 1, 0x11), 2).unwrap();
    c.write(0, RegAddr::new(3, 0, 0x12), 3).unwrap();
    c.write(0, RegAddr::new(3, 0, 0x13), 4).unwrap();
    let ops = c.with_transport(|t| t.bus().ops().to_vec());
    assert_eq!(book_selects(&ops), [(0x38, 2), (0x38, 3)]);
    assert_eq!(c.devices()[0].book, Some(3));
}

#[test]
fn books_are_cached_per_device() {
    let c = codec(&[0x38, 0x39]);
    c.write(0, RegAddr::new(1, 0, 2), 1).unwrap();
    c.write(1, RegAddr::new(1, 0, 2), 1).unwrap();
    c.write(0, RegAddr::new(1, 0, 3), 1).unwrap();
    let ops = c.with_transport(|t| t.bus().ops().to_vec());
    assert_eq!(book_selects(&ops), [(0x38, 1), (0x39, 1)]);
}

#[test]
fn broadcast_single_write_lands_on_each_device_in_order() {
    let image = ImageBuilder::new(0x105, 2).config(
        ConfigBuilder::named("init").block(
            BlockBuilder::new(0, BlockType::PrePowerUp)
                .sub(subblock::single_write(0, &[(RegAddr::new(0, 0, 2), 0x11)])),
        ),
    );
    let c = codec(&[0x38, 0x39]);
    let report = c.load_firmware(&image.build()).unwrap();
    let (index, pass) = report.init.unwrap();
    assert_eq!(index, 0);
    assert_eq!(pass.blocks_applied, 1);
    assert_eq!(pass.write_failures, 0);

    let ops = c.with_transport(|t| t.bus().ops().to_vec());
    let writes: Vec<u8> = payload_writes(&ops)
        .iter()
        .filter_map(|op| match op {
            BusOp::Write {
                addr,
                offset: 2,
                value: 0x11,
            } => Some(*addr),
            _ => None,
        })
        .collect();
    assert_eq!(writes, [0x38, 0x39]);
    c.with_transport(|t| {
        assert_eq!(t.bus().register(0x38, 0, 2), 0x11);
        assert_eq!(t.bus().register(0x39, 0, 2), 0x11);
    });
}

#[test]
fn explicit_selector_skips_other_devices() {
    let image = ImageBuilder::new(0x105, 2).config(
        ConfigBuilder::named("init").block(
            BlockBuilder::new(2, BlockType::PrePowerUp)
                .sub(subblock::field_write(0, RegAddr::new(0, 0, 4), 0xF0, 0xA0)),
        ),
    );
    let c = codec(&[0x38, 0x39]);
    c.load_firmware(&image.build()).unwrap();
    c.with_transport(|t| {
        assert!(t.bus().ops().iter().all(|op| op.addr() == 0x39));
        assert_eq!(t.bus().register(0x39, 0, 4), 0xA0);
        assert!(!t.device(0).unwrap().is_loading);
    });
}

struct SleepDelay;

impl DelayNs for SleepDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

#[test]
fn delay_sub_block_really_sleeps() {
    let image = ImageBuilder::new(0x105, 1).config(
        ConfigBuilder::named("init").block(
            BlockBuilder::new(0, BlockType::PrePowerUp)
                .sub(subblock::delay(0, 100))
                .sub(subblock::single_write(0, &[(RegAddr::new(0, 0, 2), 1)])),
        ),
    );
    let c: Codec<SleepDelay> =
        TasCodec::new(ChipVariant::Tas2562, RecordingBus::new(), SleepDelay, &[0x38]).unwrap();
    let start = Instant::now();
    c.load_firmware(&image.build()).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(100));
    c.with_transport(|t| assert_eq!(t.bus().register(0x38, 0, 2), 1));
}

#[test]
fn reselecting_a_config_is_idempotent() {
    let image = ImageBuilder::new(0x105, 2).config(
        ConfigBuilder::named("music").block(
            BlockBuilder::new(0, BlockType::PrePowerUp)
                .sub(subblock::single_write(
                    0,
                    &[(RegAddr::new(0, 0, 2), 0x0C), (RegAddr::new(4, 1, 8), 0x33)],
                ))
                .sub(subblock::burst(0, RegAddr::new(0, 2, 0x18), &[9, 8, 7, 6]))
                .sub(subblock::field_write(0, RegAddr::new(0, 0, 3), 0x0F, 0x02)),
        ),
    );
    let c = codec(&[0x38, 0x39]);
    c.load_firmware(&image.build()).unwrap();

    c.select(0, BlockType::PrePowerUp).unwrap();
    let first = c.with_transport(|t| {
        let writes = payload_writes(t.bus().ops());
        t.bus_mut().clear_ops();
        writes
    });
    let snapshot = |c: &Codec| {
        c.with_transport(|t| {
            [0x38, 0x39].map(|addr| {
                [
                    t.bus().register(addr, 0, 2),
                    t.bus().register(addr, 4, 136),
                    t.bus().register(addr, 0, 0x118),
                    t.bus().register(addr, 0, 3),
                ]
            })
        })
    };
    let after_first = snapshot(&c);

    c.select(0, BlockType::PrePowerUp).unwrap();
    let second = c.with_transport(|t| payload_writes(t.bus().ops()));
    assert_eq!(first, second);
    assert_eq!(snapshot(&c), after_first);
    assert_eq!(after_first[1], [0x0C, 0x33, 9, 0x02]);
}

#[test]
fn transient_failures_are_retried_with_backoff() {
    let c = codec(&[0x38]);
    c.write(0, RegAddr::new(0, 0, 2), 0).unwrap();
    c.with_transport(|t| t.bus_mut().fail_next(2));
    c.write(0, RegAddr::new(0, 0, 2), 0x5A).unwrap();
    c.with_transport(|t| {
        assert_eq!(t.bus().register(0x38, 0, 2), 0x5A);
        assert_eq!(t.delay_mut().calls_ns(), [5_000_000, 5_000_000]);
    });
}

#[test]
fn persistent_failure_surfaces_after_three_attempts() {
    let c = codec(&[0x38]);
    c.write(0, RegAddr::new(0, 0, 2), 0).unwrap();
    c.with_transport(|t| {
        t.bus_mut().clear_ops();
        t.bus_mut().fail_all(true);
    });
    let err = c.write(0, RegAddr::new(0, 0, 2), 1).unwrap_err();
    assert!(matches!(
        err,
        Error::TransportFailed {
            channel: 0,
            reg,
            ..
        } if reg == RegAddr::new(0, 0, 2)
    ));
    c.with_transport(|t| {
        assert_eq!(t.bus().attempts(), 3);
        assert_eq!(t.delay_mut().calls_ns(), [5_000_000; 3]);
    });
}

#[test]
fn missing_channel_is_rejected_without_traffic() {
    let c = codec(&[0x38, 0x39]);
    assert_eq!(
        c.write(2, RegAddr::new(0, 0, 2), 1),
        Err(Error::NoSuchChannel { channel: 2 })
    );
    assert_eq!(
        c.read(7, RegAddr::new(0, 0, 2)),
        Err(Error::NoSuchChannel { channel: 7 })
    );
    c.with_transport(|t| assert_eq!(t.bus().attempts(), 0));
}

#[test]
fn failing_device_does_not_stop_the_program() {
    let image = ImageBuilder::new(0x105, 1).config(
        ConfigBuilder::named("init").block(
            BlockBuilder::new(0, BlockType::PrePowerUp)
                .sub(subblock::single_write(
                    0,
                    &[(RegAddr::new(0, 0, 2), 0xAA), (RegAddr::new(0, 0, 3), 0xBB)],
                ))
                .sub(subblock::single_write(0, &[(RegAddr::new(0, 0, 4), 0xCC)])),
        ),
    );
    let c = codec(&[0x38]);
    // Book select succeeds, then the first data write fails three times.
    c.write(0, RegAddr::new(0, 0, 1), 0).unwrap();
    c.with_transport(|t| t.bus_mut().fail_next(3));
    let report = c.load_firmware(&image.build()).unwrap();
    let (_, pass) = report.init.unwrap();
    assert_eq!(pass.write_failures, 1);
    c.with_transport(|t| {
        assert_eq!(t.bus().register(0x38, 0, 2), 0);
        assert_eq!(t.bus().register(0x38, 0, 3), 0xBB);
        assert_eq!(t.bus().register(0x38, 0, 4), 0xCC);
    });
}

#[test]
fn returning_to_a_device_resets_its_page_with_one_transfer() {
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    let expectations = [
        I2cTransaction::write(0x38, vec![0x00, 0x00]),
        I2cTransaction::write(0x38, vec![0x7F, 0x00]),
        I2cTransaction::write(0x38, vec![0x02, 0x11]),
        I2cTransaction::write(0x39, vec![0x00, 0x00]),
        I2cTransaction::write(0x39, vec![0x7F, 0x00]),
        I2cTransaction::write(0x39, vec![0x02, 0x22]),
        // Book still cached for 0x38: one page reset, then the data.
        I2cTransaction::write(0x38, vec![0x00, 0x00]),
        I2cTransaction::write(0x38, vec![0x02, 0x33]),
    ];
    let bus = I2cRegmap::new(I2cMock::new(&expectations), 0x38);
    let mut t = Transport::new(
        ChipVariant::Tas2562,
        bus,
        RecordingDelay::new(),
        &[0x38, 0x39],
    )
    .unwrap();
    let reg = RegAddr::new(0, 0, 0x02);
    t.write(0, reg, 0x11).unwrap();
    t.write(1, reg, 0x22).unwrap();
    t.write(0, reg, 0x33).unwrap();

    let (bus, _delay) = t.release();
    bus.release().done();
}
