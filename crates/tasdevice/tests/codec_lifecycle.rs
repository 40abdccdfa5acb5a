//! Codec lifecycle: firmware, stream hooks, profiles, controls and resets.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction};
use regbin::builder::{subblock, BlockBuilder, ConfigBuilder, ImageBuilder};
use regbin::BlockType;
use tas_platform::mocks::{BusOp, RecordingBus, RecordingDelay};
use tas_platform::{ChipVariant, RegAddr, SW_RESET};
use tasdevice::{ControlKind, Error, Stream, TasCodec, PROFILE_CONTROL};

type Codec = TasCodec<NoopRawMutex, RecordingBus, RecordingDelay>;

const AMP_CTRL: RegAddr = RegAddr::new(0, 0, 2);

fn codec(chip: ChipVariant, addresses: &[u8]) -> Codec {
    TasCodec::new(chip, RecordingBus::new(), RecordingDelay::new(), addresses).unwrap()
}

fn reg(c: &Codec, addr: u8, reg: RegAddr) -> u8 {
    c.with_transport(|t| t.bus().register(addr, reg.book(), reg.page_reg()))
}

/// `init` plus two playback profiles with distinct power-up values.
fn two_profile_image(ndev: u8) -> ImageBuilder {
    let profile = |name: &str, up: u8| {
        ConfigBuilder::named(name)
            .block(
                BlockBuilder::new(0, BlockType::PrePowerUp)
                    .sub(subblock::single_write(0, &[(AMP_CTRL, up)])),
            )
            .block(
                BlockBuilder::new(0, BlockType::PreShutdown)
                    .sub(subblock::single_write(0, &[(AMP_CTRL, 0x0E)])),
            )
    };
    ImageBuilder::new(0x105, ndev)
        .config(
            ConfigBuilder::named("tas2562-init").block(
                BlockBuilder::new(0, BlockType::PrePowerUp)
                    .sub(subblock::single_write(0, &[(RegAddr::new(0, 0, 0x30), 0x01)])),
            ),
        )
        .config(profile("music", 0x0C))
        .config(profile("voice", 0x0D))
}

// ── Construction ────────────────────────────────────────────────────────────

#[test]
fn device_count_is_bounded() {
    let err = TasCodec::<NoopRawMutex, _, _>::new(
        ChipVariant::Tas2562,
        RecordingBus::new(),
        RecordingDelay::new(),
        &[],
    )
    .unwrap_err();
    assert_eq!(err, Error::InvalidDeviceCount { count: 0, max: 4 });

    let err = TasCodec::<NoopRawMutex, _, _>::new(
        ChipVariant::Tas2562,
        RecordingBus::new(),
        RecordingDelay::new(),
        &[0x38, 0x39, 0x3A, 0x3B, 0x3C],
    )
    .unwrap_err();
    assert_eq!(err, Error::InvalidDeviceCount { count: 5, max: 4 });
}

#[test]
fn codec_works_behind_a_critical_section_mutex() {
    let c: TasCodec<CriticalSectionRawMutex, _, _> = TasCodec::new(
        ChipVariant::Tas2562,
        RecordingBus::new(),
        RecordingDelay::new(),
        &[0x38],
    )
    .unwrap();
    c.write(0, AMP_CTRL, 0x42).unwrap();
    assert_eq!(c.read(0, AMP_CTRL).unwrap(), 0x42);
}

// ── Firmware ────────────────────────────────────────────────────────────────

#[test]
fn load_runs_the_init_config() {
    let c = codec(ChipVariant::Tas2562, &[0x38, 0x39]);
    let report = c.load_firmware(&two_profile_image(2).build()).unwrap();
    assert_eq!(report.config_count, 3);
    assert_eq!(report.init.map(|(index, _)| index), Some(0));
    assert_eq!(reg(&c, 0x38, RegAddr::new(0, 0, 0x30)), 0x01);
    assert_eq!(reg(&c, 0x39, RegAddr::new(0, 0, 0x30)), 0x01);
    assert_eq!(reg(&c, 0x38, AMP_CTRL), 0);
    assert!(c.has_firmware());
    assert_eq!(c.profile(), Ok(0));
}

#[test]
fn rejected_image_leaves_no_firmware() {
    let c = codec(ChipVariant::Tas2562, &[0x38]);
    c.load_firmware(&two_profile_image(1).build()).unwrap();
    let err = c.load_firmware(&two_profile_image(2).build()).unwrap_err();
    assert!(matches!(
        err,
        Error::Format(regbin::Error::DeviceCountMismatch { .. })
    ));
    assert!(!c.has_firmware());
    assert_eq!(c.select(0, BlockType::PrePowerUp), Err(Error::NoFirmware));
    assert_eq!(c.profile(), Err(Error::NoFirmware));
}

#[test]
fn unload_drops_the_firmware() {
    let c = codec(ChipVariant::Tas2562, &[0x38]);
    c.load_firmware(&two_profile_image(1).build()).unwrap();
    c.unload_firmware();
    assert!(!c.has_firmware());
    assert_eq!(c.mute(Stream::Playback, false), None);
}

// ── Stream hooks ────────────────────────────────────────────────────────────

#[test]
fn unmute_powers_up_and_last_mute_shuts_down() {
    let c = codec(ChipVariant::Tas2562, &[0x38]);
    c.load_firmware(&two_profile_image(1).build()).unwrap();
    assert_eq!(c.set_profile(1), Ok(true));
    // No stream yet, so nothing is applied.
    assert_eq!(reg(&c, 0x38, AMP_CTRL), 0);

    let up = c.mute(Stream::Playback, false).unwrap();
    assert_eq!(up.blocks_applied, 1);
    assert_eq!(reg(&c, 0x38, AMP_CTRL), 0x0C);

    c.mute(Stream::Capture, false).unwrap();
    assert_eq!(c.mute(Stream::Playback, true), None);
    assert_eq!(reg(&c, 0x38, AMP_CTRL), 0x0C);

    let down = c.mute(Stream::Capture, true).unwrap();
    assert_eq!(down.blocks_applied, 1);
    assert_eq!(reg(&c, 0x38, AMP_CTRL), 0x0E);
}

// ── Profile ─────────────────────────────────────────────────────────────────

#[test]
fn profile_is_clamped_to_the_last_config() {
    let c = codec(ChipVariant::Tas2562, &[0x38]);
    c.load_firmware(&two_profile_image(1).build()).unwrap();
    assert_eq!(c.profile_max(), Ok(2));
    assert_eq!(c.set_profile(99), Ok(true));
    assert_eq!(c.profile(), Ok(2));
    assert_eq!(c.set_profile(2), Ok(false));
}

#[test]
fn profile_change_during_playback_applies_immediately() {
    let c = codec(ChipVariant::Tas2562, &[0x38]);
    c.load_firmware(&two_profile_image(1).build()).unwrap();
    c.set_profile(1).unwrap();
    c.mute(Stream::Playback, false).unwrap();
    assert_eq!(reg(&c, 0x38, AMP_CTRL), 0x0C);
    c.set_profile(2).unwrap();
    assert_eq!(reg(&c, 0x38, AMP_CTRL), 0x0D);
}

#[test]
fn profile_control_mirrors_set_profile() {
    let c = codec(ChipVariant::Tas2562, &[0x38]);
    assert_eq!(c.find_control(PROFILE_CONTROL), None);
    c.load_firmware(&two_profile_image(1).build()).unwrap();
    let index = c.find_control(PROFILE_CONTROL).unwrap();
    assert_eq!(c.controls()[index].max, 2);
    c.mixer_put(index, 7).unwrap();
    assert_eq!(c.mixer_get(index), Ok(2));
}

// ── Mixer controls ──────────────────────────────────────────────────────────

#[test]
fn field_control_shifts_and_preserves_other_bits() {
    let c = codec(ChipVariant::Tas2110, &[0x38, 0x39]);
    let index = c.find_control("tas2110-amp-gain-volume").unwrap();
    assert_eq!(c.controls()[index].max, 0x14);
    let level = RegAddr::new(0, 0, 0x03);
    c.write(0, level, 0x81).unwrap();
    c.write(1, level, 0x81).unwrap();

    c.mixer_put(index, 0x0A).unwrap();
    assert_eq!(reg(&c, 0x38, level), 0x95);
    assert_eq!(reg(&c, 0x39, level), 0x95);
    assert_eq!(c.mixer_get(index), Ok(0x0A));

    c.mixer_put(index, 0xFF).unwrap();
    assert_eq!(c.mixer_get(index), Ok(0x14));
}

#[test]
fn inverted_control_counts_down_on_the_wire() {
    let c = codec(ChipVariant::Tas2770, &[0x38]);
    let index = c.find_control("tas2770-digital-pcm-volume").unwrap();
    c.mixer_put(index, 1).unwrap();
    assert_eq!(reg(&c, 0x38, RegAddr::new(0, 0, 0x05)), 200);
    assert_eq!(c.mixer_get(index), Ok(1));
}

#[test]
fn per_device_controls_address_one_device() {
    let c = codec(ChipVariant::Pcm9211, &[0x40, 0x41]);
    let names: Vec<String> = c.controls().iter().map(|c| c.name.to_string()).collect();
    assert_eq!(
        names,
        [
            "pcm9211s-dev0-ch1-digital-gain",
            "pcm9211s-dev1-ch1-digital-gain",
            "pcm9211s-dev0-ch2-digital-gain",
            "pcm9211s-dev1-ch2-digital-gain",
        ]
    );
    let index = c.find_control("pcm9211s-dev1-ch1-digital-gain").unwrap();
    assert!(matches!(
        c.controls()[index].kind,
        ControlKind::Mixer {
            device: Some(1),
            ..
        }
    ));
    c.mixer_put(index, 0x80).unwrap();
    let gain = RegAddr::new(0, 0, 0x46);
    assert_eq!(reg(&c, 0x41, gain), 0x80);
    assert_eq!(reg(&c, 0x40, gain), 0);
    assert_eq!(c.mixer_get(index), Ok(0x80));
}

#[test]
fn unknown_control_index_is_rejected() {
    let c = codec(ChipVariant::Tas2110, &[0x38]);
    assert_eq!(c.mixer_get(5), Err(Error::ControlOutOfRange { index: 5 }));
    assert_eq!(c.mixer_put(5, 0), Err(Error::ControlOutOfRange { index: 5 }));
}

// ── Resets ──────────────────────────────────────────────────────────────────

#[test]
fn sw_reset_writes_every_device_and_forgets_books() {
    let c = codec(ChipVariant::Tas2562, &[0x38, 0x39]);
    c.write(0, RegAddr::new(0, 0, 5), 1).unwrap();
    c.sw_reset().unwrap();
    assert_eq!(reg(&c, 0x38, SW_RESET), 0x01);
    assert_eq!(reg(&c, 0x39, SW_RESET), 0x01);
    assert!(c.devices().iter().all(|device| device.book.is_none()));

    c.with_transport(|t| t.bus_mut().clear_ops());
    c.write(0, RegAddr::new(0, 0, 5), 2).unwrap();
    c.with_transport(|t| assert!(t.bus().ops()[0].is_book_select()));
}

#[test]
fn pcm9211_sw_reset_clears_the_master_reset_bit() {
    let c = codec(ChipVariant::Pcm9211, &[0x40]);
    let sw_ctrl = RegAddr::new(0, 0, 0x40);
    c.write(0, sw_ctrl, 0xF0).unwrap();
    c.sw_reset().unwrap();
    assert_eq!(reg(&c, 0x40, sw_ctrl), 0x70);
}

#[test]
fn sw_reset_tries_every_device_before_failing() {
    let c = codec(ChipVariant::Tas2562, &[0x38, 0x39]);
    c.write(0, RegAddr::new(0, 0, 5), 1).unwrap();
    c.write(1, RegAddr::new(0, 0, 5), 1).unwrap();
    // Device 0's page select uses up three failures; device 1 recovers on
    // its second attempt.
    c.with_transport(|t| t.bus_mut().fail_next(4));
    let err = c.sw_reset().unwrap_err();
    assert!(matches!(err, Error::TransportFailed { channel: 0, .. }));
    assert_eq!(reg(&c, 0x39, SW_RESET), 0x01);
}

#[test]
fn hw_reset_pulses_active_high_parts() {
    let c = codec(ChipVariant::Tas2562, &[0x38]);
    c.write(0, AMP_CTRL, 1).unwrap();
    let mut pin = PinMock::new(&[Transaction::set(State::High), Transaction::set(State::Low)]);
    let mut delay = RecordingDelay::new();
    c.hw_reset(&mut pin, &mut delay).unwrap();
    pin.done();
    assert_eq!(delay.calls_ns(), [500_000]);
    assert_eq!(c.devices()[0].book, None);
}

#[test]
fn hw_reset_pulses_active_low_parts() {
    let c = codec(ChipVariant::Tas5805, &[0x2C]);
    let mut pin = PinMock::new(&[Transaction::set(State::Low), Transaction::set(State::High)]);
    c.hw_reset(&mut pin, &mut RecordingDelay::new()).unwrap();
    pin.done();
}

// ── Interrupts ──────────────────────────────────────────────────────────────

#[test]
fn interrupt_latches_are_read_from_every_device() {
    let c = codec(ChipVariant::Tas2560, &[0x4C, 0x4D]);
    c.write(1, RegAddr::new(0, 0, 0x27), 0x80).unwrap();
    let readings = c.read_interrupt_latches();
    assert_eq!(readings.len(), 4);
    let hit: Vec<_> = readings.iter().filter(|r| r.value != 0).collect();
    assert_eq!(hit.len(), 1);
    assert_eq!(hit[0].channel, 1);
    assert_eq!(hit[0].reg, RegAddr::new(0, 0, 0x27));
}

#[test]
fn chips_without_latches_read_nothing() {
    let c = codec(ChipVariant::Tas2770, &[0x38]);
    assert!(c.read_interrupt_latches().is_empty());
    c.with_transport(|t| assert!(!t.bus().ops().iter().any(|op| matches!(op, BusOp::Read { .. }))));
}
