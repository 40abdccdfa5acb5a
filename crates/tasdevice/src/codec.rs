//! Locked codec: firmware lifecycle, stream hooks, controls and resets.
//!
//! Two locks guard the codec. The coarse lock covers the firmware state
//! (parsed image, current profile, active streams) and is held for a whole
//! firmware load, selector pass or control update. The fine lock covers the
//! transport and is taken per register transaction, so direct register
//! access interleaves with a long selector pass only between transactions.
//! The coarse lock is always taken first.

use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt::Write as _;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use regbin::{BlockType, RegBin};
use tas_platform::config::{HW_RESET_PULSE_US, MAX_DEVICES};
use tas_platform::{
    ChipVariant, MixerAccess, MixerControl, MixerScope, RegAddr, RegisterBus, ResetPolarity,
    ResetStrategy,
};

use crate::error::{Error, TransportError};
use crate::interpreter::ProgramTarget;
use crate::selector::{select, SelectReport};
use crate::transport::{Device, Transport};

/// Longest control name, NUL excluded.
pub const CONTROL_NAME_LEN: usize = 44;

/// Control name storage.
pub type ControlName = heapless::String<CONTROL_NAME_LEN>;

/// Name of the profile selection control.
pub const PROFILE_CONTROL: &str = "Profile";

/// Substring marking the config applied right after a firmware load.
pub const INIT_CONFIG: &str = "init";

/// Audio stream direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stream {
    /// Playback.
    Playback,
    /// Capture.
    Capture,
}

/// What a control drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlKind {
    /// Current profile (config index).
    Profile,
    /// Register-backed mixer.
    Mixer {
        /// Register map entry.
        mixer: MixerControl,
        /// Device for per-device controls, `None` for broadcast ones.
        device: Option<usize>,
    },
}

/// Descriptor of one user-visible control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlInfo {
    /// Control name.
    pub name: ControlName,
    /// Largest value; the smallest is always 0.
    pub max: u32,
    /// Backing.
    pub kind: ControlKind,
}

/// One interrupt latch register read back from a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LatchReading {
    /// Device index.
    pub channel: usize,
    /// Latch register.
    pub reg: RegAddr,
    /// Value read.
    pub value: u8,
}

/// Result of a successful firmware load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Configurations in the image.
    pub config_count: usize,
    /// Init config index and its pre-power-up pass, if the image has one.
    pub init: Option<(usize, SelectReport)>,
}

#[derive(Debug, Default)]
struct FirmwareState {
    regbin: Option<RegBin>,
    profile: usize,
    playback: bool,
    capture: bool,
}

impl FirmwareState {
    fn stream_active(&self) -> bool {
        self.playback || self.capture
    }
}

/// Transport borrowed through the fine lock, one transaction at a time.
struct Locked<'a, M: RawMutex, B, D> {
    transport: &'a Mutex<M, RefCell<Transport<B, D>>>,
}

impl<M: RawMutex, B: RegisterBus, D: DelayNs> Locked<'_, M, B, D> {
    fn with<R>(&self, f: impl FnOnce(&mut Transport<B, D>) -> R) -> R {
        self.transport.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

impl<M: RawMutex, B: RegisterBus, D: DelayNs> ProgramTarget for Locked<'_, M, B, D> {
    fn device_count(&self) -> usize {
        self.with(|t| t.device_count())
    }

    fn is_loading(&self, chn: usize) -> bool {
        self.with(|t| t.device(chn).is_some_and(|device| device.is_loading))
    }

    fn set_loading(&mut self, chn: usize) {
        self.with(|t| t.set_loading(chn));
    }

    fn write(&mut self, chn: usize, reg: RegAddr, value: u8) -> Result<(), TransportError> {
        self.with(|t| t.write(chn, reg, value))
    }

    fn bulk_write(
        &mut self,
        chn: usize,
        reg: RegAddr,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.with(|t| t.bulk_write(chn, reg, data))
    }

    fn update_bits(
        &mut self,
        chn: usize,
        reg: RegAddr,
        mask: u8,
        value: u8,
    ) -> Result<(), TransportError> {
        self.with(|t| t.update_bits(chn, reg, mask, value))
    }

    fn delay_ms(&mut self, ms: u32) {
        self.with(|t| t.delay_ms(ms));
    }
}

/// Codec driving up to [`MAX_DEVICES`] chips of one variant on one bus.
pub struct TasCodec<M: RawMutex, B, D> {
    chip: ChipVariant,
    state: Mutex<M, RefCell<FirmwareState>>,
    transport: Mutex<M, RefCell<Transport<B, D>>>,
}

impl<M: RawMutex, B: RegisterBus, D: DelayNs> TasCodec<M, B, D> {
    /// Codec for `chip` parts at `addresses`, without firmware.
    pub fn new(chip: ChipVariant, bus: B, delay: D, addresses: &[u8]) -> Result<Self, Error> {
        let transport =
            Transport::new(chip, bus, delay, addresses).ok_or(Error::InvalidDeviceCount {
                count: addresses.len(),
                max: MAX_DEVICES,
            })?;
        tracing::info!("{} codec with {} devices", chip, addresses.len());
        Ok(Self {
            chip,
            state: Mutex::new(RefCell::new(FirmwareState::default())),
            transport: Mutex::new(RefCell::new(transport)),
        })
    }

    /// Chip variant.
    pub fn chip(&self) -> ChipVariant {
        self.chip
    }

    /// Number of devices.
    pub fn device_count(&self) -> usize {
        self.with_transport(|t| t.device_count())
    }

    /// Snapshot of the device table.
    pub fn devices(&self) -> heapless::Vec<Device, MAX_DEVICES> {
        self.with_transport(|t| t.devices().iter().copied().collect())
    }

    /// Run `f` with the transport under the fine lock.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut Transport<B, D>) -> R) -> R {
        self.transport.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Run `f` with the parsed firmware, if any, under the coarse lock.
    pub fn with_firmware<R>(&self, f: impl FnOnce(Option<&RegBin>) -> R) -> R {
        self.state.lock(|cell| f(cell.borrow().regbin.as_ref()))
    }

    /// Whether a firmware image is loaded.
    pub fn has_firmware(&self) -> bool {
        self.with_firmware(|fw| fw.is_some())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FirmwareState, &mut Locked<'_, M, B, D>) -> R) -> R {
        let mut locked = Locked {
            transport: &self.transport,
        };
        self.state.lock(|cell| f(&mut cell.borrow_mut(), &mut locked))
    }

    // ── Resets ──────────────────────────────────────────────────────────────

    /// Pulse the shared hardware reset line with the chip's polarity.
    ///
    /// Every cached book is forgotten afterwards.
    pub fn hw_reset<P: OutputPin, T: DelayNs>(
        &self,
        pin: &mut P,
        delay: &mut T,
    ) -> Result<(), P::Error> {
        match self.chip.hw_reset_polarity() {
            ResetPolarity::ActiveHigh => {
                pin.set_high()?;
                delay.delay_us(HW_RESET_PULSE_US);
                pin.set_low()?;
            }
            ResetPolarity::ActiveLow => {
                pin.set_low()?;
                delay.delay_us(HW_RESET_PULSE_US);
                pin.set_high()?;
            }
        }
        self.with_transport(Transport::invalidate_books);
        tracing::info!("{} hardware reset", self.chip);
        Ok(())
    }

    /// Software-reset every device with the chip's reset sequence.
    ///
    /// Every device is attempted; the first failure is returned.
    pub fn sw_reset(&self) -> Result<(), Error> {
        let strategy = self.chip.reset_strategy();
        self.with_transport(|t| {
            let mut first = None;
            for chn in 0..t.device_count() {
                let result = match strategy {
                    ResetStrategy::Write { reg, value } => t.write(chn, reg, value),
                    ResetStrategy::UpdateBits { reg, mask, value } => {
                        t.update_bits(chn, reg, mask, value)
                    }
                };
                t.invalidate_book(chn);
                if let Err(err) = result {
                    tracing::error!(channel = chn, "software reset failed: {}", err);
                    first.get_or_insert(err);
                }
            }
            first.map_or(Ok(()), |err: TransportError| Err(Error::from(err)))
        })
    }

    // ── Firmware ────────────────────────────────────────────────────────────

    /// Replace the firmware with `image` and apply its init config.
    ///
    /// The previous image is dropped first; if `image` is rejected the codec
    /// is left without firmware.
    pub fn load_firmware(&self, image: &[u8]) -> Result<LoadReport, Error> {
        self.with_state(|state, target| {
            state.regbin = None;
            state.profile = 0;
            let count = target.device_count();
            let bin = RegBin::parse(image, count).map_err(|err| {
                tracing::error!("firmware rejected: {}", err);
                match err {
                    regbin::Error::OutOfMemory => Error::OutOfMemory,
                    other => Error::Format(other),
                }
            })?;

            let init = bin.find_config(INIT_CONFIG).map(|index| {
                tracing::info!("init id = {}", index);
                (index, select(target, &bin, index, BlockType::PrePowerUp))
            });
            let report = LoadReport {
                config_count: bin.config_count(),
                init,
            };
            state.regbin = Some(bin);
            tracing::info!("firmware loaded, {} configs", report.config_count);
            Ok(report)
        })
    }

    /// Drop the firmware.
    pub fn unload_firmware(&self) {
        self.with_state(|state, _| {
            state.regbin = None;
            state.profile = 0;
        });
    }

    /// Run the `block_type` blocks of config `config`.
    pub fn select(&self, config: usize, block_type: BlockType) -> Result<SelectReport, Error> {
        self.with_state(|state, target| {
            let bin = state.regbin.as_ref().ok_or(Error::NoFirmware)?;
            Ok(select(target, bin, config, block_type))
        })
    }

    /// Stream mute hook.
    ///
    /// Unmuting applies the current profile's pre-power-up blocks; muting
    /// applies its pre-shutdown blocks once no stream is left running.
    /// Returns the pass that ran, if any.
    pub fn mute(&self, stream: Stream, muted: bool) -> Option<SelectReport> {
        self.with_state(|state, target| {
            let active = !muted;
            match stream {
                Stream::Playback => state.playback = active,
                Stream::Capture => state.capture = active,
            }
            let bin = state.regbin.as_ref()?;
            let block_type = if muted {
                if state.stream_active() {
                    return None;
                }
                BlockType::PreShutdown
            } else {
                BlockType::PrePowerUp
            };
            Some(select(target, bin, state.profile, block_type))
        })
    }

    // ── Profile ─────────────────────────────────────────────────────────────

    /// Highest selectable profile.
    pub fn profile_max(&self) -> Result<usize, Error> {
        self.with_firmware(|fw| {
            fw.map(|bin| bin.config_count().saturating_sub(1))
                .ok_or(Error::NoFirmware)
        })
    }

    /// Current profile.
    pub fn profile(&self) -> Result<usize, Error> {
        self.state.lock(|cell| {
            let state = cell.borrow();
            state
                .regbin
                .as_ref()
                .map(|_| state.profile)
                .ok_or(Error::NoFirmware)
        })
    }

    /// Switch profile, clamped to the available configs.
    ///
    /// While a stream runs, the new profile's pre-power-up blocks are applied
    /// immediately. Returns whether the profile changed.
    pub fn set_profile(&self, profile: usize) -> Result<bool, Error> {
        self.with_state(|state, target| {
            let bin = state.regbin.as_ref().ok_or(Error::NoFirmware)?;
            let clamped = profile.min(bin.config_count().saturating_sub(1));
            if clamped == state.profile {
                return Ok(false);
            }
            state.profile = clamped;
            tracing::info!("profile {}", clamped);
            if state.stream_active() {
                select(target, bin, clamped, BlockType::PrePowerUp);
            }
            Ok(true)
        })
    }

    // ── Controls ────────────────────────────────────────────────────────────

    /// User-visible controls: the profile (with firmware only), then the
    /// chip's mixers, per-device ones once per device.
    pub fn controls(&self) -> Vec<ControlInfo> {
        let mut out = Vec::new();
        if let Ok(max) = self.profile_max() {
            let mut name = ControlName::new();
            let _ = name.push_str(PROFILE_CONTROL);
            out.push(ControlInfo {
                name,
                max: u32::try_from(max).unwrap_or(u32::MAX),
                kind: ControlKind::Profile,
            });
        }
        let chip = self.chip.name();
        let devices = self.device_count();
        for mixer in self.chip.profile().mixers {
            match mixer.scope {
                MixerScope::Broadcast => {
                    let mut name = ControlName::new();
                    let _ = write!(name, "{chip}-{}", mixer.name);
                    out.push(ControlInfo {
                        name,
                        max: u32::from(mixer.max),
                        kind: ControlKind::Mixer {
                            mixer: *mixer,
                            device: None,
                        },
                    });
                }
                MixerScope::PerDevice => {
                    for dev in 0..devices {
                        let mut name = ControlName::new();
                        let _ = write!(name, "{chip}-dev{dev}-{}", mixer.name);
                        out.push(ControlInfo {
                            name,
                            max: u32::from(mixer.max),
                            kind: ControlKind::Mixer {
                                mixer: *mixer,
                                device: Some(dev),
                            },
                        });
                    }
                }
            }
        }
        out
    }

    fn control(&self, index: usize) -> Result<ControlInfo, Error> {
        self.controls()
            .into_iter()
            .nth(index)
            .ok_or(Error::ControlOutOfRange { index })
    }

    /// Index of the control called `name`.
    pub fn find_control(&self, name: &str) -> Option<usize> {
        self.controls().iter().position(|c| c.name == name)
    }

    /// Current value of control `index`.
    pub fn mixer_get(&self, index: usize) -> Result<u32, Error> {
        match self.control(index)?.kind {
            ControlKind::Profile => self
                .profile()
                .map(|p| u32::try_from(p).unwrap_or(u32::MAX)),
            ControlKind::Mixer { mixer, device } => self.with_state(|_, target| -> Result<u32, Error> {
                let raw = target.with(|t| t.read(device.unwrap_or(0), mixer.reg))?;
                Ok(u32::from(mixer.decode(raw)))
            }),
        }
    }

    /// Set control `index`; out-of-range values are clamped.
    pub fn mixer_put(&self, index: usize, value: u32) -> Result<(), Error> {
        match self.control(index)?.kind {
            ControlKind::Profile => self
                .set_profile(usize::try_from(value).unwrap_or(usize::MAX))
                .map(|_| ()),
            ControlKind::Mixer { mixer, device } => self.with_state(|_, target| -> Result<(), Error> {
                let bits = mixer.encode(value);
                let count = target.device_count();
                let channels = match device {
                    Some(dev) => dev..dev.saturating_add(1),
                    None => 0..count,
                };
                for chn in channels {
                    target.with(|t| match mixer.access {
                        MixerAccess::Field => {
                            t.update_bits(chn, mixer.reg, mixer.register_mask(), bits)
                        }
                        MixerAccess::Register => t.write(chn, mixer.reg, bits),
                    })?;
                }
                Ok(())
            }),
        }
    }

    // ── Interrupts ──────────────────────────────────────────────────────────

    /// Read every interrupt latch register of every device.
    ///
    /// Failed reads are logged and left out.
    pub fn read_interrupt_latches(&self) -> Vec<LatchReading> {
        let latches = self.chip.profile().interrupt_latches;
        self.with_transport(|t| {
            let mut out = Vec::new();
            for channel in 0..t.device_count() {
                for &reg in latches {
                    match t.read(channel, reg) {
                        Ok(value) => {
                            tracing::info!(channel, "irq latch {} = 0x{:02x}", reg, value);
                            out.push(LatchReading {
                                channel,
                                reg,
                                value,
                            });
                        }
                        Err(err) => tracing::error!(channel, "irq latch: {}", err),
                    }
                }
            }
            out
        })
    }

    // ── Direct register access ──────────────────────────────────────────────

    /// Write one register of device `chn`.
    pub fn write(&self, chn: usize, reg: RegAddr, value: u8) -> Result<(), Error> {
        Ok(self.with_transport(|t| t.write(chn, reg, value))?)
    }

    /// Read one register of device `chn`.
    pub fn read(&self, chn: usize, reg: RegAddr) -> Result<u8, Error> {
        Ok(self.with_transport(|t| t.read(chn, reg))?)
    }

    /// Write consecutive registers of device `chn`.
    pub fn bulk_write(&self, chn: usize, reg: RegAddr, data: &[u8]) -> Result<(), Error> {
        Ok(self.with_transport(|t| t.bulk_write(chn, reg, data))?)
    }

    /// Read consecutive registers of device `chn`.
    pub fn bulk_read(&self, chn: usize, reg: RegAddr, buf: &mut [u8]) -> Result<(), Error> {
        Ok(self.with_transport(|t| t.bulk_read(chn, reg, buf))?)
    }

    /// Read-modify-write one register of device `chn`.
    pub fn update_bits(&self, chn: usize, reg: RegAddr, mask: u8, value: u8) -> Result<(), Error> {
        Ok(self.with_transport(|t| t.update_bits(chn, reg, mask, value))?)
    }
}

impl<M: RawMutex, B, D> core::fmt::Debug for TasCodec<M, B, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TasCodec")
            .field("chip", &self.chip)
            .finish_non_exhaustive()
    }
}
