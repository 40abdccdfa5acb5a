//! Supported chip variants and their per-variant register map.
//!
//! All variant-specific behaviour (reset sequence, interrupt latch
//! registers, mixer controls) is looked up here through a `match` on
//! [`ChipVariant`]; nothing else in the driver branches on the chip.

use core::fmt::Write as _;

use crate::config::REGBIN_FILENAME_LEN;
use crate::reg::{RegAddr, SW_RESET};

/// Every chip the driver binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)] // variant names are the part numbers
pub enum ChipVariant {
    Pcm9211,
    Tas2020,
    Tas2110,
    Tas2118,
    Tas2120,
    Tas2320,
    Tas2560,
    Tas2562,
    Tas2564,
    Tas257x,
    Tas2764,
    Tas2770,
    Tas2780,
    Tas5802,
    Tas5805,
    Tas5806m,
    Tas5806md,
    Tas5815,
    Tas5822,
    Tas5825m,
    Tas5825p,
    Tas5827,
    Tas5828,
}

/// Power class of a chip, which decides its reset sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipFamily {
    /// TAS20xx..TAS2780 low-power smart amplifiers.
    LowPower,
    /// TAS58xx mid-power class-D amplifiers.
    MidPower,
    /// PCM9211 digital audio interface transceiver.
    Transceiver,
}

/// Software reset sequence of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetStrategy {
    /// Plain register write.
    Write {
        /// Reset register.
        reg: RegAddr,
        /// Value written.
        value: u8,
    },
    /// Read-modify-write of the reset bits.
    UpdateBits {
        /// Reset register.
        reg: RegAddr,
        /// Bits touched.
        mask: u8,
        /// New value of the masked bits.
        value: u8,
    },
}

/// Active level of the hardware reset line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetPolarity {
    /// Pulse high, rest low.
    ActiveHigh,
    /// Pulse low, rest high.
    ActiveLow,
}

/// How a mixer control reaches its register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MixerAccess {
    /// `update_bits` of a `shift`ed bit field.
    Field,
    /// Whole-register write; `shift` is ignored.
    Register,
}

/// Which devices a mixer control addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MixerScope {
    /// Read from device 0, written to every device.
    Broadcast,
    /// One control instance per device.
    PerDevice,
}

/// A register-backed integer control.
///
/// The user-visible value lives in `0..=max`; `invert` maps it to
/// `max - value` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MixerControl {
    /// Control name, without chip or device prefix.
    pub name: &'static str,
    /// Backing register.
    pub reg: RegAddr,
    /// Bit position of the field.
    pub shift: u8,
    /// Largest user value.
    pub max: u8,
    /// Register counts down while the user value counts up.
    pub invert: bool,
    /// Write path.
    pub access: MixerAccess,
    /// Device fan-out.
    pub scope: MixerScope,
}

impl MixerControl {
    const fn field(name: &'static str, reg: RegAddr, shift: u8, max: u8, invert: bool) -> Self {
        Self {
            name,
            reg,
            shift,
            max,
            invert,
            access: MixerAccess::Field,
            scope: MixerScope::Broadcast,
        }
    }

    const fn register(name: &'static str, reg: RegAddr, max: u8, invert: bool) -> Self {
        Self {
            name,
            reg,
            shift: 0,
            max,
            invert,
            access: MixerAccess::Register,
            scope: MixerScope::Broadcast,
        }
    }

    const fn per_device(self) -> Self {
        Self {
            scope: MixerScope::PerDevice,
            ..self
        }
    }

    /// Field mask before shifting: all bits up to the highest bit of `max`.
    #[must_use]
    pub const fn value_mask(&self) -> u8 {
        match u8::MAX.checked_shr(self.max.leading_zeros()) {
            Some(mask) => mask,
            None => 0,
        }
    }

    /// Register bits owned by the control.
    #[must_use]
    pub const fn register_mask(&self) -> u8 {
        match self.access {
            MixerAccess::Field => self.value_mask().wrapping_shl(self.shift as u32),
            MixerAccess::Register => 0xFF,
        }
    }

    /// User value held by a raw register byte.
    #[must_use]
    pub const fn decode(&self, raw: u8) -> u8 {
        let field = match self.access {
            MixerAccess::Field => raw.wrapping_shr(self.shift as u32) & self.value_mask(),
            MixerAccess::Register => raw,
        };
        let clamped = if field > self.max { self.max } else { field };
        if self.invert {
            self.max.wrapping_sub(clamped)
        } else {
            clamped
        }
    }

    /// Register bits for a user value, clamped to `0..=max`, positioned
    /// under [`MixerControl::register_mask`].
    #[must_use]
    pub const fn encode(&self, value: u32) -> u8 {
        #[allow(clippy::cast_possible_truncation)] // clamped to max first
        let clamped = if value > self.max as u32 {
            self.max
        } else {
            value as u8
        };
        let wire = if self.invert {
            self.max.wrapping_sub(clamped)
        } else {
            clamped
        };
        match self.access {
            MixerAccess::Field => wire.wrapping_shl(self.shift as u32) & self.register_mask(),
            MixerAccess::Register => wire,
        }
    }
}

/// Per-variant register map entry.
#[derive(Debug, Clone, Copy)]
pub struct ChipProfile {
    /// Interrupt latch registers dumped when the chip raises its IRQ line.
    pub interrupt_latches: &'static [RegAddr],
    /// Register-backed mixer controls.
    pub mixers: &'static [MixerControl],
}

// ── Register constants ──────────────────────────────────────────────────────

// The TAS2110, TAS2770 and TAS2780 amplifier level registers share an address.
const TAS2110_AMP_LEVEL: RegAddr = RegAddr::new(0, 0, 0x03);
const TAS2770_AMP_LEVEL: RegAddr = RegAddr::new(0, 0, 0x03);
const TAS2770_DVC_PCM: RegAddr = RegAddr::new(0, 0, 0x05);
const TAS2770_DVC_PDM: RegAddr = RegAddr::new(0, 0, 0x06);
const TAS2780_DVC_LVL: RegAddr = RegAddr::new(0, 0, 0x1A);
const TAS2780_AMP_LEVEL: RegAddr = RegAddr::new(0, 0, 0x03);
const TAS257X_AMP_LEVEL: RegAddr = RegAddr::new(0, 0, 0x04);

/// TAS58xx device control 1: modulation scheme and switching frequency.
pub const TAS5805_DEVICE_CTRL_1: RegAddr = RegAddr::new(0, 0, 0x02);
/// TAS58xx device control 2: power state and mute.
pub const TAS5805_DEVICE_CTRL_2: RegAddr = RegAddr::new(0, 0, 0x03);
const TAS5805_VOL_CTL: RegAddr = RegAddr::new(0, 0, 0x4C);
const TAS5805_ANALOG_GAIN: RegAddr = RegAddr::new(0, 0, 0x54);
const TAS58XX_RESET_MASK: u8 = 0x11;

const PCM9211_SW_CTRL: RegAddr = RegAddr::new(0, 0, 0x40);
const PCM9211_SW_CTRL_MRST_MASK: u8 = 0x80;
const PCM9211_CH1_DIGITAL_GAIN: RegAddr = RegAddr::new(0, 0, 0x46);
const PCM9211_CH2_DIGITAL_GAIN: RegAddr = RegAddr::new(0, 0, 0x47);

const SW_RESET_BIT: u8 = 0x01;

const TAS257X_LATCHES: [RegAddr; 5] = [
    RegAddr::new(0, 0, 0x60),
    RegAddr::new(0, 0, 0x61),
    RegAddr::new(0, 0, 0x62),
    RegAddr::new(0, 0, 0x63),
    RegAddr::new(0, 0, 0x64),
];
const TAS2560_LATCHES: [RegAddr; 2] = [RegAddr::new(0, 0, 0x26), RegAddr::new(0, 0, 0x27)];
const PCM9211_LATCHES: [RegAddr; 2] = [RegAddr::new(0, 0, 0x2C), RegAddr::new(0, 0, 0x2D)];

const PCM9211_MIXERS: [MixerControl; 2] = [
    MixerControl::register("ch1-digital-gain", PCM9211_CH1_DIGITAL_GAIN, 0xFF, false).per_device(),
    MixerControl::register("ch2-digital-gain", PCM9211_CH2_DIGITAL_GAIN, 0xFF, false).per_device(),
];
const TAS2110_MIXERS: [MixerControl; 1] = [MixerControl::field(
    "amp-gain-volume",
    TAS2110_AMP_LEVEL,
    1,
    0x14,
    false,
)];
const TAS257X_MIXERS: [MixerControl; 1] = [MixerControl::field(
    "amp-gain-volume",
    TAS257X_AMP_LEVEL,
    1,
    0x2A,
    false,
)];
const TAS2770_MIXERS: [MixerControl; 3] = [
    MixerControl::field("amp-gain-volume", TAS2770_AMP_LEVEL, 0, 0x14, false),
    MixerControl::register("digital-pcm-volume", TAS2770_DVC_PCM, 201, true),
    MixerControl::register("digital-pdm-volume", TAS2770_DVC_PDM, 201, true),
];
const TAS2780_MIXERS: [MixerControl; 2] = [
    MixerControl::field("amp-gain-volume", TAS2780_AMP_LEVEL, 1, 0x14, false),
    MixerControl::register("digital-volume", TAS2780_DVC_LVL, 201, true),
];
const TAS5805_MIXERS: [MixerControl; 4] = [
    MixerControl::field("volume-analog", TAS5805_ANALOG_GAIN, 0, 31, true),
    MixerControl::field("volume-digital", TAS5805_VOL_CTL, 0, 255, true),
    // Hybrid / BD / 1SPW
    MixerControl::field("driver-modulation-scheme", TAS5805_DEVICE_CTRL_1, 0, 2, false),
    // 768k / 384k / 480k / 576k
    MixerControl::field("driver-switching-freq", TAS5805_DEVICE_CTRL_1, 4, 3, false),
];

// No latch register map is known for the TAS2770, TAS2780 or TAS58xx parts;
// interrupt latch reads report nothing for them.
const NO_LATCHES: [RegAddr; 0] = [];
const NO_MIXERS: [MixerControl; 0] = [];

impl ChipVariant {
    /// Every supported variant, in device-id table order.
    pub const ALL: [ChipVariant; 23] = [
        Self::Pcm9211,
        Self::Tas2020,
        Self::Tas2110,
        Self::Tas2118,
        Self::Tas2120,
        Self::Tas2320,
        Self::Tas2560,
        Self::Tas2562,
        Self::Tas2564,
        Self::Tas257x,
        Self::Tas2764,
        Self::Tas2770,
        Self::Tas2780,
        Self::Tas5802,
        Self::Tas5805,
        Self::Tas5806m,
        Self::Tas5806md,
        Self::Tas5815,
        Self::Tas5822,
        Self::Tas5825m,
        Self::Tas5825p,
        Self::Tas5827,
        Self::Tas5828,
    ];

    /// Device-id name, as used in bus match tables and firmware file names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pcm9211 => "pcm9211s",
            Self::Tas2020 => "tas2020",
            Self::Tas2110 => "tas2110",
            Self::Tas2118 => "tas2118",
            Self::Tas2120 => "tas2120",
            Self::Tas2320 => "tas2320",
            Self::Tas2560 => "tas2560",
            Self::Tas2562 => "tas2562",
            Self::Tas2564 => "tas2564",
            Self::Tas257x => "tas257x",
            Self::Tas2764 => "tas2764",
            Self::Tas2770 => "tas2770",
            Self::Tas2780 => "tas2780",
            Self::Tas5802 => "tas5802",
            Self::Tas5805 => "tas5805",
            Self::Tas5806m => "tas5806m",
            Self::Tas5806md => "tas5806md",
            Self::Tas5815 => "tas5815",
            Self::Tas5822 => "tas5822",
            Self::Tas5825m => "tas5825m",
            Self::Tas5825p => "tas5825p",
            Self::Tas5827 => "tas5827",
            Self::Tas5828 => "tas5828",
        }
    }

    /// Look a variant up by its device-id name (case-insensitive).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|chip| chip.name().eq_ignore_ascii_case(name))
    }

    /// Power class.
    #[must_use]
    pub const fn family(self) -> ChipFamily {
        match self {
            Self::Pcm9211 => ChipFamily::Transceiver,
            Self::Tas2020
            | Self::Tas2110
            | Self::Tas2118
            | Self::Tas2120
            | Self::Tas2320
            | Self::Tas2560
            | Self::Tas2562
            | Self::Tas2564
            | Self::Tas257x
            | Self::Tas2764
            | Self::Tas2770
            | Self::Tas2780 => ChipFamily::LowPower,
            Self::Tas5802
            | Self::Tas5805
            | Self::Tas5806m
            | Self::Tas5806md
            | Self::Tas5815
            | Self::Tas5822
            | Self::Tas5825m
            | Self::Tas5825p
            | Self::Tas5827
            | Self::Tas5828 => ChipFamily::MidPower,
        }
    }

    /// Software reset of one device.
    #[must_use]
    pub const fn reset_strategy(self) -> ResetStrategy {
        match self.family() {
            ChipFamily::LowPower => ResetStrategy::Write {
                reg: SW_RESET,
                value: SW_RESET_BIT,
            },
            ChipFamily::Transceiver => ResetStrategy::UpdateBits {
                reg: PCM9211_SW_CTRL,
                mask: PCM9211_SW_CTRL_MRST_MASK,
                value: 0,
            },
            ChipFamily::MidPower => ResetStrategy::UpdateBits {
                reg: SW_RESET,
                mask: TAS58XX_RESET_MASK,
                value: TAS58XX_RESET_MASK,
            },
        }
    }

    /// Level that holds the chip in reset on the shared reset line.
    #[must_use]
    pub const fn hw_reset_polarity(self) -> ResetPolarity {
        match self.family() {
            ChipFamily::LowPower | ChipFamily::Transceiver => ResetPolarity::ActiveHigh,
            ChipFamily::MidPower => ResetPolarity::ActiveLow,
        }
    }

    /// Register map entry.
    #[must_use]
    pub const fn profile(self) -> ChipProfile {
        let (interrupt_latches, mixers): (&'static [RegAddr], &'static [MixerControl]) = match self
        {
            Self::Pcm9211 => (&PCM9211_LATCHES, &PCM9211_MIXERS),
            Self::Tas257x => (&TAS257X_LATCHES, &TAS257X_MIXERS),
            Self::Tas2560 => (&TAS2560_LATCHES, &NO_MIXERS),
            Self::Tas2110 => (&NO_LATCHES, &TAS2110_MIXERS),
            Self::Tas2770 => (&NO_LATCHES, &TAS2770_MIXERS),
            Self::Tas2780 => (&NO_LATCHES, &TAS2780_MIXERS),
            Self::Tas5805 => (&NO_LATCHES, &TAS5805_MIXERS),
            _ => (&NO_LATCHES, &NO_MIXERS),
        };
        ChipProfile {
            interrupt_latches,
            mixers,
        }
    }

    /// Firmware file requested for `device_count` devices:
    /// `[<prefix>-]<chip>-<n>amp-reg.bin`.
    ///
    /// Returns `None` when the name does not fit [`REGBIN_FILENAME_LEN`].
    #[must_use]
    pub fn regbin_file_name(
        self,
        prefix: Option<&str>,
        device_count: usize,
    ) -> Option<heapless::String<REGBIN_FILENAME_LEN>> {
        let mut name = heapless::String::new();
        let written = match prefix {
            Some(prefix) => write!(name, "{prefix}-{}-{device_count}amp-reg.bin", self.name()),
            None => write!(name, "{}-{device_count}amp-reg.bin", self.name()),
        };
        written.ok().map(|()| name)
    }
}

impl core::fmt::Display for ChipVariant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
