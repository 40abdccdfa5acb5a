use anyhow::{Context, Result};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use tas_platform::mocks::{RecordingBus, RecordingDelay};
use tas_platform::ChipVariant;
use tasdevice::node::{regbininfo_list, regcfg_list, ConfigListCommand};
use tasdevice::TasCodec;

use crate::default_addresses;

pub fn run(image: &[u8], devices: usize, config: Option<usize>) -> Result<()> {
    print!("{}", render(image, devices, config)?);
    Ok(())
}

/// Config listing followed by the decoded programs, as the diagnostic nodes
/// print them.
pub fn render(image: &[u8], devices: usize, config: Option<usize>) -> Result<String> {
    let codec: TasCodec<NoopRawMutex, _, _> = TasCodec::new(
        ChipVariant::Tas2562,
        RecordingBus::new(),
        RecordingDelay::new(),
        &default_addresses(devices),
    )?;
    let report = codec
        .load_firmware(image)
        .context("Failed to parse regbin image")?;

    let mut out = String::new();
    regbininfo_list(&codec, &mut out)?;
    out.push('\n');
    let configs = match config {
        Some(index) => index..index.saturating_add(1),
        None => 0..report.config_count,
    };
    for index in configs {
        regcfg_list(&codec, &ConfigListCommand { config: index }, &mut out)?;
        out.push('\n');
    }
    Ok(out)
}
