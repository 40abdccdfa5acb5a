// Host tooling crate: unwrap/expect/panic acceptable outside the driver.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod dump;
mod info;
mod simulate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use regbin::BlockType;
use tas_platform::ChipVariant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "regtool")]
#[command(about = "Inspect and dry-run TAS / PCM9211 regbin images", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the header and configuration summary of an image
    Info {
        /// Regbin image
        image: PathBuf,
        /// Devices the image must be built for
        #[arg(long, default_value_t = 1)]
        devices: usize,
        /// Emit the parsed image as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the decoded register programs of one or every configuration
    Dump {
        /// Regbin image
        image: PathBuf,
        #[arg(long, default_value_t = 1)]
        devices: usize,
        /// Only this configuration
        #[arg(long)]
        config: Option<usize>,
    },
    /// Run one configuration against a simulated bus and print every transfer
    Simulate {
        /// Regbin image
        image: PathBuf,
        #[arg(long, default_value_t = 1)]
        devices: usize,
        #[arg(long, default_value_t = 0)]
        config: usize,
        /// pre-power-up, post-power-up, pre-shutdown or post-shutdown
        #[arg(long, default_value = "pre-power-up")]
        block_type: BlockType,
        /// Chip variant the devices are
        #[arg(long, default_value = "tas2562", value_parser = parse_chip)]
        chip: ChipVariant,
        /// Record delay sub-blocks instead of sleeping
        #[arg(long)]
        no_delay: bool,
    },
}

fn parse_chip(s: &str) -> Result<ChipVariant, String> {
    ChipVariant::from_name(s).ok_or_else(|| format!("unknown chip '{s}'"))
}

/// Bus addresses given to simulated devices: 0x38, 0x39, ...
pub fn default_addresses(devices: usize) -> Vec<u8> {
    (0x38u8..=0x3F).take(devices).collect()
}

/// The driver requests `[<prefix>-]<chip>-<n>amp-reg.bin`; flag images that
/// would never be found under their current name.
fn warn_on_file_name(path: &Path, chip: ChipVariant, devices: usize) {
    let Some(expected) = chip.regbin_file_name(None, devices) else {
        return;
    };
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if !name.ends_with(expected.as_str()) {
        tracing::warn!("{} would be requested as {}", path.display(), expected);
    }
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info {
            image,
            devices,
            json,
        } => info::run(&read_image(&image)?, devices, json),
        Commands::Dump {
            image,
            devices,
            config,
        } => dump::run(&read_image(&image)?, devices, config),
        Commands::Simulate {
            image,
            devices,
            config,
            block_type,
            chip,
            no_delay,
        } => {
            warn_on_file_name(&image, chip, devices);
            simulate::run(
                &read_image(&image)?,
                &simulate::Options {
                    chip,
                    devices,
                    config,
                    block_type,
                    sleep: !no_delay,
                },
            )
        }
    }
}
