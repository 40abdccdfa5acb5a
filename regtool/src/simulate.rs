use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use anyhow::{Context, Result};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_hal::delay::DelayNs;
use regbin::BlockType;
use tas_platform::mocks::{BusOp, RecordingBus};
use tas_platform::reg::split_page_reg;
use tas_platform::{ChipVariant, RegAddr, BOOK_SELECT, PAGE_SELECT};
use tasdevice::{SelectReport, TasCodec};

use crate::default_addresses;

pub struct Options {
    pub chip: ChipVariant,
    pub devices: usize,
    pub config: usize,
    pub block_type: BlockType,
    /// Really sleep on delay sub-blocks and retry backoff.
    pub sleep: bool,
}

/// Delay source that logs every request and optionally sleeps through it.
#[derive(Debug, Default)]
pub struct SimDelay {
    sleep: bool,
    calls_ns: Vec<u64>,
}

impl SimDelay {
    pub fn new(sleep: bool) -> Self {
        Self {
            sleep,
            calls_ns: Vec::new(),
        }
    }

    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.calls_ns.iter().fold(0u64, |acc, ns| acc.saturating_add(*ns)))
    }

    pub fn clear(&mut self) {
        self.calls_ns.clear();
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.calls_ns.push(u64::from(ns));
        if self.sleep {
            std::thread::sleep(Duration::from_nanos(u64::from(ns)));
        }
    }
}

pub fn run(image: &[u8], opts: &Options) -> Result<()> {
    print!("{}", render(image, opts)?);
    Ok(())
}

/// Load `image`, then run one selector pass and list what reached the bus.
///
/// Transfers caused by the load itself (the init config) are not listed.
pub fn render(image: &[u8], opts: &Options) -> Result<String> {
    let codec: TasCodec<NoopRawMutex, _, _> = TasCodec::new(
        opts.chip,
        RecordingBus::new(),
        SimDelay::new(opts.sleep),
        &default_addresses(opts.devices),
    )?;
    codec
        .load_firmware(image)
        .context("Failed to parse regbin image")?;
    codec.with_transport(|t| {
        t.bus_mut().clear_ops();
        t.delay_mut().clear();
    });

    let report = codec.select(opts.config, opts.block_type)?;
    let (ops, waited) = codec.with_transport(|t| (t.bus().ops().to_vec(), t.delay_mut().total()));

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} x{} config {} {}",
        opts.chip, opts.devices, opts.config, opts.block_type
    );
    transcript(&mut out, &ops);
    summary(&mut out, &report, ops.len(), waited);
    Ok(out)
}

fn transcript(out: &mut String, ops: &[BusOp]) {
    let mut books: BTreeMap<u8, u8> = BTreeMap::new();
    let at = |books: &BTreeMap<u8, u8>, addr: u8, offset: u16| {
        let (page, reg) = split_page_reg(offset);
        RegAddr::new(books.get(&addr).copied().unwrap_or(0), page, reg)
    };
    for op in ops {
        let _ = match op {
            BusOp::Write {
                addr,
                offset,
                value,
            } if *offset == BOOK_SELECT.page_reg() => {
                books.insert(*addr, *value);
                writeln!(out, "0x{addr:02x} book   0x{value:02x}")
            }
            BusOp::Write { addr, offset, .. } if *offset == PAGE_SELECT.page_reg() => {
                writeln!(out, "0x{addr:02x} page   0x00")
            }
            BusOp::Write {
                addr,
                offset,
                value,
            } => writeln!(out, "0x{addr:02x} write  {} = 0x{value:02x}", at(&books, *addr, *offset)),
            BusOp::Read { addr, offset } => {
                writeln!(out, "0x{addr:02x} read   {}", at(&books, *addr, *offset))
            }
            BusOp::BulkWrite { addr, offset, data } => {
                let bytes: Vec<String> = data.iter().map(|b| format!("{b:02x}")).collect();
                writeln!(
                    out,
                    "0x{addr:02x} burst  {} [{}]",
                    at(&books, *addr, *offset),
                    bytes.join(" ")
                )
            }
            BusOp::BulkRead { addr, offset, len } => writeln!(
                out,
                "0x{addr:02x} bread  {} len {len}",
                at(&books, *addr, *offset)
            ),
        };
    }
}

fn summary(out: &mut String, report: &SelectReport, transfers: usize, waited: Duration) {
    let _ = writeln!(
        out,
        "{} blocks, {} transfers, {} failures, {} aborted, {} size mismatches, {} ms delayed",
        report.blocks_applied,
        transfers,
        report.write_failures,
        report.aborted_blocks,
        report.size_mismatches,
        waited.as_millis()
    );
}
