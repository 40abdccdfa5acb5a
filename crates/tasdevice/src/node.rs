//! Diagnostic text nodes.
//!
//! Each node renders one request into a caller-supplied [`core::fmt::Write`].
//! Commands are parsed from the same one-line text a user would echo into
//! the node; register access goes through the codec, so node reads and
//! writes take the same locks as everything else.
//!
//! Line endings follow the historical node output, including the `\n\r`
//! pairs some listings use.

use core::fmt::{self, Write};
use core::str::FromStr;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::delay::DelayNs;
use regbin::{decode, Block, Command, Opcode, RegBin, SubBlockError};
use tas_platform::config::REGDUMP_REGISTERS;
use tas_platform::{RegAddr, RegisterBus};

use crate::codec::TasCodec;
use crate::error::Error;

/// Rejected node command text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Wrong number of whitespace-separated fields.
    #[error("expected {expected} fields, got {found}")]
    FieldCount {
        /// Fields the command takes.
        expected: usize,
        /// Fields received.
        found: usize,
    },
    /// A field is not a number of the expected radix and width.
    #[error("field {index} is not a valid number")]
    BadNumber {
        /// Zero-based field index.
        index: usize,
    },
    /// In-page register above 0x7F.
    #[error("register 0x{0:02x} is larger than 0x7f")]
    RegisterOutOfRange(u8),
}

fn fields<const N: usize>(input: &str) -> Result<[&str; N], CommandError> {
    let mut out = [""; N];
    let mut found = 0usize;
    for token in input.split_whitespace() {
        if let Some(slot) = out.get_mut(found) {
            *slot = token;
        }
        found = found.saturating_add(1);
    }
    if found != N {
        return Err(CommandError::FieldCount { expected: N, found });
    }
    Ok(out)
}

fn decimal<T: FromStr>(token: &str, index: usize) -> Result<T, CommandError> {
    token.parse().map_err(|_| CommandError::BadNumber { index })
}

fn hex_u8(token: &str, index: usize) -> Result<u8, CommandError> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u8::from_str_radix(digits, 16).map_err(|_| CommandError::BadNumber { index })
}

fn in_page(reg: u8) -> Result<u8, CommandError> {
    if reg > 0x7F {
        return Err(CommandError::RegisterOutOfRange(reg));
    }
    Ok(reg)
}

/// `chn 0xBK 0xPG 0xRG 0xVV`: one register of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegCommand {
    /// Device index.
    pub channel: usize,
    /// Register.
    pub reg: RegAddr,
    /// Value to write.
    pub value: u8,
}

impl RegCommand {
    /// Usage line for the register node.
    pub const HELP: &'static str = "command: echo chn 0xBK 0xPG 0xRG 0xXX > NODE\n";

    /// Parse `chn 0xBK 0xPG 0xRG 0xVV`.
    pub fn parse(input: &str) -> Result<Self, CommandError> {
        let [chn, book, page, reg, value] = fields::<5>(input)?;
        let channel = decimal(chn, 0)?;
        let book = hex_u8(book, 1)?;
        let page = hex_u8(page, 2)?;
        let reg = in_page(hex_u8(reg, 3)?)?;
        let value = hex_u8(value, 4)?;
        Ok(Self {
            channel,
            reg: RegAddr::new(book, page, reg),
            value,
        })
    }
}

/// `chn 0xBK 0xPG`: one page of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegDumpCommand {
    /// Device index.
    pub channel: usize,
    /// Book.
    pub book: u8,
    /// Page.
    pub page: u8,
}

impl RegDumpCommand {
    /// Parse `chn 0xBK 0xPG`.
    pub fn parse(input: &str) -> Result<Self, CommandError> {
        let [chn, book, page] = fields::<3>(input)?;
        Ok(Self {
            channel: decimal(chn, 0)?,
            book: hex_u8(book, 1)?,
            page: hex_u8(page, 2)?,
        })
    }
}

/// Decimal config index for the config listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigListCommand {
    /// Config index.
    pub config: usize,
}

impl ConfigListCommand {
    /// Parse a decimal config index.
    pub fn parse(input: &str) -> Result<Self, CommandError> {
        let [config] = fields::<1>(input)?;
        Ok(Self {
            config: decimal(config, 0)?,
        })
    }
}

// ── Register nodes ──────────────────────────────────────────────────────────

/// Write the register named by `cmd`.
pub fn reg_store<M, B, D>(codec: &TasCodec<M, B, D>, cmd: &RegCommand) -> Result<(), Error>
where
    M: RawMutex,
    B: RegisterBus,
    D: DelayNs,
{
    codec
        .write(cmd.channel, cmd.reg, cmd.value)
        .inspect_err(|err| tracing::error!("reg: write chn{} {} failed: {}", cmd.channel, cmd.reg, err))
}

fn device_addr<M, B, D>(codec: &TasCodec<M, B, D>, channel: usize) -> Option<u8>
where
    M: RawMutex,
    B: RegisterBus,
    D: DelayNs,
{
    codec.with_transport(|t| t.device(channel).map(|device| device.addr))
}

fn reg_line<W: Write>(out: &mut W, channel: usize, reg: RegAddr, value: u8) -> fmt::Result {
    writeln!(
        out,
        "Chn{}B0x{:02x}P0x{:02x}R0x{:02x}:0x{:02x}",
        channel,
        reg.book(),
        reg.page(),
        reg.reg(),
        value
    )
}

/// Read back the register `cmd` names.
pub fn reg_show<M, B, D, W>(codec: &TasCodec<M, B, D>, cmd: &RegCommand, out: &mut W) -> fmt::Result
where
    M: RawMutex,
    B: RegisterBus,
    D: DelayNs,
    W: Write,
{
    let Some(addr) = device_addr(codec, cmd.channel) else {
        return writeln!(out, "channel {} out of range", cmd.channel);
    };
    writeln!(out, "i2c-addr: 0x{addr:02x}")?;
    match codec.read(cmd.channel, cmd.reg) {
        Ok(value) => reg_line(out, cmd.channel, cmd.reg, value),
        Err(err) => {
            tracing::error!("reg_show: {}", err);
            writeln!(out, "reg_show: read register failed")
        }
    }
}

/// Dump the 128 registers of the page `cmd` names.
///
/// The dump stops at the first failed read.
pub fn regdump_show<M, B, D, W>(
    codec: &TasCodec<M, B, D>,
    cmd: &RegDumpCommand,
    out: &mut W,
) -> fmt::Result
where
    M: RawMutex,
    B: RegisterBus,
    D: DelayNs,
    W: Write,
{
    let Some(addr) = device_addr(codec, cmd.channel) else {
        return writeln!(out, "channel {} out of range", cmd.channel);
    };
    write!(out, "i2c-addr: 0x{addr:02x}\n\r")?;
    write!(out, "DeviceID: {}\n\r", codec.chip())?;
    for offset in (0u8..=0x7F).take(REGDUMP_REGISTERS) {
        let reg = RegAddr::new(cmd.book, cmd.page, offset);
        match codec.read(cmd.channel, reg) {
            Ok(value) => reg_line(out, cmd.channel, reg, value)?,
            Err(err) => {
                tracing::error!("regdump: {}", err);
                write!(out, "regdump: read register failed!\n\r")?;
                break;
            }
        }
    }
    write!(out, "======caught smartpa reg end ======\n\r")
}

/// Address the bus last talked to.
pub fn active_address<M, B, D, W>(codec: &TasCodec<M, B, D>, out: &mut W) -> fmt::Result
where
    M: RawMutex,
    B: RegisterBus,
    D: DelayNs,
    W: Write,
{
    let addr = codec.with_transport(|t| t.bus().address());
    writeln!(out, "Active SmartPA-0x{addr:02x}")
}

/// Device table: index, chip and address of every device.
pub fn devinfo<M, B, D, W>(codec: &TasCodec<M, B, D>, out: &mut W) -> fmt::Result
where
    M: RawMutex,
    B: RegisterBus,
    D: DelayNs,
    W: Write,
{
    writeln!(out, "No.\tDevTyp\tAddr")?;
    for (index, device) in codec.devices().iter().enumerate() {
        writeln!(out, "{}\t{}\t0x{:02x}", index, device.chip, device.addr)?;
    }
    Ok(())
}

// ── Firmware listings ───────────────────────────────────────────────────────

/// Format version and config names of the loaded image.
pub fn regbininfo_list<M, B, D, W>(codec: &TasCodec<M, B, D>, out: &mut W) -> fmt::Result
where
    M: RawMutex,
    B: RegisterBus,
    D: DelayNs,
    W: Write,
{
    codec.with_firmware(|fw| {
        let Some(bin) = fw else {
            return writeln!(out, "no firmware loaded");
        };
        let header = bin.header();
        write!(out, "Regbin File Version: 0x{:04X} ", header.format_version)?;
        if !header.has_config_names() {
            out.write_str("No confname in this version")?;
        }
        out.write_str("\n\r")?;
        for (index, config) in bin.configs().iter().enumerate() {
            write!(out, "conf {index:02}")?;
            config_name(out, bin, config.name_str())?;
        }
        Ok(())
    })
}

fn config_name<W: Write>(out: &mut W, bin: &RegBin, name: &str) -> fmt::Result {
    if bin.header().has_config_names() {
        write!(out, ": {name}\n\r")
    } else {
        out.write_str("\n\r")
    }
}

/// Blocks of config `cmd.config` with their decoded sub-blocks.
///
/// Decode errors and size mismatches are rendered inline; a block whose
/// sub-block cannot be decoded is listed up to that point.
pub fn regcfg_list<M, B, D, W>(
    codec: &TasCodec<M, B, D>,
    cmd: &ConfigListCommand,
    out: &mut W,
) -> fmt::Result
where
    M: RawMutex,
    B: RegisterBus,
    D: DelayNs,
    W: Write,
{
    codec.with_firmware(|fw| {
        let Some(bin) = fw else {
            return writeln!(out, "no firmware loaded");
        };
        let Some(config) = bin.config(cmd.config) else {
            return writeln!(
                out,
                "config {} out of range, {} available",
                cmd.config,
                bin.config_count()
            );
        };
        write!(out, "Conf {:02}", cmd.config)?;
        config_name(out, bin, config.name_str())?;
        for block in &config.blocks {
            show_block(out, block)?;
        }
        Ok(())
    })
}

fn show_block<W: Write>(out: &mut W, block: &Block) -> fmt::Result {
    match block.block_type() {
        Some(ty) => write!(out, "block type:{}", ty.label())?,
        None => write!(out, "block type:UNKNOWN(0x{:02x})", block.raw_type)?,
    }
    writeln!(out, "\t device idx = 0x{:02x}", block.selector.raw())?;

    let declared = usize::try_from(block.payload_len).unwrap_or(usize::MAX);
    let mut consumed = 0usize;
    for _ in 0..block.subblock_count {
        let Some(stream) = block.payload.get(consumed..) else {
            break;
        };
        let Some(len) = show_subblock(out, stream)? else {
            break;
        };
        consumed = consumed.saturating_add(len);
        if consumed > declared {
            writeln!(out, "regcfg_list: ERROR: {consumed} {declared} out of memory")?;
            break;
        }
    }
    if consumed != declared {
        writeln!(out, "regcfg_list: ERROR: {consumed} {declared} size is not same")?;
    }
    Ok(())
}

/// Render the sub-block at the start of `stream`; `None` when it cannot be
/// decoded.
fn show_subblock<W: Write>(out: &mut W, stream: &[u8]) -> Result<Option<usize>, fmt::Error> {
    let sub = match decode(stream) {
        Ok(sub) => sub,
        Err(err) => {
            show_decode_error(out, err)?;
            return Ok(None);
        }
    };
    match sub.command {
        Command::SingleWrite(writes) => {
            writeln!(out, "\t\tSINGLE BYTE:")?;
            for write in writes {
                writeln!(
                    out,
                    "\t\t\tBOOK0x{:02x} PAGE0x{:02x} REG0x{:02x} VALUE = 0x{:02x}",
                    write.reg.book(),
                    write.reg.page(),
                    write.reg.reg(),
                    write.value
                )?;
            }
        }
        Command::Burst { reg, data } => {
            writeln!(out, "\t\tBURST:")?;
            writeln!(out, "\t\t\tBOOK0x{:02x} PAGE0x{:02x}", reg.book(), reg.page())?;
            let mut next = u16::from(reg.reg());
            for row in data.chunks_exact(4) {
                out.write_str("\t\t\t")?;
                for (column, value) in row.iter().enumerate() {
                    if column > 0 {
                        out.write_char(' ')?;
                    }
                    write!(out, "REG0x{next:02x} = 0x{value:02x}")?;
                    next = next.saturating_add(1);
                }
                out.write_char('\n')?;
            }
        }
        Command::Delay { ms } => writeln!(out, "\t\tDELAY = {ms}ms")?,
        Command::FieldWrite { reg, mask, value } => {
            writeln!(out, "\t\tFIELD:")?;
            writeln!(
                out,
                "\t\t\tBOOK0x{:02x} PAGE0x{:02x} REG0x{:02x} MASK0x{:02x} VALUE = 0x{:02x}",
                reg.book(),
                reg.page(),
                reg.reg(),
                mask,
                value
            )?;
        }
    }
    Ok(Some(sub.len))
}

fn show_decode_error<W: Write>(out: &mut W, err: SubBlockError) -> fmt::Result {
    match err {
        SubBlockError::OutOfBounds { opcode, .. } => writeln!(out, "{opcode}: Out of boundary"),
        SubBlockError::MisalignedBurst { .. } => {
            writeln!(out, "{}: Burst len is wrong", Opcode::Burst)
        }
        other => writeln!(out, "{other}"),
    }
}
