use std::fmt::Write as _;

use anyhow::{Context, Result};
use regbin::RegBin;

pub fn run(image: &[u8], devices: usize, json: bool) -> Result<()> {
    let bin = RegBin::parse(image, devices).context("Failed to parse regbin image")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&bin)?);
    } else {
        print!("{}", summary(&bin));
    }
    Ok(())
}

/// Header fields followed by one line per config and per block.
pub fn summary(bin: &RegBin) -> String {
    let header = bin.header();
    let mut out = String::new();
    let _ = writeln!(out, "image size      {} bytes", header.image_size);
    let _ = writeln!(out, "format version  0x{:04x}", header.format_version);
    let _ = writeln!(out, "driver fw       0x{:08x}", header.driver_fw_version);
    let _ = writeln!(out, "timestamp       {}", header.timestamp);
    let _ = writeln!(
        out,
        "platform/family {}/{}",
        header.platform_type, header.device_family
    );
    let _ = writeln!(out, "devices         {}", header.device_count);
    let _ = writeln!(out, "configs         {}", bin.config_count());

    for (index, config) in bin.configs().iter().enumerate() {
        let _ = writeln!(
            out,
            "[{index:02}] {:<24} blocks {}/{}  active 0x{:02x}",
            config.name_str(),
            config.real_nblocks(),
            config.declared_blocks,
            config.active_devices
        );
        if let Some(reason) = &config.truncated {
            let _ = writeln!(out, "     truncated: {reason}");
        }
        for block in &config.blocks {
            let ty = block
                .block_type()
                .map_or_else(|| format!("0x{:02x}", block.raw_type), |ty| ty.label().to_string());
            let _ = writeln!(
                out,
                "     {ty:<14} dev 0x{:02x}  {} bytes  {} sub-blocks",
                block.selector.raw(),
                block.payload_len,
                block.subblock_count
            );
        }
    }
    out
}
