//! Configuration selector: runs every block of one type in a configuration.

use regbin::{BlockType, DeviceSelector, RegBin};

use crate::error::Diagnostic;
use crate::interpreter::{process_block, targets, ProgramTarget};

/// What one selector pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SelectReport {
    /// Blocks whose sub-blocks were run.
    pub blocks_applied: usize,
    /// Register operations that failed after retries.
    pub write_failures: usize,
    /// Blocks stopped by a sub-block decode error or an overrun.
    pub aborted_blocks: usize,
    /// Blocks whose consumed length differs from the declared one.
    pub size_mismatches: usize,
}

fn mark_loading<T: ProgramTarget + ?Sized>(target: &mut T, selector: DeviceSelector) {
    match selector {
        DeviceSelector::All => {
            for chn in 0..target.device_count() {
                target.set_loading(chn);
            }
        }
        DeviceSelector::Device(_) => {
            for chn in targets(target, selector) {
                target.set_loading(chn);
            }
        }
    }
}

/// Run every block of `block_type` in config `config_index`, in declaration
/// order.
///
/// An out-of-range index or a coefficient block type is logged and has no
/// effect. Targeted devices are marked loading before their block runs.
pub fn select<T: ProgramTarget + ?Sized>(
    target: &mut T,
    regbin: &RegBin,
    config_index: usize,
    block_type: BlockType,
) -> SelectReport {
    let mut report = SelectReport::default();
    let Some(config) = regbin.config(config_index) else {
        tracing::error!(
            "config {} out of range, {} available",
            config_index,
            regbin.config_count()
        );
        return report;
    };
    if block_type == BlockType::Coefficient {
        tracing::error!("{} blocks are not selectable", block_type);
        return report;
    }
    tracing::info!(
        config = config_index,
        "select {} '{}' {}",
        config_index,
        config.name_str(),
        block_type
    );

    for (block_index, block) in config.blocks.iter().enumerate() {
        if block.block_type() != Some(block_type) {
            continue;
        }
        mark_loading(target, block.selector);

        let declared = usize::try_from(block.payload_len).unwrap_or(usize::MAX);
        let mut consumed = 0usize;
        for _ in 0..block.subblock_count {
            let Some(stream) = block.payload.get(consumed..) else {
                break;
            };
            match process_block(target, stream, block.selector) {
                Ok(done) => {
                    consumed = consumed.saturating_add(done.consumed);
                    report.write_failures = report.write_failures.saturating_add(done.write_failures);
                    if consumed > declared {
                        tracing::error!(
                            config = config_index,
                            block = block_index,
                            "consumed {} past declared {}",
                            consumed,
                            declared
                        );
                        report.aborted_blocks = report.aborted_blocks.saturating_add(1);
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!(config = config_index, block = block_index, "{}", err);
                    report.aborted_blocks = report.aborted_blocks.saturating_add(1);
                    break;
                }
            }
        }

        if consumed != declared {
            let diag = Diagnostic::SizeMismatch {
                config: config_index,
                block: block_index,
                consumed,
                declared: block.payload_len,
            };
            tracing::warn!("{}", diag);
            report.size_mismatches = report.size_mismatches.saturating_add(1);
        }
        report.blocks_applied = report.blocks_applied.saturating_add(1);
    }

    tracing::debug!(
        blocks = report.blocks_applied,
        failures = report.write_failures,
        "select done"
    );
    report
}
