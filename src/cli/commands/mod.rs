//! Command execution functions for bundler operations.
//!
//! Each subcommand turns its arguments (layered over the configuration
//! file and environment) into library settings and runs one pipeline
//! component against the system toolchain.

mod create;
mod fix;
mod package;
mod sign;

pub use create::execute_create;
pub use fix::execute_fix;
pub use package::execute_package;
pub use sign::execute_sign;

use super::{OutputManager, RuntimeConfig};
use crate::{
    bundler::{ProcessReport, platform::macos::dylib::SkipKind},
    error::{CliError, Result},
};

/// Prints a relocation report and fails when any unit failed.
pub(crate) fn report_relocation(config: &RuntimeConfig, report: &ProcessReport) -> Result<()> {
    let output = config.output();

    for (source, dest) in &report.planned {
        output.indent(&format!("{} -> {}", source.display(), dest.display()))?;
    }
    if !report.copied.is_empty() {
        output.success(&format!("Bundled {} libraries", report.copied.len()))?;
    }
    for copied in &report.copied {
        output.verbose(&copied.display().to_string())?;
    }
    output.verbose(&format!("Rewrote {} references", report.rewritten.len()))?;

    print_skipped(output, report)?;

    if report.is_clean() {
        return Ok(());
    }
    for failure in &report.failures {
        output.warn(&format!("{}: {}", failure.unit.display(), failure.error))?;
    }
    Err(CliError::UnitsFailed {
        failed: report.failures.len(),
        total: report.copied.len() + report.failures.len(),
    }
    .into())
}

fn print_skipped(output: &OutputManager, report: &ProcessReport) -> std::io::Result<()> {
    for skipped in &report.skipped {
        let line = format!("{} (from {})", skipped.reference, skipped.binary.display());
        match &skipped.kind {
            SkipKind::Unresolved => output.warn(&format!("Unresolved: {line}"))?,
            SkipKind::Rejected(reason) => output.warn(&format!("Not bundled: {line}: {reason}"))?,
            SkipKind::Skipped(reason) if output.is_verbose() => {
                output.verbose(&format!("Skipped ({reason:?}): {line}"))?
            }
            SkipKind::Skipped(_) => {}
        }
    }
    Ok(())
}
