//! Validate command handler

use std::path::Path;

use anyhow::{bail, Context, Result};

use fabedit_core::Config;

use crate::commands::catalog::{open_session, save_catalog};
use crate::output::Output;

/// Validate a catalog, optionally applying automatic fixes
///
/// Fixed catalogs are written to `dest`, or back over `file`. Fails when
/// errors remain so scripts can check the exit status.
pub fn run(
    file: &Path,
    fix: bool,
    dest: Option<&Path>,
    config: &Config,
    output: &Output,
) -> Result<()> {
    let mut session = open_session(file, config)?;
    let mut report = session.validate();

    if fix {
        let fixed = session
            .auto_fix_all(&report)
            .context("Failed to apply fixes")?;
        if fixed > 0 {
            let dest = dest.unwrap_or(file);
            save_catalog(&session, dest)?;
            output.success(&format!("Fixed {} issue(s), wrote {}", fixed, dest.display()));
            report = session.validate();
        } else {
            output.message("Nothing to fix.");
        }
    }

    output.print_report(&report);

    let errors = report.error_count();
    if errors > 0 {
        bail!("Catalog has {} error(s)", errors);
    }
    Ok(())
}
