//! Statistics command handler

use std::path::Path;

use anyhow::{bail, Result};

use fabedit_core::stats::{bundle_stats, global_stats};
use fabedit_core::Config;

use crate::commands::catalog::open_session;
use crate::output::Output;

/// Show statistics for the whole catalog or one bundle
pub fn show(file: &Path, bundle_id: Option<&str>, config: &Config, output: &Output) -> Result<()> {
    let session = open_session(file, config)?;
    let store = session.store();

    match bundle_id {
        Some(bundle_id) => {
            if store.bundle(bundle_id).is_none() {
                bail!("Bundle not found: {}", bundle_id);
            }
            output.print_bundle_stats(bundle_id, &bundle_stats(store, bundle_id));
        }
        None => output.print_global_stats(&global_stats(store)),
    }
    Ok(())
}
