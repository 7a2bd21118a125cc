//! Catalog file loading and writing

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use fabedit_core::storage::atomic_write;
use fabedit_core::{Config, Session};

use crate::output::Output;

/// Read a catalog file into a fresh session
pub fn open_session(path: &Path, config: &Config) -> Result<Session> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog file: {:?}", path))?;

    let mut session = Session::with_config(config);
    session
        .load_str(&content)
        .with_context(|| format!("Failed to load catalog: {:?}", path))?;
    debug!("Opened {:?} ({} items)", path, session.store().len());
    Ok(session)
}

/// Serialize the session's catalog as JSON
pub fn catalog_json(session: &Session) -> Result<String> {
    session
        .export_json()
        .context("Failed to encode catalog")?
        .context("No catalog loaded")
}

/// Write the session's catalog to `path`
pub fn save_catalog(session: &Session, path: &Path) -> Result<()> {
    let json = catalog_json(session)?;
    atomic_write(path, json.as_bytes())
        .with_context(|| format!("Failed to write catalog: {:?}", path))?;
    debug!("Wrote {:?}", path);
    Ok(())
}

/// Write a normalized copy of a catalog to `dest`, or stdout
pub fn export(file: &Path, dest: Option<&Path>, config: &Config, output: &Output) -> Result<()> {
    let session = open_session(file, config)?;

    match dest {
        Some(dest) => {
            save_catalog(&session, dest)?;
            output.success(&format!(
                "Exported {} items to {}",
                session.store().len(),
                dest.display()
            ));
        }
        None => println!("{}", catalog_json(&session)?),
    }

    Ok(())
}
