//! Autosave command handlers

use std::path::Path;

use anyhow::{Context, Result};

use fabedit_core::{AutosaveStore, Config, Session};

use crate::commands::catalog::{catalog_json, save_catalog};
use crate::output::{Output, OutputFormat};

/// Show the snapshot's age and size
pub fn show(config: &Config, output: &Output) -> Result<()> {
    let store = AutosaveStore::from_config(config);
    let loaded = store.load().context("Failed to read autosave")?;

    match output.format {
        OutputFormat::Json => {
            let json = match &loaded {
                Some(loaded) => serde_json::json!({
                    "path": store.path(),
                    "timestamp": loaded.snapshot.timestamp,
                    "age": loaded.formatted_age(),
                    "entities": loaded.snapshot.entity_count(),
                }),
                None => serde_json::json!({"path": store.path(), "timestamp": null}),
            };
            println!("{}", json);
        }
        OutputFormat::Quiet => {
            if let Some(loaded) = &loaded {
                println!("{}", loaded.snapshot.timestamp);
            }
        }
        OutputFormat::Human => match &loaded {
            Some(loaded) => {
                let saved_at = loaded
                    .snapshot
                    .saved_at()
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| "(unknown)".to_string());
                println!("Autosave:");
                println!("  saved:    {} ({})", saved_at, loaded.formatted_age());
                println!(
                    "  entities: {}",
                    loaded
                        .snapshot
                        .entity_count()
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "(no catalog)".to_string())
                );
                println!();
                println!("Autosave file: {}", store.path().display());
            }
            None => println!("No autosave at {}", store.path().display()),
        },
    }

    Ok(())
}

/// Write the snapshot's catalog to `dest`, or stdout
pub fn restore(dest: Option<&Path>, config: &Config, output: &Output) -> Result<()> {
    let store = AutosaveStore::from_config(config);
    let loaded = store
        .load()
        .context("Failed to read autosave")?
        .with_context(|| format!("No autosave at {}", store.path().display()))?;

    let mut session = Session::with_config(config);
    loaded
        .snapshot
        .restore_into(&mut session)
        .context("Autosave does not hold a valid catalog")?;

    match dest {
        Some(dest) => {
            save_catalog(&session, dest)?;
            output.success(&format!(
                "Restored {} items from autosave ({}) to {}",
                session.store().len(),
                loaded.formatted_age(),
                dest.display()
            ));
        }
        None => println!("{}", catalog_json(&session)?),
    }
    Ok(())
}

/// Delete the snapshot
pub fn clear(config: &Config, output: &Output) -> Result<()> {
    let store = AutosaveStore::from_config(config);
    if store.clear().context("Failed to delete autosave")? {
        output.success("Autosave cleared");
    } else {
        output.message("No autosave to clear.");
    }
    Ok(())
}
