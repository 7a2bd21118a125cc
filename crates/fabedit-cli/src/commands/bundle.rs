//! Bundle command handlers

use std::path::Path;

use anyhow::{bail, Result};

use fabedit_core::stats::bundle_stats;
use fabedit_core::{CatalogStore, Config};

use crate::commands::catalog::{open_session, save_catalog};
use crate::output::Output;

/// List bundles with their statistics
pub fn list(file: &Path, config: &Config, output: &Output) -> Result<()> {
    let session = open_session(file, config)?;
    let store = session.store();

    let bundles: Vec<_> = store
        .bundles()
        .into_iter()
        .map(|bundle| (bundle, bundle_stats(store, bundle.item_id())))
        .collect();
    output.print_bundles(&bundles);
    Ok(())
}

/// Add an item to a bundle
pub fn add(file: &Path, item_id: &str, bundle_id: &str, config: &Config, output: &Output) -> Result<()> {
    let mut session = open_session(file, config)?;
    ensure_item(session.store(), item_id)?;
    ensure_bundle(session.store(), bundle_id)?;

    if !session.add_to_bundle(item_id, bundle_id) {
        output.message(&format!("{} is already in {}", item_id, bundle_id));
        return Ok(());
    }
    save_catalog(&session, file)?;

    output.success(&format!("Added {} to {}", item_id, bundle_id));
    Ok(())
}

/// Remove an item from a bundle
pub fn remove(
    file: &Path,
    item_id: &str,
    bundle_id: &str,
    config: &Config,
    output: &Output,
) -> Result<()> {
    let mut session = open_session(file, config)?;
    ensure_bundle(session.store(), bundle_id)?;

    if !session.remove_from_bundle(item_id, bundle_id) {
        bail!("{} is not in {}", item_id, bundle_id);
    }
    save_catalog(&session, file)?;

    output.success(&format!("Removed {} from {}", item_id, bundle_id));
    Ok(())
}

/// Move an item between bundles; `None` on either side is the unassigned pool
pub fn move_item(
    file: &Path,
    item_id: &str,
    from: Option<&str>,
    to: Option<&str>,
    config: &Config,
    output: &Output,
) -> Result<()> {
    if from.is_none() && to.is_none() {
        bail!("Give a source bundle (--from), a target bundle (--to), or both");
    }

    let mut session = open_session(file, config)?;
    ensure_item(session.store(), item_id)?;
    for bundle_id in from.into_iter().chain(to) {
        ensure_bundle(session.store(), bundle_id)?;
    }

    if !session.move_between_bundles(item_id, from, to) {
        bail!("Nothing to move: {} was not changed", item_id);
    }
    save_catalog(&session, file)?;

    output.success(&format!(
        "Moved {} from {} to {}",
        item_id,
        from.unwrap_or("unassigned"),
        to.unwrap_or("unassigned")
    ));
    Ok(())
}

fn ensure_item(store: &CatalogStore, item_id: &str) -> Result<()> {
    if store.get(item_id).is_none() {
        bail!("Item not found: {}", item_id);
    }
    Ok(())
}

fn ensure_bundle(store: &CatalogStore, bundle_id: &str) -> Result<()> {
    if store.bundle(bundle_id).is_none() {
        bail!("Bundle not found: {}", bundle_id);
    }
    Ok(())
}
