//! Template command handlers

use std::path::Path;

use anyhow::{bail, Context, Result};

use fabedit_core::{Config, Settings, TemplateKind};

use crate::commands::catalog::open_session;
use crate::output::{Output, OutputFormat};

fn load_settings(config: &Config) -> Result<Settings> {
    Settings::load_from_path(&config.settings_path()).context("Failed to load settings")
}

/// List item and bundle templates
pub fn list(config: &Config, output: &Output) -> Result<()> {
    let settings = load_settings(config)?;
    let templates = &settings.templates;

    match output.format {
        OutputFormat::Json => output.print_json(&serde_json::json!({
            "items": settings.item_template_ids(),
            "bundles": settings.bundle_template_ids(),
        })),
        OutputFormat::Quiet => {
            for id in settings
                .item_template_ids()
                .into_iter()
                .chain(settings.bundle_template_ids())
            {
                println!("{}", id);
            }
        }
        OutputFormat::Human => {
            println!("Item templates:");
            for (id, template) in &templates.items {
                println!(
                    "  {:<14} {:<10} {}",
                    id,
                    template.item_class,
                    template.display_name.as_deref().unwrap_or("")
                );
            }
            println!();
            println!("Bundle templates:");
            for (id, template) in &templates.bundles {
                println!("  {:<14} {:<10} {}", id, template.bundle_class, template.name);
            }
        }
    }
    Ok(())
}

/// Show one template as JSON
pub fn show(kind: &str, template_id: &str, config: &Config, output: &Output) -> Result<()> {
    let kind: TemplateKind = kind.parse().map_err(anyhow::Error::msg)?;
    let settings = load_settings(config)?;

    let template = settings
        .template(kind, template_id)
        .with_context(|| format!("No {} template: {}", kind, template_id))?;

    if output.is_quiet() {
        println!("{}", template_id);
    } else {
        output.print_json(&template);
    }
    Ok(())
}

/// Check a bundle's members against a bundle template's requirements
///
/// Fails when any requirement is unmet.
pub fn check(
    file: &Path,
    bundle_id: &str,
    template_id: &str,
    config: &Config,
    output: &Output,
) -> Result<()> {
    let settings = load_settings(config)?;
    let template = settings
        .bundle_template(template_id)
        .with_context(|| format!("No bundle template: {}", template_id))?;

    let session = open_session(file, config)?;
    let store = session.store();
    if store.bundle(bundle_id).is_none() {
        bail!("Bundle not found: {}", bundle_id);
    }

    let checks = template.check_requirements(&store.bundle_members(bundle_id));
    match output.format {
        OutputFormat::Json => output.print_json(&checks),
        OutputFormat::Quiet => {}
        OutputFormat::Human => {
            println!("{} against {}:", bundle_id, template.name);
            for check in &checks {
                let marker = if check.satisfied { "✓" } else { "✗" };
                println!(
                    "  {} {:<10} {} (need {})",
                    marker, check.item_class, check.found, check.label
                );
            }
        }
    }

    let unmet = checks.iter().filter(|c| !c.satisfied).count();
    if unmet > 0 {
        bail!("{} requirement(s) not met", unmet);
    }
    Ok(())
}
