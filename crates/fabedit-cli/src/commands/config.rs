//! Config command handlers

use std::path::Path;

use anyhow::{Context, Result};

use fabedit_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: &Path, output: &Output) -> Result<()> {
    let config = Config::load_from_path(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "history_limit": config.history_limit,
                    "autosave_enabled": config.autosave_enabled,
                    "autosave_interval_secs": config.autosave_interval_secs,
                    "log_level": config.log_level,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  data_dir:               {}", config.data_dir.display());
            println!("  history_limit:          {}", config.history_limit);
            println!("  autosave_enabled:       {}", config.autosave_enabled);
            println!("  autosave_interval_secs: {}", config.autosave_interval_secs);
            println!("  log_level:              {}", config.log_level);
            println!(
                "  log_file:               {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", config_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: &str, value: &str, config_path: &Path, output: &Output) -> Result<()> {
    let mut config = Config::load_from_path(config_path).context("Failed to load configuration")?;

    config.set_value(key, value)?;
    config
        .save_to_path(config_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}
