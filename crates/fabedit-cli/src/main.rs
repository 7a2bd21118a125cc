//! fabedit CLI
//!
//! Command-line interface for fabedit - inspect, validate and edit game item
//! catalogs.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fabedit_core::Config;

mod commands;
mod output;
mod prompt;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "fabedit")]
#[command(about = "fabedit - Game item catalog editor")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a catalog against the validation rules
    #[command(alias = "check")]
    Validate {
        /// Catalog file
        file: PathBuf,
        /// Apply automatic fixes
        #[arg(long)]
        fix: bool,
        /// Write the fixed catalog here instead of over the input
        #[arg(short, long, requires = "fix")]
        output: Option<PathBuf>,
    },
    /// List unassigned items
    #[command(alias = "ls")]
    List {
        /// Catalog file
        file: PathBuf,
        /// Keep only this item class ("all" keeps everything)
        #[arg(short = 'T', long = "type")]
        item_class: Option<String>,
        /// Match against display name and id
        #[arg(short, long)]
        search: Option<String>,
        /// Keep only items with this tag
        #[arg(short, long)]
        tag: Option<String>,
        /// Sort by name, type or id
        #[arg(long, default_value = "name")]
        sort: String,
    },
    /// Show one item with its decoded CustomData
    Show {
        /// Catalog file
        file: PathBuf,
        /// Item id
        id: String,
    },
    /// List bundles with their statistics
    Bundles {
        /// Catalog file
        file: PathBuf,
    },
    /// Show catalog or bundle statistics
    Stats {
        /// Catalog file
        file: PathBuf,
        /// Show statistics for this bundle only
        #[arg(short, long)]
        bundle: Option<String>,
    },
    /// Suggest the next free id for an item class
    NextId {
        /// Catalog file
        file: PathBuf,
        /// Item class
        class: String,
    },
    /// Create a new item
    #[command(alias = "add")]
    Create {
        /// Catalog file
        file: PathBuf,
        /// Item class (taken from the template when omitted)
        #[arg(short, long, required_unless_present = "template")]
        class: Option<String>,
        /// Item id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        /// Display name
        #[arg(short, long)]
        name: Option<String>,
        /// Start from an item or bundle template
        #[arg(long)]
        template: Option<String>,
        /// Tags to add
        #[arg(short, long)]
        tag: Vec<String>,
    },
    /// Delete an item and remove it from every bundle
    #[command(alias = "rm")]
    Delete {
        /// Catalog file
        file: PathBuf,
        /// Item id
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Manage bundle membership
    Bundle {
        #[command(subcommand)]
        command: BundleCommands,
    },
    /// Write a normalized copy of the catalog
    Export {
        /// Catalog file
        file: PathBuf,
        /// Destination (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Inspect or restore the autosave snapshot
    Autosave {
        #[command(subcommand)]
        command: Option<AutosaveCommands>,
    },
    /// Inspect item and bundle templates
    Template {
        #[command(subcommand)]
        command: Option<TemplateCommands>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Edit a catalog interactively with undo and autosave
    Shell {
        /// Catalog file
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum BundleCommands {
    /// Add an item to a bundle
    Add {
        /// Catalog file
        file: PathBuf,
        /// Item id
        item: String,
        /// Bundle id
        bundle: String,
    },
    /// Remove an item from a bundle
    #[command(alias = "rm")]
    Remove {
        /// Catalog file
        file: PathBuf,
        /// Item id
        item: String,
        /// Bundle id
        bundle: String,
    },
    /// Move an item between bundles
    #[command(alias = "mv")]
    Move {
        /// Catalog file
        file: PathBuf,
        /// Item id
        item: String,
        /// Source bundle (unassigned when omitted)
        #[arg(long)]
        from: Option<String>,
        /// Target bundle (unassigned when omitted)
        #[arg(long)]
        to: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
enum AutosaveCommands {
    /// Show the snapshot's age and size
    Show,
    /// Write the snapshot's catalog to a file
    Restore {
        /// Destination (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete the snapshot
    Clear,
}

#[derive(Subcommand, Clone)]
enum TemplateCommands {
    /// List item and bundle templates
    #[command(alias = "ls")]
    List,
    /// Show a template
    Show {
        /// Template kind (item or bundle)
        kind: String,
        /// Template id
        id: String,
    },
    /// Check a bundle against a bundle template's item requirements
    Check {
        /// Catalog file
        file: PathBuf,
        /// Bundle id
        bundle: String,
        /// Bundle template id
        #[arg(short, long, default_value = "starter_club")]
        template: String,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, history_limit, autosave_enabled,
        /// autosave_interval_secs, log_level, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.clone().unwrap_or_else(Config::config_file_path);

    // Config commands work on the file directly and don't need logging
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), &config_path, &output);
    }

    let config = Config::load_from_path(&config_path).context("Failed to load configuration")?;
    init_logging(&config);

    match cli.command {
        Commands::Validate { file, fix, output: dest } => {
            commands::validate::run(&file, fix, dest.as_deref(), &config, &output)
        }
        Commands::List {
            file,
            item_class,
            search,
            tag,
            sort,
        } => commands::item::list(
            &file,
            commands::item::ListArgs {
                item_class,
                search,
                tag,
                sort,
            },
            &config,
            &output,
        ),
        Commands::Show { file, id } => commands::item::show(&file, &id, &config, &output),
        Commands::Bundles { file } => commands::bundle::list(&file, &config, &output),
        Commands::Stats { file, bundle } => {
            commands::stats::show(&file, bundle.as_deref(), &config, &output)
        }
        Commands::NextId { file, class } => {
            commands::item::next_id(&file, &class, &config, &output)
        }
        Commands::Create {
            file,
            class,
            id,
            name,
            template,
            tag,
        } => commands::item::create(
            &file,
            commands::item::CreateArgs {
                class,
                id,
                name,
                template,
                tags: tag,
            },
            &config,
            &output,
        ),
        Commands::Delete { file, id, yes } => {
            commands::item::delete(&file, &id, yes, &config, &output)
        }
        Commands::Bundle { command } => handle_bundle_command(command, &config, &output),
        Commands::Export { file, output: dest } => {
            commands::catalog::export(&file, dest.as_deref(), &config, &output)
        }
        Commands::Autosave { command } => handle_autosave_command(command, &config, &output),
        Commands::Template { command } => handle_template_command(command, &config, &output),
        Commands::Config { .. } => unreachable!(), // Handled above
        Commands::Shell { file } => commands::shell::run(&file, &config, &output),
    }
}

fn handle_bundle_command(command: BundleCommands, config: &Config, output: &Output) -> Result<()> {
    match command {
        BundleCommands::Add { file, item, bundle } => {
            commands::bundle::add(&file, &item, &bundle, config, output)
        }
        BundleCommands::Remove { file, item, bundle } => {
            commands::bundle::remove(&file, &item, &bundle, config, output)
        }
        BundleCommands::Move {
            file,
            item,
            from,
            to,
        } => commands::bundle::move_item(&file, &item, from.as_deref(), to.as_deref(), config, output),
    }
}

fn handle_autosave_command(
    command: Option<AutosaveCommands>,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        Some(AutosaveCommands::Show) | None => commands::autosave::show(config, output),
        Some(AutosaveCommands::Restore { output: dest }) => {
            commands::autosave::restore(dest.as_deref(), config, output)
        }
        Some(AutosaveCommands::Clear) => commands::autosave::clear(config, output),
    }
}

fn handle_template_command(
    command: Option<TemplateCommands>,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        Some(TemplateCommands::List) | None => commands::template::list(config, output),
        Some(TemplateCommands::Show { kind, id }) => {
            commands::template::show(&kind, &id, config, output)
        }
        Some(TemplateCommands::Check {
            file,
            bundle,
            template,
        }) => commands::template::check(&file, &bundle, &template, config, output),
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: &std::path::Path,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(&key, &value, config_path, output)
        }
    }
}

/// Initialize tracing
///
/// FABEDIT_LOG takes a full filter directive; otherwise the configured level
/// applies to the fabedit crates. Logs go to the configured file, or stderr.
fn init_logging(config: &Config) {
    let filter = std::env::var("FABEDIT_LOG")
        .ok()
        .filter(|directive| !directive.is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| {
            EnvFilter::new(format!(
                "fabedit_core={level},fabedit_cli={level}",
                level = config.log_level
            ))
        });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let log_file = config.log_file.as_ref().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eprintln!("Failed to open log file {:?}: {}", path, e))
            .ok()
    });

    // A subscriber may already be set (tests); that's fine.
    let _ = match log_file {
        Some(file) => builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init(),
        None => builder.with_writer(std::io::stderr).try_init(),
    };
}
