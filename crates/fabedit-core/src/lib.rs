//! fabedit Core Library
//!
//! This crate provides the core functionality for fabedit, an editor for
//! game item catalogs: JSON documents holding players, staff, teams,
//! tactics and the bundles that group them.
//!
//! # Architecture
//!
//! - **CatalogStore**: entity collection plus derived indices
//! - **Session**: explicit context owning the store and its undo history;
//!   every mutation goes through it and records an invertible action
//! - **Validation**: a fixed rule list producing issues as plain data
//!
//! # Quick Start
//!
//! ```text
//! let mut session = Session::new();
//! session.load_str(&std::fs::read_to_string("catalog.json")?)?;
//!
//! let id = session.generate_item_id("team");
//! session.create_entity(EntityDraft::new(id, "team").display_name("Reds"));
//! session.add_to_bundle("team_5", "club_1");
//! session.undo()?;
//!
//! let report = session.validate();
//! let json = session.export_json()?;
//! ```
//!
//! # Modules
//!
//! - `session`: Mutation API, undo/redo and autosave state (main entry point)
//! - `catalog`: Entity collection and non-recording primitives
//! - `view`: Filtered and sorted views
//! - `models`: Entities, drafts, patches and the catalog document
//! - `history`: Action records and the bounded undo log
//! - `validation`: Catalog rules and issues
//! - `ids`: Item id prefixes and naming patterns
//! - `stats`: Bundle statistics
//! - `display`: CustomData decoders
//! - `settings`: User settings and templates
//! - `storage`: Autosave snapshots and atomic writes
//! - `config`: Application configuration

pub mod catalog;
pub mod config;
pub mod display;
pub mod error;
pub mod history;
pub mod ids;
pub mod models;
pub mod session;
pub mod settings;
pub mod stats;
pub mod storage;
pub mod validation;
pub mod view;

pub use catalog::CatalogStore;
pub use config::Config;
pub use display::{DecoderRegistry, DisplayInfo};
pub use error::{CatalogError, CatalogResult};
pub use history::{Action, ActionKind, History, HistoryError};
pub use models::{BundleDescriptor, CatalogDocument, Entity, EntityDraft, FieldPatch};
pub use session::Session;
pub use settings::{Settings, Template, TemplateKind};
pub use storage::{AutosaveStore, StorageError};
pub use validation::{Issue, RuleId, Severity, ValidationReport};
pub use view::{Filters, SortKey};
