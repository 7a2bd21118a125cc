//! Storage layer
//!
//! Local persistence for everything that outlives a command: autosave
//! snapshots of the open catalog and the settings file. All writes go
//! through [`atomic_write`] so a crash never leaves a half-written file.
//!
//! Catalog documents themselves are read and written by the front end.

pub mod error;
pub mod persistence;

pub use error::{Operation, StorageError, StorageResult};
pub use persistence::{atomic_write, format_age, AutosaveSnapshot, AutosaveStore, LoadedAutosave};
