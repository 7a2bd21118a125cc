//! Autosave persistence
//!
//! Saves snapshots of the open catalog to the filesystem so work survives a
//! crash. Uses atomic writes (write to temp file, then rename) to prevent
//! corruption.
//!
//! Storage location: `~/.local/share/fabedit/` (configurable via `Config`)
//!
//! Files:
//! - `autosave.json` - `{ "timestamp": <ms>, "catalogData": <catalog> }`

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::error::{Operation, StorageError, StorageResult};
use crate::config::Config;
use crate::error::CatalogResult;
use crate::models::CatalogDocument;
use crate::session::Session;

/// A saved copy of the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutosaveSnapshot {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(rename = "catalogData")]
    pub catalog_data: Value,
}

impl AutosaveSnapshot {
    pub fn new(document: &CatalogDocument, at: DateTime<Utc>) -> Result<Self, serde_json::Error> {
        Ok(Self {
            timestamp: at.timestamp_millis(),
            catalog_data: serde_json::to_value(document)?,
        })
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }

    /// Number of entities in the snapshot, if it has a `Catalog` array
    pub fn entity_count(&self) -> Option<usize> {
        self.catalog_data
            .get("Catalog")
            .and_then(Value::as_array)
            .map(Vec::len)
    }

    /// Load the snapshot into a session
    ///
    /// A snapshot without a `Catalog` array is rejected and the session is
    /// left as it was. A restored session starts with no unsaved changes.
    pub fn restore_into(&self, session: &mut Session) -> CatalogResult<()> {
        session.load(self.catalog_data.clone())?;
        info!(
            "Restored autosave from {} ({} entities)",
            self.timestamp,
            session.store().len()
        );
        Ok(())
    }
}

/// A snapshot read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedAutosave {
    pub snapshot: AutosaveSnapshot,
    /// Time since the snapshot was written
    pub age: Duration,
}

impl LoadedAutosave {
    pub fn formatted_age(&self) -> String {
        format_age(self.age.num_milliseconds())
    }
}

/// Persistence for the single autosave slot
pub struct AutosaveStore {
    path: PathBuf,
}

impl AutosaveStore {
    /// Create a store writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a store at the configured autosave location
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.autosave_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if a snapshot exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write a snapshot of `document` taken at `at`
    pub fn save(&self, document: &CatalogDocument, at: DateTime<Utc>) -> StorageResult<AutosaveSnapshot> {
        let encode = |source| StorageError::Encode {
            path: self.path.clone(),
            source,
        };
        let snapshot = AutosaveSnapshot::new(document, at).map_err(encode)?;
        let bytes = serde_json::to_vec(&snapshot).map_err(encode)?;

        atomic_write(&self.path, &bytes)?;
        info!(
            "Autosaved {} entities to {:?}",
            document.catalog.len(),
            self.path
        );
        Ok(snapshot)
    }

    /// Save the session's catalog and mark the session saved
    ///
    /// Returns `false` without writing when nothing is loaded.
    pub fn save_session(&self, session: &mut Session, at: DateTime<Utc>) -> StorageResult<bool> {
        let Some(document) = session.export_catalog() else {
            debug!("Nothing loaded, skipping autosave");
            return Ok(false);
        };
        self.save(&document, at)?;
        session.mark_saved(at);
        Ok(true)
    }

    /// Load the snapshot, measuring its age against now
    pub fn load(&self) -> StorageResult<Option<LoadedAutosave>> {
        self.load_at(Utc::now())
    }

    /// Load the snapshot, measuring its age against `now`
    ///
    /// Returns `None` if there is no snapshot on disk.
    pub fn load_at(&self, now: DateTime<Utc>) -> StorageResult<Option<LoadedAutosave>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| StorageError::io(Operation::Read, e, self.path.clone()))?;
        let snapshot: AutosaveSnapshot =
            serde_json::from_str(&content).map_err(|e| StorageError::InvalidSnapshot {
                path: self.path.clone(),
                details: e.to_string(),
            })?;

        let age = Duration::milliseconds(now.timestamp_millis() - snapshot.timestamp);
        Ok(Some(LoadedAutosave { snapshot, age }))
    }

    /// Delete the snapshot
    ///
    /// Returns whether there was one to delete.
    pub fn clear(&self) -> StorageResult<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)
            .map_err(|e| StorageError::io(Operation::Delete, e, self.path.clone()))?;
        info!("Cleared autosave at {:?}", self.path);
        Ok(true)
    }
}

/// Describe an age in milliseconds as `1h 5m ago`, `3m ago` or `42s ago`
pub fn format_age(age_ms: i64) -> String {
    let seconds = age_ms.max(0) / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m ago", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m ago", minutes)
    } else {
        format!("{}s ago", seconds)
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
///
/// This ensures the target file is never left in a partially-written state.
pub fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    // Same directory so the rename stays on one filesystem
    let temp_path = path.with_extension("tmp");

    let write_failed = |e| StorageError::io(Operation::Write, e, temp_path.clone());
    let mut file = File::create(&temp_path).map_err(write_failed)?;
    file.write_all(data).map_err(write_failed)?;
    file.sync_all().map_err(write_failed)?;

    fs::rename(&temp_path, path).map_err(|source| StorageError::Replace {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityDraft;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        }
    }

    fn loaded_session() -> Session {
        let mut session = Session::new();
        session
            .load(json!({
                "CatalogVersion": "Main",
                "Catalog": [
                    {"ItemId": "player_1", "ItemClass": "player", "DisplayName": "Ann"},
                    {"ItemId": "club_1", "ItemClass": "club", "Bundle": {"BundledItems": ["player_1"]}}
                ]
            }))
            .unwrap();
        session
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = AutosaveStore::from_config(&test_config(&temp_dir));

        assert!(!store.exists());
        assert!(store.load().unwrap().is_none());

        let session = loaded_session();
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        store.save(&session.export_catalog().unwrap(), at).unwrap();
        assert!(store.exists());

        let loaded = store.load_at(at + Duration::seconds(65)).unwrap().unwrap();
        assert_eq!(loaded.snapshot.timestamp, 1_700_000_000_000);
        assert_eq!(loaded.snapshot.entity_count(), Some(2));
        assert_eq!(loaded.age, Duration::seconds(65));
        assert_eq!(loaded.formatted_age(), "1m ago");
        assert_eq!(loaded.snapshot.saved_at(), Some(at));
    }

    #[test]
    fn test_snapshot_file_shape() {
        let temp_dir = TempDir::new().unwrap();
        let store = AutosaveStore::new(temp_dir.path().join("autosave.json"));
        let session = loaded_session();
        store.save(&session.export_catalog().unwrap(), Utc::now()).unwrap();

        let raw: Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert!(raw["timestamp"].is_i64());
        assert_eq!(raw["catalogData"]["CatalogVersion"], json!("Main"));
        assert_eq!(raw["catalogData"]["Catalog"][0]["ItemId"], json!("player_1"));
    }

    #[test]
    fn test_save_session_marks_saved() {
        let temp_dir = TempDir::new().unwrap();
        let store = AutosaveStore::from_config(&test_config(&temp_dir));

        let mut session = loaded_session();
        session.create_entity(EntityDraft::new("player_2", "player"));
        assert!(session.has_unsaved_changes());

        let at = Utc::now();
        assert!(store.save_session(&mut session, at).unwrap());
        assert!(!session.has_unsaved_changes());
        assert_eq!(session.last_saved(), Some(at));

        let mut empty = Session::new();
        let other = AutosaveStore::new(temp_dir.path().join("other.json"));
        assert!(!other.save_session(&mut empty, at).unwrap());
        assert!(!other.exists());
    }

    #[test]
    fn test_restore_into_session() {
        let temp_dir = TempDir::new().unwrap();
        let store = AutosaveStore::from_config(&test_config(&temp_dir));

        let mut original = loaded_session();
        original.delete_entity("player_1");
        store.save_session(&mut original, Utc::now()).unwrap();

        let mut restored = Session::new();
        let loaded = store.load().unwrap().unwrap();
        loaded.snapshot.restore_into(&mut restored).unwrap();

        assert_eq!(restored.store().len(), 1);
        assert!(restored.store().get("player_1").is_none());
        assert!(!restored.has_unsaved_changes());
        assert!(!restored.can_undo());
    }

    #[test]
    fn test_restore_rejects_missing_catalog_array() {
        let snapshot = AutosaveSnapshot {
            timestamp: 0,
            catalog_data: json!({"CatalogVersion": "Main", "Catalog": {"ItemId": "x"}}),
        };
        let mut session = loaded_session();
        assert!(snapshot.restore_into(&mut session).is_err());
        assert_eq!(session.store().len(), 2);
    }

    #[test]
    fn test_load_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let store = AutosaveStore::new(temp_dir.path().join("autosave.json"));
        fs::write(store.path(), "{not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, StorageError::InvalidSnapshot { .. }));
    }

    #[test]
    fn test_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = AutosaveStore::new(temp_dir.path().join("autosave.json"));
        assert!(!store.clear().unwrap());

        let session = loaded_session();
        store.save(&session.export_catalog().unwrap(), Utc::now()).unwrap();
        assert!(store.clear().unwrap());
        assert!(!store.exists());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(42_000), "42s ago");
        assert_eq!(format_age(999), "0s ago");
        assert_eq!(format_age(3 * 60_000 + 5_000), "3m ago");
        assert_eq!(format_age(65 * 60_000), "1h 5m ago");
        assert_eq!(format_age(-5), "0s ago");
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir
            .path()
            .join("a")
            .join("b")
            .join("c")
            .join("file.json");

        atomic_write(&nested_path, b"test data").unwrap();

        assert!(nested_path.exists());
        let content = fs::read_to_string(&nested_path).unwrap();
        assert_eq!(content, "test data");
        assert!(!nested_path.with_extension("tmp").exists());
    }
}
