//! Editing session
//!
//! A [`Session`] is the explicit context object a front end constructs: it
//! owns the [`CatalogStore`] and its [`History`], exposes the recorded
//! mutation API, and tracks whether there are changes not yet autosaved.
//!
//! Every mutation that changes the store records exactly one action. Calls
//! that change nothing (an unknown id, an idempotent add, a no-op move)
//! record nothing, so every recorded action is exactly invertible.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::error::CatalogResult;
use crate::history::{Action, ActionKind, History, HistoryError};
use crate::ids;
use crate::models::{keys, CatalogDocument, Entity, EntityDraft, FieldPatch, DEFAULT_CATALOG_VERSION};
use crate::validation::{self, Issue, RuleId, ValidationReport};

/// When the autosave trigger fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosavePolicy {
    pub enabled: bool,
    pub interval: Duration,
}

impl Default for AutosavePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::seconds(30),
        }
    }
}

/// Store, history and dirty state for one open catalog
#[derive(Debug, Default)]
pub struct Session {
    store: CatalogStore,
    history: History,
    autosave: AutosavePolicy,
    dirty: bool,
    last_saved: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a session using the history limit and autosave settings from
    /// `config`
    pub fn with_config(config: &Config) -> Self {
        let interval = i64::try_from(config.autosave_interval_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        Self {
            history: History::with_limit(config.history_limit),
            autosave: AutosavePolicy {
                enabled: config.autosave_enabled,
                interval: Duration::seconds(interval),
            },
            ..Self::default()
        }
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn autosave_policy(&self) -> AutosavePolicy {
        self.autosave
    }

    pub fn set_autosave_enabled(&mut self, enabled: bool) {
        self.autosave.enabled = enabled;
    }

    // ==================== Loading ====================

    /// Replace the catalog with a parsed document
    ///
    /// History is cleared and the session starts clean. On failure the
    /// previous catalog, history and dirty flag are kept.
    pub fn load(&mut self, document: Value) -> CatalogResult<()> {
        self.store.load(document)?;
        self.history.clear();
        self.dirty = false;
        self.last_saved = Some(Utc::now());
        Ok(())
    }

    /// Parse JSON text and load it
    pub fn load_str(&mut self, json: &str) -> CatalogResult<()> {
        let document: Value = serde_json::from_str(json)?;
        self.load(document)
    }

    // ==================== Mutations ====================

    /// Create an entity from a draft and append it
    pub fn create_entity(&mut self, draft: EntityDraft) -> Entity {
        let version = self
            .store
            .catalog_version()
            .unwrap_or(DEFAULT_CATALOG_VERSION)
            .to_string();
        let entity = Entity::from_draft(draft, &version);

        self.store.push_entity(entity.clone());
        debug!("Created {} ({})", entity.item_id(), entity.item_class());
        self.record(Action::CreateItem {
            entity: entity.clone(),
        });
        entity
    }

    /// Shallow-merge `patch` into the first entity with `item_id`
    ///
    /// Returns `Ok(false)` when no entity has that id. A patch that assigns
    /// a non-string `ItemId` or `ItemClass` is rejected before anything
    /// changes.
    pub fn update_entity(&mut self, item_id: &str, patch: FieldPatch) -> CatalogResult<bool> {
        let Some(index) = self.store.position_of(item_id) else {
            return Ok(false);
        };
        if patch.is_empty() {
            return Ok(true);
        }
        let Some(previous) = self.store.apply_patch(index, &patch)? else {
            return Ok(false);
        };

        debug!("Updated {} ({} fields)", item_id, previous.values.len() + previous.absent.len());
        self.record(Action::EditItem {
            item_id: item_id.to_string(),
            index,
            fields: patch,
            previous,
        });
        Ok(true)
    }

    /// Delete the first entity with `item_id`, removing it from every
    /// bundle's membership list first
    pub fn delete_entity(&mut self, item_id: &str) -> bool {
        let Some(index) = self.store.position_of(item_id) else {
            return false;
        };
        let memberships = self.store.remove_from_all_bundles(item_id);
        let Some(entity) = self.store.remove_entity_at(index) else {
            return false;
        };

        debug!(
            "Deleted {} (removed from {} bundles)",
            item_id,
            memberships.len()
        );
        self.record(Action::DeleteItem {
            entity,
            index,
            memberships,
        });
        true
    }

    /// Append `item_id` to a bundle's membership list
    ///
    /// Returns `false` when the bundle is unknown or already has the item.
    pub fn add_to_bundle(&mut self, item_id: &str, bundle_id: &str) -> bool {
        if !self.store.add_member(item_id, bundle_id) {
            return false;
        }
        debug!("Added {} to bundle {}", item_id, bundle_id);
        self.record(Action::AddToBundle {
            item_id: item_id.to_string(),
            bundle_id: bundle_id.to_string(),
        });
        true
    }

    /// Remove `item_id` from a bundle's membership list
    pub fn remove_from_bundle(&mut self, item_id: &str, bundle_id: &str) -> bool {
        let positions = self.store.remove_member(item_id, bundle_id);
        if positions.is_empty() {
            return false;
        }
        debug!("Removed {} from bundle {}", item_id, bundle_id);
        self.record(Action::RemoveFromBundle {
            item_id: item_id.to_string(),
            bundle_id: bundle_id.to_string(),
            positions,
        });
        true
    }

    /// Move `item_id` between bundles; either side may be `None` for the
    /// unassigned pool
    pub fn move_between_bundles(
        &mut self,
        item_id: &str,
        from_bundle_id: Option<&str>,
        to_bundle_id: Option<&str>,
    ) -> bool {
        let from_positions = from_bundle_id
            .map(|from| self.store.remove_member(item_id, from))
            .unwrap_or_default();
        let removed = !from_positions.is_empty();
        let added = to_bundle_id.is_some_and(|to| self.store.add_member(item_id, to));

        if !removed && !added {
            return false;
        }

        debug!(
            "Moved {} from {} to {}",
            item_id,
            from_bundle_id.unwrap_or("unassigned"),
            to_bundle_id.unwrap_or("unassigned")
        );
        self.record(Action::MoveItem {
            item_id: item_id.to_string(),
            from_bundle_id: removed.then(|| from_bundle_id.map(str::to_string)).flatten(),
            from_positions,
            to_bundle_id: added.then(|| to_bundle_id.map(str::to_string)).flatten(),
        });
        true
    }

    /// Suggest the next id for a class
    pub fn generate_item_id(&self, item_class: &str) -> String {
        ids::next_item_id(item_class, self.store.entities())
    }

    /// Snapshot of the current catalog; `None` when nothing is loaded
    pub fn export_catalog(&self) -> Option<CatalogDocument> {
        self.store.export()
    }

    /// Current catalog as 2-space indented JSON
    pub fn export_json(&self) -> CatalogResult<Option<String>> {
        self.store.export_json()
    }

    // ==================== Validation ====================

    pub fn validate(&self) -> ValidationReport {
        validation::validate(&self.store)
    }

    /// Apply the automatic fix for an issue through the recorded mutation
    /// API
    ///
    /// Only empty display names are fixable: the display name becomes the
    /// item id. Returns `Ok(false)` for every other rule or when the item is
    /// gone.
    pub fn auto_fix(&mut self, issue: &Issue) -> CatalogResult<bool> {
        match issue.rule {
            RuleId::EmptyDisplayName => {
                let patch = FieldPatch::new().set(keys::DISPLAY_NAME, issue.item_id.clone());
                self.update_entity(&issue.item_id, patch)
            }
            _ => Ok(false),
        }
    }

    /// Apply every available fix in `report`, returning how many applied
    pub fn auto_fix_all(&mut self, report: &ValidationReport) -> CatalogResult<usize> {
        let mut fixed = 0;
        for issue in report.issues.iter().filter(|i| i.can_auto_fix) {
            if self.auto_fix(issue)? {
                fixed += 1;
            }
        }
        if fixed > 0 {
            info!("Auto-fixed {} issues", fixed);
        }
        Ok(fixed)
    }

    // ==================== History ====================

    fn record(&mut self, action: Action) {
        self.history.record(action);
        self.dirty = true;
    }

    /// Undo the most recent action
    pub fn undo(&mut self) -> Result<Option<ActionKind>, HistoryError> {
        let undone = self.history.undo(&mut self.store)?;
        if undone.is_some() {
            self.dirty = true;
        }
        Ok(undone)
    }

    /// Redo the most recently undone action
    pub fn redo(&mut self) -> Result<Option<ActionKind>, HistoryError> {
        let redone = self.history.redo(&mut self.store)?;
        if redone.is_some() {
            self.dirty = true;
        }
        Ok(redone)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ==================== Autosave ====================

    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    /// Record that the current state has been persisted at `at`
    pub fn mark_saved(&mut self, at: DateTime<Utc>) {
        self.dirty = false;
        self.last_saved = Some(at);
    }

    /// Whether an autosave should run at `now`
    ///
    /// Due when autosave is enabled, a catalog is loaded, there are unsaved
    /// changes and at least one interval has passed since the last save.
    pub fn autosave_due(&self, now: DateTime<Utc>) -> bool {
        if !self.autosave.enabled || !self.dirty || !self.store.is_loaded() {
            return false;
        }
        self.last_saved
            .map_or(true, |saved| now - saved >= self.autosave.interval)
    }
}
