//! Undo/redo history
//!
//! Every recorded mutation is stored as an [`Action`] that can be replayed
//! forward (redo) or inverted (undo) against a [`CatalogStore`]. Actions own
//! copies of everything they need, so later edits to live entities never leak
//! into history.
//!
//! `past` is bounded (oldest dropped first) and `future` is cleared by every
//! new record. While a replay runs, recording is suspended through a
//! [`RecordingPause`] guard that restores the previous state when dropped,
//! including when replay fails or unwinds.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::{CatalogStore, MemberSlot};
use crate::error::CatalogError;
use crate::models::{keys, Entity, FieldPatch, PriorFields};

/// Default number of undo steps kept
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Errors raised while replaying history
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Failed to replay {kind} action: {source}")]
    Replay {
        kind: ActionKind,
        #[source]
        source: CatalogError,
    },
}

/// Action type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateItem,
    DeleteItem,
    EditItem,
    AddToBundle,
    RemoveFromBundle,
    MoveItem,
}

impl ActionKind {
    /// Wire name (`create_item`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CreateItem => "create_item",
            ActionKind::DeleteItem => "delete_item",
            ActionKind::EditItem => "edit_item",
            ActionKind::AddToBundle => "add_to_bundle",
            ActionKind::RemoveFromBundle => "remove_from_bundle",
            ActionKind::MoveItem => "move_item",
        }
    }

    /// Short human label
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::CreateItem => "Create",
            ActionKind::DeleteItem => "Delete",
            ActionKind::EditItem => "Edit",
            ActionKind::AddToBundle => "Add to bundle",
            ActionKind::RemoveFromBundle => "Remove from bundle",
            ActionKind::MoveItem => "Move",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reversible description of one mutation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    CreateItem {
        entity: Entity,
    },
    DeleteItem {
        entity: Entity,
        /// Collection index the entity was removed from
        index: usize,
        /// Memberships removed by the cascade
        memberships: Vec<MemberSlot>,
    },
    EditItem {
        /// Id before the edit
        item_id: String,
        index: usize,
        fields: FieldPatch,
        previous: PriorFields,
    },
    AddToBundle {
        item_id: String,
        bundle_id: String,
    },
    RemoveFromBundle {
        item_id: String,
        bundle_id: String,
        positions: Vec<usize>,
    },
    MoveItem {
        item_id: String,
        /// Set only when the item was actually removed from it
        from_bundle_id: Option<String>,
        from_positions: Vec<usize>,
        /// Set only when the item was actually added to it
        to_bundle_id: Option<String>,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::CreateItem { .. } => ActionKind::CreateItem,
            Action::DeleteItem { .. } => ActionKind::DeleteItem,
            Action::EditItem { .. } => ActionKind::EditItem,
            Action::AddToBundle { .. } => ActionKind::AddToBundle,
            Action::RemoveFromBundle { .. } => ActionKind::RemoveFromBundle,
            Action::MoveItem { .. } => ActionKind::MoveItem,
        }
    }

    /// The item this action is about
    pub fn item_id(&self) -> &str {
        match self {
            Action::CreateItem { entity } | Action::DeleteItem { entity, .. } => entity.item_id(),
            Action::EditItem { item_id, .. }
            | Action::AddToBundle { item_id, .. }
            | Action::RemoveFromBundle { item_id, .. }
            | Action::MoveItem { item_id, .. } => item_id,
        }
    }

    /// Replay the mutation forward
    pub fn apply(&self, store: &mut CatalogStore) -> Result<(), CatalogError> {
        match self {
            Action::CreateItem { entity } => {
                store.push_entity(entity.clone());
            }
            Action::DeleteItem { entity, index, .. } => {
                if let Some(at) = locate(store, *index, entity.item_id()) {
                    store.remove_from_all_bundles(entity.item_id());
                    store.remove_entity_at(at);
                }
            }
            Action::EditItem {
                item_id,
                index,
                fields,
                ..
            } => {
                if let Some(at) = locate(store, *index, item_id) {
                    store.apply_patch(at, fields)?;
                }
            }
            Action::AddToBundle { item_id, bundle_id } => {
                store.add_member(item_id, bundle_id);
            }
            Action::RemoveFromBundle {
                item_id, bundle_id, ..
            } => {
                store.remove_member(item_id, bundle_id);
            }
            Action::MoveItem {
                item_id,
                from_bundle_id,
                to_bundle_id,
                ..
            } => {
                if let Some(from) = from_bundle_id {
                    store.remove_member(item_id, from);
                }
                if let Some(to) = to_bundle_id {
                    store.add_member(item_id, to);
                }
            }
        }
        Ok(())
    }

    /// Replay the inverse of the mutation
    pub fn revert(&self, store: &mut CatalogStore) -> Result<(), CatalogError> {
        match self {
            Action::CreateItem { entity } => {
                if let Some(at) = store.last_position_of(entity.item_id()) {
                    store.remove_entity_at(at);
                }
            }
            Action::DeleteItem {
                entity,
                index,
                memberships,
            } => {
                store.insert_entity(*index, entity.clone());
                store.restore_member_slots(entity.item_id(), memberships);
            }
            Action::EditItem {
                item_id,
                index,
                fields,
                previous,
            } => {
                let current_id = fields
                    .get(keys::ITEM_ID)
                    .and_then(|v| v.as_str())
                    .unwrap_or(item_id);
                if let Some(at) = locate(store, *index, current_id) {
                    store.restore_fields(at, previous);
                }
            }
            Action::AddToBundle { item_id, bundle_id } => {
                store.remove_member(item_id, bundle_id);
            }
            Action::RemoveFromBundle {
                item_id,
                bundle_id,
                positions,
            } => {
                store.insert_member(item_id, bundle_id, positions);
            }
            Action::MoveItem {
                item_id,
                from_bundle_id,
                from_positions,
                to_bundle_id,
            } => {
                if let Some(to) = to_bundle_id {
                    store.remove_member(item_id, to);
                }
                if let Some(from) = from_bundle_id {
                    store.insert_member(item_id, from, from_positions);
                }
            }
        }
        Ok(())
    }
}

/// Prefer the recorded index when it still holds the expected id
fn locate(store: &CatalogStore, index: usize, item_id: &str) -> Option<usize> {
    match store.get_at(index) {
        Some(entity) if entity.item_id() == item_id => Some(index),
        _ => store.position_of(item_id),
    }
}

/// An action plus when it was recorded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub action: Action,
}

impl ActionRecord {
    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }
}

/// Bounded undo stack plus redo stack
#[derive(Debug, Clone)]
pub struct History {
    past: VecDeque<ActionRecord>,
    future: Vec<ActionRecord>,
    limit: usize,
    recording: bool,
}

impl Default for History {
    fn default() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// History keeping at most `limit` undo steps (at least one)
    pub fn with_limit(limit: usize) -> Self {
        Self {
            past: VecDeque::new(),
            future: Vec::new(),
            limit: limit.max(1),
            recording: true,
        }
    }

    /// Record an action; ignored while recording is suspended
    ///
    /// Returns whether the action was stored.
    pub fn record(&mut self, action: Action) -> bool {
        if !self.recording {
            debug!("Recording suspended, dropping {} action", action.kind());
            return false;
        }

        self.past.push_back(ActionRecord {
            timestamp: Utc::now(),
            action,
        });
        while self.past.len() > self.limit {
            self.past.pop_front();
        }
        self.future.clear();
        true
    }

    /// Suspend recording until the returned guard is dropped
    pub fn suspend(&mut self) -> RecordingPause<'_> {
        let previous = self.recording;
        self.recording = false;
        RecordingPause {
            history: self,
            previous,
        }
    }

    /// Undo the most recent action
    ///
    /// Returns the kind undone, or `None` when there is nothing to undo. If
    /// replay fails the action goes back onto the undo stack.
    pub fn undo(&mut self, store: &mut CatalogStore) -> Result<Option<ActionKind>, HistoryError> {
        let Some(record) = self.past.pop_back() else {
            return Ok(None);
        };
        let kind = record.kind();

        let result = {
            let _pause = self.suspend();
            record.action.revert(store)
        };

        match result {
            Ok(()) => {
                debug!("Undid {} on {}", kind, record.action.item_id());
                self.future.push(record);
                Ok(Some(kind))
            }
            Err(source) => {
                warn!("Undo of {} failed: {}", kind, source);
                self.past.push_back(record);
                Err(HistoryError::Replay { kind, source })
            }
        }
    }

    /// Redo the most recently undone action
    pub fn redo(&mut self, store: &mut CatalogStore) -> Result<Option<ActionKind>, HistoryError> {
        let Some(record) = self.future.pop() else {
            return Ok(None);
        };
        let kind = record.kind();

        let result = {
            let _pause = self.suspend();
            record.action.apply(store)
        };

        match result {
            Ok(()) => {
                debug!("Redid {} on {}", kind, record.action.item_id());
                self.past.push_back(record);
                Ok(Some(kind))
            }
            Err(source) => {
                warn!("Redo of {} failed: {}", kind, source);
                self.future.push(record);
                Err(HistoryError::Replay { kind, source })
            }
        }
    }

    /// Empty both stacks and resume recording
    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
        self.recording = true;
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Number of undo steps available
    pub fn len(&self) -> usize {
        self.past.len()
    }

    pub fn is_empty(&self) -> bool {
        self.past.is_empty()
    }

    pub fn redo_len(&self) -> usize {
        self.future.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn last_action(&self) -> Option<&ActionRecord> {
        self.past.back()
    }

    /// Undo stack, oldest first
    pub fn past(&self) -> impl Iterator<Item = &ActionRecord> {
        self.past.iter()
    }
}

/// Scope guard returned by [`History::suspend`]
pub struct RecordingPause<'a> {
    history: &'a mut History,
    previous: bool,
}

impl Deref for RecordingPause<'_> {
    type Target = History;

    fn deref(&self) -> &History {
        &*self.history
    }
}

impl DerefMut for RecordingPause<'_> {
    fn deref_mut(&mut self) -> &mut History {
        &mut *self.history
    }
}

impl Drop for RecordingPause<'_> {
    fn drop(&mut self) {
        self.history.recording = self.previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> CatalogStore {
        let mut store = CatalogStore::new();
        store
            .load(json!({
                "CatalogVersion": "Main",
                "Catalog": [
                    {"ItemId": "club_1", "ItemClass": "club", "DisplayName": "Club",
                     "Bundle": {"BundledItems": ["player_1"]}},
                    {"ItemId": "player_1", "ItemClass": "player", "DisplayName": "Ann"}
                ]
            }))
            .unwrap();
        store
    }

    fn add_action(n: usize) -> Action {
        Action::AddToBundle {
            item_id: format!("player_{}", n),
            bundle_id: "club_1".to_string(),
        }
    }

    #[test]
    fn test_new_history_is_empty_and_recording() {
        let history = History::new();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert!(history.is_recording());
        assert_eq!(history.limit(), DEFAULT_HISTORY_LIMIT);
        assert!(history.last_action().is_none());
    }

    #[test]
    fn test_record_evicts_oldest() {
        let mut history = History::new();
        for n in 0..60 {
            history.record(add_action(n));
        }
        assert_eq!(history.len(), 50);
        let first = history.past().next().unwrap();
        assert_eq!(first.action.item_id(), "player_10");
        assert_eq!(history.last_action().unwrap().action.item_id(), "player_59");
    }

    #[test]
    fn test_limit_of_zero_keeps_one() {
        let mut history = History::with_limit(0);
        history.record(add_action(1));
        history.record(add_action(2));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_record_ignored_while_suspended() {
        let mut history = History::new();
        {
            let mut pause = history.suspend();
            assert!(!pause.is_recording());
            assert!(!pause.record(add_action(1)));
        }
        assert!(history.is_recording());
        assert!(history.is_empty());
    }

    #[test]
    fn test_nested_suspend_restores_outer_state() {
        let mut history = History::new();
        {
            let mut outer = history.suspend();
            {
                let inner = outer.suspend();
                assert!(!inner.is_recording());
            }
            assert!(!outer.is_recording());
        }
        assert!(history.is_recording());
    }

    #[test]
    fn test_undo_redo_add_to_bundle() {
        let mut store = store();
        let mut history = History::new();

        store.add_member("player_1", "club_1");
        store.add_member("ghost", "club_1");
        history.record(Action::AddToBundle {
            item_id: "ghost".into(),
            bundle_id: "club_1".into(),
        });

        assert_eq!(history.undo(&mut store).unwrap(), Some(ActionKind::AddToBundle));
        assert_eq!(store.bundle("club_1").unwrap().member_ids(), vec!["player_1"]);
        assert!(history.can_redo());

        assert_eq!(history.redo(&mut store).unwrap(), Some(ActionKind::AddToBundle));
        assert_eq!(
            store.bundle("club_1").unwrap().member_ids(),
            vec!["player_1", "ghost"]
        );
        assert!(history.is_recording());
    }

    #[test]
    fn test_undo_redo_on_empty_stacks() {
        let mut store = store();
        let mut history = History::new();
        assert_eq!(history.undo(&mut store).unwrap(), None);
        assert_eq!(history.redo(&mut store).unwrap(), None);
    }

    #[test]
    fn test_failed_undo_restores_stacks_and_recording() {
        let mut store = store();
        let before = store.entities().to_vec();
        let mut history = History::new();

        let mut previous = PriorFields::default();
        previous.values.insert("ItemId".into(), json!(7));
        history.record(Action::EditItem {
            item_id: "player_1".into(),
            index: 1,
            fields: FieldPatch::new().set("DisplayName", "Bea"),
            previous,
        });

        let err = history.undo(&mut store).unwrap_err();
        assert!(matches!(
            err,
            HistoryError::Replay {
                kind: ActionKind::EditItem,
                ..
            }
        ));
        assert!(history.is_recording());
        assert_eq!(history.len(), 1);
        assert!(!history.can_redo());
        assert_eq!(store.entities(), before.as_slice());
    }

    #[test]
    fn test_new_record_clears_future() {
        let mut store = store();
        let mut history = History::new();
        history.record(add_action(1));
        history.undo(&mut store).unwrap();
        assert!(history.can_redo());

        history.record(add_action(2));
        assert!(!history.can_redo());
        assert_eq!(history.redo(&mut store).unwrap(), None);
    }

    #[test]
    fn test_clear() {
        let mut history = History::new();
        history.record(add_action(1));
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.redo_len(), 0);
        assert!(history.is_recording());
    }

    #[test]
    fn test_action_kind_labels() {
        assert_eq!(ActionKind::MoveItem.label(), "Move");
        assert_eq!(ActionKind::RemoveFromBundle.as_str(), "remove_from_bundle");
        assert_eq!(ActionKind::CreateItem.to_string(), "create_item");
    }

    #[test]
    fn test_record_serializes_with_type_tag() {
        let mut history = History::new();
        history.record(add_action(3));
        let value = serde_json::to_value(history.last_action().unwrap()).unwrap();
        assert_eq!(value["type"], json!("add_to_bundle"));
        assert_eq!(value["item_id"], json!("player_3"));
        assert!(value["timestamp"].is_string());
    }
}
