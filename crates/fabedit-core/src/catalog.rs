//! In-memory catalog store
//!
//! `CatalogStore` owns the entity collection and the indices derived from it:
//!
//! - every class tag seen (`item_classes`)
//! - class tags that carry bundles (`bundle_classes`)
//! - ids of bundle entities, in first-seen order
//!
//! Indices are rebuilt on [`CatalogStore::load`] and kept current by the
//! primitive operations below. Those primitives never record history; the
//! recorded mutation API lives on [`crate::Session`].

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::{CatalogError, CatalogResult};
use crate::models::{keys, CatalogDocument, Entity, FieldPatch, PriorFields};

/// Where a member id sat inside one bundle before it was removed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberSlot {
    /// Index of the bundle entity in the collection
    pub bundle_index: usize,
    /// Positions the id occupied in the bundle's membership list, ascending
    pub positions: Vec<usize>,
}

/// Entity collection plus derived indices
#[derive(Debug, Clone, Default)]
pub struct CatalogStore {
    loaded: bool,
    catalog_version: Option<String>,
    entities: Vec<Entity>,
    item_classes: BTreeSet<String>,
    bundle_classes: BTreeSet<String>,
    bundle_ids: Vec<String>,
}

impl CatalogStore {
    /// Create an empty store with nothing loaded
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Loading ====================

    /// Load a parsed catalog document
    ///
    /// Fails if `Catalog` is missing or not an array, or if any element is
    /// not an entity. On failure the previous state is left untouched.
    pub fn load(&mut self, document: Value) -> CatalogResult<()> {
        match parse_document(document) {
            Ok((version, entities)) => {
                self.install(version, entities);
                Ok(())
            }
            Err(e) => {
                error!("Rejected catalog document: {}", e);
                Err(e)
            }
        }
    }

    /// Parse JSON text and load it
    pub fn load_str(&mut self, json: &str) -> CatalogResult<()> {
        let document: Value = serde_json::from_str(json).map_err(|e| {
            error!("Catalog is not valid JSON: {}", e);
            CatalogError::Json(e)
        })?;
        self.load(document)
    }

    /// Load an already-typed document
    pub fn load_document(&mut self, document: CatalogDocument) {
        self.install(document.catalog_version, document.catalog);
    }

    fn install(&mut self, version: Option<String>, entities: Vec<Entity>) {
        self.loaded = true;
        self.catalog_version = version;
        self.entities = entities;
        self.rebuild_indices();
        info!(
            "Loaded catalog with {} entities ({} bundles)",
            self.entities.len(),
            self.bundle_ids.len()
        );
    }

    /// Recompute every derived index with one scan of the collection
    pub fn rebuild_indices(&mut self) {
        self.item_classes.clear();
        self.bundle_classes.clear();
        self.bundle_ids.clear();

        for entity in &self.entities {
            self.item_classes.insert(entity.item_class().to_string());
            if entity.is_bundle() {
                self.bundle_classes.insert(entity.item_class().to_string());
                if !self.bundle_ids.iter().any(|id| id == entity.item_id()) {
                    self.bundle_ids.push(entity.item_id().to_string());
                }
            }
        }
    }

    /// Drop the loaded catalog
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    // ==================== Accessors ====================

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn catalog_version(&self) -> Option<&str> {
        self.catalog_version.as_deref()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Every class tag seen since the last load
    pub fn item_classes(&self) -> &BTreeSet<String> {
        &self.item_classes
    }

    /// Class tags that carry bundles
    pub fn bundle_classes(&self) -> &BTreeSet<String> {
        &self.bundle_classes
    }

    /// First entity with the given id
    pub fn get(&self, item_id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.item_id() == item_id)
    }

    pub fn get_at(&self, index: usize) -> Option<&Entity> {
        self.entities.get(index)
    }

    /// Index of the first entity with the given id
    pub fn position_of(&self, item_id: &str) -> Option<usize> {
        self.entities.iter().position(|e| e.item_id() == item_id)
    }

    /// Index of the last entity with the given id
    pub fn last_position_of(&self, item_id: &str) -> Option<usize> {
        self.entities.iter().rposition(|e| e.item_id() == item_id)
    }

    /// First bundle entity with the given id
    pub fn bundle(&self, bundle_id: &str) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| e.item_id() == bundle_id && e.is_bundle())
    }

    fn bundle_mut(&mut self, bundle_id: &str) -> Option<&mut Entity> {
        self.entities
            .iter_mut()
            .find(|e| e.item_id() == bundle_id && e.is_bundle())
    }

    /// Bundle entities, in index order
    pub fn bundles(&self) -> Vec<&Entity> {
        self.bundle_ids
            .iter()
            .filter_map(|id| self.bundle(id))
            .collect()
    }

    /// Resolve a bundle's members; ids that do not resolve are skipped
    pub fn bundle_members(&self, bundle_id: &str) -> Vec<&Entity> {
        self.bundle(bundle_id)
            .map(|bundle| {
                bundle
                    .member_ids()
                    .into_iter()
                    .filter_map(|id| self.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any bundle lists `item_id`
    pub fn is_member(&self, item_id: &str) -> bool {
        self.entities.iter().any(|e| e.has_member(item_id))
    }

    fn is_indexed_bundle(&self, entity: &Entity) -> bool {
        self.bundle_classes.contains(entity.item_class()) && entity.is_bundle()
    }

    /// Entities that are neither bundles nor members of a bundle
    pub fn unassigned(&self) -> Vec<&Entity> {
        let members: HashSet<&str> = self
            .entities
            .iter()
            .flat_map(|e| e.member_ids())
            .collect();

        self.entities
            .iter()
            .filter(|e| !self.is_indexed_bundle(e) && !members.contains(e.item_id()))
            .collect()
    }

    /// Class tags of non-bundle entities, sorted
    pub fn entity_classes(&self) -> Vec<String> {
        self.entities
            .iter()
            .filter(|e| !self.is_indexed_bundle(e))
            .map(|e| e.item_class().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Every tag used by any entity, sorted
    pub fn all_tags(&self) -> Vec<String> {
        self.entities
            .iter()
            .flat_map(|e| e.tags())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    // ==================== Export ====================

    /// Snapshot of the document, `None` when nothing is loaded
    pub fn export(&self) -> Option<CatalogDocument> {
        if !self.loaded {
            return None;
        }
        Some(CatalogDocument {
            catalog_version: self.catalog_version.clone(),
            catalog: self.entities.clone(),
        })
    }

    /// The document as 2-space indented JSON
    pub fn export_json(&self) -> CatalogResult<Option<String>> {
        match self.export() {
            Some(document) => {
                let json = document.to_json_pretty()?;
                debug!("Exported catalog ({} bytes)", json.len());
                Ok(Some(json))
            }
            None => Ok(None),
        }
    }

    // ==================== Primitive mutations ====================

    fn note_entity(&mut self, index: usize) {
        let Some(entity) = self.entities.get(index) else {
            return;
        };
        let class = entity.item_class().to_string();
        let bundle_id = entity.is_bundle().then(|| entity.item_id().to_string());

        self.item_classes.insert(class.clone());
        if let Some(id) = bundle_id {
            self.bundle_classes.insert(class);
            if !self.bundle_ids.contains(&id) {
                self.bundle_ids.push(id);
            }
        }
    }

    fn refresh_bundle_id(&mut self, item_id: &str) {
        let still_bundle = self
            .entities
            .iter()
            .any(|e| e.item_id() == item_id && e.is_bundle());
        if !still_bundle {
            self.bundle_ids.retain(|id| id != item_id);
        }
    }

    /// Append an entity, returning its index
    pub fn push_entity(&mut self, entity: Entity) -> usize {
        self.entities.push(entity);
        let index = self.entities.len() - 1;
        self.note_entity(index);
        index
    }

    /// Insert an entity at `index` (clamped to the collection length)
    pub fn insert_entity(&mut self, index: usize, entity: Entity) -> usize {
        let index = index.min(self.entities.len());
        self.entities.insert(index, entity);
        self.note_entity(index);
        index
    }

    /// Remove the entity at `index`
    pub fn remove_entity_at(&mut self, index: usize) -> Option<Entity> {
        if index >= self.entities.len() {
            return None;
        }
        let entity = self.entities.remove(index);
        if entity.is_bundle() {
            self.refresh_bundle_id(entity.item_id());
        }
        Some(entity)
    }

    /// Shallow-merge a patch into the entity at `index`
    pub fn apply_patch(&mut self, index: usize, patch: &FieldPatch) -> CatalogResult<Option<PriorFields>> {
        let Some(entity) = self.entities.get_mut(index) else {
            return Ok(None);
        };
        let old_id = entity.item_id().to_string();
        let prior = entity.merge(patch)?;
        if patch.touches_indices() {
            self.refresh_bundle_id(&old_id);
            self.note_entity(index);
        }
        Ok(Some(prior))
    }

    /// Restore a pre-image onto the entity at `index`
    pub fn restore_fields(&mut self, index: usize, prior: &PriorFields) -> bool {
        let Some(entity) = self.entities.get_mut(index) else {
            return false;
        };
        let old_id = entity.item_id().to_string();
        entity.restore(prior);
        let feeds_indices = |key: &str| {
            key == keys::ITEM_ID || key == keys::ITEM_CLASS || key == keys::BUNDLE
        };
        let touched = prior.values.keys().any(|k| feeds_indices(k.as_str()))
            || prior.absent.iter().any(|k| feeds_indices(k.as_str()));
        if touched {
            self.refresh_bundle_id(&old_id);
            self.note_entity(index);
        }
        true
    }

    /// Append `item_id` to a bundle unless already present
    pub fn add_member(&mut self, item_id: &str, bundle_id: &str) -> bool {
        let Some(bundle) = self.bundle_mut(bundle_id) else {
            return false;
        };
        if bundle.has_member(item_id) {
            return false;
        }
        match bundle.bundled_items_mut() {
            Some(items) => {
                items.push(Value::from(item_id));
                true
            }
            None => false,
        }
    }

    /// Remove every occurrence of `item_id` from a bundle, returning the
    /// positions it held
    pub fn remove_member(&mut self, item_id: &str, bundle_id: &str) -> Vec<usize> {
        self.bundle_mut(bundle_id)
            .and_then(Entity::bundled_items_mut)
            .map(|items| remove_occurrences(items, item_id))
            .unwrap_or_default()
    }

    /// Put `item_id` back into a bundle at the given positions
    pub fn insert_member(&mut self, item_id: &str, bundle_id: &str, positions: &[usize]) -> bool {
        match self.bundle_mut(bundle_id).and_then(Entity::bundled_items_mut) {
            Some(items) => {
                insert_occurrences(items, item_id, positions);
                true
            }
            None => false,
        }
    }

    /// Remove `item_id` from every bundle's membership list
    pub fn remove_from_all_bundles(&mut self, item_id: &str) -> Vec<MemberSlot> {
        let mut slots = Vec::new();
        for (bundle_index, entity) in self.entities.iter_mut().enumerate() {
            let Some(items) = entity.bundled_items_mut() else {
                continue;
            };
            let positions = remove_occurrences(items, item_id);
            if !positions.is_empty() {
                slots.push(MemberSlot {
                    bundle_index,
                    positions,
                });
            }
        }
        slots
    }

    /// Undo [`CatalogStore::remove_from_all_bundles`]
    pub fn restore_member_slots(&mut self, item_id: &str, slots: &[MemberSlot]) {
        for slot in slots {
            if let Some(items) = self
                .entities
                .get_mut(slot.bundle_index)
                .and_then(Entity::bundled_items_mut)
            {
                insert_occurrences(items, item_id, &slot.positions);
            }
        }
    }
}

fn parse_document(mut document: Value) -> CatalogResult<(Option<String>, Vec<Entity>)> {
    let items = match document.get_mut(keys::CATALOG) {
        Some(Value::Array(items)) => std::mem::take(items),
        _ => return Err(CatalogError::MissingCatalog),
    };

    let entities = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item).map_err(|source| CatalogError::InvalidEntity { index, source })
        })
        .collect::<CatalogResult<Vec<Entity>>>()?;

    let version = document
        .get(keys::CATALOG_VERSION)
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok((version, entities))
}

fn remove_occurrences(items: &mut Vec<Value>, item_id: &str) -> Vec<usize> {
    let positions: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, v)| v.as_str() == Some(item_id))
        .map(|(i, _)| i)
        .collect();
    items.retain(|v| v.as_str() != Some(item_id));
    positions
}

fn insert_occurrences(items: &mut Vec<Value>, item_id: &str, positions: &[usize]) {
    for &position in positions {
        let position = position.min(items.len());
        items.insert(position, Value::from(item_id));
    }
}
