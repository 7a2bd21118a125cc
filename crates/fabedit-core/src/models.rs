//! Data models for fabedit
//!
//! Defines the catalog document, its entities and the bundle descriptor, plus
//! the partial shapes used to create (`EntityDraft`) and edit (`FieldPatch`)
//! entities.
//!
//! An entity is an ordered JSON map of its catalog-level fields, `ItemId` and
//! `ItemClass` included, so a loaded catalog exports back with the same keys,
//! key order, values and `null`s it was loaded with. Items without a string
//! `ItemId` or `ItemClass` still load; the accessors read them as `""`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CatalogError, CatalogResult};

/// Field names used in catalog documents
pub mod keys {
    pub const CATALOG_VERSION: &str = "CatalogVersion";
    pub const CATALOG: &str = "Catalog";

    pub const ITEM_ID: &str = "ItemId";
    pub const ITEM_CLASS: &str = "ItemClass";
    pub const DISPLAY_NAME: &str = "DisplayName";
    pub const DESCRIPTION: &str = "Description";
    pub const TAGS: &str = "Tags";
    pub const CUSTOM_DATA: &str = "CustomData";
    pub const BUNDLE: &str = "Bundle";
    pub const BUNDLED_ITEMS: &str = "BundledItems";
}

/// Catalog version used for new entities when no catalog is loaded
pub const DEFAULT_CATALOG_VERSION: &str = "Main";

/// One catalog item
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Entity {
    /// Catalog-level fields, in document order
    pub fields: Map<String, Value>,
}

impl Entity {
    /// Create an entity with only an id and class
    pub fn new(item_id: impl Into<String>, item_class: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(keys::ITEM_ID.into(), Value::String(item_id.into()));
        fields.insert(keys::ITEM_CLASS.into(), Value::String(item_class.into()));
        Self { fields }
    }

    /// Build a complete entity from a draft, filling every catalog-level
    /// field with its default
    pub fn from_draft(draft: EntityDraft, catalog_version: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(keys::ITEM_ID.into(), Value::String(draft.item_id));
        fields.insert(keys::ITEM_CLASS.into(), Value::String(draft.item_class));
        fields.insert(keys::CATALOG_VERSION.into(), Value::from(catalog_version));
        fields.insert(
            keys::DISPLAY_NAME.into(),
            Value::from(draft.display_name.unwrap_or_default()),
        );
        fields.insert(keys::DESCRIPTION.into(), non_empty(draft.description));
        fields.insert("VirtualCurrencyPrices".into(), Value::Null);
        fields.insert("RealCurrencyPrices".into(), Value::Null);
        fields.insert(
            keys::TAGS.into(),
            draft.tags.map(Value::from).unwrap_or(Value::Null),
        );
        fields.insert(keys::CUSTOM_DATA.into(), non_empty(draft.custom_data));
        fields.insert(
            "Consumable".into(),
            serde_json::json!({
                "UsageCount": null,
                "UsagePeriod": null,
                "UsagePeriodGroup": null
            }),
        );
        fields.insert("Container".into(), Value::Null);
        fields.insert(
            keys::BUNDLE.into(),
            draft
                .bundle
                .map(BundleDescriptor::into_value)
                .unwrap_or(Value::Null),
        );
        fields.insert("CanBecomeCharacter".into(), Value::Bool(false));
        fields.insert("IsStackable".into(), Value::Bool(false));
        fields.insert("IsTradable".into(), Value::Bool(false));
        fields.insert("ItemImageUrl".into(), Value::Null);
        fields.insert("IsLimitedEdition".into(), Value::Bool(false));
        fields.insert("InitialLimitedEditionCount".into(), Value::from(0));
        fields.insert("ActivatedMembership".into(), Value::Null);
        for (key, value) in draft.extra {
            if key != keys::ITEM_ID && key != keys::ITEM_CLASS {
                fields.insert(key, value);
            }
        }

        Self { fields }
    }

    /// Unique identifier, `""` when absent or not a string
    ///
    /// Uniqueness is checked by validation.
    pub fn item_id(&self) -> &str {
        self.str_field(keys::ITEM_ID)
    }

    /// Class tag (player, staff, club, ...), `""` when absent or not a string
    pub fn item_class(&self) -> &str {
        self.str_field(keys::ITEM_CLASS)
    }

    fn str_field(&self, key: &str) -> &str {
        self.fields.get(key).and_then(Value::as_str).unwrap_or("")
    }

    /// Display name, if set to a string
    pub fn display_name(&self) -> Option<&str> {
        self.fields.get(keys::DISPLAY_NAME).and_then(Value::as_str)
    }

    /// Set the display name
    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.fields
            .insert(keys::DISPLAY_NAME.into(), Value::String(name.into()));
    }

    /// Raw CustomData value, `None` when absent or null
    pub fn custom_data_value(&self) -> Option<&Value> {
        self.fields.get(keys::CUSTOM_DATA).filter(|v| !v.is_null())
    }

    /// CustomData as its encoded JSON string
    pub fn custom_data(&self) -> Option<&str> {
        self.fields.get(keys::CUSTOM_DATA).and_then(Value::as_str)
    }

    /// Tags as strings; non-string entries are skipped
    pub fn tags(&self) -> Vec<&str> {
        self.fields
            .get(keys::TAGS)
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether a non-null Bundle descriptor is present
    pub fn has_bundle_descriptor(&self) -> bool {
        self.fields
            .get(keys::BUNDLE)
            .is_some_and(|bundle| !bundle.is_null())
    }

    /// Membership list of the Bundle descriptor
    pub fn bundled_items(&self) -> Option<&Vec<Value>> {
        self.fields
            .get(keys::BUNDLE)
            .and_then(|bundle| bundle.get(keys::BUNDLED_ITEMS))
            .and_then(Value::as_array)
    }

    /// Mutable membership list of the Bundle descriptor
    pub fn bundled_items_mut(&mut self) -> Option<&mut Vec<Value>> {
        self.fields
            .get_mut(keys::BUNDLE)
            .and_then(|bundle| bundle.get_mut(keys::BUNDLED_ITEMS))
            .and_then(Value::as_array_mut)
    }

    /// Member ids of this bundle (empty for non-bundles)
    pub fn member_ids(&self) -> Vec<&str> {
        self.bundled_items()
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// An entity is a bundle when its descriptor carries a membership list,
    /// even an empty one
    pub fn is_bundle(&self) -> bool {
        self.bundled_items().is_some()
    }

    /// Whether this bundle lists `item_id` as a member
    pub fn has_member(&self, item_id: &str) -> bool {
        self.member_position(item_id).is_some()
    }

    /// Position of `item_id` in this bundle's membership list
    pub fn member_position(&self, item_id: &str) -> Option<usize> {
        self.bundled_items()?
            .iter()
            .position(|member| member.as_str() == Some(item_id))
    }

    /// Storage key for this entity's image
    pub fn image_key(&self, ext: &str) -> String {
        format!("images/{}/{}.{}", self.item_class(), self.item_id(), ext)
    }

    /// Shallow-merge a patch into this entity, returning the pre-image of
    /// every patched key
    ///
    /// A patched `ItemId` or `ItemClass` must be a string. This is checked
    /// before anything is written, so a rejected patch leaves the entity
    /// untouched.
    pub fn merge(&mut self, patch: &FieldPatch) -> CatalogResult<PriorFields> {
        expect_string(patch, keys::ITEM_ID)?;
        expect_string(patch, keys::ITEM_CLASS)?;

        let mut prior = PriorFields::default();
        for key in patch.keys() {
            match self.fields.get(key) {
                Some(value) => {
                    prior.values.insert(key.into(), value.clone());
                }
                None => prior.absent.push(key.to_string()),
            }
        }

        for (key, value) in patch.iter() {
            self.fields.insert(key.clone(), value.clone());
        }

        Ok(prior)
    }

    /// Put back a pre-image captured by [`Entity::merge`]
    ///
    /// Values are restored verbatim, including a `null` or missing
    /// `ItemClass` the entity was loaded with.
    pub fn restore(&mut self, prior: &PriorFields) {
        for (key, value) in &prior.values {
            self.fields.insert(key.clone(), value.clone());
        }
        for key in &prior.absent {
            self.fields.shift_remove(key);
        }
    }
}

fn non_empty(value: Option<String>) -> Value {
    match value {
        Some(s) if !s.is_empty() => Value::String(s),
        _ => Value::Null,
    }
}

fn expect_string(patch: &FieldPatch, field: &'static str) -> CatalogResult<()> {
    match patch.get(field) {
        None | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(CatalogError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}

/// Bundle descriptor carried by bundle entities
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BundleDescriptor {
    /// Member item ids, in order
    #[serde(rename = "BundledItems", default)]
    pub bundled_items: Vec<String>,
    /// Carried through unchanged
    #[serde(rename = "BundledResultTables", default)]
    pub bundled_result_tables: Vec<Value>,
    /// Carried through unchanged
    #[serde(rename = "BundledVirtualCurrencies", default)]
    pub bundled_virtual_currencies: Option<Value>,
}

impl BundleDescriptor {
    /// An empty bundle
    pub fn new() -> Self {
        Self::default()
    }

    /// A bundle with the given members
    pub fn with_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bundled_items: items.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    fn into_value(self) -> Value {
        let mut bundle = Map::new();
        bundle.insert(keys::BUNDLED_ITEMS.into(), Value::from(self.bundled_items));
        bundle.insert(
            "BundledResultTables".into(),
            Value::Array(self.bundled_result_tables),
        );
        bundle.insert(
            "BundledVirtualCurrencies".into(),
            self.bundled_virtual_currencies.unwrap_or(Value::Null),
        );
        Value::Object(bundle)
    }
}

/// Caller-supplied fields for a new entity
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EntityDraft {
    #[serde(rename = "ItemId")]
    pub item_id: String,
    #[serde(rename = "ItemClass")]
    pub item_class: String,
    #[serde(rename = "DisplayName", default)]
    pub display_name: Option<String>,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
    #[serde(rename = "Tags", default)]
    pub tags: Option<Vec<String>>,
    /// JSON-encoded payload
    #[serde(rename = "CustomData", default)]
    pub custom_data: Option<String>,
    #[serde(rename = "Bundle", default)]
    pub bundle: Option<BundleDescriptor>,
    /// Other catalog-level fields; these override the defaults
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntityDraft {
    /// Start a draft with an id and class
    pub fn new(item_id: impl Into<String>, item_class: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            item_class: item_class.into(),
            ..Self::default()
        }
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn custom_data(mut self, data: impl Into<String>) -> Self {
        self.custom_data = Some(data.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn bundle(mut self, bundle: BundleDescriptor) -> Self {
        self.bundle = Some(bundle);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set any other catalog-level field
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A set of field assignments to shallow-merge onto an entity
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct FieldPatch(Map<String, Value>);

impl FieldPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an assignment (builder style)
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the patch touches fields that feed the derived indices
    pub fn touches_indices(&self) -> bool {
        self.0.contains_key(keys::ITEM_ID)
            || self.0.contains_key(keys::ITEM_CLASS)
            || self.0.contains_key(keys::BUNDLE)
    }
}

impl From<Map<String, Value>> for FieldPatch {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Pre-image of the keys touched by a [`FieldPatch`]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PriorFields {
    /// Keys that existed, with their previous values
    pub values: Map<String, Value>,
    /// Keys that did not exist before the patch
    pub absent: Vec<String>,
}

/// The top-level catalog document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogDocument {
    #[serde(
        rename = "CatalogVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub catalog_version: Option<String>,
    #[serde(rename = "Catalog")]
    pub catalog: Vec<Entity>,
}

impl CatalogDocument {
    /// Serialize with 2-space indentation
    pub fn to_json_pretty(&self) -> CatalogResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
