//! User settings and entity templates
//!
//! Settings live in `{data_dir}/settings.json`. A saved file is deep-merged
//! over the built-in defaults on load, so settings added in newer versions
//! appear with their default values: objects merge key by key, every other
//! value replaces what was there.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::models::{BundleDescriptor, Entity, EntityDraft};
use crate::storage::atomic_write;

pub const SETTINGS_VERSION: &str = "1.1.0";

/// Template for a single item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemTemplate {
    #[serde(rename = "ItemClass")]
    pub item_class: String,
    #[serde(rename = "DisplayName", default)]
    pub display_name: Option<String>,
    #[serde(
        rename = "Description",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    /// Structured payload, encoded to a string when an entity is created
    #[serde(rename = "CustomData", default)]
    pub custom_data: Option<Value>,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,
    #[serde(rename = "Bundle", default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<BundleDescriptor>,
    /// Any other catalog-level fields (`IsStackable`, `IsTradable`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItemTemplate {
    fn new(item_class: &str, display_name: &str, custom_data: Value) -> Self {
        let mut extra = Map::new();
        extra.insert("IsStackable".into(), Value::Bool(false));
        extra.insert("IsTradable".into(), Value::Bool(false));
        Self {
            item_class: item_class.to_string(),
            display_name: Some(display_name.to_string()),
            description: None,
            custom_data: Some(custom_data),
            tags: Vec::new(),
            bundle: None,
            extra,
        }
    }

    /// Draft for a new entity with `item_id` built from this template
    pub fn to_draft(&self, item_id: impl Into<String>) -> EntityDraft {
        let mut draft = EntityDraft::new(item_id, self.item_class.clone()).tags(self.tags.clone());
        draft.display_name = self.display_name.clone();
        draft.description = self.description.clone();
        draft.custom_data = self.custom_data.as_ref().map(encode_custom_data);
        draft.bundle = self.bundle.clone();
        draft.extra = self.extra.clone();
        draft
    }
}

/// How many items of one class a bundle template expects
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemRequirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    pub min: usize,
    pub max: usize,
    pub label: String,
}

impl ItemRequirement {
    fn new(count: Option<usize>, min: usize, max: usize, label: &str) -> Self {
        Self {
            count,
            min,
            max,
            label: label.to_string(),
        }
    }
}

/// Outcome of checking one [`ItemRequirement`] against a bundle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequirementCheck {
    pub item_class: String,
    pub label: String,
    pub found: usize,
    pub satisfied: bool,
}

/// Template for a bundle and the items it should hold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub bundle_class: String,
    #[serde(default)]
    pub custom_data: Option<Value>,
    #[serde(default)]
    pub virtual_currencies: Map<String, Value>,
    #[serde(default)]
    pub item_requirements: BTreeMap<String, ItemRequirement>,
}

impl BundleTemplate {
    /// Draft for a new, empty bundle entity built from this template
    pub fn to_draft(&self, item_id: impl Into<String>) -> EntityDraft {
        let mut bundle = BundleDescriptor::new();
        if !self.virtual_currencies.is_empty() {
            bundle.bundled_virtual_currencies = Some(Value::Object(self.virtual_currencies.clone()));
        }

        let mut draft = EntityDraft::new(item_id, self.bundle_class.clone())
            .display_name(self.name.clone())
            .tags(Vec::new())
            .bundle(bundle);
        if !self.description.is_empty() {
            draft = draft.description(self.description.clone());
        }
        draft.custom_data = self.custom_data.as_ref().map(encode_custom_data);
        draft
    }

    /// Compare a bundle's members against the item requirements
    pub fn check_requirements(&self, members: &[&Entity]) -> Vec<RequirementCheck> {
        self.item_requirements
            .iter()
            .map(|(item_class, requirement)| {
                let found = members
                    .iter()
                    .filter(|e| e.item_class() == item_class)
                    .count();
                RequirementCheck {
                    item_class: item_class.clone(),
                    label: requirement.label.clone(),
                    found,
                    satisfied: (requirement.min..=requirement.max).contains(&found),
                }
            })
            .collect()
    }
}

/// The two template families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Item,
    Bundle,
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "item" | "items" => Ok(TemplateKind::Item),
            "bundle" | "bundles" => Ok(TemplateKind::Bundle),
            other => Err(format!("Unknown template kind '{}' (expected item or bundle)", other)),
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateKind::Item => f.write_str("item"),
            TemplateKind::Bundle => f.write_str("bundle"),
        }
    }
}

/// A template of either kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Template {
    Item(ItemTemplate),
    Bundle(BundleTemplate),
}

impl Template {
    pub fn kind(&self) -> TemplateKind {
        match self {
            Template::Item(_) => TemplateKind::Item,
            Template::Bundle(_) => TemplateKind::Bundle,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Templates {
    #[serde(default)]
    pub items: BTreeMap<String, ItemTemplate>,
    #[serde(default)]
    pub bundles: BTreeMap<String, BundleTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UiPreferences {
    pub theme: String,
    pub bundle_grid_columns: u32,
    pub entity_card_size: String,
    pub show_previews: bool,
    pub auto_collapse_warnings: bool,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            bundle_grid_columns: 4,
            entity_card_size: "medium".to_string(),
            show_previews: true,
            auto_collapse_warnings: false,
        }
    }
}

/// Where the user left off
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastSession {
    pub file_path: Option<String>,
    /// Milliseconds since the Unix epoch
    pub timestamp: Option<i64>,
    pub auto_save_enabled: bool,
}

impl Default for LastSession {
    fn default() -> Self {
        Self {
            file_path: None,
            timestamp: None,
            auto_save_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub version: String,
    pub templates: Templates,
    pub ui_preferences: UiPreferences,
    pub last_session: LastSession,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION.to_string(),
            templates: default_templates(),
            ui_preferences: UiPreferences::default(),
            last_session: LastSession::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, merged over the defaults
    ///
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut settings = Self::default();
        if !path.exists() {
            debug!("No settings file at {:?}, using defaults", path);
            return Ok(settings);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;
        settings
            .merge_json(&content)
            .with_context(|| format!("Failed to load settings file: {:?}", path))?;
        Ok(settings)
    }

    /// Save settings to `path`
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let content = self.export_json()?;
        atomic_write(path, content.as_bytes())
            .with_context(|| format!("Failed to save settings to {:?}", path))?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Deep-merge a JSON object over the current settings
    ///
    /// The settings are unchanged if the merged result is not valid.
    pub fn merge_json(&mut self, json: &str) -> Result<()> {
        let incoming: Value = serde_json::from_str(json).context("Settings are not valid JSON")?;
        if !incoming.is_object() {
            bail!("Settings must be a JSON object");
        }

        let mut merged = serde_json::to_value(&*self).context("Failed to serialize settings")?;
        deep_merge(&mut merged, incoming);
        *self = serde_json::from_value(merged).context("Settings have an invalid shape")?;
        Ok(())
    }

    /// Import a settings file exported from another installation
    pub fn import_from_path(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;
        self.merge_json(&content)?;
        info!("Imported settings from {:?}", path);
        Ok(())
    }

    /// Settings as 2-space indented JSON
    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize settings")
    }

    /// Restore every default
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn item_template(&self, template_id: &str) -> Option<&ItemTemplate> {
        self.templates.items.get(template_id)
    }

    pub fn bundle_template(&self, template_id: &str) -> Option<&BundleTemplate> {
        self.templates.bundles.get(template_id)
    }

    pub fn template(&self, kind: TemplateKind, template_id: &str) -> Option<Template> {
        match kind {
            TemplateKind::Item => self.item_template(template_id).cloned().map(Template::Item),
            TemplateKind::Bundle => self
                .bundle_template(template_id)
                .cloned()
                .map(Template::Bundle),
        }
    }

    /// Add or replace a template
    pub fn save_template(&mut self, template_id: impl Into<String>, template: Template) {
        let template_id = template_id.into();
        match template {
            Template::Item(t) => {
                self.templates.items.insert(template_id, t);
            }
            Template::Bundle(t) => {
                self.templates.bundles.insert(template_id, t);
            }
        }
    }

    /// Remove a template, returning whether it existed
    pub fn delete_template(&mut self, kind: TemplateKind, template_id: &str) -> bool {
        match kind {
            TemplateKind::Item => self.templates.items.remove(template_id).is_some(),
            TemplateKind::Bundle => self.templates.bundles.remove(template_id).is_some(),
        }
    }

    pub fn item_template_ids(&self) -> Vec<&str> {
        self.templates.items.keys().map(String::as_str).collect()
    }

    pub fn bundle_template_ids(&self) -> Vec<&str> {
        self.templates.bundles.keys().map(String::as_str).collect()
    }
}

/// Merge `source` into `target`: objects recursively, anything else replaces
pub fn deep_merge(target: &mut Value, source: Value) {
    let Value::Object(source) = source else {
        *target = source;
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in source {
            if value.is_object() {
                deep_merge(target.entry(key).or_insert(Value::Null), value);
            } else {
                target.insert(key, value);
            }
        }
    }
}

fn encode_custom_data(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn default_infrastructure(training_modules: Value) -> Value {
    json!({
        "infrastructure": {
            "training_base": {"level": 1, "modules": training_modules},
            "academy": {"level": 0, "modules": []},
            "main_office": {"level": 0, "modules": []},
            "stadium": {"level": 0, "modules": []}
        }
    })
}

fn default_templates() -> Templates {
    let mut items = BTreeMap::new();
    items.insert(
        "player".to_string(),
        ItemTemplate::new(
            "player",
            "New Player",
            json!({"level": "1", "power": "1", "power_limit": "5"}),
        ),
    );
    items.insert(
        "staff".to_string(),
        ItemTemplate::new(
            "staff",
            "New Staff Member",
            json!({"level": "1", "salary": "1000", "specialty": "coach"}),
        ),
    );
    items.insert(
        "team".to_string(),
        ItemTemplate::new("team", "New Team", json!({"balance": "0", "power": "12"})),
    );
    items.insert(
        "tactic".to_string(),
        ItemTemplate::new("tactic", "New Tactic", json!({"style": "BALANCED"})),
    );
    let mut club = ItemTemplate::new("club", "New Club", default_infrastructure(json!([])));
    club.bundle = Some(BundleDescriptor::new());
    items.insert("club".to_string(), club);

    let mut virtual_currencies = Map::new();
    virtual_currencies.insert("CO".into(), json!(1000));

    let mut item_requirements = BTreeMap::new();
    item_requirements.insert("team".to_string(), ItemRequirement::new(Some(1), 1, 1, "1"));
    item_requirements.insert("player".to_string(), ItemRequirement::new(Some(5), 5, 7, "5-7"));
    item_requirements.insert("staff".to_string(), ItemRequirement::new(Some(1), 1, 2, "1-2"));
    item_requirements.insert("tactic".to_string(), ItemRequirement::new(Some(1), 1, 1, "1"));
    item_requirements.insert(
        "location".to_string(),
        ItemRequirement::new(None, 0, 5, "optional"),
    );

    let mut bundles = BTreeMap::new();
    bundles.insert(
        "starter_club".to_string(),
        BundleTemplate {
            name: "Starter Club".to_string(),
            description: "Basic club for new players".to_string(),
            bundle_class: "club".to_string(),
            custom_data: Some(default_infrastructure(json!([{"id": "loc_gym"}]))),
            virtual_currencies,
            item_requirements,
        },
    );

    Templates { items, bundles }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_templates() {
        let settings = Settings::default();
        assert_eq!(settings.version, "1.1.0");
        assert_eq!(
            settings.item_template_ids(),
            vec!["club", "player", "staff", "tactic", "team"]
        );
        assert_eq!(settings.bundle_template_ids(), vec!["starter_club"]);
        assert!(settings.item_template("club").unwrap().bundle.is_some());
    }

    #[test]
    fn test_item_template_to_draft() {
        let settings = Settings::default();
        let template = settings.item_template("player").unwrap();
        let entity = Entity::from_draft(template.to_draft("player_9"), "Main");

        assert_eq!(entity.item_id(), "player_9");
        assert_eq!(entity.display_name(), Some("New Player"));
        assert_eq!(entity.fields["Tags"], json!([]));
        assert_eq!(entity.fields["IsStackable"], json!(false));
        let data: Value = serde_json::from_str(entity.custom_data().unwrap()).unwrap();
        assert_eq!(data, json!({"level": "1", "power": "1", "power_limit": "5"}));
    }

    #[test]
    fn test_template_extra_fields_override_defaults() {
        let mut template = Settings::default().item_template("team").cloned().unwrap();
        template.extra.insert("IsTradable".into(), json!(true));
        let entity = Entity::from_draft(template.to_draft("team_2"), "Main");
        assert_eq!(entity.fields["IsTradable"], json!(true));
    }

    #[test]
    fn test_bundle_template_to_draft() {
        let settings = Settings::default();
        let template = settings.bundle_template("starter_club").unwrap();
        let entity = Entity::from_draft(template.to_draft("club_7"), "Main");

        assert!(entity.is_bundle());
        assert!(entity.member_ids().is_empty());
        assert_eq!(entity.item_class(), "club");
        assert_eq!(entity.fields["Description"], json!("Basic club for new players"));
        assert_eq!(
            entity.fields["Bundle"]["BundledVirtualCurrencies"],
            json!({"CO": 1000})
        );
    }

    #[test]
    fn test_check_requirements() {
        let settings = Settings::default();
        let template = settings.bundle_template("starter_club").unwrap();
        let players: Vec<Entity> = (1..=5)
            .map(|i| Entity::new(format!("player_{}", i), "player"))
            .collect();
        let team = Entity::new("team_1", "team");
        let mut members: Vec<&Entity> = players.iter().collect();
        members.push(&team);

        let checks = template.check_requirements(&members);
        let by_class = |class: &str| checks.iter().find(|c| c.item_class == class).unwrap();
        assert!(by_class("player").satisfied);
        assert_eq!(by_class("player").found, 5);
        assert!(by_class("team").satisfied);
        assert!(!by_class("staff").satisfied);
        assert!(!by_class("tactic").satisfied);
        assert!(by_class("location").satisfied);
    }

    #[test]
    fn test_deep_merge() {
        let mut target = json!({"a": {"b": 1, "c": [1, 2]}, "d": "x"});
        deep_merge(
            &mut target,
            json!({"a": {"c": [3], "e": {"f": true}}, "d": null, "g": 4}),
        );
        assert_eq!(
            target,
            json!({"a": {"b": 1, "c": [3], "e": {"f": true}}, "d": null, "g": 4})
        );
    }

    #[test]
    fn test_merge_json_keeps_defaults() {
        let mut settings = Settings::default();
        settings
            .merge_json(r#"{"uiPreferences": {"theme": "dark"}, "templates": {"items": {"player": {"DisplayName": "Rookie"}}}}"#)
            .unwrap();

        assert_eq!(settings.ui_preferences.theme, "dark");
        assert_eq!(settings.ui_preferences.bundle_grid_columns, 4);
        let player = settings.item_template("player").unwrap();
        assert_eq!(player.display_name.as_deref(), Some("Rookie"));
        assert_eq!(player.item_class, "player");
        assert!(settings.item_template("staff").is_some());
    }

    #[test]
    fn test_merge_json_rejects_bad_input() {
        let mut settings = Settings::default();
        assert!(settings.merge_json("[1, 2]").is_err());
        assert!(settings.merge_json("{oops").is_err());
        assert!(settings
            .merge_json(r#"{"uiPreferences": {"bundleGridColumns": "wide"}}"#)
            .is_err());
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");

        let mut settings = Settings::default();
        settings.last_session.file_path = Some("/tmp/catalog.json".into());
        let mut custom = settings.item_template("team").cloned().unwrap();
        custom.display_name = Some("Academy Team".into());
        settings.save_template("academy_team", Template::Item(custom));
        settings.save_to_path(&path).unwrap();

        let loaded = Settings::load_from_path(&path).unwrap();
        assert_eq!(loaded, settings);
        assert!(loaded.item_template("academy_team").is_some());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_from_path(&temp_dir.path().join("none.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_template_crud_and_reset() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.template(TemplateKind::Bundle, "starter_club"),
            Some(Template::Bundle(_))
        ));
        assert!(settings.delete_template(TemplateKind::Item, "tactic"));
        assert!(!settings.delete_template(TemplateKind::Item, "tactic"));
        assert!(settings.template(TemplateKind::Item, "tactic").is_none());

        settings.reset();
        assert!(settings.template(TemplateKind::Item, "tactic").is_some());
    }

    #[test]
    fn test_template_kind_from_str() {
        assert_eq!("Item".parse::<TemplateKind>().unwrap(), TemplateKind::Item);
        assert_eq!("bundles".parse::<TemplateKind>().unwrap(), TemplateKind::Bundle);
        assert!("club".parse::<TemplateKind>().is_err());
    }

    #[test]
    fn test_import_from_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("exported.json");
        std::fs::write(&path, r#"{"lastSession": {"autoSaveEnabled": false}}"#).unwrap();

        let mut settings = Settings::default();
        settings.import_from_path(&path).unwrap();
        assert!(!settings.last_session.auto_save_enabled);
    }
}
