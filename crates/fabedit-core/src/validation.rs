//! Catalog validation
//!
//! A fixed, ordered list of rules runs against every entity on each pass.
//! Rules are plain functions of the entity and a [`RuleContext`] built once
//! per pass from the whole collection. Findings come back as [`Issue`] data;
//! nothing here returns an error.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::CatalogStore;
use crate::ids;
use crate::models::Entity;

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// Rule identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    JsonSyntax,
    UniqueItemid,
    EmptyDisplayName,
    EmptyBundle,
    BundleItemNotFound,
    InvalidItemidFormat,
    NestedStringifiedJson,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::JsonSyntax => "json_syntax",
            RuleId::UniqueItemid => "unique_itemid",
            RuleId::EmptyDisplayName => "empty_display_name",
            RuleId::EmptyBundle => "empty_bundle",
            RuleId::BundleItemNotFound => "bundle_item_not_found",
            RuleId::InvalidItemidFormat => "invalid_itemid_format",
            RuleId::NestedStringifiedJson => "nested_stringified_json",
        }
    }

    /// Whether [`crate::Session::auto_fix`] can resolve issues of this rule
    pub fn can_auto_fix(&self) -> bool {
        matches!(self, RuleId::EmptyDisplayName)
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts about the whole collection shared by every rule in a pass
pub struct RuleContext<'a> {
    id_counts: HashMap<&'a str, usize>,
}

impl<'a> RuleContext<'a> {
    pub fn new(entities: &'a [Entity]) -> Self {
        let mut id_counts = HashMap::new();
        for entity in entities {
            *id_counts.entry(entity.item_id()).or_insert(0) += 1;
        }
        Self { id_counts }
    }

    fn count(&self, item_id: &str) -> usize {
        self.id_counts.get(item_id).copied().unwrap_or(0)
    }

    fn contains(&self, item_id: &str) -> bool {
        self.id_counts.contains_key(item_id)
    }
}

type Check = fn(&Entity, &RuleContext<'_>) -> Option<String>;

struct Rule {
    id: RuleId,
    severity: Severity,
    check: Check,
}

const RULES: &[Rule] = &[
    Rule {
        id: RuleId::JsonSyntax,
        severity: Severity::Error,
        check: check_json_syntax,
    },
    Rule {
        id: RuleId::UniqueItemid,
        severity: Severity::Error,
        check: check_unique_itemid,
    },
    Rule {
        id: RuleId::EmptyDisplayName,
        severity: Severity::Warning,
        check: check_empty_display_name,
    },
    Rule {
        id: RuleId::EmptyBundle,
        severity: Severity::Warning,
        check: check_empty_bundle,
    },
    Rule {
        id: RuleId::BundleItemNotFound,
        severity: Severity::Error,
        check: check_bundle_item_not_found,
    },
    Rule {
        id: RuleId::InvalidItemidFormat,
        severity: Severity::Warning,
        check: check_itemid_format,
    },
    Rule {
        id: RuleId::NestedStringifiedJson,
        severity: Severity::Warning,
        check: check_nested_stringified_json,
    },
];

/// CustomData that counts as present: non-null and not an empty string
fn present_custom_data(item: &Entity) -> Option<&Value> {
    item.custom_data_value()
        .filter(|value| value.as_str() != Some(""))
}

fn check_json_syntax(item: &Entity, _: &RuleContext<'_>) -> Option<String> {
    match present_custom_data(item)? {
        Value::String(encoded) => serde_json::from_str::<Value>(encoded)
            .err()
            .map(|e| format!("Invalid JSON: {}", e)),
        _ => Some("Invalid JSON: CustomData must be a JSON-encoded string".to_string()),
    }
}

fn check_unique_itemid(item: &Entity, ctx: &RuleContext<'_>) -> Option<String> {
    (ctx.count(item.item_id()) > 1).then(|| format!("Duplicate ItemId: {}", item.item_id()))
}

fn check_empty_display_name(item: &Entity, _: &RuleContext<'_>) -> Option<String> {
    let blank = item
        .display_name()
        .map_or(true, |name| name.trim().is_empty());
    blank.then(|| "DisplayName is empty".to_string())
}

fn check_empty_bundle(item: &Entity, _: &RuleContext<'_>) -> Option<String> {
    if !item.has_bundle_descriptor() {
        return None;
    }
    let empty = item.bundled_items().map_or(true, Vec::is_empty);
    empty.then(|| "Bundle has no items".to_string())
}

fn check_bundle_item_not_found(item: &Entity, ctx: &RuleContext<'_>) -> Option<String> {
    let missing: Vec<&str> = item
        .member_ids()
        .into_iter()
        .filter(|id| !ctx.contains(id))
        .collect();
    (!missing.is_empty()).then(|| format!("Missing items: {}", missing.join(", ")))
}

fn check_itemid_format(item: &Entity, _: &RuleContext<'_>) -> Option<String> {
    (!ids::matches_format(item.item_class(), item.item_id())).then(|| {
        format!(
            "ItemId doesn't match standard format for {}",
            item.item_class()
        )
    })
}

fn check_nested_stringified_json(item: &Entity, _: &RuleContext<'_>) -> Option<String> {
    // Unparseable payloads belong to json_syntax
    let data: Value = serde_json::from_str(item.custom_data().filter(|s| !s.is_empty())?).ok()?;

    let entries: Vec<(String, &Value)> = match &data {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(values) => values
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => return None,
    };

    let nested: Vec<String> = entries
        .into_iter()
        .filter(|(_, value)| value.as_str().is_some_and(is_encoded_container))
        .map(|(key, _)| key)
        .collect();

    (!nested.is_empty()).then(|| format!("Double-stringified JSON in: {}", nested.join(", ")))
}

/// Length is measured in UTF-16 code units, like the catalog's JavaScript
/// consumers
fn is_encoded_container(value: &str) -> bool {
    if value.encode_utf16().count() <= 2 {
        return false;
    }
    let trimmed = value.trim();
    let bracketed = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    bracketed && serde_json::from_str::<Value>(trimmed).is_ok()
}

/// One validation finding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    /// `{itemId}-{ruleId}`
    pub id: String,
    pub rule: RuleId,
    pub severity: Severity,
    pub message: String,
    /// Id of the offending entity
    pub item_id: String,
    /// Index of the offending entity at validation time
    pub position: usize,
    pub can_auto_fix: bool,
}

/// Run every rule against one entity
pub fn validate_item(item: &Entity, position: usize, ctx: &RuleContext<'_>) -> Vec<Issue> {
    RULES
        .iter()
        .filter_map(|rule| {
            (rule.check)(item, ctx).map(|message| Issue {
                id: format!("{}-{}", item.item_id(), rule.id),
                rule: rule.id,
                severity: rule.severity,
                message,
                item_id: item.item_id().to_string(),
                position,
                can_auto_fix: rule.id.can_auto_fix(),
            })
        })
        .collect()
}

/// Validate a whole collection; errors sort before warnings
pub fn validate_entities(entities: &[Entity]) -> ValidationReport {
    let ctx = RuleContext::new(entities);
    let mut issues: Vec<Issue> = entities
        .iter()
        .enumerate()
        .flat_map(|(position, item)| validate_item(item, position, &ctx))
        .collect();
    issues.sort_by_key(|issue| issue.severity != Severity::Error);
    ValidationReport { issues }
}

/// Validate everything in the store
pub fn validate(store: &CatalogStore) -> ValidationReport {
    validate_entities(store.entities())
}

/// Issues for a single entity, checked against the whole store
pub fn issues_for(store: &CatalogStore, item_id: &str) -> Vec<Issue> {
    let ctx = RuleContext::new(store.entities());
    match store.position_of(item_id) {
        Some(position) => validate_item(&store.entities()[position], position, &ctx),
        None => Vec::new(),
    }
}

/// Result of a validation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn for_item<'a>(&'a self, item_id: &'a str) -> impl Iterator<Item = &'a Issue> + 'a {
        self.issues.iter().filter(move |i| i.item_id == item_id)
    }

    pub fn has_errors(&self, item_id: &str) -> bool {
        self.for_item(item_id).any(|i| i.severity == Severity::Error)
    }

    pub fn has_warnings(&self, item_id: &str) -> bool {
        self.for_item(item_id)
            .any(|i| i.severity == Severity::Warning)
    }

    /// Items touched by at least one issue, deduplicated
    pub fn affected_items(&self) -> usize {
        self.issues
            .iter()
            .map(|i| i.item_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(value: Value) -> Entity {
        serde_json::from_value(value).unwrap()
    }

    fn rules_fired(issues: &[Issue]) -> Vec<RuleId> {
        issues.iter().map(|i| i.rule).collect()
    }

    fn single(value: Value) -> Vec<Issue> {
        validate_entities(&[entity(value)]).issues
    }

    #[test]
    fn test_clean_entity() {
        let issues = single(json!({
            "ItemId": "player_1", "ItemClass": "player", "DisplayName": "Ann",
            "CustomData": "{\"power\":\"5\"}"
        }));
        assert!(issues.is_empty());
    }

    #[test]
    fn test_duplicate_ids_flag_both() {
        let entities = vec![
            entity(json!({"ItemId": "player_1", "ItemClass": "player", "DisplayName": "A"})),
            entity(json!({"ItemId": "player_1", "ItemClass": "player", "DisplayName": "B"})),
        ];
        let report = validate_entities(&entities);
        assert_eq!(report.error_count(), 2);
        assert!(report
            .issues
            .iter()
            .all(|i| i.rule == RuleId::UniqueItemid && i.message == "Duplicate ItemId: player_1"));
        assert_eq!(report.issues[0].position, 0);
        assert_eq!(report.issues[1].position, 1);
        assert_eq!(report.issues[0].id, "player_1-unique_itemid");
    }

    #[test]
    fn test_bad_json_short_circuits_nested_check() {
        let issues = single(json!({
            "ItemId": "player_1", "ItemClass": "player", "DisplayName": "Ann",
            "CustomData": "{bad json"
        }));
        assert_eq!(rules_fired(&issues), vec![RuleId::JsonSyntax]);
        assert!(issues[0].message.starts_with("Invalid JSON: "));
        assert_eq!(issues[0].severity, Severity::Error);
    }

    #[test]
    fn test_non_string_custom_data() {
        let issues = single(json!({
            "ItemId": "player_1", "ItemClass": "player", "DisplayName": "Ann",
            "CustomData": {"power": 1}
        }));
        assert_eq!(rules_fired(&issues), vec![RuleId::JsonSyntax]);
    }

    #[test]
    fn test_empty_custom_data_is_absent() {
        let issues = single(json!({
            "ItemId": "player_1", "ItemClass": "player", "DisplayName": "Ann", "CustomData": ""
        }));
        assert!(issues.is_empty());
    }

    #[test]
    fn test_empty_display_name() {
        let blank = single(json!({"ItemId": "team_1", "ItemClass": "team", "DisplayName": "   "}));
        assert_eq!(rules_fired(&blank), vec![RuleId::EmptyDisplayName]);
        assert!(blank[0].can_auto_fix);
        assert_eq!(blank[0].message, "DisplayName is empty");

        let missing = single(json!({"ItemId": "team_1", "ItemClass": "team"}));
        assert_eq!(rules_fired(&missing), vec![RuleId::EmptyDisplayName]);
    }

    #[test]
    fn test_empty_bundle() {
        let issues = single(json!({
            "ItemId": "club_1", "ItemClass": "club", "DisplayName": "C",
            "Bundle": {"BundledItems": []}
        }));
        assert_eq!(rules_fired(&issues), vec![RuleId::EmptyBundle]);
        assert_eq!(issues[0].severity, Severity::Warning);

        let no_list = single(json!({
            "ItemId": "club_1", "ItemClass": "club", "DisplayName": "C",
            "Bundle": {"BundledResultTables": []}
        }));
        assert_eq!(rules_fired(&no_list), vec![RuleId::EmptyBundle]);
    }

    #[test]
    fn test_missing_bundle_member() {
        let entities = vec![
            entity(json!({"ItemId": "club_1", "ItemClass": "club", "DisplayName": "C",
                          "Bundle": {"BundledItems": ["player_1", "player_2"]}})),
            entity(json!({"ItemId": "player_1", "ItemClass": "player", "DisplayName": "P"})),
        ];
        let report = validate_entities(&entities);
        assert_eq!(report.issues.len(), 1);
        let issue = &report.issues[0];
        assert_eq!(issue.rule, RuleId::BundleItemNotFound);
        assert_eq!(issue.item_id, "club_1");
        assert_eq!(issue.message, "Missing items: player_2");
        assert!(!issue.can_auto_fix);
    }

    #[test]
    fn test_itemid_format() {
        let issues = single(json!({"ItemId": "striker", "ItemClass": "player", "DisplayName": "S"}));
        assert_eq!(rules_fired(&issues), vec![RuleId::InvalidItemidFormat]);
        assert_eq!(
            issues[0].message,
            "ItemId doesn't match standard format for player"
        );

        let exempt = single(json!({"ItemId": "whatever", "ItemClass": "bot_bonus", "DisplayName": "B"}));
        assert!(exempt.is_empty());
    }

    #[test]
    fn test_nested_stringified_json() {
        let issues = single(json!({
            "ItemId": "tactic_1", "ItemClass": "tactic", "DisplayName": "T",
            "CustomData": "{\"slots\":\"[1,2]\",\"meta\":\" {\\\"a\\\":1} \",\"style\":\"BALANCED\",\"bad\":\"{nope}\",\"tiny\":\"{}\"}"
        }));
        assert_eq!(rules_fired(&issues), vec![RuleId::NestedStringifiedJson]);
        assert_eq!(issues[0].message, "Double-stringified JSON in: slots, meta");
    }

    #[test]
    fn test_encoded_container_length_in_utf16_units() {
        assert!(!is_encoded_container("[]"));
        assert!(is_encoded_container("[1]"));
        // one astral char is two UTF-16 units, so this clears the length check
        assert_eq!("[\u{1F600}".encode_utf16().count(), 3);
        assert!(is_encoded_container("[\"\u{1F600}\"]"));
    }

    #[test]
    fn test_unclassed_item_has_no_format_rule() {
        let issues = single(json!({"ItemId": "misc_1", "ItemClass": null, "DisplayName": "M"}));
        assert!(issues.is_empty());

        let issues = single(json!({"ItemId": "x_1", "DisplayName": "No class"}));
        assert!(issues.is_empty());
    }

    #[test]
    fn test_errors_sort_first_and_stable() {
        let entities = vec![
            entity(json!({"ItemId": "team_1", "ItemClass": "team"})),
            entity(json!({"ItemId": "team_2", "ItemClass": "team", "DisplayName": "T",
                          "CustomData": "{oops"})),
            entity(json!({"ItemId": "team_x", "ItemClass": "team", "DisplayName": "X"})),
        ];
        let report = validate_entities(&entities);
        let ids: Vec<_> = report.issues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "team_2-json_syntax",
                "team_1-empty_display_name",
                "team_x-invalid_itemid_format"
            ]
        );
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.warning_count(), 2);
        assert!(report.has_errors("team_2"));
        assert!(!report.has_errors("team_1"));
        assert!(report.has_warnings("team_1"));
        assert_eq!(report.affected_items(), 3);
    }

    #[test]
    fn test_issues_for_uses_whole_store() {
        let mut store = CatalogStore::new();
        store
            .load(json!({"Catalog": [
                {"ItemId": "staff_1", "ItemClass": "staff", "DisplayName": "A"},
                {"ItemId": "staff_1", "ItemClass": "staff", "DisplayName": "B"}
            ]}))
            .unwrap();
        let issues = issues_for(&store, "staff_1");
        assert_eq!(rules_fired(&issues), vec![RuleId::UniqueItemid]);
        assert!(issues_for(&store, "missing").is_empty());
    }
}
