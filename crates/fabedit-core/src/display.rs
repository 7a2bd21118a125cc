//! CustomData decoding for display
//!
//! CustomData is an opaque JSON-encoded string as far as the store is
//! concerned. This module turns it into a [`DisplayInfo`] summary through a
//! [`DecoderRegistry`] of per-class [`CustomDataDecoder`]s, so adding a new
//! item class never touches the store. Malformed payloads decode to nothing.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Entity;

/// Parse a CustomData string; empty or malformed input gives `None`
pub fn parse_custom_data(raw: &str) -> Option<Value> {
    if raw.is_empty() {
        return None;
    }
    serde_json::from_str(raw).ok()
}

/// Re-indent a CustomData string for display
pub fn format_custom_data(raw: &str) -> Option<String> {
    let data = parse_custom_data(raw)?;
    serde_json::to_string_pretty(&data).ok()
}

/// Short marker for an item class
pub fn type_icon(item_class: &str) -> &'static str {
    match item_class {
        "player" => "⚽",
        "staff" => "👔",
        "team" => "🏆",
        "tactic" => "📋",
        "location" => "🏟️",
        "club" => "🏛️",
        "feature_player" | "feature_staff" | "feature_tactic" => "⭐",
        "feature_tactic_slot" => "🎯",
        _ => "📦",
    }
}

/// One tactic slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotInfo {
    /// Active positions, e.g. `DEF/MID`
    pub pos: String,
    pub has_feature: bool,
}

/// Decoded summary of an entity's CustomData
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_limit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Active positions, e.g. `GK/DEF`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_marks: Option<String>,
    #[serde(default)]
    pub has_tactics: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slots: Option<Vec<SlotInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tactic_styles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directions: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgradeable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus_marks: Option<String>,
}

impl DisplayInfo {
    /// `key: value` pairs for the fields that are set, in display order
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        let mut push = |label: &'static str, value: Option<String>| {
            if let Some(v) = value {
                out.push((label, v));
            }
        };
        push("power", self.power.clone());
        push("power limit", self.power_limit.clone());
        push("level", self.level.clone());
        push("max level", self.max_level.clone());
        push("balance", self.balance.clone());
        push("salary", self.salary.clone());
        push("style", self.style.clone());
        push("position", self.position.clone());
        push("tags", self.player_tags.as_ref().map(|t| t.join(", ")));
        push("marks", self.active_marks.clone());
        push("tactics", self.has_tactics.then(|| "linked".to_string()));
        push(
            "slots",
            self.slots.as_ref().map(|slots| {
                slots
                    .iter()
                    .map(|s| {
                        if s.has_feature {
                            format!("{}*", s.pos)
                        } else {
                            s.pos.clone()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            }),
        );
        push("styles", self.tactic_styles.as_ref().map(|s| s.join(", ")));
        push(
            "directions",
            self.directions
                .as_ref()
                .map(|d| d.iter().map(value_text).collect::<Vec<_>>().join(", ")),
        );
        push("upgradeable", self.upgradeable.map(|u| u.to_string()));
        push("action duration", self.action_duration.clone());
        push("requirements", self.requirements.clone());
        push("bonus marks", self.bonus_marks.clone());
        out
    }
}

/// Decodes the CustomData of one item class into a [`DisplayInfo`]
pub trait CustomDataDecoder {
    /// Class tag this decoder handles
    fn item_class(&self) -> &str;

    /// Fill `info` from the parsed payload
    fn decode(&self, data: &Value, info: &mut DisplayInfo);
}

/// Fields shared by every class: stats and positions
struct CommonDecoder;

impl CommonDecoder {
    fn decode(&self, data: &Value, info: &mut DisplayInfo) {
        info.power = text_field(data, "power");
        info.power_limit = text_field(data, "power_limit");
        info.level = text_field(data, "level");
        info.max_level = text_field(data, "max_level");
        info.balance = text_field(data, "balance");
        info.salary = text_field(data, "salary");
        info.style = text_field(data, "style");
        info.position = positions(data);
    }
}

const PLAYER_TAGS: &[&str] = &[
    "tag_aggressive",
    "tag_speed",
    "tag_creative",
    "tag_strategist",
    "tag_cold_blooded",
];

pub struct PlayerDecoder;

impl CustomDataDecoder for PlayerDecoder {
    fn item_class(&self) -> &str {
        "player"
    }

    fn decode(&self, data: &Value, info: &mut DisplayInfo) {
        let tags: Vec<String> = PLAYER_TAGS
            .iter()
            .filter(|key| match data.get(**key) {
                Some(Value::Bool(flag)) => *flag,
                Some(Value::String(s)) => s == "true",
                _ => false,
            })
            .map(|key| key.trim_start_matches("tag_").to_string())
            .collect();
        info.player_tags = (!tags.is_empty()).then_some(tags);
    }
}

pub struct StaffDecoder;

impl CustomDataDecoder for StaffDecoder {
    fn item_class(&self) -> &str {
        "staff"
    }

    fn decode(&self, data: &Value, info: &mut DisplayInfo) {
        if let Some(marks) = data.get("marks").and_then(Value::as_array) {
            let active: Vec<String> = marks
                .iter()
                .filter(|m| m.get("status").and_then(Value::as_str) == Some("active"))
                .map(|m| m.get("type").map(value_text).unwrap_or_default())
                .collect();
            if !active.is_empty() {
                info.active_marks = Some(active.join("/"));
            }
        }
        info.has_tactics = data
            .pointer("/special/tactics")
            .and_then(Value::as_array)
            .is_some_and(|tactics| !tactics.is_empty());
    }
}

const TACTIC_STYLES: &[(&str, &str)] = &[
    ("style_aggressive", "aggressive"),
    ("style_free_attack", "free_attack"),
    ("style_total_defence", "total_defence"),
];

pub struct TacticDecoder;

impl CustomDataDecoder for TacticDecoder {
    fn item_class(&self) -> &str {
        "tactic"
    }

    fn decode(&self, data: &Value, info: &mut DisplayInfo) {
        if let Some(slots) = data.get("slots").and_then(Value::as_array) {
            info.slots = Some(slots.iter().map(tactic_slot).collect());
        }
        let styles: Vec<String> = TACTIC_STYLES
            .iter()
            .filter(|(key, _)| data.get(*key) == Some(&Value::Bool(true)))
            .map(|(_, name)| name.to_string())
            .collect();
        info.tactic_styles = (!styles.is_empty()).then_some(styles);
    }
}

pub struct LocationDecoder;

impl CustomDataDecoder for LocationDecoder {
    fn item_class(&self) -> &str {
        "location"
    }

    fn decode(&self, data: &Value, info: &mut DisplayInfo) {
        info.directions = data.get("directions").and_then(Value::as_array).cloned();
        info.upgradeable = Some(data.get("upgradeable") == Some(&Value::Bool(true)));
        info.action_duration = data
            .get("action_duration")
            .filter(|v| is_truthy(v))
            .map(value_text);
        info.requirements = data
            .get("requirements")
            .and_then(Value::as_array)
            .and_then(|r| format_requirements(r));
        info.bonus_marks = data
            .get("bonus_marks")
            .and_then(Value::as_object)
            .and_then(format_bonus_marks);
    }
}

/// Decoders keyed by class tag
pub struct DecoderRegistry {
    common: CommonDecoder,
    decoders: HashMap<String, Box<dyn CustomDataDecoder>>,
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(PlayerDecoder));
        registry.register(Box::new(StaffDecoder));
        registry.register(Box::new(TacticDecoder));
        registry.register(Box::new(LocationDecoder));
        registry
    }
}

impl DecoderRegistry {
    /// Registry with the built-in decoders
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that only decodes the common fields
    pub fn empty() -> Self {
        Self {
            common: CommonDecoder,
            decoders: HashMap::new(),
        }
    }

    /// Add or replace the decoder for its class
    pub fn register(&mut self, decoder: Box<dyn CustomDataDecoder>) {
        self.decoders
            .insert(decoder.item_class().to_string(), decoder);
    }

    pub fn has_decoder(&self, item_class: &str) -> bool {
        self.decoders.contains_key(item_class)
    }

    /// Decode an entity's CustomData; empty when there is nothing to decode
    pub fn decode(&self, entity: &Entity) -> DisplayInfo {
        let mut info = DisplayInfo::default();
        let Some(data) = entity.custom_data().and_then(parse_custom_data) else {
            return info;
        };
        self.common.decode(&data, &mut info);
        if let Some(decoder) = self.decoders.get(entity.item_class()) {
            decoder.decode(&data, &mut info);
        }
        info
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn text_field(data: &Value, key: &str) -> Option<String> {
    data.get(key).filter(|v| !v.is_null()).map(value_text)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn position_active(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(true)) => true,
        Some(v) => v.get("state") == Some(&Value::Bool(true)),
        None => false,
    }
}

const POSITION_KEYS: &[&str] = &["gk", "def", "mid", "att"];

fn positions(data: &Value) -> Option<String> {
    let active: Vec<String> = POSITION_KEYS
        .iter()
        .filter(|key| position_active(data.get(**key)))
        .map(|key| key.to_uppercase())
        .collect();
    (!active.is_empty()).then(|| active.join("/"))
}

fn tactic_slot(slot: &Value) -> SlotInfo {
    let mut info = SlotInfo::default();
    let mut active = Vec::new();
    for key in POSITION_KEYS {
        let pos = slot.get(*key);
        if position_active(pos) {
            active.push(key.to_uppercase());
            if pos.and_then(|p| p.get("feature_id")).is_some_and(is_truthy) {
                info.has_feature = true;
            }
        }
    }
    info.pos = active.join("/");
    info
}

fn format_mark(mark: &Value) -> String {
    let strict = mark.get("strict").is_some_and(is_truthy);
    let kind = mark.get("type").map(value_text).unwrap_or_default();
    format!("{}{}", if strict { "[!]" } else { "[*]" }, kind)
}

fn format_group(group: &Value) -> Option<String> {
    let marks = group.get("marks").and_then(Value::as_array)?;
    match marks.as_slice() {
        [] => None,
        [single] => Some(format_mark(single)),
        many => Some(format!(
            "({})",
            many.iter().map(format_mark).collect::<Vec<_>>().join(" | ")
        )),
    }
}

/// Groups joined with `+`; identical groups collapse to `group ×N`
fn format_variant(variant: &Value) -> Option<String> {
    let groups = variant.get("groups").and_then(Value::as_array)?;
    let rendered: Vec<String> = groups.iter().filter_map(format_group).collect();
    if rendered.is_empty() {
        return None;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for group in &rendered {
        *counts.entry(group.as_str()).or_insert(0) += 1;
    }

    let mut seen = HashSet::new();
    let parts: Vec<String> = rendered
        .iter()
        .filter(|group| seen.insert(group.as_str()))
        .map(|group| match counts[group.as_str()] {
            1 => group.clone(),
            n => format!("{} ×{}", group, n),
        })
        .collect();
    Some(parts.join(" + "))
}

/// Requirement variants joined with `//`
pub fn format_requirements(requirements: &[Value]) -> Option<String> {
    let variants: Vec<String> = requirements.iter().filter_map(format_variant).collect();
    (!variants.is_empty()).then(|| variants.join(" // "))
}

/// Bonus marks as `+type` or `+type×N`
pub fn format_bonus_marks(marks: &serde_json::Map<String, Value>) -> Option<String> {
    let parts: Vec<String> = marks
        .iter()
        .map(|(kind, count)| {
            let many = match count {
                Value::Number(n) => n.as_f64().is_some_and(|f| f > 1.0),
                Value::String(s) => s.trim().parse::<f64>().is_ok_and(|f| f > 1.0),
                _ => false,
            };
            if many {
                format!("+{}×{}", kind, value_text(count))
            } else {
                format!("+{}", kind)
            }
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(class: &str, data: Value) -> Entity {
        let mut entity = Entity::new(format!("{}_1", class), class);
        entity
            .fields
            .insert("CustomData".into(), Value::String(data.to_string()));
        entity
    }

    #[test]
    fn test_parse_custom_data_degrades() {
        assert_eq!(parse_custom_data(""), None);
        assert_eq!(parse_custom_data("{oops"), None);
        assert_eq!(parse_custom_data("{\"a\":1}"), Some(json!({"a": 1})));
    }

    #[test]
    fn test_format_custom_data() {
        assert_eq!(
            format_custom_data("{\"a\":1}").as_deref(),
            Some("{\n  \"a\": 1\n}")
        );
        assert_eq!(format_custom_data("nope"), None);
    }

    #[test]
    fn test_player_decoding() {
        let registry = DecoderRegistry::new();
        let info = registry.decode(&entity(
            "player",
            json!({"power": "12", "level": 3, "gk": false, "def": {"state": true}, "mid": true,
                   "tag_speed": true, "tag_creative": "true", "tag_aggressive": false}),
        ));
        assert_eq!(info.power.as_deref(), Some("12"));
        assert_eq!(info.level.as_deref(), Some("3"));
        assert_eq!(info.position.as_deref(), Some("DEF/MID"));
        assert_eq!(
            info.player_tags,
            Some(vec!["speed".to_string(), "creative".to_string()])
        );
    }

    #[test]
    fn test_staff_decoding() {
        let info = DecoderRegistry::new().decode(&entity(
            "staff",
            json!({"marks": [
                {"type": "fitness", "status": "active"},
                {"type": "morale", "status": "idle"},
                {"type": "focus", "status": "active"}
            ], "special": {"tactics": ["tactic_1"]}}),
        ));
        assert_eq!(info.active_marks.as_deref(), Some("fitness/focus"));
        assert!(info.has_tactics);
    }

    #[test]
    fn test_tactic_decoding() {
        let info = DecoderRegistry::new().decode(&entity(
            "tactic",
            json!({"slots": [
                {"gk": true},
                {"def": {"state": true, "feature_id": "feature_tactic_slot_2"}, "mid": {"state": true}},
                {}
            ], "style_free_attack": true, "style_aggressive": "yes"}),
        ));
        assert_eq!(
            info.slots,
            Some(vec![
                SlotInfo { pos: "GK".into(), has_feature: false },
                SlotInfo { pos: "DEF/MID".into(), has_feature: true },
                SlotInfo { pos: "".into(), has_feature: false },
            ])
        );
        assert_eq!(info.tactic_styles, Some(vec!["free_attack".to_string()]));
    }

    #[test]
    fn test_location_decoding() {
        let info = DecoderRegistry::new().decode(&entity(
            "location",
            json!({
                "directions": ["north", "east"],
                "upgradeable": true,
                "action_duration": 0,
                "requirements": [
                    {"groups": [
                        {"marks": [{"type": "speed", "strict": true}]},
                        {"marks": [{"type": "speed", "strict": true}]},
                        {"marks": [{"type": "power"}, {"type": "focus", "strict": false}]}
                    ]},
                    {"groups": []},
                    {"groups": [{"marks": [{"type": "luck"}]}]}
                ],
                "bonus_marks": {"speed": 2, "luck": 1}
            }),
        ));
        assert_eq!(info.directions, Some(vec![json!("north"), json!("east")]));
        assert_eq!(info.upgradeable, Some(true));
        assert_eq!(info.action_duration, None);
        assert_eq!(
            info.requirements.as_deref(),
            Some("[!]speed ×2 + ([*]power | [*]focus) // [*]luck")
        );
        assert_eq!(info.bonus_marks.as_deref(), Some("+speed×2 +luck"));
    }

    #[test]
    fn test_class_decoders_do_not_leak() {
        // player-only tags are ignored on a team
        let info = DecoderRegistry::new().decode(&entity("team", json!({"tag_speed": true, "balance": 4})));
        assert_eq!(info.player_tags, None);
        assert_eq!(info.balance.as_deref(), Some("4"));
    }

    #[test]
    fn test_malformed_custom_data_decodes_empty() {
        let mut broken = Entity::new("player_1", "player");
        broken
            .fields
            .insert("CustomData".into(), Value::String("{bad".into()));
        assert_eq!(DecoderRegistry::new().decode(&broken), DisplayInfo::default());
    }

    struct ClubDecoder;

    impl CustomDataDecoder for ClubDecoder {
        fn item_class(&self) -> &str {
            "club"
        }

        fn decode(&self, data: &Value, info: &mut DisplayInfo) {
            info.style = data.get("motto").map(value_text);
        }
    }

    #[test]
    fn test_register_custom_decoder() {
        let mut registry = DecoderRegistry::empty();
        assert!(!registry.has_decoder("club"));
        registry.register(Box::new(ClubDecoder));
        assert!(registry.has_decoder("club"));

        let info = registry.decode(&entity("club", json!({"motto": "Onward"})));
        assert_eq!(info.style.as_deref(), Some("Onward"));
    }

    #[test]
    fn test_summary_lists_set_fields() {
        let info = DisplayInfo {
            power: Some("5".into()),
            has_tactics: true,
            ..DisplayInfo::default()
        };
        assert_eq!(
            info.summary(),
            vec![("power", "5".to_string()), ("tactics", "linked".to_string())]
        );
    }

    #[test]
    fn test_type_icon_fallback() {
        assert_eq!(type_icon("player"), "⚽");
        assert_eq!(type_icon("gadget"), "📦");
    }
}
