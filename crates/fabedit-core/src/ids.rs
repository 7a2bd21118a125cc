//! Item id conventions
//!
//! Each known item class has a fixed id prefix (`player_`, `club_`, ...) and
//! most have a naming pattern that validation checks ids against.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Entity;

/// Id prefixes for the known item classes
const PREFIXES: &[(&str, &str)] = &[
    ("player", "player_"),
    ("staff", "staff_"),
    ("team", "team_"),
    ("tactic", "tactic_"),
    ("location", "location_"),
    ("club", "club_"),
    ("feature_player", "feature_player_"),
    ("feature_staff", "feature_staff_"),
    ("feature_tactic", "feature_tactic_"),
    ("feature_tactic_slot", "feature_tactic_slot_"),
    ("bot_bonus", "bot_bonus_"),
    ("bot_bonus_deck", "bot_bonus_deck_"),
];

static PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("player", r"^player_\d+$"),
        ("staff", r"^staff_\d+$"),
        ("team", r"^team_\d+$"),
        ("club", r"^club_\d+$"),
        ("tactic", r"^tactic_\d+$"),
        ("location", r"(?i)^location_[a-z0-9_]+$"),
        ("feature_player", r"^feature_player_\d+$"),
        ("feature_staff", r"^feature_staff_\d+$"),
        ("feature_tactic", r"^feature_tactic_\d+$"),
        ("feature_tactic_slot", r"^feature_tactic_slot_\d+$"),
    ]
    .into_iter()
    .map(|(class, pattern)| {
        (
            class,
            Regex::new(pattern).expect("item id pattern should compile"),
        )
    })
    .collect()
});

/// Id prefix for an item class; unknown classes use `{class}_`
pub fn prefix_for(item_class: &str) -> String {
    PREFIXES
        .iter()
        .find(|(class, _)| *class == item_class)
        .map(|(_, prefix)| prefix.to_string())
        .unwrap_or_else(|| format!("{}_", item_class))
}

/// Naming pattern for an item class, if the class has one
pub fn pattern_for(item_class: &str) -> Option<&'static Regex> {
    PATTERNS
        .iter()
        .find(|(class, _)| *class == item_class)
        .map(|(_, re)| re)
}

/// Whether `item_id` follows its class's naming pattern
///
/// Classes without a pattern accept any id.
pub fn matches_format(item_class: &str, item_id: &str) -> bool {
    pattern_for(item_class).map_or(true, |re| re.is_match(item_id))
}

/// Suggest the next id for a class: prefix + (highest numeric suffix + 1)
///
/// Suffixes are read like `parseInt`: leading digits count, anything without
/// leading digits is ignored. Not a uniqueness guarantee.
pub fn next_item_id<'a, I>(item_class: &str, entities: I) -> String
where
    I: IntoIterator<Item = &'a Entity>,
{
    let prefix = prefix_for(item_class);
    let max = entities
        .into_iter()
        .filter_map(|e| e.item_id().strip_prefix(prefix.as_str()))
        .filter_map(leading_number)
        .max()
        .unwrap_or(0);
    format!("{}{}", prefix, max.saturating_add(1))
}

fn leading_number(suffix: &str) -> Option<u64> {
    let digits: &str = suffix
        .find(|c: char| !c.is_ascii_digit())
        .map_or(suffix, |end| &suffix[..end]);
    digits.parse().ok()
}
