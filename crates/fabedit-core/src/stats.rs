//! Bundle statistics
//!
//! Totals are read from each member's CustomData. Numeric fields are read
//! with leading-integer semantics (`"12abc"` counts as 12); anything that
//! does not start with a number counts as 0.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::CatalogStore;
use crate::display::parse_custom_data;

/// Totals for one bundle's resolved members
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleStats {
    pub item_count: usize,
    /// Sum of player and team power
    pub total_power: i64,
    /// Sum of team balance
    pub total_balance: i64,
    /// Average player level to one decimal; 0 with no players
    pub avg_level: f64,
    pub player_count: usize,
    pub staff_count: usize,
    pub team_count: usize,
    pub tactic_count: usize,
    pub location_count: usize,
}

/// Totals across every bundle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    pub bundle_count: usize,
    pub total_entities: usize,
    /// Resolved memberships summed over bundles
    pub assigned_entities: usize,
    /// Entities that are neither bundles nor counted as assigned
    pub unassigned_entities: usize,
    /// Average bundle power to one decimal; 0 with no bundles
    pub avg_power: f64,
    pub total_balance: i64,
}

/// Compute statistics for one bundle
///
/// Unknown bundles and unresolved member ids contribute nothing. Sums
/// saturate at the `i64` bounds.
pub fn bundle_stats(store: &CatalogStore, bundle_id: &str) -> BundleStats {
    let members = store.bundle_members(bundle_id);
    let mut stats = BundleStats {
        item_count: members.len(),
        ..BundleStats::default()
    };
    let mut total_level = 0i64;

    for entity in members {
        let data = entity.custom_data().and_then(parse_custom_data);
        let field = |key: &str| data.as_ref().and_then(|d| d.get(key)).map_or(0, leading_int);

        match entity.item_class() {
            "player" => {
                stats.player_count += 1;
                stats.total_power = stats.total_power.saturating_add(field("power"));
                total_level = total_level.saturating_add(field("level"));
            }
            "staff" => stats.staff_count += 1,
            "team" => {
                stats.team_count += 1;
                stats.total_power = stats.total_power.saturating_add(field("power"));
                stats.total_balance = stats.total_balance.saturating_add(field("balance"));
            }
            "tactic" => stats.tactic_count += 1,
            "location" => stats.location_count += 1,
            _ => {}
        }
    }

    if stats.player_count > 0 {
        stats.avg_level = one_decimal(total_level as f64 / stats.player_count as f64);
    }
    stats
}

/// Compute statistics across every bundle in the store
pub fn global_stats(store: &CatalogStore) -> GlobalStats {
    let bundles = store.bundles();
    let bundle_count = bundles.len();

    let mut assigned = 0;
    let mut total_power = 0i64;
    let mut total_balance = 0i64;
    for bundle in &bundles {
        let stats = bundle_stats(store, bundle.item_id());
        assigned += stats.item_count;
        total_power = total_power.saturating_add(stats.total_power);
        total_balance = total_balance.saturating_add(stats.total_balance);
    }

    let avg_power = if bundle_count > 0 {
        one_decimal(total_power as f64 / bundle_count as f64)
    } else {
        0.0
    };

    GlobalStats {
        bundle_count,
        total_entities: store.len(),
        assigned_entities: assigned,
        unassigned_entities: store.len().saturating_sub(assigned + bundle_count),
        avg_power,
        total_balance,
    }
}

/// Integer prefix of a number or numeric string; 0 otherwise
pub fn leading_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => parse_leading_int(s).unwrap_or(0),
        _ => 0,
    }
}

fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse::<i64>().ok().map(|n| sign * n)
}

fn one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> CatalogStore {
        let mut store = CatalogStore::new();
        store
            .load(json!({
                "Catalog": [
                    {"ItemId": "player_1", "ItemClass": "player", "CustomData": "{\"power\":\"10\",\"level\":\"3\"}"},
                    {"ItemId": "player_2", "ItemClass": "player", "CustomData": "{\"power\":5,\"level\":\"4x\"}"},
                    {"ItemId": "team_1", "ItemClass": "team", "CustomData": "{\"power\":\"20\",\"balance\":\"7\"}"},
                    {"ItemId": "staff_1", "ItemClass": "staff", "CustomData": "not json"},
                    {"ItemId": "tactic_1", "ItemClass": "tactic"},
                    {"ItemId": "location_a", "ItemClass": "location"},
                    {"ItemId": "player_3", "ItemClass": "player"},
                    {"ItemId": "club_1", "ItemClass": "club",
                     "Bundle": {"BundledItems": ["player_1", "player_2", "team_1", "staff_1", "tactic_1", "location_a", "ghost"]}},
                    {"ItemId": "club_2", "ItemClass": "club", "Bundle": {"BundledItems": []}}
                ]
            }))
            .unwrap();
        store
    }

    #[test]
    fn test_bundle_stats() {
        let stats = bundle_stats(&store(), "club_1");
        assert_eq!(stats.item_count, 6);
        assert_eq!(stats.total_power, 35);
        assert_eq!(stats.total_balance, 7);
        assert_eq!(stats.avg_level, 3.5);
        assert_eq!(stats.player_count, 2);
        assert_eq!(stats.staff_count, 1);
        assert_eq!(stats.team_count, 1);
        assert_eq!(stats.tactic_count, 1);
        assert_eq!(stats.location_count, 1);
    }

    #[test]
    fn test_sums_saturate() {
        let mut store = CatalogStore::new();
        store
            .load(json!({
                "Catalog": [
                    {"ItemId": "player_1", "ItemClass": "player",
                     "CustomData": "{\"power\":\"9223372036854775807\",\"level\":\"9223372036854775807\"}"},
                    {"ItemId": "player_2", "ItemClass": "player", "CustomData": "{\"power\":\"1\",\"level\":1}"},
                    {"ItemId": "team_1", "ItemClass": "team",
                     "CustomData": "{\"balance\":\"-9223372036854775807\"}"},
                    {"ItemId": "team_2", "ItemClass": "team", "CustomData": "{\"balance\":-5}"},
                    {"ItemId": "club_1", "ItemClass": "club",
                     "Bundle": {"BundledItems": ["player_1", "player_2", "team_1", "team_2"]}},
                    {"ItemId": "club_2", "ItemClass": "club", "Bundle": {"BundledItems": ["player_1"]}}
                ]
            }))
            .unwrap();

        let stats = bundle_stats(&store, "club_1");
        assert_eq!(stats.total_power, i64::MAX);
        assert_eq!(stats.total_balance, i64::MIN);
        assert!(stats.avg_level > 0.0);

        let global = global_stats(&store);
        assert_eq!(global.total_balance, i64::MIN);
        assert_eq!(global.avg_power, one_decimal(i64::MAX as f64 / 2.0));
    }

    #[test]
    fn test_empty_and_unknown_bundle() {
        let store = store();
        assert_eq!(bundle_stats(&store, "club_2"), BundleStats::default());
        assert_eq!(bundle_stats(&store, "nope"), BundleStats::default());
    }

    #[test]
    fn test_global_stats() {
        let stats = global_stats(&store());
        assert_eq!(stats.bundle_count, 2);
        assert_eq!(stats.total_entities, 9);
        assert_eq!(stats.assigned_entities, 6);
        assert_eq!(stats.unassigned_entities, 1);
        assert_eq!(stats.avg_power, 17.5);
        assert_eq!(stats.total_balance, 7);
    }

    #[test]
    fn test_leading_int() {
        assert_eq!(leading_int(&json!("42")), 42);
        assert_eq!(leading_int(&json!(" -7 apples")), -7);
        assert_eq!(leading_int(&json!("abc")), 0);
        assert_eq!(leading_int(&json!(9.8)), 9);
        assert_eq!(leading_int(&json!(true)), 0);
        assert_eq!(leading_int(&Value::Null), 0);
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let value = serde_json::to_value(global_stats(&store())).unwrap();
        assert!(value.get("bundleCount").is_some());
        assert!(value.get("unassignedEntities").is_some());
    }
}
