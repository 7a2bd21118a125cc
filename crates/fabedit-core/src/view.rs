//! Filtered and sorted views over unassigned entities

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogStore;
use crate::models::Entity;

/// Sort order for entity views
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// By display name
    #[default]
    Name,
    /// By class tag
    Type,
    /// By item id
    Id,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "type" | "class" => Ok(SortKey::Type),
            "id" => Ok(SortKey::Id),
            other => Err(format!("Unknown sort key '{}' (expected name, type or id)", other)),
        }
    }
}

/// Transient filter state layered over the entity collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    /// Class tag to keep; `None` keeps all
    pub item_class: Option<String>,
    /// Case-insensitive substring matched against display name and id
    pub search: String,
    /// Tag to keep; `None` keeps all
    pub tag: Option<String>,
    pub sort: SortKey,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the type filter; `"all"` clears it
    pub fn with_type(mut self, item_class: impl Into<String>) -> Self {
        let item_class = item_class.into();
        self.item_class = (item_class != "all").then_some(item_class);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    /// Set the tag filter; `"all"` clears it
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        self.tag = (tag != "all").then_some(tag);
        self
    }

    pub fn sorted_by(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    fn matches(&self, entity: &Entity, needle: &str) -> bool {
        if let Some(class) = &self.item_class {
            if entity.item_class() != class {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !entity.tags().contains(&tag.as_str()) {
                return false;
            }
        }
        if needle.is_empty() {
            return true;
        }
        entity
            .display_name()
            .is_some_and(|name| name.to_lowercase().contains(needle))
            || entity.item_id().to_lowercase().contains(needle)
    }
}

impl CatalogStore {
    /// Unassigned entities after filtering, stably sorted
    pub fn filtered_sorted(&self, filters: &Filters) -> Vec<&Entity> {
        let needle = filters.search.to_lowercase();
        let mut result: Vec<&Entity> = self
            .unassigned()
            .into_iter()
            .filter(|e| filters.matches(e, &needle))
            .collect();

        result.sort_by(|a, b| match filters.sort {
            SortKey::Name => collate(a.display_name().unwrap_or(""), b.display_name().unwrap_or("")),
            SortKey::Type => collate(a.item_class(), b.item_class()),
            SortKey::Id => collate(a.item_id(), b.item_id()),
        });
        result
    }
}

/// Case-folded comparison with lowercase ordered before uppercase on ties,
/// close to how a browser's `localeCompare` orders plain identifiers
fn collate(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}
