//! Catalog error types

use thiserror::Error;

/// Errors raised by catalog loading and entity mutation
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The document has no `Catalog` array
    #[error("Invalid catalog document: missing or invalid Catalog array")]
    MissingCatalog,

    /// An element of the `Catalog` array is not a JSON object
    #[error("Invalid entity at Catalog[{index}]: {source}")]
    InvalidEntity {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A field patch assigns a value of the wrong type to `ItemId` or `ItemClass`
    #[error("Invalid value for {field}: expected {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    /// JSON text could not be parsed or produced
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_catalog_display() {
        let msg = CatalogError::MissingCatalog.to_string();
        assert!(msg.contains("Catalog array"));
    }

    #[test]
    fn test_invalid_entity_display() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = CatalogError::InvalidEntity { index: 3, source };
        assert!(err.to_string().starts_with("Invalid entity at Catalog[3]"));
    }

    #[test]
    fn test_invalid_field_display() {
        let err = CatalogError::InvalidField {
            field: "ItemId",
            expected: "a string",
        };
        assert_eq!(err.to_string(), "Invalid value for ItemId: expected a string");
    }
}
