//! Storage trait definitions and the equality filter.

use crate::error::Result;
use serde::{Serialize, de::DeserializeOwned};

/// Equality match on one top-level field of a stored record.
#[derive(Debug, Clone)]
pub struct Filter {
    /// Field name to filter on
    pub field: String,
    /// Value the field must equal
    pub value: serde_json::Value,
}

impl Filter {
    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Serialize) -> Self {
        Self {
            field: field.into(),
            value: serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Check if a record matches this filter. A missing field matches null.
    pub fn matches(&self, record: &serde_json::Value) -> bool {
        match record.get(&self.field) {
            Some(v) => *v == self.value,
            None => self.value.is_null(),
        }
    }
}

/// Trait for records that have an ID field.
pub trait HasId {
    /// Get the record's unique identifier.
    fn id(&self) -> &str;
}

/// Append-only record storage. Every write adds a new version of a record;
/// reads see the latest version per id.
pub trait Storage: Send + Sync {
    /// Write a new version of a record.
    fn put<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()>;

    /// Latest version of a record by ID.
    fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>>;

    /// Latest versions matching every filter.
    fn query<T: DeserializeOwned>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>>;

    /// Latest version of every record, in first-written order.
    fn list<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>>;

    /// Rewrite the collection keeping only the latest version per id.
    /// Returns the number of superseded lines dropped.
    fn compact(&self, collection: &str) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_eq_matches() {
        let filter = Filter::eq("phase", "under_review");
        let record = json!({"id": "1", "phase": "under_review"});
        assert!(filter.matches(&record));
    }

    #[test]
    fn test_filter_eq_no_match() {
        let filter = Filter::eq("phase", "under_review");
        let record = json!({"id": "1", "phase": "new"});
        assert!(!filter.matches(&record));
    }

    #[test]
    fn test_filter_eq_null() {
        let filter = Filter::eq("reviewer", serde_json::Value::Null);
        let record = json!({"id": "1"});
        assert!(filter.matches(&record));
    }

    #[test]
    fn test_filter_on_structured_value() {
        let filter = Filter::eq("phase", json!({"closed": {"merged": true}}));
        assert!(filter.matches(&json!({"id": "1", "phase": {"closed": {"merged": true}}})));
        assert!(!filter.matches(&json!({"id": "1", "phase": {"closed": {"merged": false}}})));
    }
}
