use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::SchemaId;

/// Field name to value payload of a content item.
pub type ContentData = Map<String, Value>;

/// Opaque identifier of a content item in the content store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentId(pub Uuid);

impl ContentId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A content item returned by the query service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntity {
    pub id: ContentId,
    pub schema_id: SchemaId,
    pub data: ContentData,
    pub is_published: bool,
}

/// Equality filter on a single content field.
///
/// Field values are compared by their text form: a string by its contents,
/// any other scalar by its JSON rendering. `42` and `"42"` both match `"42"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFilter {
    pub field: String,
    pub equals: String,
    pub take: Option<usize>,
}

impl ContentFilter {
    pub fn field_eq(field: impl Into<String>, equals: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            equals: equals.into(),
            take: None,
        }
    }

    pub fn take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }

    pub fn matches(&self, data: &ContentData) -> bool {
        match data.get(&self.field) {
            Some(Value::String(s)) => *s == self.equals,
            Some(Value::Null) | Some(Value::Array(_)) | Some(Value::Object(_)) | None => false,
            Some(other) => other.to_string() == self.equals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches_on_exact_value() {
        let mut data = ContentData::new();
        data.insert("id".into(), json!("A"));

        assert!(ContentFilter::field_eq("id", "A").matches(&data));
        assert!(!ContentFilter::field_eq("id", "B").matches(&data));
        assert!(!ContentFilter::field_eq("other", "A").matches(&data));
    }

    #[test]
    fn test_filter_matches_numbers_by_text() {
        let mut data = ContentData::new();
        data.insert("id".into(), json!(42));
        data.insert("active".into(), json!(true));
        data.insert("gone".into(), Value::Null);

        assert!(ContentFilter::field_eq("id", "42").matches(&data));
        assert!(!ContentFilter::field_eq("id", "4").matches(&data));
        assert!(ContentFilter::field_eq("active", "true").matches(&data));
        assert!(!ContentFilter::field_eq("gone", "null").matches(&data));
    }
}
