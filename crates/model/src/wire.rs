use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Primitive type of a field as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveType {
    Bool,
    String,
    Int,
    Float,
    Double,
    /// Anything the decoder could not place in the closed set above.
    Other(String),
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveType::Bool => f.write_str("bool"),
            PrimitiveType::String => f.write_str("string"),
            PrimitiveType::Int => f.write_str("int"),
            PrimitiveType::Float => f.write_str("float"),
            PrimitiveType::Double => f.write_str("double"),
            PrimitiveType::Other(name) => f.write_str(name),
        }
    }
}

/// A named, typed field carried by a wire record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WireField {
    pub name: String,
    pub primitive_type: PrimitiveType,
}

impl WireField {
    pub fn new(name: impl Into<String>, primitive_type: PrimitiveType) -> Self {
        Self {
            name: name.into(),
            primitive_type,
        }
    }
}

/// Common view over one consumed message payload.
///
/// Fields are reported in insertion order. That order decides the order in
/// which target schema fields get created, nothing else.
pub trait WireRecord: Send + Sync {
    /// Ordered field list of this record.
    fn fields(&self) -> Cow<'_, [WireField]>;

    /// Raw value of the named field, `None` when the record has no such field.
    fn value(&self, name: &str) -> Option<Value>;
}

/// Self-describing record: the field list travels with the message and is
/// filled in once by the decoder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicRecord {
    fields: Vec<WireField>,
    values: Map<String, Value>,
}

impl DynamicRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field. A repeated name replaces the earlier value but keeps
    /// the original position.
    pub fn push(&mut self, field: WireField, value: Value) {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == field.name) {
            existing.primitive_type = field.primitive_type.clone();
        } else {
            self.fields.push(field.clone());
        }
        self.values.insert(field.name, value);
    }

    /// Builder-style variant of [`DynamicRecord::push`].
    pub fn with(mut self, name: &str, primitive_type: PrimitiveType, value: Value) -> Self {
        self.push(WireField::new(name, primitive_type), value);
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl WireRecord for DynamicRecord {
    fn fields(&self) -> Cow<'_, [WireField]> {
        Cow::Borrowed(&self.fields)
    }

    fn value(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dynamic_record_keeps_insertion_order() {
        let record = DynamicRecord::new()
            .with("price", PrimitiveType::Float, json!(1.5))
            .with("active", PrimitiveType::Bool, json!(true))
            .with("code", PrimitiveType::String, json!("EUR"));

        let names: Vec<_> = record.fields().iter().map(|f| f.name.clone()).collect();
        assert_eq!(names, vec!["price", "active", "code"]);
        assert_eq!(record.value("active"), Some(json!(true)));
        assert_eq!(record.value("missing"), None);
    }

    #[test]
    fn test_repeated_field_replaces_value_in_place() {
        let record = DynamicRecord::new()
            .with("a", PrimitiveType::Int, json!(1))
            .with("b", PrimitiveType::Int, json!(2))
            .with("a", PrimitiveType::Double, json!(3.0));

        assert_eq!(record.len(), 2);
        assert_eq!(record.fields()[0], WireField::new("a", PrimitiveType::Double));
        assert_eq!(record.value("a"), Some(json!(3.0)));
    }

    #[test]
    fn test_primitive_type_display() {
        assert_eq!(PrimitiveType::Double.to_string(), "double");
        assert_eq!(PrimitiveType::Other("map".into()).to_string(), "map");
    }
}
