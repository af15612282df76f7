use std::fmt;

use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of a schema in the content store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaId(pub Uuid);

impl SchemaId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Content field types supported by the target store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "field_type")]
pub enum TargetFieldType {
    #[postgres(name = "boolean")]
    Boolean,
    #[postgres(name = "string")]
    String,
    #[postgres(name = "number")]
    Number,
}

/// A field as defined on a target schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFieldDefinition {
    pub name: String,
    pub field_type: TargetFieldType,
    /// Shown in list views. Decided once when the field is created.
    pub is_list_field: bool,
}

/// Snapshot of a schema as read from the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSchema {
    pub id: SchemaId,
    pub name: String,
    pub is_published: bool,
    fields: Vec<TargetFieldDefinition>,
}

impl TargetSchema {
    pub fn new(
        id: SchemaId,
        name: impl Into<String>,
        is_published: bool,
        fields: Vec<TargetFieldDefinition>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            is_published,
            fields,
        }
    }

    /// Fields in creation order.
    pub fn fields(&self) -> &[TargetFieldDefinition] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&TargetFieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Appends a field at the end. Existing fields are never touched.
    pub fn push_field(&mut self, field: TargetFieldDefinition) {
        self.fields.push(field);
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}
