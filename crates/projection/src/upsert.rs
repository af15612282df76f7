use std::collections::BTreeMap;
use std::sync::Arc;

use cache::IdentityCache;
use model::{Command, CommandContext, CommandEnvelope, ContentData, ContentId, SchemaId, WireField, WireRecord};
use repository::ContentStore;
use tracing::debug;

use crate::ProjectionError;

/// How wire fields turn into content fields. Chosen once per consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProjection {
    /// Every wire field becomes a content field of the same name.
    PassThrough,
    /// Only mapped fields are projected: target field name -> source field name.
    Mapped(BTreeMap<String, String>),
}

impl FieldProjection {
    /// `Mapped` when `mapping` has entries, `PassThrough` otherwise.
    pub fn from_mapping(mapping: &BTreeMap<String, String>) -> Self {
        if mapping.is_empty() {
            FieldProjection::PassThrough
        } else {
            FieldProjection::Mapped(mapping.clone())
        }
    }

    /// Target-side fields for a record carrying `fields`, in record order.
    ///
    /// Under a mapping each target takes the type of its source field;
    /// targets whose source is absent from the record are left out.
    pub fn target_fields(&self, fields: &[WireField]) -> Vec<WireField> {
        match self {
            FieldProjection::PassThrough => fields.to_vec(),
            FieldProjection::Mapped(mapping) => fields
                .iter()
                .flat_map(|source| {
                    mapping
                        .iter()
                        .filter(move |(_, s)| *s == &source.name)
                        .map(move |(target, _)| {
                            WireField::new(target.clone(), source.primitive_type.clone())
                        })
                })
                .collect(),
        }
    }

    /// Content data for `record`.
    pub fn field_data<R>(&self, record: &R) -> ContentData
    where
        R: WireRecord + ?Sized,
    {
        let mut data = ContentData::new();
        match self {
            FieldProjection::PassThrough => {
                for field in record.fields().iter() {
                    if let Some(value) = record.value(&field.name) {
                        data.insert(field.name.clone(), value);
                    }
                }
            }
            FieldProjection::Mapped(mapping) => {
                for (target, source) in mapping {
                    if let Some(value) = record.value(source) {
                        data.insert(target.clone(), value);
                    }
                }
            }
        }
        data
    }
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(ContentId),
    Updated(ContentId),
}

impl UpsertOutcome {
    pub fn content_id(&self) -> ContentId {
        match self {
            UpsertOutcome::Created(id) | UpsertOutcome::Updated(id) => *id,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            UpsertOutcome::Created(_) => "created",
            UpsertOutcome::Updated(_) => "updated",
        }
    }
}

/// Issues create-or-update commands keyed by resolved identity.
pub struct UpsertOrchestrator {
    store: Arc<dyn ContentStore>,
    identities: IdentityCache,
}

impl UpsertOrchestrator {
    pub fn new(store: Arc<dyn ContentStore>, identities: IdentityCache) -> Self {
        Self { store, identities }
    }

    /// Updates `resolved` with `data` (full replace), or creates published
    /// content in `schema_id` and remembers `external_id -> new id`.
    pub async fn upsert(
        &self,
        ctx: &CommandContext,
        schema_id: SchemaId,
        external_id: &str,
        resolved: Option<ContentId>,
        data: ContentData,
    ) -> Result<UpsertOutcome, ProjectionError> {
        match resolved {
            Some(content_id) => {
                let command = Command::UpdateContent { content_id, data };
                self.store.publish(CommandEnvelope::new(ctx, command)).await?;
                debug!(external_id, %content_id, "Updated content");
                Ok(UpsertOutcome::Updated(content_id))
            }
            None => {
                let command = Command::CreateContent {
                    schema_id,
                    data,
                    publish: true,
                };
                let content_id = self
                    .store
                    .publish(CommandEnvelope::new(ctx, command))
                    .await?
                    .content_id()
                    .ok_or(ProjectionError::UnexpectedOutcome("create_content"))?;
                self.identities.set(external_id, content_id).await;
                debug!(external_id, %content_id, "Created content");
                Ok(UpsertOutcome::Created(content_id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{DynamicRecord, PrimitiveType};
    use serde_json::json;

    fn record() -> DynamicRecord {
        DynamicRecord::new()
            .with("price", PrimitiveType::Float, json!(1.5))
            .with("name", PrimitiveType::String, json!("gold"))
            .with("active", PrimitiveType::Bool, json!(true))
    }

    #[test]
    fn test_pass_through_projects_every_field() {
        let projection = FieldProjection::from_mapping(&BTreeMap::new());
        assert_eq!(projection, FieldProjection::PassThrough);

        let record = record();
        assert_eq!(projection.target_fields(&record.fields()), record.fields().to_vec());

        let data = projection.field_data(&record);
        assert_eq!(data.len(), 3);
        assert_eq!(data.get("name"), Some(&json!("gold")));
    }

    #[test]
    fn test_mapping_renames_and_drops_unmapped_fields() {
        let mapping = BTreeMap::from([
            ("label".to_string(), "name".to_string()),
            ("cost".to_string(), "price".to_string()),
            ("missing".to_string(), "nowhere".to_string()),
        ]);
        let projection = FieldProjection::from_mapping(&mapping);
        let record = record();

        let targets = projection.target_fields(&record.fields());
        assert_eq!(
            targets,
            vec![
                WireField::new("cost", PrimitiveType::Float),
                WireField::new("label", PrimitiveType::String),
            ]
        );

        let data = projection.field_data(&record);
        assert_eq!(data.len(), 2);
        assert_eq!(data.get("label"), Some(&json!("gold")));
        assert_eq!(data.get("cost"), Some(&json!(1.5)));
        assert!(data.get("active").is_none());
    }
}
