use std::sync::Arc;

use cache::SchemaCache;
use model::{
    Command, CommandContext, CommandEnvelope, SchemaId, TargetFieldDefinition, TargetSchema,
    WireField,
};
use repository::{ContentStore, StoreError};
use tracing::{debug, info, warn};

use crate::{ProjectionError, field_definition};

/// Keeps target schemas a superset of the fields seen on incoming records.
///
/// Schemas only ever grow: fields are added, never removed or renamed.
/// Fields are created in the order the record lists them.
///
/// Duplicates are settled by the store. Losing a create-schema race
/// ([`StoreError::Conflict`]) makes the synchronizer adopt the winning schema
/// and add whatever it lacks; a conflicting add-field counts as the field
/// already being there.
pub struct SchemaSynchronizer {
    store: Arc<dyn ContentStore>,
    cache: SchemaCache,
}

impl SchemaSynchronizer {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self::with_cache(store, SchemaCache::new())
    }

    /// Uses an existing cache, e.g. one shared with another synchronizer.
    pub fn with_cache(store: Arc<dyn ContentStore>, cache: SchemaCache) -> Self {
        Self { store, cache }
    }

    /// Last schema snapshot seen for `name`, if any.
    pub async fn cached(&self, name: &str) -> Option<TargetSchema> {
        self.cache.get(name).await
    }

    /// Makes sure schema `name` exists and has a field for every entry of `fields`.
    ///
    /// Idempotent for fields already present. Nothing is sent to the store
    /// when one of the fields that would have to be created has an
    /// unsupported type.
    pub async fn ensure_schema(
        &self,
        ctx: &CommandContext,
        name: &str,
        fields: &[WireField],
    ) -> Result<SchemaId, ProjectionError> {
        let known = match self.cache.get(name).await {
            Some(schema) => Some(schema),
            None => self.store.find_schema(&ctx.app_id, name).await?,
        };

        match known {
            Some(schema) => self.add_missing_fields(ctx, schema, fields).await,
            None => self.create_schema(ctx, name, fields).await,
        }
    }

    async fn create_schema(
        &self,
        ctx: &CommandContext,
        name: &str,
        fields: &[WireField],
    ) -> Result<SchemaId, ProjectionError> {
        let definitions = fields
            .iter()
            .map(|f| field_definition(f, fields.len()))
            .collect::<Result<Vec<_>, _>>()?;

        let command = Command::CreateSchema {
            app_id: ctx.app_id.clone(),
            name: name.to_string(),
            is_published: true,
            fields: definitions.clone(),
        };
        match self.store.publish(CommandEnvelope::new(ctx, command)).await {
            Ok(outcome) => {
                let id = outcome
                    .schema_id()
                    .ok_or(ProjectionError::UnexpectedOutcome("create_schema"))?;
                info!(schema = name, schema_id = %id, fields = definitions.len(), "Created schema");
                self.cache
                    .set(TargetSchema::new(id, name, true, definitions))
                    .await;
                Ok(id)
            }
            Err(StoreError::Conflict(reason)) => {
                warn!(schema = name, %reason, "Schema was created concurrently, adopting it");
                let winner = self
                    .store
                    .find_schema(&ctx.app_id, name)
                    .await?
                    .ok_or_else(|| ProjectionError::SchemaNotFound(name.to_string()))?;
                self.add_missing_fields(ctx, winner, fields).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn add_missing_fields(
        &self,
        ctx: &CommandContext,
        schema: TargetSchema,
        fields: &[WireField],
    ) -> Result<SchemaId, ProjectionError> {
        let missing = fields
            .iter()
            .filter(|f| !schema.contains_field(&f.name))
            .map(|f| field_definition(f, fields.len()))
            .collect::<Result<Vec<TargetFieldDefinition>, _>>()?;

        if missing.is_empty() {
            let id = schema.id;
            self.cache.set(schema).await;
            return Ok(id);
        }

        for field in missing {
            let field_name = field.name.clone();
            let command = Command::AddField {
                schema_id: schema.id,
                field,
            };
            match self.store.publish(CommandEnvelope::new(ctx, command)).await {
                Ok(_) => info!(schema = %schema.name, field = %field_name, "Added field"),
                Err(StoreError::Conflict(reason)) => {
                    debug!(schema = %schema.name, field = %field_name, %reason, "Field already present");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let reloaded = self
            .store
            .find_schema(&ctx.app_id, &schema.name)
            .await?
            .ok_or_else(|| ProjectionError::SchemaNotFound(schema.name.clone()))?;
        let id = reloaded.id;
        self.cache.set(reloaded).await;
        Ok(id)
    }
}
