use async_trait::async_trait;
use deadpool_postgres::Pool;
use model::{
    AppId, Command, CommandContext, CommandEnvelope, CommandOutcome, ContentData, ContentEntity,
    ContentFilter, ContentId, SchemaId, TargetFieldDefinition, TargetFieldType, TargetSchema,
};
use serde_json::Value;
use tokio_postgres::Row;
use tracing::debug;
use uuid::Uuid;

use crate::{CommandBus, ContentQuery, SchemaStore, StoreError};

/// PostgreSQL implementation of the content store.
///
/// Schemas live in `schemas` / `schema_fields`, content in `contents` with its
/// field data as JSONB. Duplicate schema names per app and duplicate field
/// names per schema are rejected with [`StoreError::Conflict`].
#[derive(Clone)]
pub struct PgContentStore {
    pool: Pool,
}

impl PgContentStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn create_schema(
        &self,
        envelope: &CommandEnvelope,
        app_id: &AppId,
        name: &str,
        is_published: bool,
        fields: &[TargetFieldDefinition],
    ) -> Result<CommandOutcome, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let id = Uuid::new_v4();
        let inserted = tx
            .execute(
                r#"
                INSERT INTO schemas (id, app_id, name, is_published, created_by)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (app_id, name) DO NOTHING
                "#,
                &[&id, &app_id.as_str(), &name, &is_published, &envelope.principal.subject],
            )
            .await?;
        if inserted == 0 {
            return Err(StoreError::Conflict(format!(
                "schema '{name}' already exists in app '{app_id}'"
            )));
        }

        for (position, field) in fields.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO schema_fields (schema_id, position, name, field_type, is_list_field)
                VALUES ($1, $2, $3, $4, $5)
                "#,
                &[&id, &(position as i32), &field.name, &field.field_type, &field.is_list_field],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(CommandOutcome::Schema(SchemaId(id)))
    }

    async fn add_field(
        &self,
        schema_id: SchemaId,
        field: &TargetFieldDefinition,
    ) -> Result<CommandOutcome, StoreError> {
        let client = self.pool.get().await?;
        let inserted = client
            .execute(
                r#"
                INSERT INTO schema_fields (schema_id, position, name, field_type, is_list_field)
                SELECT $1, COALESCE(MAX(position) + 1, 0), $2, $3, $4
                FROM schema_fields WHERE schema_id = $1
                ON CONFLICT (schema_id, name) DO NOTHING
                "#,
                &[&schema_id.0, &field.name, &field.field_type, &field.is_list_field],
            )
            .await?;
        if inserted == 0 {
            return Err(StoreError::Conflict(format!(
                "field '{}' already exists on schema {schema_id}",
                field.name
            )));
        }
        Ok(CommandOutcome::Schema(schema_id))
    }

    async fn create_content(
        &self,
        envelope: &CommandEnvelope,
        schema_id: SchemaId,
        data: &ContentData,
        publish: bool,
    ) -> Result<CommandOutcome, StoreError> {
        let client = self.pool.get().await?;
        let id = Uuid::new_v4();
        client
            .execute(
                r#"
                INSERT INTO contents (id, schema_id, data, is_published, created_by, last_modified_by)
                VALUES ($1, $2, $3, $4, $5, $5)
                "#,
                &[
                    &id,
                    &schema_id.0,
                    &Value::Object(data.clone()),
                    &publish,
                    &envelope.principal.subject,
                ],
            )
            .await?;
        Ok(CommandOutcome::Content(ContentId(id)))
    }

    async fn update_content(
        &self,
        envelope: &CommandEnvelope,
        content_id: ContentId,
        data: &ContentData,
    ) -> Result<CommandOutcome, StoreError> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                r#"
                UPDATE contents
                SET data = $2, last_modified_by = $3, updated_at = now()
                WHERE id = $1
                "#,
                &[&content_id.0, &Value::Object(data.clone()), &envelope.principal.subject],
            )
            .await?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("content {content_id}")));
        }
        Ok(CommandOutcome::Content(content_id))
    }
}

#[async_trait]
impl CommandBus for PgContentStore {
    async fn publish(&self, envelope: CommandEnvelope) -> Result<CommandOutcome, StoreError> {
        debug!(command = envelope.command.kind(), actor = %envelope.actor.client_id, "Executing command");
        match &envelope.command {
            Command::CreateSchema {
                app_id,
                name,
                is_published,
                fields,
            } => {
                self.create_schema(&envelope, app_id, name, *is_published, fields)
                    .await
            }
            Command::AddField { schema_id, field } => self.add_field(*schema_id, field).await,
            Command::CreateContent {
                schema_id,
                data,
                publish,
            } => {
                self.create_content(&envelope, *schema_id, data, *publish)
                    .await
            }
            Command::UpdateContent { content_id, data } => {
                self.update_content(&envelope, *content_id, data).await
            }
        }
    }
}

#[async_trait]
impl SchemaStore for PgContentStore {
    async fn find_schema(
        &self,
        app_id: &AppId,
        name: &str,
    ) -> Result<Option<TargetSchema>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, name, is_published FROM schemas WHERE app_id = $1 AND name = $2",
                &[&app_id.as_str(), &name],
            )
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let id: Uuid = row.get("id");
        let rows = client
            .query(
                r#"
                SELECT name, field_type, is_list_field
                FROM schema_fields WHERE schema_id = $1
                ORDER BY position
                "#,
                &[&id],
            )
            .await?;
        let fields = rows
            .into_iter()
            .map(|r| TargetFieldDefinition {
                name: r.get("name"),
                field_type: r.get::<_, TargetFieldType>("field_type"),
                is_list_field: r.get("is_list_field"),
            })
            .collect();

        Ok(Some(TargetSchema::new(
            SchemaId(id),
            row.get::<_, String>("name"),
            row.get("is_published"),
            fields,
        )))
    }
}

#[async_trait]
impl ContentQuery for PgContentStore {
    async fn query(
        &self,
        ctx: &CommandContext,
        schema_name: &str,
        filter: &ContentFilter,
    ) -> Result<Vec<ContentEntity>, StoreError> {
        let client = self.pool.get().await?;
        let limit = filter.take.map(|n| n as i64);
        let rows = client
            .query(
                r#"
                SELECT c.id, c.schema_id, c.data, c.is_published
                FROM contents c
                JOIN schemas s ON s.id = c.schema_id
                WHERE s.app_id = $1 AND s.name = $2 AND c.data ->> $3::text = $4::text
                ORDER BY c.created_at
                LIMIT $5
                "#,
                &[&ctx.app_id.as_str(), &schema_name, &filter.field, &filter.equals, &limit],
            )
            .await?;
        Ok(rows.iter().map(content_from_row).collect())
    }
}

fn content_from_row(row: &Row) -> ContentEntity {
    let data = match row.get::<_, Value>("data") {
        Value::Object(map) => map,
        _ => ContentData::new(),
    };
    ContentEntity {
        id: ContentId(row.get("id")),
        schema_id: SchemaId(row.get("schema_id")),
        data,
        is_published: row.get("is_published"),
    }
}
