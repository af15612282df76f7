use async_trait::async_trait;
use model::{
    AppId, Command, CommandContext, CommandEnvelope, CommandOutcome, ContentEntity, ContentFilter,
    ContentId, SchemaId, TargetSchema,
};
use tokio::sync::RwLock;

use crate::{CommandBus, ContentQuery, SchemaStore, StoreError};

/// Content store kept entirely in process memory.
///
/// Follows the same conflict rules as the PostgreSQL store. Every accepted
/// command is kept in a log so callers can inspect what was issued.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    inner: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    schemas: Vec<(AppId, TargetSchema)>,
    contents: Vec<ContentEntity>,
    commands: Vec<CommandEnvelope>,
    reject_next: Option<String>,
}

impl State {
    fn schema_mut(&mut self, id: SchemaId) -> Option<&mut TargetSchema> {
        self.schemas
            .iter_mut()
            .map(|(_, schema)| schema)
            .find(|schema| schema.id == id)
    }
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands accepted so far, in execution order.
    pub async fn commands(&self) -> Vec<CommandEnvelope> {
        self.inner.read().await.commands.clone()
    }

    pub async fn schema(&self, app_id: &AppId, name: &str) -> Option<TargetSchema> {
        let state = self.inner.read().await;
        state
            .schemas
            .iter()
            .find(|(app, schema)| app == app_id && schema.name == name)
            .map(|(_, schema)| schema.clone())
    }

    pub async fn schema_count(&self) -> usize {
        self.inner.read().await.schemas.len()
    }

    pub async fn content(&self, id: ContentId) -> Option<ContentEntity> {
        let state = self.inner.read().await;
        state.contents.iter().find(|c| c.id == id).cloned()
    }

    pub async fn contents(&self) -> Vec<ContentEntity> {
        self.inner.read().await.contents.clone()
    }

    /// Inserts a schema without going through the command bus, the way a
    /// concurrent writer would.
    pub async fn insert_schema(&self, app_id: AppId, schema: TargetSchema) {
        self.inner.write().await.schemas.push((app_id, schema));
    }

    /// Removes a content item without going through the command bus.
    pub async fn delete_content(&self, id: ContentId) -> bool {
        let mut state = self.inner.write().await;
        let before = state.contents.len();
        state.contents.retain(|c| c.id != id);
        before != state.contents.len()
    }

    /// Makes the next published command fail with [`StoreError::Rejected`].
    pub async fn reject_next(&self, reason: impl Into<String>) {
        self.inner.write().await.reject_next = Some(reason.into());
    }
}

#[async_trait]
impl CommandBus for InMemoryContentStore {
    async fn publish(&self, envelope: CommandEnvelope) -> Result<CommandOutcome, StoreError> {
        let mut state = self.inner.write().await;
        if let Some(reason) = state.reject_next.take() {
            return Err(StoreError::Rejected(reason));
        }

        let outcome = match &envelope.command {
            Command::CreateSchema {
                app_id,
                name,
                is_published,
                fields,
            } => {
                let exists = state
                    .schemas
                    .iter()
                    .any(|(app, schema)| app == app_id && &schema.name == name);
                if exists {
                    return Err(StoreError::Conflict(format!(
                        "schema '{name}' already exists in app '{app_id}'"
                    )));
                }
                let id = SchemaId::new_v4();
                let schema = TargetSchema::new(id, name.clone(), *is_published, fields.clone());
                state.schemas.push((app_id.clone(), schema));
                CommandOutcome::Schema(id)
            }
            Command::AddField { schema_id, field } => {
                let schema = state
                    .schema_mut(*schema_id)
                    .ok_or_else(|| StoreError::NotFound(format!("schema {schema_id}")))?;
                if schema.contains_field(&field.name) {
                    return Err(StoreError::Conflict(format!(
                        "field '{}' already exists on schema {schema_id}",
                        field.name
                    )));
                }
                schema.push_field(field.clone());
                CommandOutcome::Schema(*schema_id)
            }
            Command::CreateContent {
                schema_id,
                data,
                publish,
            } => {
                if state.schema_mut(*schema_id).is_none() {
                    return Err(StoreError::NotFound(format!("schema {schema_id}")));
                }
                let id = ContentId::new_v4();
                state.contents.push(ContentEntity {
                    id,
                    schema_id: *schema_id,
                    data: data.clone(),
                    is_published: *publish,
                });
                CommandOutcome::Content(id)
            }
            Command::UpdateContent { content_id, data } => {
                let content = state
                    .contents
                    .iter_mut()
                    .find(|c| c.id == *content_id)
                    .ok_or_else(|| StoreError::NotFound(format!("content {content_id}")))?;
                content.data = data.clone();
                CommandOutcome::Content(*content_id)
            }
        };

        state.commands.push(envelope);
        Ok(outcome)
    }
}

#[async_trait]
impl SchemaStore for InMemoryContentStore {
    async fn find_schema(
        &self,
        app_id: &AppId,
        name: &str,
    ) -> Result<Option<TargetSchema>, StoreError> {
        Ok(self.schema(app_id, name).await)
    }
}

#[async_trait]
impl ContentQuery for InMemoryContentStore {
    async fn query(
        &self,
        ctx: &CommandContext,
        schema_name: &str,
        filter: &ContentFilter,
    ) -> Result<Vec<ContentEntity>, StoreError> {
        let Some(schema) = self.schema(&ctx.app_id, schema_name).await else {
            return Ok(Vec::new());
        };
        let state = self.inner.read().await;
        let matches = state
            .contents
            .iter()
            .filter(|c| c.schema_id == schema.id && filter.matches(&c.data))
            .take(filter.take.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(matches)
    }
}
