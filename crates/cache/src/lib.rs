//! Process-lifetime caches used while projecting records.
//!
//! [`IdentityCache`] maps external record ids to content ids and falls back to
//! an equality query on a miss. [`SchemaCache`] keeps the last-read snapshot of
//! each target schema by name. Both are thread-safe and never evict: they grow
//! with the number of distinct ids/schemas seen, which is fine for bounded id
//! spaces. Entries are not invalidated when the store changes out of band.

use std::collections::HashMap;
use std::sync::Arc;

use model::{CommandContext, ContentFilter, ContentId, TargetSchema};
use repository::{ContentQuery, StoreError};
use tokio::sync::RwLock;
use tracing::debug;

/// Thread-safe external id -> content id map.
#[derive(Debug, Default, Clone)]
pub struct IdentityCache {
    inner: Arc<RwLock<HashMap<String, ContentId>>>,
}

impl IdentityCache {
    /// Create a new, empty identity cache.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Cached content id for `external_id`, without querying the store.
    pub async fn get(&self, external_id: &str) -> Option<ContentId> {
        let map = self.inner.read().await;
        map.get(external_id).copied()
    }

    /// Insert or replace the mapping for `external_id`.
    pub async fn set(&self, external_id: &str, content_id: ContentId) {
        let mut map = self.inner.write().await;
        map.insert(external_id.to_string(), content_id);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Resolves `external_id` to a content id.
    ///
    /// A cache hit returns immediately. A miss runs an equality query on
    /// `id_field` and takes the first match, caching it. No match returns
    /// `None` and caches nothing, so the next call queries again. Concurrent
    /// misses for the same id each run their own query.
    pub async fn resolve<Q>(
        &self,
        query: &Q,
        ctx: &CommandContext,
        schema_name: &str,
        id_field: &str,
        external_id: &str,
    ) -> Result<Option<ContentId>, StoreError>
    where
        Q: ContentQuery + ?Sized,
    {
        if let Some(id) = self.get(external_id).await {
            return Ok(Some(id));
        }

        let filter = ContentFilter::field_eq(id_field, external_id).take(1);
        let found = query.query(ctx, schema_name, &filter).await?;
        match found.into_iter().next() {
            Some(entity) => {
                debug!(external_id, content_id = %entity.id, "Resolved identity from store");
                self.set(external_id, entity.id).await;
                Ok(Some(entity.id))
            }
            None => Ok(None),
        }
    }
}

/// Thread-safe schema name -> schema snapshot map.
#[derive(Debug, Default, Clone)]
pub struct SchemaCache {
    inner: Arc<RwLock<HashMap<String, TargetSchema>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<TargetSchema> {
        self.inner.read().await.get(name).cloned()
    }

    pub async fn set(&self, schema: TargetSchema) {
        let mut map = self.inner.write().await;
        map.insert(schema.name.clone(), schema);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{Actor, AppId, Command, CommandEnvelope, ContentData, SchemaId, TargetSchema};
    use repository::{CommandBus, InMemoryContentStore};
    use serde_json::json;

    fn ctx() -> CommandContext {
        CommandContext::new(AppId::new("app"), Actor::client("tests"))
    }

    async fn seed(store: &InMemoryContentStore, external_id: &str) -> ContentId {
        let schema_id = match store.schema(&AppId::new("app"), "rates").await {
            Some(schema) => schema.id,
            None => {
                let id = SchemaId::new_v4();
                store
                    .insert_schema(AppId::new("app"), TargetSchema::new(id, "rates", true, vec![]))
                    .await;
                id
            }
        };
        let mut data = ContentData::new();
        data.insert("id".into(), json!(external_id));
        let command = Command::CreateContent {
            schema_id,
            data,
            publish: true,
        };
        store
            .publish(CommandEnvelope::new(&ctx(), command))
            .await
            .unwrap()
            .content_id()
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_cache() {
        let cache = IdentityCache::new();
        assert!(cache.get("nonexistent").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = IdentityCache::new();
        let id = ContentId::new_v4();
        cache.set("A", id).await;
        assert_eq!(cache.get("A").await, Some(id));

        let replaced = ContentId::new_v4();
        cache.set("A", replaced).await;
        assert_eq!(cache.get("A").await, Some(replaced));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_query_and_caches_hit() {
        let store = InMemoryContentStore::new();
        let existing = seed(&store, "A").await;
        let cache = IdentityCache::new();

        let resolved = cache.resolve(&store, &ctx(), "rates", "id", "A").await.unwrap();
        assert_eq!(resolved, Some(existing));
        assert_eq!(cache.get("A").await, Some(existing));
    }

    #[tokio::test]
    async fn test_resolve_does_not_cache_misses() {
        let store = InMemoryContentStore::new();
        let cache = IdentityCache::new();

        let resolved = cache.resolve(&store, &ctx(), "rates", "id", "B").await.unwrap();
        assert_eq!(resolved, None);
        assert!(cache.is_empty().await);

        // Written by another producer later on: the next lookup must see it.
        let created = seed(&store, "B").await;
        let resolved = cache.resolve(&store, &ctx(), "rates", "id", "B").await.unwrap();
        assert_eq!(resolved, Some(created));
    }

    #[tokio::test]
    async fn test_resolve_prefers_cache_over_store() {
        let store = InMemoryContentStore::new();
        let stored = seed(&store, "A").await;
        let cache = IdentityCache::new();
        let cached = ContentId::new_v4();
        cache.set("A", cached).await;

        let resolved = cache.resolve(&store, &ctx(), "rates", "id", "A").await.unwrap();
        assert_eq!(resolved, Some(cached));
        assert_ne!(resolved, Some(stored));
    }

    #[tokio::test]
    async fn test_schema_cache_replaces_snapshot() {
        let cache = SchemaCache::new();
        let id = SchemaId::new_v4();
        cache.set(TargetSchema::new(id, "rates", true, vec![])).await;
        assert_eq!(cache.get("rates").await.map(|s| s.id), Some(id));
        assert!(cache.get("other").await.is_none());
    }
}
