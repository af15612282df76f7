use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use app_config::ConsumerOptions;
use async_trait::async_trait;
use cache::IdentityCache;
use model::{CommandContext, DynamicRecord, PrimitiveType, TypedRecord, WireField, WireRecord};
use repository::ContentStore;
use tracing::{debug, instrument, warn};

use crate::{FieldProjection, ProjectionError, SchemaSynchronizer, UpsertOrchestrator, UpsertOutcome};

/// Single entry point for projecting one consumed record.
///
/// Stages run in a fixed order: ensure schema, resolve identity, build field
/// data, upsert. The first failing stage ends handling of that record.
#[async_trait]
pub trait RecordHandler: Send + Sync + 'static {
    /// Decoded record type this handler accepts.
    type Record: Send + 'static;

    /// Projects `record`, keyed by the message key `key`.
    async fn handle(
        &self,
        ctx: &CommandContext,
        key: &str,
        record: Self::Record,
    ) -> Result<UpsertOutcome, ProjectionError>;
}

/// Handler for self-describing records.
///
/// Schema name and identity field come from the consumer options; field data
/// follows the configured [`FieldProjection`].
///
/// Identity lookups filter on `id_field_name`. With `key_field` set, records
/// lacking that field get the message key written under it.
pub struct DynamicRecordHandler {
    store: Arc<dyn ContentStore>,
    schemas: SchemaSynchronizer,
    identities: IdentityCache,
    upserts: UpsertOrchestrator,
    projection: FieldProjection,
    schema_name: String,
    id_field_name: String,
    key_field: bool,
    warned_missing_id: AtomicBool,
}

impl DynamicRecordHandler {
    pub fn new(store: Arc<dyn ContentStore>, options: &ConsumerOptions) -> Self {
        let identities = IdentityCache::new();
        Self {
            schemas: SchemaSynchronizer::new(store.clone()),
            upserts: UpsertOrchestrator::new(store.clone(), identities.clone()),
            identities,
            store,
            projection: FieldProjection::from_mapping(&options.field_mapping),
            schema_name: options.schema_name.clone(),
            id_field_name: options.id_field_name.clone(),
            key_field: options.key_field,
            warned_missing_id: AtomicBool::new(false),
        }
    }

    pub fn identities(&self) -> &IdentityCache {
        &self.identities
    }
}

#[async_trait]
impl RecordHandler for DynamicRecordHandler {
    type Record = DynamicRecord;

    #[instrument(skip(self, ctx, record), fields(schema = %self.schema_name))]
    async fn handle(
        &self,
        ctx: &CommandContext,
        key: &str,
        record: DynamicRecord,
    ) -> Result<UpsertOutcome, ProjectionError> {
        let mut fields = self.projection.target_fields(&record.fields());
        let missing_id = !fields.iter().any(|f| f.name == self.id_field_name);
        let stamp_key = missing_id && self.key_field;
        if stamp_key {
            fields.push(WireField::new(self.id_field_name.clone(), PrimitiveType::String));
        } else if missing_id && !self.warned_missing_id.swap(true, Ordering::Relaxed) {
            warn!(
                id_field = %self.id_field_name,
                "Records carry no id field, identities will not be found again after a restart"
            );
        }
        let schema_id = self
            .schemas
            .ensure_schema(ctx, &self.schema_name, &fields)
            .await?;

        let resolved = self
            .identities
            .resolve(
                self.store.as_ref(),
                ctx,
                &self.schema_name,
                &self.id_field_name,
                key,
            )
            .await?;

        let mut data = self.projection.field_data(&record);
        if stamp_key {
            data.insert(self.id_field_name.clone(), key.into());
        }
        self.upserts
            .upsert(ctx, schema_id, key, resolved, data)
            .await
    }
}

/// Handler for statically-typed records.
///
/// Schema name, identity field and field data are supplied by the record
/// type itself.
pub struct TypedRecordHandler<T> {
    store: Arc<dyn ContentStore>,
    schemas: SchemaSynchronizer,
    identities: IdentityCache,
    upserts: UpsertOrchestrator,
    _record: PhantomData<fn() -> T>,
}

impl<T: TypedRecord> TypedRecordHandler<T> {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        let identities = IdentityCache::new();
        Self {
            schemas: SchemaSynchronizer::new(store.clone()),
            upserts: UpsertOrchestrator::new(store.clone(), identities.clone()),
            identities,
            store,
            _record: PhantomData,
        }
    }

    pub fn identities(&self) -> &IdentityCache {
        &self.identities
    }
}

#[async_trait]
impl<T: TypedRecord> RecordHandler for TypedRecordHandler<T> {
    type Record = T;

    #[instrument(skip(self, ctx, record), fields(schema = record.schema_name()))]
    async fn handle(
        &self,
        ctx: &CommandContext,
        key: &str,
        record: T,
    ) -> Result<UpsertOutcome, ProjectionError> {
        if key != record.id() {
            debug!(key, id = record.id(), "Message key differs from record id, using record id");
        }
        let schema_name = record.schema_name();
        let schema_id = self
            .schemas
            .ensure_schema(ctx, schema_name, &record.fields())
            .await?;

        let resolved = self
            .identities
            .resolve(
                self.store.as_ref(),
                ctx,
                schema_name,
                record.id_field_name(),
                record.id(),
            )
            .await?;

        let data = record.to_field_data();
        self.upserts
            .upsert(ctx, schema_id, record.id(), resolved, data)
            .await
    }
}
