//! # Content Store Layer
//!
//! Interfaces of the external content store the projector writes into:
//! a command bus for mutations, a schema lookup and an equality query over
//! content. Two implementations are provided, one backed by PostgreSQL and
//! one kept in process memory.

use async_trait::async_trait;
use model::{
    AppId, CommandContext, CommandEnvelope, CommandOutcome, ContentEntity, ContentFilter,
    TargetSchema,
};
use thiserror::Error;

mod memory;
mod pg;

pub use memory::InMemoryContentStore;
pub use pg::PgContentStore;

/// # StoreError
///
/// Errors reported by the content store.
///
/// `Conflict` and `NotFound` are semantic rejections the projector reacts to;
/// everything else is an infrastructure failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database-related errors, wrapping the underlying PostgreSQL error
    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    /// Failed to obtain a database connection from the pool.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    /// The target of a command does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The entity a command tries to create already exists.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The store refused the command.
    #[error("Rejected: {0}")]
    Rejected(String),
}

/// Dispatches commands to the content store.
#[async_trait]
pub trait CommandBus: Send + Sync {
    /// Executes one command and returns the id of the entity it created or touched.
    async fn publish(&self, envelope: CommandEnvelope) -> Result<CommandOutcome, StoreError>;
}

/// Read access to schema definitions.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    async fn find_schema(&self, app_id: &AppId, name: &str)
    -> Result<Option<TargetSchema>, StoreError>;
}

/// Filtered lookup of content items.
#[async_trait]
pub trait ContentQuery: Send + Sync {
    /// Returns content of `schema_name` matching `filter`, oldest first.
    async fn query(
        &self,
        ctx: &CommandContext,
        schema_name: &str,
        filter: &ContentFilter,
    ) -> Result<Vec<ContentEntity>, StoreError>;
}

/// Everything the projector needs from a content store.
pub trait ContentStore: CommandBus + SchemaStore + ContentQuery {}

impl<T: CommandBus + SchemaStore + ContentQuery> ContentStore for T {}
