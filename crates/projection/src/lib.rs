//! Projection of wire records into the content store.
//!
//! A [`RecordHandler`] takes one decoded record through the same stages every
//! time: make sure the target schema has a field for everything the record
//! carries, resolve the record's external id to existing content, build the
//! field data and finally create or update the content item.
//!
//! # Failure model
//! Each stage's error aborts the remaining stages for that record only.
//! Nothing is rolled back: fields added to a schema stay even when the
//! content write that followed them failed.

mod error;
mod handler;
mod mapper;
mod schema_sync;
mod upsert;

pub use error::{ProjectionError, UnsupportedFieldType};
pub use handler::{DynamicRecordHandler, RecordHandler, TypedRecordHandler};
pub use mapper::{LIST_FIELD_THRESHOLD, field_definition, map_type};
pub use schema_sync::SchemaSynchronizer;
pub use upsert::{FieldProjection, UpsertOrchestrator, UpsertOutcome};
