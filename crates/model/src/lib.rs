//! Shared data model for the content projector.
//!
//! Wire-side types describe what comes off the broker; schema and content types
//! describe the target store; commands are what the projector issues against it.

mod command;
mod content;
mod records;
mod schema;
mod wire;

pub use command::{Actor, AppId, Command, CommandContext, CommandEnvelope, CommandOutcome, Principal};
pub use content::{ContentData, ContentEntity, ContentFilter, ContentId};
pub use records::{Commodity, ExchangeRate, TypedRecord};
pub use schema::{SchemaId, TargetFieldDefinition, TargetFieldType, TargetSchema};
pub use wire::{DynamicRecord, PrimitiveType, WireField, WireRecord};
