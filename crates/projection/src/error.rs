use model::PrimitiveType;
use repository::StoreError;
use thiserror::Error;

/// A wire type outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported field type '{0}'")]
pub struct UnsupportedFieldType(pub PrimitiveType);

/// The main error type for handling a single record.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// A record field cannot be represented in the target schema.
    #[error("Field '{field}': {source}")]
    UnsupportedField {
        field: String,
        #[source]
        source: UnsupportedFieldType,
    },
    /// The content store rejected or failed a command or query.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    /// A schema reported as existing could not be read back.
    #[error("Schema '{0}' not found after it was reported to exist")]
    SchemaNotFound(String),
    /// The store answered a command with an id of the wrong kind.
    #[error("Unexpected outcome for command '{0}'")]
    UnexpectedOutcome(&'static str),
}
