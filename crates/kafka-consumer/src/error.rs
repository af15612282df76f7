use std::str::Utf8Error;

use rdkafka::error::KafkaError;
use thiserror::Error;

/// Why a message could not be turned into a record.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message has no key")]
    MissingKey,
    #[error("message key is not valid UTF-8: {0}")]
    InvalidKey(#[from] Utf8Error),
    #[error("message has no payload")]
    EmptyPayload,
    #[error("invalid Avro payload: {0}")]
    Avro(#[from] apache_avro::Error),
    #[error("Avro writer schema must be a record, got {0}")]
    NotARecord(String),
    #[error("Avro container holds no records")]
    NoRecords,
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned by [`crate::RecordSource::consume`].
#[derive(Debug, Error)]
pub enum ConsumeError {
    /// The cancellation token fired. Not a failure.
    #[error("consumption cancelled")]
    Cancelled,
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("failed to decode message at partition {partition} offset {offset}: {source}")]
    Decode {
        partition: i32,
        offset: i64,
        #[source]
        source: DecodeError,
    },
}

impl ConsumeError {
    /// Label used for this error in logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            ConsumeError::Cancelled => "cancelled",
            ConsumeError::Kafka(_) => "kafka_error",
            ConsumeError::Decode { .. } => "decode_error",
        }
    }
}
