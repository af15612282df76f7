//! Kafka consumption for the content projector.
//!
//! [`KafkaRecordSource`] reads one topic and decodes each message with a
//! pluggable [`RecordDeserializer`]. [`ConsumerHost`] drives a source and a
//! [`projection::RecordHandler`] in a background task until it is stopped.

mod deserializer;
mod error;
mod host;
mod metrics;
mod source;

pub use deserializer::{AvroDeserializer, JsonDeserializer, RecordDeserializer};
pub use error::{ConsumeError, DecodeError};
pub use host::{ConsumerHost, HostState, HostStatus, HostedConsumer};
pub use metrics::ConsumerMetrics;
pub use source::{KafkaRecordSource, RecordSource, client_config, resolve_group_id};
