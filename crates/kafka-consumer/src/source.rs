use std::sync::atomic::{AtomicBool, Ordering};

use app_config::ConsumerOptions;
use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{ConsumeError, DecodeError, RecordDeserializer};

/// Something that yields keyed records one at a time.
#[async_trait]
pub trait RecordSource: Send + Sync + 'static {
    type Record: Send + 'static;

    /// Topic this source reads.
    fn topic(&self) -> &str;

    /// Waits for the next record.
    ///
    /// Returns [`ConsumeError::Cancelled`] once `cancel` fires.
    async fn consume(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(String, Self::Record), ConsumeError>;

    /// Releases what the source holds on the broker side. A later `consume`
    /// acquires it again.
    fn close(&self) {}
}

/// Group id for a consumer: the configured one, or a fresh random one.
pub fn resolve_group_id(options: &ConsumerOptions) -> String {
    match &options.group_id {
        Some(group_id) => group_id.clone(),
        None => {
            let group_id = format!("{}-{}", options.app_name, Uuid::new_v4());
            warn!(
                topic = %options.topic_name,
                group_id = %group_id,
                "No consumer group configured, using a random one; the whole topic is re-read on every start"
            );
            group_id
        }
    }
}

/// Consumer configuration shared by every source. The deserializer gets the
/// last word.
pub fn client_config<D: RecordDeserializer>(
    brokers: &[String],
    group_id: &str,
    deserializer: &D,
) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", brokers.join(","))
        .set("group.id", group_id)
        .set("enable.partition.eof", "false")
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "true");
    deserializer.configure(&mut config);
    config
}

/// [`RecordSource`] over a single Kafka topic.
pub struct KafkaRecordSource<D> {
    consumer: StreamConsumer,
    topic: String,
    group_id: String,
    deserializer: D,
    subscribed: AtomicBool,
}

impl<D: RecordDeserializer> KafkaRecordSource<D> {
    /// Creates the consumer and subscribes it to `options.topic_name`.
    pub fn new(
        brokers: &[String],
        options: &ConsumerOptions,
        deserializer: D,
    ) -> Result<Self, KafkaError> {
        let group_id = resolve_group_id(options);
        let consumer: StreamConsumer =
            client_config(brokers, &group_id, &deserializer).create()?;
        consumer.subscribe(&[options.topic_name.as_str()])?;

        info!(topic = %options.topic_name, group_id = %group_id, "Kafka consumer subscribed");
        Ok(Self {
            consumer,
            topic: options.topic_name.clone(),
            group_id,
            deserializer,
            subscribed: AtomicBool::new(true),
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    fn decode(&self, msg: &BorrowedMessage<'_>) -> Result<(String, D::Record), DecodeError> {
        let key = std::str::from_utf8(msg.key().ok_or(DecodeError::MissingKey)?)?;
        let payload = msg.payload().ok_or(DecodeError::EmptyPayload)?;
        let record = self.deserializer.deserialize(payload)?;
        Ok((key.to_string(), record))
    }
}

#[async_trait]
impl<D: RecordDeserializer> RecordSource for KafkaRecordSource<D> {
    type Record = D::Record;

    fn topic(&self) -> &str {
        &self.topic
    }

    async fn consume(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(String, D::Record), ConsumeError> {
        if !self.subscribed.swap(true, Ordering::AcqRel) {
            if let Err(e) = self.consumer.subscribe(&[self.topic.as_str()]) {
                self.subscribed.store(false, Ordering::Release);
                return Err(e.into());
            }
            info!(topic = %self.topic, group_id = %self.group_id, "Kafka consumer resubscribed");
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConsumeError::Cancelled),
            msg = self.consumer.recv() => {
                let msg = msg?;
                self.decode(&msg).map_err(|source| ConsumeError::Decode {
                    partition: msg.partition(),
                    offset: msg.offset(),
                    source,
                })
            }
        }
    }

    /// Leaves the consumer group until the next `consume`.
    fn close(&self) {
        if self.subscribed.swap(false, Ordering::AcqRel) {
            self.consumer.unsubscribe();
            info!(topic = %self.topic, "Kafka consumer unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AvroDeserializer;
    use model::DynamicRecord;

    struct TunedDeserializer;

    impl RecordDeserializer for TunedDeserializer {
        type Record = DynamicRecord;

        fn configure(&self, config: &mut ClientConfig) {
            config.set("fetch.max.bytes", "1048576");
            config.set("auto.offset.reset", "latest");
        }

        fn deserialize(&self, _payload: &[u8]) -> Result<DynamicRecord, DecodeError> {
            Ok(DynamicRecord::new())
        }
    }

    #[test]
    fn test_client_config_defaults() {
        let brokers = vec!["kafka-1:9092".to_string(), "kafka-2:9092".to_string()];
        let config = client_config(&brokers, "projector", &AvroDeserializer::new());

        assert_eq!(config.get("bootstrap.servers"), Some("kafka-1:9092,kafka-2:9092"));
        assert_eq!(config.get("group.id"), Some("projector"));
        assert_eq!(config.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(config.get("enable.auto.commit"), Some("true"));
    }

    #[test]
    fn test_deserializer_configure_hook_runs_last() {
        let config = client_config(&["localhost:9092".to_string()], "g", &TunedDeserializer);
        assert_eq!(config.get("fetch.max.bytes"), Some("1048576"));
        assert_eq!(config.get("auto.offset.reset"), Some("latest"));
    }

    #[tokio::test]
    async fn test_close_unsubscribes_until_next_consume() {
        let options = ConsumerOptions::new("rates", "market", "rates", "kafka-rates");
        let source =
            KafkaRecordSource::new(&["localhost:9092".to_string()], &options, AvroDeserializer::new())
                .unwrap();
        assert!(source.subscribed.load(Ordering::Acquire));

        source.close();
        assert!(!source.subscribed.load(Ordering::Acquire));
        source.close();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = source.consume(&cancel).await.unwrap_err();
        assert!(matches!(err, ConsumeError::Cancelled));
        assert!(source.subscribed.load(Ordering::Acquire));
    }

    #[test]
    fn test_explicit_group_id_is_kept() {
        let mut options = ConsumerOptions::new("rates", "market", "rates", "kafka-rates");
        options.group_id = Some("rates-projector".into());
        assert_eq!(resolve_group_id(&options), "rates-projector");
    }

    #[test]
    fn test_missing_group_id_is_random_per_call() {
        let options = ConsumerOptions::new("rates", "market", "rates", "kafka-rates");
        let first = resolve_group_id(&options);
        let second = resolve_group_id(&options);

        assert!(first.starts_with("market-"));
        assert!(second.starts_with("market-"));
        assert_ne!(first, second);
    }
}
