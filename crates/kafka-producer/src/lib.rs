//! Sample record producer for local end-to-end runs.
//!
//! Publishes fake records to a topic in any of the supported wire formats.
//! Keys are drawn from a small fixed pool so that repeated runs exercise both
//! the create and the update path of the projector.

use std::time::Duration;

use anyhow::{Context, Result};
use apache_avro::types::Record;
use apache_avro::{Schema, Writer};
use app_config::{AppConfig, RecordFormat};
use fake::Fake;
use model::{Commodity, ExchangeRate};
use rand::Rng;
use rdkafka::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::{error, info};

const PAIRS: [(&str, &str); 5] = [
    ("EUR", "USD"),
    ("GBP", "USD"),
    ("USD", "JPY"),
    ("AUD", "USD"),
    ("USD", "CHF"),
];

const COMMODITIES: [(&str, &str, &str); 5] = [
    ("XAU", "Gold", "oz"),
    ("XAG", "Silver", "oz"),
    ("WTI", "Crude Oil WTI", "bbl"),
    ("BRENT", "Crude Oil Brent", "bbl"),
    ("NG", "Natural Gas", "MMBtu"),
];

/// Writer schema embedded in every Avro sample.
pub const RATE_AVRO_SCHEMA: &str = r#"{
    "type": "record",
    "name": "Rate",
    "namespace": "market",
    "fields": [
        {"name": "id", "type": "string"},
        {"name": "base", "type": "string"},
        {"name": "quote", "type": "string"},
        {"name": "rate", "type": "double"},
        {"name": "volume", "type": "long"},
        {"name": "active", "type": "boolean"}
    ]
}"#;

/// Publishes `count` sample records to `topic` and returns their keys.
pub async fn produce_samples(
    config: &AppConfig,
    topic: &str,
    format: RecordFormat,
    count: usize,
) -> Result<Vec<String>> {
    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", config.kafka_brokers.join(","))
        .set("message.timeout.ms", "5000")
        .create()
        .context("Failed to create Kafka producer")?;

    info!(topic, ?format, count, "Kafka producer initialized");

    let schema = Schema::parse_str(RATE_AVRO_SCHEMA).context("Invalid sample Avro schema")?;
    let mut keys = Vec::with_capacity(count);
    for _ in 0..count {
        let (key, payload) = sample_message(format, &schema)?;
        let record = FutureRecord::to(topic).key(&key).payload(&payload);

        producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(kafka_err, _)| {
                error!(topic, key = %key, error = %kafka_err, "Failed to publish sample");
                anyhow::anyhow!("Kafka error: {kafka_err}")
            })
            .context("Failed to send message to Kafka")?;

        info!(topic, key = %key, "Sample published");
        keys.push(key);
    }
    Ok(keys)
}

/// Builds one random message in `format`: `(key, payload)`.
pub fn sample_message(format: RecordFormat, avro_schema: &Schema) -> Result<(String, Vec<u8>)> {
    match format {
        RecordFormat::Avro => {
            let rate = sample_exchange_rate();
            let payload = encode_avro_rate(avro_schema, &rate)?;
            Ok((rate.id, payload))
        }
        RecordFormat::ExchangeRate => {
            let rate = sample_exchange_rate();
            let payload = serde_json::to_vec(&rate).context("Failed to serialize exchange rate")?;
            Ok((rate.id, payload))
        }
        RecordFormat::Commodity => {
            let commodity = sample_commodity();
            let payload =
                serde_json::to_vec(&commodity).context("Failed to serialize commodity")?;
            Ok((commodity.code, payload))
        }
    }
}

fn sample_exchange_rate() -> ExchangeRate {
    let mut rng = rand::thread_rng();
    let (base, quote) = PAIRS[rng.gen_range(0..PAIRS.len())];
    ExchangeRate {
        id: format!("{base}{quote}"),
        base: base.to_string(),
        quote: quote.to_string(),
        rate: (0.5..160.0).fake::<f64>(),
        active: rng.gen_bool(0.9),
    }
}

fn sample_commodity() -> Commodity {
    let mut rng = rand::thread_rng();
    let (code, name, unit) = COMMODITIES[rng.gen_range(0..COMMODITIES.len())];
    Commodity {
        code: code.to_string(),
        name: name.to_string(),
        unit: unit.to_string(),
        price: (1.0..3000.0).fake::<f64>(),
    }
}

/// Single-record Avro object container for `rate`.
fn encode_avro_rate(schema: &Schema, rate: &ExchangeRate) -> Result<Vec<u8>> {
    let mut writer = Writer::new(schema, Vec::new());
    let mut record = Record::new(writer.schema()).context("Sample Avro schema is not a record")?;
    record.put("id", rate.id.clone());
    record.put("base", rate.base.clone());
    record.put("quote", rate.quote.clone());
    record.put("rate", rate.rate);
    record.put("volume", (1_000..1_000_000).fake::<i64>());
    record.put("active", rate.active);
    writer.append(record).context("Failed to encode Avro record")?;
    writer.into_inner().context("Failed to flush Avro container")
}

#[cfg(test)]
mod tests {
    use super::*;
    use apache_avro::Reader;
    use apache_avro::types::Value;

    fn schema() -> Schema {
        Schema::parse_str(RATE_AVRO_SCHEMA).unwrap()
    }

    #[test]
    fn test_avro_sample_is_a_container_keyed_by_id() {
        let (key, payload) = sample_message(RecordFormat::Avro, &schema()).unwrap();

        let mut reader = Reader::new(&payload[..]).unwrap();
        assert!(matches!(reader.writer_schema(), Schema::Record(_)));
        let Value::Record(fields) = reader.next().unwrap().unwrap() else {
            panic!("expected a record");
        };
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[0], ("id".to_string(), Value::String(key.clone())));
        assert!(PAIRS.iter().any(|(b, q)| format!("{b}{q}") == key));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_json_samples_match_their_record_types() {
        let (key, payload) = sample_message(RecordFormat::ExchangeRate, &schema()).unwrap();
        let rate: ExchangeRate = serde_json::from_slice(&payload).unwrap();
        assert_eq!(rate.id, key);
        assert_eq!(rate.id, format!("{}{}", rate.base, rate.quote));

        let (key, payload) = sample_message(RecordFormat::Commodity, &schema()).unwrap();
        let commodity: Commodity = serde_json::from_slice(&payload).unwrap();
        assert_eq!(commodity.code, key);
        assert!(commodity.price >= 1.0 && commodity.price < 3000.0);
    }

    #[test]
    fn test_keys_repeat_within_a_small_pool() {
        let keys: std::collections::BTreeSet<_> = (0..50)
            .map(|_| sample_message(RecordFormat::Commodity, &schema()).unwrap().0)
            .collect();
        assert!(keys.len() <= COMMODITIES.len());
    }
}
