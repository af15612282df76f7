use std::marker::PhantomData;

use apache_avro::schema::{RecordSchema, SchemaKind};
use apache_avro::types::Value as AvroValue;
use apache_avro::{Reader, Schema};
use model::{DynamicRecord, PrimitiveType, TypedRecord, WireField};
use rdkafka::ClientConfig;
use serde_json::Value;

use crate::DecodeError;

/// Turns a message payload into the record type a handler consumes.
pub trait RecordDeserializer: Send + Sync + 'static {
    type Record: Send + 'static;

    /// Adjusts the consumer configuration. Called once, before the consumer
    /// is created.
    fn configure(&self, _config: &mut ClientConfig) {}

    fn deserialize(&self, payload: &[u8]) -> Result<Self::Record, DecodeError>;
}

/// Decodes Avro object container payloads into [`DynamicRecord`]s.
///
/// The field list comes from the embedded writer schema, which must be a
/// record. Only the first record of the container is used.
#[derive(Debug, Default, Clone, Copy)]
pub struct AvroDeserializer;

impl AvroDeserializer {
    pub fn new() -> Self {
        Self
    }
}

impl RecordDeserializer for AvroDeserializer {
    type Record = DynamicRecord;

    fn deserialize(&self, payload: &[u8]) -> Result<DynamicRecord, DecodeError> {
        let mut reader = Reader::new(payload)?;
        let fields = wire_fields(reader.writer_schema())?;

        let value = reader.next().ok_or(DecodeError::NoRecords)??;
        let AvroValue::Record(values) = value else {
            return Err(DecodeError::NotARecord(kind_name(reader.writer_schema())));
        };

        let mut record = DynamicRecord::new();
        for field in fields {
            let value = match values.iter().find(|(name, _)| *name == field.name) {
                Some((_, value)) => apache_avro::from_value::<Value>(value)?,
                None => Value::Null,
            };
            record.push(field, value);
        }
        Ok(record)
    }
}

fn wire_fields(schema: &Schema) -> Result<Vec<WireField>, DecodeError> {
    let Schema::Record(RecordSchema { fields, .. }) = schema else {
        return Err(DecodeError::NotARecord(kind_name(schema)));
    };
    Ok(fields
        .iter()
        .map(|field| WireField::new(field.name.clone(), primitive_type(&field.schema)))
        .collect())
}

fn primitive_type(schema: &Schema) -> PrimitiveType {
    match schema {
        Schema::Boolean => PrimitiveType::Bool,
        Schema::String => PrimitiveType::String,
        Schema::Int | Schema::Long => PrimitiveType::Int,
        Schema::Float => PrimitiveType::Float,
        Schema::Double => PrimitiveType::Double,
        other => PrimitiveType::Other(kind_name(other)),
    }
}

fn kind_name(schema: &Schema) -> String {
    format!("{:?}", SchemaKind::from(schema)).to_lowercase()
}

/// Decodes JSON payloads into a statically-typed record.
pub struct JsonDeserializer<T> {
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonDeserializer<T> {
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }
}

impl<T> Default for JsonDeserializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TypedRecord> RecordDeserializer for JsonDeserializer<T> {
    type Record = T;

    fn deserialize(&self, payload: &[u8]) -> Result<T, DecodeError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apache_avro::Writer;
    use apache_avro::types::Record;
    use model::{ExchangeRate, WireRecord};
    use serde_json::json;

    const RATE_SCHEMA: &str = r#"{
        "type": "record",
        "name": "Rate",
        "fields": [
            {"name": "price", "type": "float"},
            {"name": "active", "type": "boolean"},
            {"name": "volume", "type": "long"},
            {"name": "code", "type": "string"}
        ]
    }"#;

    fn container(schema: &str, fill: impl Fn(&mut Record)) -> Vec<u8> {
        let schema = Schema::parse_str(schema).unwrap();
        let mut writer = Writer::new(&schema, Vec::new());
        let mut record = Record::new(writer.schema()).unwrap();
        fill(&mut record);
        writer.append(record).unwrap();
        writer.into_inner().unwrap()
    }

    #[test]
    fn test_avro_record_keeps_writer_field_order_and_types() {
        let payload = container(RATE_SCHEMA, |r| {
            r.put("price", 1.5f32);
            r.put("active", true);
            r.put("volume", 42i64);
            r.put("code", "EUR".to_string());
        });

        let record = AvroDeserializer::new().deserialize(&payload).unwrap();

        assert_eq!(
            record.fields().to_vec(),
            vec![
                WireField::new("price", PrimitiveType::Float),
                WireField::new("active", PrimitiveType::Bool),
                WireField::new("volume", PrimitiveType::Int),
                WireField::new("code", PrimitiveType::String),
            ]
        );
        assert_eq!(record.value("price"), Some(json!(1.5)));
        assert_eq!(record.value("active"), Some(json!(true)));
        assert_eq!(record.value("volume"), Some(json!(42)));
        assert_eq!(record.value("code"), Some(json!("EUR")));
    }

    #[test]
    fn test_avro_complex_field_is_reported_as_other() {
        let schema = r#"{
            "type": "record",
            "name": "Tagged",
            "fields": [
                {"name": "id", "type": "string"},
                {"name": "tags", "type": {"type": "array", "items": "string"}}
            ]
        }"#;
        let payload = container(schema, |r| {
            r.put("id", "A".to_string());
            r.put("tags", AvroValue::Array(vec![AvroValue::String("x".into())]));
        });

        let record = AvroDeserializer::new().deserialize(&payload).unwrap();
        assert_eq!(
            record.fields()[1],
            WireField::new("tags", PrimitiveType::Other("array".into()))
        );
    }

    #[test]
    fn test_avro_non_record_schema_is_rejected() {
        let schema = Schema::parse_str(r#""string""#).unwrap();
        let mut writer = Writer::new(&schema, Vec::new());
        writer.append(AvroValue::String("A".into())).unwrap();
        let payload = writer.into_inner().unwrap();

        let err = AvroDeserializer::new().deserialize(&payload).unwrap_err();
        assert!(matches!(err, DecodeError::NotARecord(ref kind) if kind == "string"));
    }

    #[test]
    fn test_avro_garbage_is_a_decode_error() {
        let err = AvroDeserializer::new()
            .deserialize(b"definitely not avro")
            .unwrap_err();
        assert!(matches!(err, DecodeError::Avro(_)));
    }

    #[test]
    fn test_json_typed_record() {
        let payload = br#"{"id":"EURUSD","base":"EUR","quote":"USD","rate":1.08,"active":true}"#;

        let rate = JsonDeserializer::<ExchangeRate>::new()
            .deserialize(payload)
            .unwrap();
        assert_eq!(rate.id, "EURUSD");
        assert_eq!(rate.rate, 1.08);

        let err = JsonDeserializer::<ExchangeRate>::new()
            .deserialize(br#"{"id":"EURUSD"}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }
}
