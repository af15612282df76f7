//! Statically-typed wire records, one type per external entity kind.

use std::borrow::Cow;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ContentData, PrimitiveType, WireField, WireRecord};

/// Contract for records whose shape is fixed at compile time.
///
/// Such records know which schema they belong to and which content field
/// carries their external identifier.
pub trait TypedRecord: WireRecord + DeserializeOwned + 'static {
    /// External identifier.
    fn id(&self) -> &str;

    /// Name of the content field holding [`TypedRecord::id`].
    fn id_field_name(&self) -> &'static str;

    /// Target schema name.
    fn schema_name(&self) -> &'static str;

    /// Content payload for this record.
    fn to_field_data(&self) -> ContentData;
}

/// Exchange rate between two currencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub id: String,
    pub base: String,
    pub quote: String,
    pub rate: f64,
    pub active: bool,
}

impl WireRecord for ExchangeRate {
    fn fields(&self) -> Cow<'_, [WireField]> {
        Cow::Owned(vec![
            WireField::new("id", PrimitiveType::String),
            WireField::new("base", PrimitiveType::String),
            WireField::new("quote", PrimitiveType::String),
            WireField::new("rate", PrimitiveType::Double),
            WireField::new("active", PrimitiveType::Bool),
        ])
    }

    fn value(&self, name: &str) -> Option<Value> {
        self.to_field_data().remove(name)
    }
}

impl TypedRecord for ExchangeRate {
    fn id(&self) -> &str {
        &self.id
    }

    fn id_field_name(&self) -> &'static str {
        "id"
    }

    fn schema_name(&self) -> &'static str {
        "exchange-rates"
    }

    fn to_field_data(&self) -> ContentData {
        let mut data = ContentData::new();
        data.insert("id".into(), Value::from(self.id.as_str()));
        data.insert("base".into(), Value::from(self.base.as_str()));
        data.insert("quote".into(), Value::from(self.quote.as_str()));
        data.insert("rate".into(), Value::from(self.rate));
        data.insert("active".into(), Value::from(self.active));
        data
    }
}

/// Traded commodity with its current price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commodity {
    pub code: String,
    pub name: String,
    pub unit: String,
    pub price: f64,
}

impl WireRecord for Commodity {
    fn fields(&self) -> Cow<'_, [WireField]> {
        Cow::Owned(vec![
            WireField::new("code", PrimitiveType::String),
            WireField::new("name", PrimitiveType::String),
            WireField::new("unit", PrimitiveType::String),
            WireField::new("price", PrimitiveType::Double),
        ])
    }

    fn value(&self, name: &str) -> Option<Value> {
        self.to_field_data().remove(name)
    }
}

impl TypedRecord for Commodity {
    fn id(&self) -> &str {
        &self.code
    }

    fn id_field_name(&self) -> &'static str {
        "code"
    }

    fn schema_name(&self) -> &'static str {
        "commodities"
    }

    fn to_field_data(&self) -> ContentData {
        let mut data = ContentData::new();
        data.insert("code".into(), Value::from(self.code.as_str()));
        data.insert("name".into(), Value::from(self.name.as_str()));
        data.insert("unit".into(), Value::from(self.unit.as_str()));
        data.insert("price".into(), Value::from(self.price));
        data
    }
}
