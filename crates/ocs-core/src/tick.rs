//! Latest-value tick record.
//!
//! The feed delivers partial updates: the first message for an instrument
//! carries every field, later ones only the fields that changed. Values are
//! kept as the raw text the feed sent; numeric interpretation happens where a
//! value is used so that a malformed field degrades to "unknown" instead of
//! rejecting the whole update.

use crate::decimal::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Latest known field values for one instrument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tick {
    #[serde(rename = "lp")]
    #[serde(deserialize_with = "raw_field", skip_serializing_if = "Option::is_none")]
    pub last_price: Option<String>,
    #[serde(rename = "o")]
    #[serde(deserialize_with = "raw_field", skip_serializing_if = "Option::is_none")]
    pub open: Option<String>,
    #[serde(rename = "h")]
    #[serde(deserialize_with = "raw_field", skip_serializing_if = "Option::is_none")]
    pub high: Option<String>,
    #[serde(rename = "l")]
    #[serde(deserialize_with = "raw_field", skip_serializing_if = "Option::is_none")]
    pub low: Option<String>,
    /// Previous session close.
    #[serde(rename = "c")]
    #[serde(deserialize_with = "raw_field", skip_serializing_if = "Option::is_none")]
    pub prev_close: Option<String>,
    #[serde(rename = "v")]
    #[serde(deserialize_with = "raw_field", skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(rename = "oi")]
    #[serde(deserialize_with = "raw_field", skip_serializing_if = "Option::is_none")]
    pub open_interest: Option<String>,
    #[serde(rename = "poi")]
    #[serde(deserialize_with = "raw_field", skip_serializing_if = "Option::is_none")]
    pub prev_open_interest: Option<String>,
    /// Trading symbol / display name.
    #[serde(rename = "ts")]
    #[serde(deserialize_with = "raw_field", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "toi")]
    #[serde(deserialize_with = "raw_field", skip_serializing_if = "Option::is_none")]
    pub total_open_interest: Option<String>,
}

impl Tick {
    /// Merge a partial update into this record.
    ///
    /// Fields present in `update` overwrite; absent fields are left unchanged.
    pub fn merge(&mut self, update: Tick) {
        fn take(slot: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.last_price, update.last_price);
        take(&mut self.open, update.open);
        take(&mut self.high, update.high);
        take(&mut self.low, update.low);
        take(&mut self.prev_close, update.prev_close);
        take(&mut self.volume, update.volume);
        take(&mut self.open_interest, update.open_interest);
        take(&mut self.prev_open_interest, update.prev_open_interest);
        take(&mut self.display_name, update.display_name);
        take(&mut self.total_open_interest, update.total_open_interest);
    }

    /// True when the update carries no known field.
    pub fn is_empty(&self) -> bool {
        *self == Tick::default()
    }

    /// Parsed last-traded price, `None` when absent or malformed.
    pub fn last_price_value(&self) -> Option<Price> {
        self.last_price.as_deref().and_then(Price::parse_lenient)
    }

    /// Parsed previous close, `None` when absent or malformed.
    pub fn prev_close_value(&self) -> Option<Price> {
        self.prev_close.as_deref().and_then(Price::parse_lenient)
    }
}

/// Parse a raw field as a decimal, `None` when absent or malformed.
pub fn parse_numeric(raw: Option<&str>) -> Option<Decimal> {
    raw.and_then(Price::parse_lenient).map(|p| p.inner())
}

/// Accept either a JSON string or a JSON number and keep its text form.
fn raw_field<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    }))
}
