//! Typed Quote View
//!
//! A read-only, strongly typed view over a merged quote record. Prices are
//! [`Decimal`] parsed from the JSON number text so no float rounding creeps
//! in. The event stream keeps carrying raw records; this is a convenience for
//! consumers that know the upstream quote shape.

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::domain::delta::DeltaRecord;

/// Error building a [`Quote`] from a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteError {
    /// A required field is absent or null.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field has the wrong type or cannot be parsed.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// What was wrong.
        reason: String,
    },
}

/// Stock quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    /// Ticker symbol.
    pub symbol: String,
    /// Last price.
    pub price: Decimal,
    /// Change from previous close.
    pub change: Decimal,
    /// Percent change from previous close.
    pub change_percent: Decimal,
    /// Session volume.
    pub volume: u64,
    /// Session high.
    pub high: Decimal,
    /// Session low.
    pub low: Decimal,
    /// Session open.
    pub open: Decimal,
    /// Previous session close.
    pub previous_close: Decimal,
    /// Quote time.
    pub timestamp: DateTime<Utc>,
    /// Company name.
    pub name: Option<String>,
    /// Sector.
    pub sector: Option<String>,
    /// Market capitalization.
    pub market_cap: Option<Decimal>,
    /// Price/earnings ratio.
    pub pe_ratio: Option<Decimal>,
    /// Dividend yield.
    pub dividend_yield: Option<Decimal>,
    /// 52-week high.
    pub fifty_two_week_high: Option<Decimal>,
    /// 52-week low.
    pub fifty_two_week_low: Option<Decimal>,
}

impl Quote {
    /// Build a typed view over a merged record.
    ///
    /// `symbol` falls back to the record key.
    ///
    /// # Errors
    ///
    /// Returns [`QuoteError::MissingField`] if a required field is absent and
    /// [`QuoteError::InvalidField`] if a field has the wrong type.
    pub fn from_record(record: &DeltaRecord) -> Result<Self, QuoteError> {
        let fields = &record.fields;
        let required = |name: &'static str| -> Result<Decimal, QuoteError> {
            optional_decimal(fields.get(name), name)?.ok_or(QuoteError::MissingField(name))
        };
        let optional = |name: &'static str| optional_decimal(fields.get(name), name);

        let symbol = match fields.get("symbol") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => record.key.clone(),
            Some(other) => return Err(invalid("symbol", other)),
        };

        Ok(Self {
            symbol,
            price: required("price")?,
            change: required("change")?,
            change_percent: required("change_percent")?,
            volume: volume(fields.get("volume"))?,
            high: required("high")?,
            low: required("low")?,
            open: required("open")?,
            previous_close: required("previous_close")?,
            timestamp: timestamp(fields.get("timestamp"))?,
            name: optional_string(fields.get("name"), "name")?,
            sector: optional_string(fields.get("sector"), "sector")?,
            market_cap: optional("market_cap")?,
            pe_ratio: optional("pe_ratio")?,
            dividend_yield: optional("dividend_yield")?,
            fifty_two_week_high: optional("fifty_two_week_high")?,
            fifty_two_week_low: optional("fifty_two_week_low")?,
        })
    }
}

// =============================================================================
// Field parsing
// =============================================================================

fn invalid(field: &'static str, value: &Value) -> QuoteError {
    QuoteError::InvalidField {
        field,
        reason: format!("unexpected value {value}"),
    }
}

fn parse_decimal(text: &str, field: &'static str) -> Result<Decimal, QuoteError> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|e| QuoteError::InvalidField {
            field,
            reason: e.to_string(),
        })
}

fn optional_decimal(
    value: Option<&Value>,
    field: &'static str,
) -> Result<Option<Decimal>, QuoteError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => parse_decimal(&n.to_string(), field).map(Some),
        Some(Value::String(s)) => parse_decimal(s, field).map(Some),
        Some(other) => Err(invalid(field, other)),
    }
}

fn optional_string(
    value: Option<&Value>,
    field: &'static str,
) -> Result<Option<String>, QuoteError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(invalid(field, other)),
    }
}

fn volume(value: Option<&Value>) -> Result<u64, QuoteError> {
    match value {
        None | Some(Value::Null) => Err(QuoteError::MissingField("volume")),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| invalid("volume", &Value::Number(n.clone()))),
        Some(Value::String(s)) => {
            s.parse::<u64>()
                .map_err(|e| QuoteError::InvalidField {
                    field: "volume",
                    reason: e.to_string(),
                })
        }
        Some(other) => Err(invalid("volume", other)),
    }
}

fn timestamp(value: Option<&Value>) -> Result<DateTime<Utc>, QuoteError> {
    match value {
        None | Some(Value::Null) => Err(QuoteError::MissingField("timestamp")),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| QuoteError::InvalidField {
                field: "timestamp",
                reason: e.to_string(),
            }),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| invalid("timestamp", &Value::Number(n.clone()))),
        Some(other) => Err(invalid("timestamp", other)),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> DeltaRecord {
        let Value::Object(fields) = value else {
            panic!("expected object");
        };
        DeltaRecord {
            key: "AAPL".into(),
            fields,
            changed_fields: None,
        }
    }

    fn full_quote() -> Value {
        json!({
            "symbol": "AAPL",
            "price": 189.95,
            "change": -1.05,
            "change_percent": -0.55,
            "volume": 51_234_567,
            "high": 191.2,
            "low": 188.1,
            "open": 190.0,
            "previous_close": 191.0,
            "timestamp": "2024-03-15T14:30:00Z",
            "name": "Apple Inc.",
            "market_cap": 2_950_000_000_000_u64
        })
    }

    #[test]
    fn parses_full_quote_without_float_rounding() {
        let quote = Quote::from_record(&record(full_quote())).unwrap();

        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.price, Decimal::from_str("189.95").unwrap());
        assert_eq!(quote.change, Decimal::from_str("-1.05").unwrap());
        assert_eq!(quote.volume, 51_234_567);
        assert_eq!(quote.timestamp.to_rfc3339(), "2024-03-15T14:30:00+00:00");
        assert_eq!(quote.name.as_deref(), Some("Apple Inc."));
        assert_eq!(quote.market_cap, Some(Decimal::from(2_950_000_000_000_u64)));
        assert!(quote.sector.is_none());
        assert!(quote.pe_ratio.is_none());
    }

    #[test]
    fn symbol_falls_back_to_key() {
        let mut value = full_quote();
        value.as_object_mut().unwrap().remove("symbol");

        let quote = Quote::from_record(&record(value)).unwrap();

        assert_eq!(quote.symbol, "AAPL");
    }

    #[test]
    fn epoch_millis_timestamp() {
        let mut value = full_quote();
        value["timestamp"] = json!(1_710_513_000_000_i64);

        let quote = Quote::from_record(&record(value)).unwrap();

        assert_eq!(quote.timestamp.timestamp_millis(), 1_710_513_000_000);
    }

    #[test]
    fn string_prices_are_accepted() {
        let mut value = full_quote();
        value["price"] = json!("189.9500");

        let quote = Quote::from_record(&record(value)).unwrap();

        assert_eq!(quote.price, Decimal::from_str("189.95").unwrap());
    }

    #[test]
    fn missing_required_field() {
        let mut value = full_quote();
        value.as_object_mut().unwrap().remove("previous_close");

        assert_eq!(
            Quote::from_record(&record(value)),
            Err(QuoteError::MissingField("previous_close"))
        );
    }

    #[test]
    fn invalid_field_type() {
        let mut value = full_quote();
        value["volume"] = json!(-3);

        assert!(matches!(
            Quote::from_record(&record(value)),
            Err(QuoteError::InvalidField { field: "volume", .. })
        ));
    }

    #[test]
    fn invalid_timestamp() {
        let mut value = full_quote();
        value["timestamp"] = json!("yesterday");

        assert!(matches!(
            Quote::from_record(&record(value)),
            Err(QuoteError::InvalidField {
                field: "timestamp",
                ..
            })
        ));
    }
}
