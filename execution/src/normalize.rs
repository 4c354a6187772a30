//! The normalization contract.
//!
//! Every venue driver owns a [`Normalizer`]: a pure, deterministic,
//! I/O-free translator between venue wire payloads and the canonical
//! `kestrel-markets` shapes, in both directions.

use kestrel_markets::{
    Balance, BookLevel, ErrorKind, FundingRate, Market, Ohlcv, Order, OrderBook, OrderRequest,
    Position, Symbol, Ticker, Trade, VenueError, VenueResult,
};
use serde_json::Value;

/// Bidirectional venue-shape <-> canonical-shape transformation.
///
/// Payloads that do not carry their own symbol (books, public trades) take
/// the canonical symbol as context.
pub trait Normalizer: Send + Sync {
    fn market(&self, raw: &Value) -> VenueResult<Market>;
    fn ticker(&self, raw: &Value) -> VenueResult<Ticker>;
    fn order_book(&self, raw: &Value, symbol: &Symbol) -> VenueResult<OrderBook>;
    fn trade(&self, raw: &Value, symbol: &Symbol) -> VenueResult<Trade>;
    fn order(&self, raw: &Value) -> VenueResult<Order>;
    /// `None` for rows describing closed positions; drivers exclude them.
    fn position(&self, raw: &Value) -> VenueResult<Option<Position>>;
    fn balances(&self, raw: &Value) -> VenueResult<Vec<Balance>>;
    fn funding_rate(&self, raw: &Value) -> VenueResult<FundingRate>;
    fn ohlcv(&self, raw: &Value) -> VenueResult<Ohlcv>;
    /// Canonical order request -> venue request payload.
    fn order_request(&self, request: &OrderRequest) -> VenueResult<Value>;
}

/// Field-access helpers shared by normalizer implementations. Venue
/// payloads mix JSON numbers and decimal strings freely; these accept
/// both.
pub mod util {
    use super::*;

    pub fn malformed(what: &str) -> VenueError {
        VenueError::new(ErrorKind::Unknown, format!("malformed venue payload: {what}"))
    }

    pub fn str_field<'a>(raw: &'a Value, key: &str) -> VenueResult<&'a str> {
        raw.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(key))
    }

    pub fn f64_field(raw: &Value, key: &str) -> VenueResult<f64> {
        raw.get(key)
            .map(parse_f64)
            .transpose()?
            .ok_or_else(|| malformed(key))
    }

    pub fn f64_field_or(raw: &Value, key: &str, default: f64) -> f64 {
        raw.get(key)
            .map(parse_f64)
            .transpose()
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    pub fn i64_field(raw: &Value, key: &str) -> VenueResult<i64> {
        match raw.get(key) {
            Some(Value::Number(number)) => number.as_i64().ok_or_else(|| malformed(key)),
            Some(Value::String(text)) => {
                text.parse::<i64>().map_err(|_| malformed(key))
            }
            _ => Err(malformed(key)),
        }
    }

    /// Parse a numeric value that may be a JSON number or decimal string.
    pub fn parse_f64(value: &Value) -> VenueResult<f64> {
        let parsed = match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed
            .filter(|parsed| parsed.is_finite())
            .ok_or_else(|| malformed("numeric field"))
    }

    /// Parse a `[["price","size"], ...]` side.
    pub fn parse_levels(raw: &Value) -> VenueResult<Vec<BookLevel>> {
        raw.as_array()
            .ok_or_else(|| malformed("book side"))?
            .iter()
            .map(|level| {
                let pair = level.as_array().ok_or_else(|| malformed("book level"))?;
                if pair.len() < 2 {
                    return Err(malformed("book level"));
                }
                Ok(BookLevel {
                    price: parse_f64(&pair[0])?,
                    size: parse_f64(&pair[1])?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::util::*;

    #[test]
    fn test_parse_f64_accepts_strings_and_numbers() {
        assert_eq!(parse_f64(&serde_json::json!("50000.5")).unwrap(), 50_000.5);
        assert_eq!(parse_f64(&serde_json::json!(2)).unwrap(), 2.0);
        assert!(parse_f64(&serde_json::json!("NaN")).is_err());
        assert!(parse_f64(&serde_json::json!(null)).is_err());
    }

    #[test]
    fn test_parse_levels() {
        let raw = serde_json::json!([["49990", "2"], ["50000", "1.5"]]);
        let levels = parse_levels(&raw).unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].price, 49_990.0);
        assert_eq!(levels[1].size, 1.5);
        assert!(parse_levels(&serde_json::json!([["x"]])).is_err());
    }

    #[test]
    fn test_field_helpers() {
        let raw = serde_json::json!({"symbol": "BTCUSDT", "qty": "0.5", "time": 1700000000000i64});
        assert_eq!(str_field(&raw, "symbol").unwrap(), "BTCUSDT");
        assert_eq!(f64_field(&raw, "qty").unwrap(), 0.5);
        assert_eq!(i64_field(&raw, "time").unwrap(), 1_700_000_000_000);
        assert_eq!(f64_field_or(&raw, "missing", 7.0), 7.0);
        assert!(str_field(&raw, "missing").is_err());
    }
}
