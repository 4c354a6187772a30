//! Canonical tickers and OHLCV candles.

use crate::symbol::Symbol;
use serde::{Deserialize, Serialize};

/// 24-hour rolling ticker statistics.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Ticker {
    pub symbol: Symbol,
    pub last: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub close: f64,
    /// Absolute change over the window (`close - open`).
    pub change: f64,
    /// Relative change over the window, in percent.
    pub percentage: f64,
    pub base_volume: f64,
    pub quote_volume: f64,
    pub timestamp: i64,
    pub raw: serde_json::Value,
}

/// A single candle: `(timestamp, open, high, low, close, volume)`.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct Ohlcv {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl From<(i64, f64, f64, f64, f64, f64)> for Ohlcv {
    fn from((timestamp, open, high, low, close, volume): (i64, f64, f64, f64, f64, f64)) -> Self {
        Self { timestamp, open, high, low, close, volume }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ohlcv_from_tuple() {
        let candle = Ohlcv::from((1_700_000_000_000, 10.0, 12.0, 9.0, 11.0, 1000.0));
        assert_eq!(candle.timestamp, 1_700_000_000_000);
        assert_eq!(candle.high, 12.0);
        assert_eq!(candle.volume, 1000.0);
    }
}
