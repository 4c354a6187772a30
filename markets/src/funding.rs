//! Canonical funding-rate data.

use crate::symbol::Symbol;
use serde::{Deserialize, Serialize};

/// Current or historical funding information for a perpetual market.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FundingRate {
    pub symbol: Symbol,
    pub funding_rate: f64,
    /// Timestamp the rate applies to (or was settled at, for history).
    pub funding_timestamp: i64,
    pub next_funding_timestamp: Option<i64>,
    pub mark_price: Option<f64>,
    pub index_price: Option<f64>,
    pub funding_interval_hours: Option<u32>,
}

impl FundingRate {
    /// Annualized rate assuming the venue's funding interval, when known.
    pub fn annualized(&self) -> Option<f64> {
        let interval = self.funding_interval_hours? as f64;
        if interval <= 0.0 {
            return None;
        }
        Some(self.funding_rate * (24.0 / interval) * 365.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol;

    #[test]
    fn test_annualized_rate() {
        let funding = FundingRate {
            symbol: symbol::build_perpetual("BTC", "USDT"),
            funding_rate: 0.0001,
            funding_timestamp: 0,
            next_funding_timestamp: None,
            mark_price: None,
            index_price: None,
            funding_interval_hours: Some(8),
        };
        let annual = funding.annualized().unwrap();
        assert!((annual - 0.1095).abs() < 1e-9);
    }

    #[test]
    fn test_annualized_requires_interval() {
        let funding = FundingRate {
            symbol: symbol::build_perpetual("BTC", "USDT"),
            funding_rate: 0.0001,
            funding_timestamp: 0,
            next_funding_timestamp: None,
            mark_price: None,
            index_price: None,
            funding_interval_hours: None,
        };
        assert!(funding.annualized().is_none());
    }
}
