//! Canonical public and private trades.

use crate::order::OrderSide;
use crate::symbol::Symbol;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A single executed trade.
///
/// `cost` equals `price * amount` within venue rounding; normalizers derive
/// it when the venue omits it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Trade {
    pub id: SmolStr,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub price: f64,
    pub amount: f64,
    pub cost: f64,
    pub timestamp: i64,
    pub raw: serde_json::Value,
}

impl Trade {
    /// True when `cost` agrees with `price * amount` within `tolerance`
    /// (relative).
    pub fn cost_consistent(&self, tolerance: f64) -> bool {
        let expected = self.price * self.amount;
        if expected == 0.0 {
            return self.cost == 0.0;
        }
        ((self.cost - expected) / expected).abs() <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol;

    #[test]
    fn test_cost_consistency() {
        let trade = Trade {
            id: "1".into(),
            symbol: symbol::build_perpetual("BTC", "USDT"),
            side: OrderSide::Buy,
            price: 50_000.0,
            amount: 0.1,
            cost: 5_000.0,
            timestamp: 0,
            raw: serde_json::Value::Null,
        };
        assert!(trade.cost_consistent(1e-9));

        let skewed = Trade { cost: 5_100.0, ..trade };
        assert!(!skewed.cost_consistent(1e-9));
    }
}
