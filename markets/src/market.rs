//! Canonical market descriptors.

use crate::error::{ErrorKind, VenueError, VenueResult};
use crate::symbol::Symbol;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Classifies a market by settlement style.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    Spot,
    /// Perpetual swap — settled via funding payments, no expiry.
    Swap,
}

/// A tradeable market as advertised by a venue, in canonical shape.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Market {
    /// Venue-native market id, verbatim (e.g. `BTCUSDT`, `BTC`).
    pub id: SmolStr,
    pub symbol: Symbol,
    pub base: SmolStr,
    pub quote: SmolStr,
    /// Settle currency; present exactly when the market is a perpetual.
    pub settle: Option<SmolStr>,
    pub active: bool,
    /// Minimum order amount in base units.
    pub min_amount: f64,
    /// Number of decimal digits accepted in prices.
    pub price_precision: u32,
    /// Number of decimal digits accepted in amounts.
    pub amount_precision: u32,
    pub price_tick_size: f64,
    pub amount_step_size: f64,
    pub maker_fee: f64,
    pub taker_fee: f64,
    pub max_leverage: f64,
    pub funding_interval_hours: Option<u32>,
    /// Untouched venue payload for callers that need venue specifics.
    pub raw: serde_json::Value,
}

impl Market {
    pub fn is_perpetual(&self) -> bool {
        self.settle.is_some()
    }

    pub fn market_type(&self) -> MarketType {
        if self.is_perpetual() {
            MarketType::Swap
        } else {
            MarketType::Spot
        }
    }

    /// Check structural invariants: strictly positive step sizes and
    /// settle/symbol agreement.
    pub fn validate(&self) -> VenueResult<()> {
        if !(self.price_tick_size > 0.0) || !(self.amount_step_size > 0.0) {
            return Err(VenueError::new(
                ErrorKind::Validation,
                format!(
                    "market {} has non-positive tick or step size",
                    self.symbol
                ),
            ));
        }
        if self.settle.is_some() != self.symbol.is_perpetual() {
            return Err(VenueError::new(
                ErrorKind::Validation,
                format!("market {} settle does not match symbol form", self.symbol),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol;

    fn perp_market() -> Market {
        Market {
            id: "BTCUSDT".into(),
            symbol: symbol::build_perpetual("BTC", "USDT"),
            base: "BTC".into(),
            quote: "USDT".into(),
            settle: Some("USDT".into()),
            active: true,
            min_amount: 0.001,
            price_precision: 2,
            amount_precision: 3,
            price_tick_size: 0.1,
            amount_step_size: 0.001,
            maker_fee: 0.0002,
            taker_fee: 0.0004,
            max_leverage: 125.0,
            funding_interval_hours: Some(8),
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_market_validates() {
        let market = perp_market();
        market.validate().unwrap();
        assert!(market.is_perpetual());
        assert_eq!(market.market_type(), MarketType::Swap);
    }

    #[test]
    fn test_market_rejects_zero_tick() {
        let mut market = perp_market();
        market.price_tick_size = 0.0;
        assert!(market.validate().is_err());
    }

    #[test]
    fn test_market_rejects_settle_mismatch() {
        let mut market = perp_market();
        market.settle = None;
        assert!(market.validate().is_err());
    }
}
