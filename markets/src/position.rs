//! Canonical positions.

use crate::symbol::Symbol;
use serde::{Deserialize, Serialize};

/// Sizes below this are treated as closed positions and excluded from
/// listings.
pub const POSITION_EPSILON: f64 = 1e-12;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    Cross,
    Isolated,
}

/// An open perpetual position in canonical shape.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: Symbol,
    pub side: PositionSide,
    /// Absolute position size in base units, `>= 0`.
    pub size: f64,
    pub entry_price: f64,
    pub mark_price: f64,
    pub liquidation_price: Option<f64>,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub leverage: f64,
    pub margin_mode: MarginMode,
    pub margin: f64,
    pub timestamp: i64,
}

impl Position {
    /// True when the position is effectively open.
    pub fn is_open(&self) -> bool {
        self.size.abs() >= POSITION_EPSILON
    }

    /// Signed size: negative for shorts.
    pub fn signed_size(&self) -> f64 {
        match self.side {
            PositionSide::Long => self.size,
            PositionSide::Short => -self.size,
        }
    }

    /// Notional value at the mark price.
    pub fn notional(&self) -> f64 {
        self.size * self.mark_price
    }
}
