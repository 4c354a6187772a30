//! Venue identifiers.
//!
//! [`VenueId`] is the closed set of perpetual-futures venues Kestrel knows
//! about. Drivers are keyed by it, errors carry it as provenance, and
//! metrics tag series with it.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Identifies a trading venue supported by Kestrel.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueId {
    /// Binance USD-margined perpetual futures
    BinanceUsdm,
    /// Bybit derivatives
    Bybit,
    /// Hyperliquid perpetual DEX
    Hyperliquid,
    /// Paradex (StarkEx-based perpetual DEX)
    Paradex,
    /// Backpack exchange
    Backpack,
    /// GRVT hybrid exchange
    Grvt,
    /// edgeX perpetual DEX
    Edgex,
    /// Extended (X10) perpetual DEX
    Extended,
    /// Drift protocol on Solana
    Drift,
    /// dYdX v4 (Cosmos app-chain)
    Dydx,
    /// Lighter perpetual DEX
    Lighter,
    /// Mock venue for testing
    Mock,
}

impl VenueId {
    /// Returns the canonical string identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueId::BinanceUsdm => "binance_usdm",
            VenueId::Bybit => "bybit",
            VenueId::Hyperliquid => "hyperliquid",
            VenueId::Paradex => "paradex",
            VenueId::Backpack => "backpack",
            VenueId::Grvt => "grvt",
            VenueId::Edgex => "edgex",
            VenueId::Extended => "extended",
            VenueId::Drift => "drift",
            VenueId::Dydx => "dydx",
            VenueId::Lighter => "lighter",
            VenueId::Mock => "mock",
        }
    }

    /// Returns true if the venue settles on-chain (DEX-style custody).
    pub fn is_onchain(&self) -> bool {
        matches!(
            self,
            VenueId::Hyperliquid
                | VenueId::Paradex
                | VenueId::Grvt
                | VenueId::Edgex
                | VenueId::Extended
                | VenueId::Drift
                | VenueId::Dydx
                | VenueId::Lighter
        )
    }

    /// Returns true if this is a testing venue.
    pub fn is_test(&self) -> bool {
        matches!(self, VenueId::Mock)
    }
}

impl FromStr for VenueId {
    type Err = crate::error::VenueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binance_usdm" | "binanceusdm" => Ok(VenueId::BinanceUsdm),
            "bybit" => Ok(VenueId::Bybit),
            "hyperliquid" => Ok(VenueId::Hyperliquid),
            "paradex" => Ok(VenueId::Paradex),
            "backpack" => Ok(VenueId::Backpack),
            "grvt" => Ok(VenueId::Grvt),
            "edgex" => Ok(VenueId::Edgex),
            "extended" => Ok(VenueId::Extended),
            "drift" => Ok(VenueId::Drift),
            "dydx" => Ok(VenueId::Dydx),
            "lighter" => Ok(VenueId::Lighter),
            "mock" => Ok(VenueId::Mock),
            other => Err(crate::error::VenueError::new(
                crate::error::ErrorKind::InvalidParameter,
                format!("unknown venue id: {other}"),
            )),
        }
    }
}

impl Display for VenueId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
