//! Reference venue drivers.
//!
//! Each driver implements the [`VenueDriver`](crate::driver::VenueDriver)
//! and [`Normalizer`](crate::normalize::Normalizer) contracts against one
//! venue's wire protocol, composing the substrate from
//! `kestrel-integration`. Further venues plug in the same way, out of
//! core.

pub mod binance;
pub mod hyperliquid;

pub use binance::BinanceUsdm;
pub use hyperliquid::Hyperliquid;
