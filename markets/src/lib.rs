#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments, type_alias_bounds)]

//! # Kestrel-Markets
//!
//! Canonical data structures shared by every Kestrel venue driver: symbols,
//! markets, order books, trades, tickers, funding rates, orders, positions
//! and balances, plus the venue identifier and the error taxonomy.
//!
//! Everything in this crate is pure data — no I/O, no async. Venue drivers
//! translate their wire payloads into these types via their normalizers, so
//! callers only ever see one shape regardless of the venue.
//!
//! ## Conventions
//!
//! * Symbols use the canonical `BASE/QUOTE[:SETTLE]` form, uppercase. For
//!   perpetuals the settle currency equals the quote currency.
//! * All numeric fields are finite `f64`.
//! * All timestamps are integer milliseconds since the Unix epoch.

pub mod balance;
pub mod book;
pub mod error;
pub mod funding;
pub mod market;
pub mod order;
pub mod position;
pub mod symbol;
pub mod ticker;
pub mod trade;
pub mod venue;

pub use balance::Balance;
pub use book::{BookLevel, OrderBook};
pub use error::{ErrorKind, VenueError, VenueResult};
pub use funding::FundingRate;
pub use market::{Market, MarketType};
pub use order::{
    Order, OrderRequest, OrderSide, OrderStatus, OrderType, TimeInForce,
};
pub use position::{MarginMode, Position, PositionSide, POSITION_EPSILON};
pub use symbol::Symbol;
pub use ticker::{Ohlcv, Ticker};
pub use trade::Trade;
pub use venue::VenueId;
