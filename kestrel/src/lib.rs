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

//! # Kestrel
//!
//! A unified client library for perpetual-futures venues. One trading
//! abstraction — markets, tickers, order books, trades, funding rates,
//! orders, positions, balances and streaming feeds — over a heterogeneous
//! collection of REST + WebSocket venues that differ in symbol
//! conventions, authentication schemes, error vocabularies, rate-limit
//! models and channel layouts.
//!
//! ## Crates
//!
//! * [`markets`] — the canonical data model and error taxonomy.
//! * [`integration`] — the execution substrate every driver composes:
//!   weighted rate limiting, circuit breaking, retriable HTTP with
//!   correlation ids, pluggable signing, nonce/session management, the
//!   WebSocket runtime and metric emission.
//! * [`execution`] — the capability-gated driver contract, the
//!   normalization contract, and the reference drivers.
//!
//! ## Example
//!
//! ```rust,ignore
//! use kestrel::execution::{VenueConfig, VenueDriver};
//! use kestrel::execution::venue::BinanceUsdm;
//! use kestrel::markets::Symbol;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     kestrel::logging::init_logging();
//!
//!     let driver = BinanceUsdm::new(VenueConfig::default())?;
//!     driver.initialize().await?;
//!
//!     let symbol = Symbol::new("BTC/USDT:USDT")?;
//!     let book = driver.fetch_order_book(&symbol, Some(20)).await?;
//!     println!("best bid: {:?}", book.best_bid());
//!
//!     driver.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub use kestrel_execution as execution;
pub use kestrel_integration as integration;
pub use kestrel_markets as markets;

pub mod logging;

pub use kestrel_markets::{Symbol, VenueError, VenueId, VenueResult};
