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

//! # Kestrel-Execution
//!
//! The venue driver framework: one capability-gated trading contract over
//! heterogeneous perpetual-futures venues, plus the reference drivers that
//! implement it.
//!
//! A [`VenueDriver`](driver::VenueDriver) composes the substrate from
//! `kestrel-integration` — rate limiter, circuit breaker, HTTP pipeline,
//! signer, WebSocket runtime, metrics — and owns them exclusively:
//! created in the constructor, released on `disconnect`. Its
//! [`Normalizer`](normalize::Normalizer) translates venue payloads into
//! the canonical `kestrel-markets` shapes, so every driver looks identical
//! from above.
//!
//! The trait's default methods are the shared convenience layer: emulated
//! batch operations, per-symbol `fetch_tickers`, a `fetch_markets`-probe
//! `fetch_status`, and `NotSupported`/`NotImplemented` refusals derived
//! from the driver's capability map.

/// Per-driver TTL-bounded market cache.
pub mod cache;

/// The `has` capability map.
pub mod capability;

/// The enumerated driver configuration record.
pub mod config;

/// The uniform driver contract and its shared convenience layer.
pub mod driver;

/// Health probes and venue status.
pub mod health;

/// The bidirectional venue-shape <-> canonical-shape contract.
pub mod normalize;

/// Batch results and aggregate-error policy.
pub mod shared;

/// Venue symbol conversion helpers.
pub mod symbol_map;

/// Pre-call request validation.
pub mod validate;

/// Reference venue drivers.
pub mod venue;

pub use cache::MarketCache;
pub use capability::{Capabilities, Capability};
pub use config::{BreakerSettings, RateLimitSettings, VenueConfig};
pub use driver::{Feed, VenueDriver};
pub use health::{ApiHealth, HealthCheckConfig, HealthReport, HealthStatus, VenueStatus};
pub use normalize::Normalizer;
pub use shared::BatchResult;
