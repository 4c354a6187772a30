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

//! # Kestrel-Integration
//!
//! Low-level execution substrate shared by every Kestrel venue driver. A
//! driver composes these pieces instead of re-implementing them:
//!
//! * [`limit::RateLimiter`] — weighted token bucket with FIFO queueing.
//! * [`breaker::CircuitBreaker`] — three-state breaker with event emission.
//! * [`http::HttpClient`] — retriable HTTP pipeline with jittered backoff,
//!   correlation ids and per-attempt metric emission.
//! * [`signer`] — one signing contract over HMAC-SHA256, Ed25519,
//!   ECDSA/SHA3, EIP-712, Cosmos secp256k1 and Solana Ed25519 schemes.
//! * [`nonce`] — monotonic nonce allocation and session-token caching for
//!   venues whose authentication is stateful.
//! * [`websocket::WsRuntime`] — durable connection with heartbeats,
//!   reconnect-with-resubscribe and per-channel fan-out of lazy event
//!   sequences.
//! * [`metric`] — push-style emission to an optional observer.
//!
//! Everything here is venue-agnostic: the driver supplies endpoint weights,
//! subscription messages, signers and normalizers, and this crate supplies
//! the machinery.

/// Circuit breaker guarding a venue's HTTP surface.
pub mod breaker;

/// Specialized collection aliases used across the crate.
pub mod collection;

/// Retriable HTTP request pipeline and the transport seam beneath it.
pub mod http;

/// Weighted token-bucket rate limiter.
pub mod limit;

/// Flexible `Metric` type and the push-style observer contract.
pub mod metric;

/// Monotonic nonces and time-bounded session tokens.
pub mod nonce;

/// Request signing: one contract, one implementation per scheme.
pub mod signer;

/// WebSocket runtime: connection lifecycle, subscription registry and
/// per-channel fan-out.
pub mod websocket;
