//! Error taxonomy shared by every Kestrel component.
//!
//! A [`VenueError`] pairs a closed [`ErrorKind`] with provenance: the venue
//! it originated from, the venue-native error code, the correlation id of
//! the HTTP request that produced it, and the preserved underlying cause.
//! Retry decisions, circuit-breaker accounting and user-facing mapping all
//! key off the kind — never off string matching.

use crate::venue::VenueId;
use smol_str::SmolStr;
use std::sync::Arc;
use thiserror::Error;

/// Convenient alias used across the workspace.
pub type VenueResult<T> = Result<T, VenueError>;

/// The closed set of error kinds a venue interaction can produce.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    #[error("network error")]
    Network,
    #[error("request timed out")]
    Timeout,
    #[error("rate limited")]
    RateLimit {
        /// Server-advised cooldown, when communicated via `Retry-After`.
        retry_after_ms: Option<u64>,
    },
    #[error("exchange unavailable")]
    ExchangeUnavailable,
    #[error("websocket disconnected")]
    WebSocketDisconnected,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("authentication expired")]
    ExpiredAuth,
    #[error("insufficient permissions")]
    InsufficientPermissions,
    #[error("validation failed")]
    Validation,
    #[error("invalid symbol")]
    InvalidSymbol,
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("insufficient margin")]
    InsufficientMargin,
    #[error("insufficient balance (required {required}, available {available})")]
    InsufficientBalance { required: f64, available: f64 },
    #[error("order not found")]
    OrderNotFound,
    #[error("order rejected: {reason}")]
    OrderRejected { reason: String },
    #[error("invalid order")]
    InvalidOrder,
    #[error("below minimum order size (min {min}, requested {requested})")]
    MinimumOrderSize { min: f64, requested: f64 },
    #[error("position not found")]
    PositionNotFound,
    #[error("transaction failed")]
    TransactionFailed { tx_hash: Option<String> },
    #[error("slippage exceeded (expected {expected}, actual {actual})")]
    SlippageExceeded { expected: f64, actual: f64 },
    #[error("position liquidated")]
    Liquidation,
    #[error("not supported by venue")]
    NotSupported,
    #[error("not implemented by driver")]
    NotImplemented,
    #[error("unknown error")]
    Unknown,
}

impl ErrorKind {
    /// Stable machine-readable code for the kind.
    pub fn standard_code(&self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::RateLimit { .. } => "RATE_LIMIT",
            ErrorKind::ExchangeUnavailable => "EXCHANGE_UNAVAILABLE",
            ErrorKind::WebSocketDisconnected => "WS_DISCONNECTED",
            ErrorKind::InvalidSignature => "INVALID_SIGNATURE",
            ErrorKind::ExpiredAuth => "EXPIRED_AUTH",
            ErrorKind::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::InvalidSymbol => "INVALID_SYMBOL",
            ErrorKind::InvalidParameter => "INVALID_PARAMETER",
            ErrorKind::InsufficientMargin => "INSUFFICIENT_MARGIN",
            ErrorKind::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            ErrorKind::OrderNotFound => "ORDER_NOT_FOUND",
            ErrorKind::OrderRejected { .. } => "ORDER_REJECTED",
            ErrorKind::InvalidOrder => "INVALID_ORDER",
            ErrorKind::MinimumOrderSize { .. } => "MINIMUM_ORDER_SIZE",
            ErrorKind::PositionNotFound => "POSITION_NOT_FOUND",
            ErrorKind::TransactionFailed { .. } => "TRANSACTION_FAILED",
            ErrorKind::SlippageExceeded { .. } => "SLIPPAGE_EXCEEDED",
            ErrorKind::Liquidation => "LIQUIDATION",
            ErrorKind::NotSupported => "NOT_SUPPORTED",
            ErrorKind::NotImplemented => "NOT_IMPLEMENTED",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }

    /// True for kinds the HTTP pipeline may transparently retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::RateLimit { .. }
                | ErrorKind::ExchangeUnavailable
                | ErrorKind::WebSocketDisconnected
        )
    }

    /// True for authentication and authorization failures.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidSignature
                | ErrorKind::ExpiredAuth
                | ErrorKind::InsufficientPermissions
        )
    }

    /// True for request-shape failures detected before or by the venue.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ErrorKind::Validation
                | ErrorKind::InvalidSymbol
                | ErrorKind::InvalidParameter
                | ErrorKind::InvalidOrder
        )
    }

    /// True for order-lifecycle failures.
    pub fn is_order(&self) -> bool {
        matches!(
            self,
            ErrorKind::OrderNotFound
                | ErrorKind::OrderRejected { .. }
                | ErrorKind::InvalidOrder
                | ErrorKind::MinimumOrderSize { .. }
        )
    }

    /// True for trading failures (orders, positions, margin, settlement).
    pub fn is_trading(&self) -> bool {
        self.is_order()
            || matches!(
                self,
                ErrorKind::InsufficientMargin
                    | ErrorKind::InsufficientBalance { .. }
                    | ErrorKind::PositionNotFound
                    | ErrorKind::TransactionFailed { .. }
                    | ErrorKind::SlippageExceeded { .. }
                    | ErrorKind::Liquidation
            )
    }

    /// Classify an HTTP status code.
    ///
    /// 408/429/5xx map to retryable kinds; auth statuses map to their
    /// respective kinds; anything else is a plain network failure.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            408 => ErrorKind::Timeout,
            429 => ErrorKind::RateLimit {
                retry_after_ms: None,
            },
            401 => ErrorKind::ExpiredAuth,
            403 => ErrorKind::InsufficientPermissions,
            404 => ErrorKind::OrderNotFound,
            500..=599 => ErrorKind::ExchangeUnavailable,
            _ => ErrorKind::Network,
        }
    }
}

/// A typed error with provenance.
///
/// Every error that crosses a component boundary is a [`VenueError`]. The
/// original venue payload (or transport error) is preserved as `cause`;
/// HTTP-pipeline errors additionally carry the request's correlation id.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct VenueError {
    pub kind: ErrorKind,
    pub message: String,
    pub venue: Option<VenueId>,
    /// Venue-native error code, verbatim.
    pub venue_code: Option<SmolStr>,
    /// Correlation id of the HTTP request that produced this error.
    pub correlation_id: Option<SmolStr>,
    #[source]
    pub cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl VenueError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            venue: None,
            venue_code: None,
            correlation_id: None,
            cause: None,
        }
    }

    pub fn with_venue(mut self, venue: VenueId) -> Self {
        self.venue = Some(venue);
        self
    }

    pub fn with_venue_code(mut self, code: impl Into<SmolStr>) -> Self {
        self.venue_code = Some(code.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<SmolStr>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Stable machine-readable code of the underlying kind.
    pub fn standard_code(&self) -> &'static str {
        self.kind.standard_code()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn is_auth(&self) -> bool {
        self.kind.is_auth()
    }

    pub fn is_validation(&self) -> bool {
        self.kind.is_validation()
    }

    pub fn is_order(&self) -> bool {
        self.kind.is_order()
    }

    pub fn is_trading(&self) -> bool {
        self.kind.is_trading()
    }

    /// Shorthand for the `NotSupported` refusal drivers raise on
    /// capabilities their venue does not offer.
    pub fn not_supported(venue: VenueId, what: &str) -> Self {
        Self::new(
            ErrorKind::NotSupported,
            format!("{what} is not supported by {venue}"),
        )
        .with_venue(venue)
    }

    /// Shorthand for features the venue offers but the driver has not built.
    pub fn not_implemented(venue: VenueId, what: &str) -> Self {
        Self::new(
            ErrorKind::NotImplemented,
            format!("{what} is not implemented for {venue}"),
        )
        .with_venue(venue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::RateLimit { retry_after_ms: None }.is_retryable());
        assert!(ErrorKind::ExchangeUnavailable.is_retryable());
        assert!(ErrorKind::WebSocketDisconnected.is_retryable());
        assert!(!ErrorKind::InvalidSignature.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::OrderRejected { reason: "post-only".into() }.is_retryable());
    }

    #[test]
    fn test_http_status_classification() {
        assert_eq!(ErrorKind::from_http_status(408), ErrorKind::Timeout);
        assert!(matches!(
            ErrorKind::from_http_status(429),
            ErrorKind::RateLimit { .. }
        ));
        assert_eq!(ErrorKind::from_http_status(503), ErrorKind::ExchangeUnavailable);
        assert_eq!(ErrorKind::from_http_status(401), ErrorKind::ExpiredAuth);
        assert!(ErrorKind::from_http_status(500).is_retryable());
        assert!(!ErrorKind::from_http_status(400).is_retryable());
    }

    #[test]
    fn test_provenance_carried() {
        let error = VenueError::new(ErrorKind::OrderNotFound, "no such order")
            .with_venue(VenueId::BinanceUsdm)
            .with_venue_code("-2013")
            .with_correlation_id("abc-123");

        assert_eq!(error.venue, Some(VenueId::BinanceUsdm));
        assert_eq!(error.venue_code.as_deref(), Some("-2013"));
        assert_eq!(error.correlation_id.as_deref(), Some("abc-123"));
        assert_eq!(error.standard_code(), "ORDER_NOT_FOUND");
    }

    #[test]
    fn test_auth_and_trading_predicates() {
        assert!(ErrorKind::ExpiredAuth.is_auth());
        assert!(ErrorKind::InsufficientMargin.is_trading());
        assert!(ErrorKind::MinimumOrderSize { min: 1.0, requested: 0.5 }.is_order());
        assert!(ErrorKind::InvalidSymbol.is_validation());
        assert!(!ErrorKind::Network.is_auth());
    }
}
