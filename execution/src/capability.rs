//! The capability map.
//!
//! Each venue driver declares, per operation, whether it is unsupported,
//! native, or emulated by the framework from other primitives. Calling an
//! unsupported operation yields `NotSupported`; a declared-but-unbuilt
//! native operation yields `NotImplemented`.

use kestrel_markets::{VenueError, VenueId, VenueResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// The venue does not offer this operation.
    #[default]
    No,
    /// The driver implements it against a native venue endpoint.
    Native,
    /// The framework emulates it via other primitives.
    Emulated,
}

impl Capability {
    pub fn is_supported(&self) -> bool {
        !matches!(self, Capability::No)
    }

    /// The refusal for an operation reaching a default implementation:
    /// unsupported capabilities refuse with `NotSupported`, declared ones
    /// with `NotImplemented` (the driver should have overridden).
    pub fn refuse<T>(&self, venue: VenueId, what: &str) -> VenueResult<T> {
        match self {
            Capability::No => Err(VenueError::not_supported(venue, what)),
            Capability::Native | Capability::Emulated => {
                Err(VenueError::not_implemented(venue, what))
            }
        }
    }
}

/// The closed `has` record.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Capabilities {
    pub fetch_markets: Capability,
    pub fetch_ticker: Capability,
    pub fetch_tickers: Capability,
    pub fetch_order_book: Capability,
    pub fetch_trades: Capability,
    pub fetch_ohlcv: Capability,
    pub fetch_funding_rate: Capability,
    pub fetch_funding_rate_history: Capability,
    pub fetch_status: Capability,
    pub create_order: Capability,
    pub cancel_order: Capability,
    pub cancel_all_orders: Capability,
    pub create_batch_orders: Capability,
    pub cancel_batch_orders: Capability,
    pub edit_order: Capability,
    pub fetch_positions: Capability,
    pub fetch_balance: Capability,
    pub fetch_open_orders: Capability,
    pub fetch_order: Capability,
    pub fetch_order_history: Capability,
    pub fetch_my_trades: Capability,
    pub set_leverage: Capability,
    pub set_margin_mode: Capability,
    pub watch_order_book: Capability,
    pub watch_trades: Capability,
    pub watch_ticker: Capability,
    pub watch_tickers: Capability,
    pub watch_positions: Capability,
    pub watch_orders: Capability,
    pub watch_balance: Capability,
    pub watch_funding_rate: Capability,
    pub watch_ohlcv: Capability,
    pub watch_my_trades: Capability,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_markets::ErrorKind;

    #[test]
    fn test_refusal_kinds() {
        let unsupported: VenueResult<()> = Capability::No.refuse(VenueId::Mock, "editOrder");
        assert_eq!(unsupported.unwrap_err().kind, ErrorKind::NotSupported);

        let unbuilt: VenueResult<()> = Capability::Native.refuse(VenueId::Mock, "editOrder");
        assert_eq!(unbuilt.unwrap_err().kind, ErrorKind::NotImplemented);
    }

    #[test]
    fn test_default_is_unsupported() {
        let capabilities = Capabilities::default();
        assert_eq!(capabilities.edit_order, Capability::No);
        assert!(!capabilities.edit_order.is_supported());
        assert!(Capability::Emulated.is_supported());
    }

    #[test]
    fn test_serde_shape() {
        let capabilities = Capabilities {
            fetch_markets: Capability::Native,
            create_batch_orders: Capability::Emulated,
            ..Capabilities::default()
        };
        let value = serde_json::to_value(capabilities).unwrap();
        assert_eq!(value["fetchMarkets"], "native");
        assert_eq!(value["createBatchOrders"], "emulated");
        assert_eq!(value["editOrder"], "no");
    }
}
