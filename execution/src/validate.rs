//! Pre-call request validation.
//!
//! Runs before any rate-limit tokens are charged or network touched;
//! failures are `Validation`/`InvalidOrder` kinded.

use kestrel_markets::{ErrorKind, Market, OrderRequest, VenueError, VenueResult};

/// Validate an order request, optionally against its market's limits.
pub fn validate_order_request(
    request: &OrderRequest,
    market: Option<&Market>,
) -> VenueResult<()> {
    request.validate()?;

    if let Some(market) = market {
        if !market.active {
            return Err(VenueError::new(
                ErrorKind::InvalidOrder,
                format!("market {} is not active", market.symbol),
            ));
        }
        if request.amount < market.min_amount {
            return Err(VenueError::new(
                ErrorKind::MinimumOrderSize {
                    min: market.min_amount,
                    requested: request.amount,
                },
                format!(
                    "amount {} below market minimum {}",
                    request.amount, market.min_amount
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_markets::{symbol, OrderSide};

    fn market(min_amount: f64, active: bool) -> Market {
        Market {
            id: "BTCUSDT".into(),
            symbol: symbol::build_perpetual("BTC", "USDT"),
            base: "BTC".into(),
            quote: "USDT".into(),
            settle: Some("USDT".into()),
            active,
            min_amount,
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
    fn test_passes_without_market() {
        let request = OrderRequest::limit(
            symbol::build_perpetual("BTC", "USDT"),
            OrderSide::Buy,
            0.1,
            50_000.0,
        );
        validate_order_request(&request, None).unwrap();
    }

    #[test]
    fn test_rejects_below_minimum() {
        let request = OrderRequest::limit(
            symbol::build_perpetual("BTC", "USDT"),
            OrderSide::Buy,
            0.0001,
            50_000.0,
        );
        let error = validate_order_request(&request, Some(&market(0.001, true))).unwrap_err();
        assert!(matches!(error.kind, ErrorKind::MinimumOrderSize { .. }));
    }

    #[test]
    fn test_rejects_inactive_market() {
        let request = OrderRequest::limit(
            symbol::build_perpetual("BTC", "USDT"),
            OrderSide::Sell,
            0.1,
            50_000.0,
        );
        let error = validate_order_request(&request, Some(&market(0.001, false))).unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidOrder);
    }
}
