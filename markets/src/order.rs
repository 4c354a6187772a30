//! Canonical orders: request shape, live shape, and the associated enums.

use crate::error::{ErrorKind, VenueError, VenueResult};
use crate::symbol::Symbol;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    StopLimit,
}

impl OrderType {
    /// True when the type requires a limit price.
    pub fn requires_price(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }

    /// True when the type requires a trigger price.
    pub fn requires_stop_price(&self) -> bool {
        matches!(self, OrderType::StopMarket | OrderType::StopLimit)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum TimeInForce {
    /// Good Till Canceled.
    #[serde(rename = "GTC")]
    Gtc,
    /// Immediate Or Cancel.
    #[serde(rename = "IOC")]
    Ioc,
    /// Fill Or Kill.
    #[serde(rename = "FOK")]
    Fok,
    /// Post Only — maker or canceled.
    #[serde(rename = "PO")]
    Po,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }

    /// Whether `self -> next` is an admissible lifecycle transition.
    ///
    /// The live path is monotonic (`open -> partiallyFilled -> filled`);
    /// any live status may fall into a terminal one.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (OrderStatus::Open, OrderStatus::PartiallyFilled) => true,
            (OrderStatus::Open, _) if next.is_terminal() => true,
            (OrderStatus::PartiallyFilled, _) if next.is_terminal() => true,
            (OrderStatus::PartiallyFilled, OrderStatus::PartiallyFilled) => true,
            (OrderStatus::Open, OrderStatus::Open) => true,
            _ => false,
        }
    }
}

/// A new-order request in canonical shape.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub symbol: Symbol,
    #[serde(rename = "type")]
    pub kind: OrderType,
    pub side: OrderSide,
    /// Order amount in base units; must be strictly positive.
    pub amount: f64,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub time_in_force: Option<TimeInForce>,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub post_only: bool,
    pub client_order_id: Option<SmolStr>,
}

impl OrderRequest {
    /// A plain market order.
    pub fn market(symbol: Symbol, side: OrderSide, amount: f64) -> Self {
        Self {
            symbol,
            kind: OrderType::Market,
            side,
            amount,
            price: None,
            stop_price: None,
            time_in_force: None,
            reduce_only: false,
            post_only: false,
            client_order_id: None,
        }
    }

    /// A plain limit order.
    pub fn limit(symbol: Symbol, side: OrderSide, amount: f64, price: f64) -> Self {
        Self {
            symbol,
            kind: OrderType::Limit,
            side,
            amount,
            price: Some(price),
            stop_price: None,
            time_in_force: Some(TimeInForce::Gtc),
            reduce_only: false,
            post_only: false,
            client_order_id: None,
        }
    }

    pub fn post_only(mut self) -> Self {
        self.post_only = true;
        self.time_in_force = Some(TimeInForce::Po);
        self
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    pub fn with_client_order_id(mut self, cid: impl Into<SmolStr>) -> Self {
        self.client_order_id = Some(cid.into());
        self
    }

    /// Validate the request locally, before any network or rate-limit cost.
    pub fn validate(&self) -> VenueResult<()> {
        let invalid = |message: String| VenueError::new(ErrorKind::InvalidOrder, message);

        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(invalid(format!(
                "order amount must be positive, got {}",
                self.amount
            )));
        }
        if self.kind.requires_price() {
            match self.price {
                Some(price) if price.is_finite() && price > 0.0 => {}
                _ => {
                    return Err(invalid(format!(
                        "{:?} order requires a positive price",
                        self.kind
                    )))
                }
            }
        }
        if self.kind.requires_stop_price() {
            match self.stop_price {
                Some(stop) if stop.is_finite() && stop > 0.0 => {}
                _ => {
                    return Err(invalid(format!(
                        "{:?} order requires a positive stop price",
                        self.kind
                    )))
                }
            }
        }
        if self.post_only && self.time_in_force != Some(TimeInForce::Po) {
            return Err(invalid(
                "postOnly orders must carry timeInForce=PO".to_string(),
            ));
        }
        if self.post_only && self.kind == OrderType::Market {
            return Err(invalid("market orders cannot be postOnly".to_string()));
        }
        Ok(())
    }
}

/// A live or historical order in canonical shape.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: SmolStr,
    pub symbol: Symbol,
    #[serde(rename = "type")]
    pub kind: OrderType,
    pub side: OrderSide,
    pub amount: f64,
    pub price: Option<f64>,
    pub status: OrderStatus,
    pub filled: f64,
    pub remaining: f64,
    pub average_price: Option<f64>,
    pub cost: f64,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub post_only: bool,
    pub client_order_id: Option<SmolStr>,
    pub timestamp: i64,
    pub raw: serde_json::Value,
}

impl Order {
    /// Check the normalized-order invariants:
    /// `filled + remaining == amount`, `status=filled => remaining=0`,
    /// `filled <= amount`.
    pub fn check_invariants(&self, tolerance: f64) -> VenueResult<()> {
        let violated = |message: String| VenueError::new(ErrorKind::Validation, message);

        if (self.filled + self.remaining - self.amount).abs() > tolerance {
            return Err(violated(format!(
                "order {}: filled {} + remaining {} != amount {}",
                self.id, self.filled, self.remaining, self.amount
            )));
        }
        if self.status == OrderStatus::Filled && self.remaining.abs() > tolerance {
            return Err(violated(format!(
                "order {}: filled status with remaining {}",
                self.id, self.remaining
            )));
        }
        if self.filled > self.amount + tolerance {
            return Err(violated(format!(
                "order {}: filled {} exceeds amount {}",
                self.id, self.filled, self.amount
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol;

    fn btc() -> Symbol {
        symbol::build_perpetual("BTC", "USDT")
    }

    #[test]
    fn test_limit_request_validates() {
        OrderRequest::limit(btc(), OrderSide::Buy, 0.1, 50_000.0)
            .validate()
            .unwrap();
    }

    #[test]
    fn test_request_rejects_non_positive_amount() {
        let mut request = OrderRequest::market(btc(), OrderSide::Buy, 0.0);
        assert!(request.validate().is_err());
        request.amount = f64::NAN;
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_limit_requires_price() {
        let mut request = OrderRequest::limit(btc(), OrderSide::Sell, 1.0, 100.0);
        request.price = None;
        assert!(request.validate().is_err());
        request.price = Some(-1.0);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_stop_market_requires_stop_price() {
        let mut request = OrderRequest::market(btc(), OrderSide::Sell, 1.0);
        request.kind = OrderType::StopMarket;
        assert!(request.validate().is_err());
        request.stop_price = Some(49_000.0);
        request.validate().unwrap();
    }

    #[test]
    fn test_post_only_implies_po() {
        let mut request = OrderRequest::limit(btc(), OrderSide::Buy, 1.0, 100.0);
        request.post_only = true;
        request.time_in_force = Some(TimeInForce::Gtc);
        assert!(request.validate().is_err());

        let request = OrderRequest::limit(btc(), OrderSide::Buy, 1.0, 100.0).post_only();
        assert_eq!(request.time_in_force, Some(TimeInForce::Po));
        request.validate().unwrap();
    }

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;
        assert!(Open.can_transition_to(PartiallyFilled));
        assert!(Open.can_transition_to(Filled));
        assert!(PartiallyFilled.can_transition_to(Filled));
        assert!(PartiallyFilled.can_transition_to(Canceled));
        assert!(!Filled.can_transition_to(Open));
        assert!(!Canceled.can_transition_to(PartiallyFilled));
        assert!(!PartiallyFilled.can_transition_to(Open));
        assert!(Filled.is_terminal());
        assert!(!Open.is_terminal());
    }

    #[test]
    fn test_order_invariants() {
        let order = Order {
            id: "1".into(),
            symbol: btc(),
            kind: OrderType::Limit,
            side: OrderSide::Buy,
            amount: 0.1,
            price: Some(50_000.0),
            status: OrderStatus::Open,
            filled: 0.0,
            remaining: 0.1,
            average_price: None,
            cost: 0.0,
            reduce_only: false,
            post_only: true,
            client_order_id: None,
            timestamp: 0,
            raw: serde_json::Value::Null,
        };
        order.check_invariants(1e-9).unwrap();

        let broken = Order { remaining: 0.2, ..order.clone() };
        assert!(broken.check_invariants(1e-9).is_err());

        let filled_with_rest = Order {
            status: OrderStatus::Filled,
            filled: 0.05,
            remaining: 0.05,
            ..order
        };
        assert!(filled_with_rest.check_invariants(1e-9).is_err());
    }

    #[test]
    fn test_serde_field_names() {
        let request = OrderRequest::limit(btc(), OrderSide::Buy, 0.1, 50_000.0).post_only();
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "limit");
        assert_eq!(value["side"], "buy");
        assert_eq!(value["timeInForce"], "PO");
        assert_eq!(value["postOnly"], true);
    }
}
