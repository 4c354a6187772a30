//! Canonical order books.

use crate::error::{ErrorKind, VenueError, VenueResult};
use crate::symbol::Symbol;
use crate::venue::VenueId;
use serde::{Deserialize, Serialize};

/// A single price level: `[price, size]`.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

impl From<(f64, f64)> for BookLevel {
    fn from((price, size): (f64, f64)) -> Self {
        Self { price, size }
    }
}

/// A normalized order book snapshot.
///
/// After normalization, bids are strictly descending and asks strictly
/// ascending in price, with no two levels sharing a price.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderBook {
    pub symbol: Symbol,
    pub timestamp: i64,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub venue: VenueId,
}

impl OrderBook {
    /// Sort both sides into canonical order and coalesce duplicate price
    /// levels (sizes are summed).
    pub fn normalize(&mut self) {
        normalize_side(&mut self.bids, true);
        normalize_side(&mut self.asks, false);
    }

    /// Verify strict bid-descending / ask-ascending ordering.
    pub fn validate_sorted(&self) -> VenueResult<()> {
        let strictly = |levels: &[BookLevel], descending: bool| {
            levels.windows(2).all(|w| {
                if descending {
                    w[0].price > w[1].price
                } else {
                    w[0].price < w[1].price
                }
            })
        };
        if !strictly(&self.bids, true) || !strictly(&self.asks, false) {
            return Err(VenueError::new(
                ErrorKind::Validation,
                format!("order book for {} is not strictly sorted", self.symbol),
            ));
        }
        Ok(())
    }

    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }
}

fn normalize_side(levels: &mut Vec<BookLevel>, descending: bool) {
    if descending {
        levels.sort_by(|a, b| b.price.total_cmp(&a.price));
    } else {
        levels.sort_by(|a, b| a.price.total_cmp(&b.price));
    }
    levels.dedup_by(|next, kept| {
        if kept.price == next.price {
            kept.size += next.size;
            true
        } else {
            false
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol;

    fn book(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> OrderBook {
        OrderBook {
            symbol: symbol::build_perpetual("BTC", "USDT"),
            timestamp: 1_700_000_000_000,
            bids: bids.iter().copied().map(BookLevel::from).collect(),
            asks: asks.iter().copied().map(BookLevel::from).collect(),
            venue: VenueId::Mock,
        }
    }

    #[test]
    fn test_normalize_sorts_bids_descending_asks_ascending() {
        let mut book = book(
            &[(49_990.0, 2.0), (50_000.0, 1.5)],
            &[(50_020.0, 1.0), (50_010.0, 3.0)],
        );
        book.normalize();
        assert_eq!(book.bids[0].price, 50_000.0);
        assert_eq!(book.bids[1].price, 49_990.0);
        assert_eq!(book.asks[0].price, 50_010.0);
        assert_eq!(book.asks[1].price, 50_020.0);
        book.validate_sorted().unwrap();
    }

    #[test]
    fn test_normalize_coalesces_duplicate_levels() {
        let mut book = book(&[(50_000.0, 1.0), (50_000.0, 0.5)], &[]);
        book.normalize();
        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.bids[0].size, 1.5);
    }

    #[test]
    fn test_validate_rejects_unsorted() {
        let book = book(&[(49_990.0, 2.0), (50_000.0, 1.5)], &[]);
        assert!(book.validate_sorted().is_err());
    }

    #[test]
    fn test_best_levels_and_mid() {
        let mut book = book(&[(50_000.0, 1.5), (49_990.0, 2.0)], &[(50_010.0, 1.0)]);
        book.normalize();
        assert_eq!(book.best_bid().unwrap().price, 50_000.0);
        assert_eq!(book.best_ask().unwrap().price, 50_010.0);
        assert_eq!(book.mid_price().unwrap(), 50_005.0);
    }
}
