//! Canonical account balances.

use crate::error::{ErrorKind, VenueError, VenueResult};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Balance of one currency. Invariant: `free + used == total` within
/// rounding.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Balance {
    pub currency: SmolStr,
    pub total: f64,
    pub free: f64,
    pub used: f64,
    pub raw: serde_json::Value,
}

impl Balance {
    /// Reconcile from the `{available, locked}` shape some venues return:
    /// `total = available + locked`, `used = locked`.
    pub fn from_available_locked(
        currency: impl Into<SmolStr>,
        available: f64,
        locked: f64,
        raw: serde_json::Value,
    ) -> Self {
        Self {
            currency: currency.into(),
            total: available + locked,
            free: available,
            used: locked,
            raw,
        }
    }

    /// Check `free + used == total` within `tolerance`.
    pub fn check(&self, tolerance: f64) -> VenueResult<()> {
        if (self.free + self.used - self.total).abs() > tolerance {
            return Err(VenueError::new(
                ErrorKind::Validation,
                format!(
                    "balance {}: free {} + used {} != total {}",
                    self.currency, self.free, self.used, self.total
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_from_available_locked() {
        let balance = Balance::from_available_locked(
            "USDT",
            900.0,
            100.0,
            serde_json::Value::Null,
        );
        assert_eq!(balance.total, 1_000.0);
        assert_eq!(balance.used, 100.0);
        balance.check(1e-9).unwrap();
    }

    #[test]
    fn test_check_catches_drift() {
        let balance = Balance {
            currency: "USDC".into(),
            total: 10.0,
            free: 4.0,
            used: 5.0,
            raw: serde_json::Value::Null,
        };
        assert!(balance.check(1e-9).is_err());
    }
}
