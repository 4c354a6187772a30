//! Canonical symbol representation and pure conversion utilities.
//!
//! A canonical symbol has the stable textual form `BASE/QUOTE[:SETTLE]`,
//! uppercase, with a single `/` and at most one `:`. Perpetual swaps carry
//! their settle currency (`BTC/USDT:USDT`); spot symbols omit it.

use crate::error::{ErrorKind, VenueError, VenueResult};
use crate::market::MarketType;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A canonical `BASE/QUOTE[:SETTLE]` symbol.
///
/// Symbols are immutable and case-insensitive by storage: construction
/// uppercases the input, so two spellings of the same market compare equal.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Symbol(SmolStr);

impl Symbol {
    /// Parse and validate a canonical symbol.
    pub fn new(s: &str) -> VenueResult<Self> {
        let parts = parse(s)?;
        Ok(build(&parts.base, &parts.quote, parts.settle.as_deref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Base currency code.
    pub fn base(&self) -> &str {
        let end = self.0.find('/').unwrap_or(self.0.len());
        &self.0[..end]
    }

    /// Quote currency code.
    pub fn quote(&self) -> &str {
        let start = self.0.find('/').map(|i| i + 1).unwrap_or(0);
        let end = self.0.find(':').unwrap_or(self.0.len());
        &self.0[start..end]
    }

    /// Settle currency code, present only for perpetuals.
    pub fn settle(&self) -> Option<&str> {
        self.0.find(':').map(|i| &self.0[i + 1..])
    }

    /// True when the symbol denotes a perpetual swap.
    pub fn is_perpetual(&self) -> bool {
        self.0.contains(':')
    }

    pub fn market_type(&self) -> MarketType {
        if self.is_perpetual() {
            MarketType::Swap
        } else {
            MarketType::Spot
        }
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = VenueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::new(s)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

/// Decomposed canonical symbol.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SymbolParts {
    pub base: SmolStr,
    pub quote: SmolStr,
    pub settle: Option<SmolStr>,
    pub kind: MarketType,
}

fn currency_ok(code: &str) -> bool {
    !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Decompose a canonical symbol into `(base, quote, settle, kind)`.
///
/// Fails with [`ErrorKind::InvalidSymbol`] when the form does not match.
pub fn parse(symbol: &str) -> VenueResult<SymbolParts> {
    let invalid = || {
        VenueError::new(
            ErrorKind::InvalidSymbol,
            format!("malformed symbol: {symbol}"),
        )
    };

    let upper = symbol.trim().to_ascii_uppercase();
    let (pair, settle) = match upper.split_once(':') {
        Some((pair, settle)) => {
            if settle.contains(':') || !currency_ok(settle) {
                return Err(invalid());
            }
            (pair, Some(settle))
        }
        None => (upper.as_str(), None),
    };

    let (base, quote) = pair.split_once('/').ok_or_else(invalid)?;
    if quote.contains('/') || !currency_ok(base) || !currency_ok(quote) {
        return Err(invalid());
    }

    let kind = if settle.is_some() {
        MarketType::Swap
    } else {
        MarketType::Spot
    };

    Ok(SymbolParts {
        base: SmolStr::new(base),
        quote: SmolStr::new(quote),
        settle: settle.map(SmolStr::new),
        kind,
    })
}

/// Compose a canonical symbol from its components, uppercasing each.
pub fn build(base: &str, quote: &str, settle: Option<&str>) -> Symbol {
    let base = base.to_ascii_uppercase();
    let quote = quote.to_ascii_uppercase();
    let rendered = match settle {
        Some(settle) => format!("{base}/{quote}:{}", settle.to_ascii_uppercase()),
        None => format!("{base}/{quote}"),
    };
    Symbol(SmolStr::new(rendered))
}

/// Convenience for the perpetual form where settle equals quote.
pub fn build_perpetual(base: &str, quote: &str) -> Symbol {
    build(base, quote, Some(quote))
}

/// True when the string denotes a perpetual swap in canonical form.
pub fn is_perpetual(symbol: &str) -> bool {
    parse(symbol)
        .map(|parts| parts.settle.is_some())
        .unwrap_or(false)
}

/// Case-insensitive canonical ordering of two symbol strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    let a = a.trim().to_ascii_uppercase();
    let b = b.trim().to_ascii_uppercase();
    a.cmp(&b)
}
