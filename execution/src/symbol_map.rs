//! Venue symbol conversion helpers.
//!
//! Pure, deterministic, never touch the network. Reversal without market
//! metadata tries a fixed list of quote suffixes in priority order and
//! falls back to the venue string unchanged.

use kestrel_markets::{symbol, Symbol};
use smol_str::SmolStr;

/// Quote suffixes tried when splitting a concatenated venue symbol, in
/// priority order.
pub const QUOTE_SUFFIXES: [&str; 3] = ["USDT", "USDC", "BUSD"];

/// `BTC/USDT:USDT -> BTCUSDT`.
pub fn concat_symbol(symbol: &Symbol) -> SmolStr {
    SmolStr::new(format!("{}{}", symbol.base(), symbol.quote()))
}

/// `BTCUSDT -> BTC/USDT:USDT`, trying [`QUOTE_SUFFIXES`] in order.
pub fn split_concat_symbol(venue_symbol: &str) -> Option<Symbol> {
    let upper = venue_symbol.trim().to_ascii_uppercase();
    for suffix in QUOTE_SUFFIXES {
        if upper.len() > suffix.len() && upper.ends_with(suffix) {
            let base = &upper[..upper.len() - suffix.len()];
            return Some(symbol::build_perpetual(base, suffix));
        }
    }
    None
}

/// Canonical form when recognized, venue string unchanged otherwise.
pub fn split_concat_or_raw(venue_symbol: &str) -> SmolStr {
    match split_concat_symbol(venue_symbol) {
        Some(symbol) => SmolStr::new(symbol.as_str()),
        None => SmolStr::new(venue_symbol),
    }
}

/// Coin-indexed venues (`BTC -> BTC/USDC:USDC`).
pub fn coin_to_canonical(coin: &str, settle: &str) -> Symbol {
    symbol::build_perpetual(coin, settle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_round_trip() {
        let canonical = symbol::build_perpetual("BTC", "USDT");
        let venue = concat_symbol(&canonical);
        assert_eq!(venue, "BTCUSDT");
        assert_eq!(split_concat_symbol(&venue).unwrap(), canonical);
    }

    #[test]
    fn test_suffix_priority() {
        // USDT is tried before USDC.
        assert_eq!(
            split_concat_symbol("ETHUSDT").unwrap().as_str(),
            "ETH/USDT:USDT"
        );
        assert_eq!(
            split_concat_symbol("ETHUSDC").unwrap().as_str(),
            "ETH/USDC:USDC"
        );
        assert_eq!(
            split_concat_symbol("SOLBUSD").unwrap().as_str(),
            "SOL/BUSD:BUSD"
        );
    }

    #[test]
    fn test_no_match_returns_raw() {
        assert_eq!(split_concat_symbol("BTCEUR"), None);
        assert_eq!(split_concat_or_raw("BTCEUR"), "BTCEUR");
        // A bare suffix with no base is not a split.
        assert_eq!(split_concat_symbol("USDT"), None);
    }

    #[test]
    fn test_coin_mapping() {
        assert_eq!(coin_to_canonical("btc", "USDC").as_str(), "BTC/USDC:USDC");
    }
}
