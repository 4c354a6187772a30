//! Per-driver market cache.
//!
//! TTL-bounded (default 5 minutes) and copy-on-write: readers receive
//! immutable `Arc` snapshots, writers replace the whole snapshot.
//! Invalidated on driver `disconnect`.

use kestrel_integration::collection::FnvIndexMap;
use kestrel_markets::{Market, Symbol};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_MARKET_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct Snapshot {
    markets: Arc<Vec<Market>>,
    by_symbol: Arc<FnvIndexMap<Symbol, usize>>,
    fetched_at: Instant,
}

/// TTL-bounded copy-on-write market snapshot store.
#[derive(Debug)]
pub struct MarketCache {
    ttl: Duration,
    state: RwLock<Option<Snapshot>>,
}

impl Default for MarketCache {
    fn default() -> Self {
        Self::new(DEFAULT_MARKET_TTL)
    }
}

impl MarketCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(None),
        }
    }

    /// Replace the snapshot.
    pub fn store(&self, markets: Vec<Market>) -> Arc<Vec<Market>> {
        let markets = Arc::new(markets);
        let by_symbol = Arc::new(
            markets
                .iter()
                .enumerate()
                .map(|(index, market)| (market.symbol.clone(), index))
                .collect::<FnvIndexMap<_, _>>(),
        );
        let snapshot = Snapshot {
            markets: Arc::clone(&markets),
            by_symbol,
            fetched_at: Instant::now(),
        };
        *self.state.write() = Some(snapshot);
        markets
    }

    /// The current snapshot, when fresh.
    pub fn get(&self) -> Option<Arc<Vec<Market>>> {
        let state = self.state.read();
        let snapshot = state.as_ref()?;
        if snapshot.fetched_at.elapsed() > self.ttl {
            return None;
        }
        Some(Arc::clone(&snapshot.markets))
    }

    /// Lookup one market by canonical symbol, when fresh.
    pub fn market(&self, symbol: &Symbol) -> Option<Market> {
        let state = self.state.read();
        let snapshot = state.as_ref()?;
        if snapshot.fetched_at.elapsed() > self.ttl {
            return None;
        }
        snapshot
            .by_symbol
            .get(symbol)
            .map(|&index| snapshot.markets[index].clone())
    }

    pub fn is_fresh(&self) -> bool {
        self.state
            .read()
            .as_ref()
            .map(|snapshot| snapshot.fetched_at.elapsed() <= self.ttl)
            .unwrap_or(false)
    }

    pub fn invalidate(&self) {
        *self.state.write() = None;
    }
}
