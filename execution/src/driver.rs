//! The uniform venue driver contract.
//!
//! Drivers implement the operations their venue natively offers and
//! declare everything in their [`Capabilities`] map; the default methods
//! here are the shared convenience layer — capability-derived refusals,
//! emulated batch operations, per-symbol `fetch_tickers` and the
//! `fetch_markets` status probe.

use crate::capability::{Capabilities, Capability};
use crate::health::{ApiHealth, HealthCheckConfig, HealthReport, VenueStatus};
use crate::shared::BatchResult;
use async_trait::async_trait;
use futures::Stream;
use kestrel_integration::breaker::BreakerMetrics;
use kestrel_integration::metric::MetricsSnapshot;
use kestrel_markets::{
    Balance, FundingRate, MarginMode, Market, Ohlcv, Order, OrderBook, OrderRequest, Position,
    Symbol, Ticker, Trade, VenueId, VenueResult,
};
use smol_str::SmolStr;
use std::pin::Pin;
use tracing::warn;

/// A lazy, non-restartable sequence of normalized streaming events.
pub type Feed<T> = Pin<Box<dyn Stream<Item = VenueResult<T>> + Send>>;

/// The uniform contract every venue driver satisfies.
///
/// All methods are asynchronous and non-blocking; the driver's substrate
/// (rate limiter, breaker, nonce manager, subscription registry, metric
/// counters) is safe under concurrent callers.
#[async_trait]
pub trait VenueDriver: Send + Sync {
    fn id(&self) -> VenueId;

    fn display_name(&self) -> &str;

    /// The `has` map. Any method on an unsupported capability throws
    /// `NotSupported`.
    fn capabilities(&self) -> &Capabilities;

    /// Idempotent. Must be called before any authenticated method;
    /// re-syncs nonces and preloads markets.
    async fn initialize(&self) -> VenueResult<()>;

    /// Releases timers, in-flight requests, WebSocket subscriptions,
    /// breaker deadlines and caches. Idempotent.
    async fn disconnect(&self) -> VenueResult<()>;

    // ---------- market data ----------

    async fn fetch_markets(&self) -> VenueResult<Vec<Market>> {
        self.capabilities().fetch_markets.refuse(self.id(), "fetchMarkets")
    }

    /// Warm the market cache; by contract equivalent to `fetch_markets`.
    async fn preload_markets(&self) -> VenueResult<Vec<Market>> {
        self.fetch_markets().await
    }

    async fn fetch_ticker(&self, symbol: &Symbol) -> VenueResult<Ticker> {
        let _ = symbol;
        self.capabilities().fetch_ticker.refuse(self.id(), "fetchTicker")
    }

    /// Emulated when the venue lacks a bulk endpoint: fetch markets, then
    /// each symbol's ticker, ignoring individual failures.
    async fn fetch_tickers(&self) -> VenueResult<Vec<Ticker>> {
        match self.capabilities().fetch_tickers {
            Capability::Emulated => {
                let markets = self.fetch_markets().await?;
                let mut tickers = Vec::with_capacity(markets.len());
                for market in &markets {
                    match self.fetch_ticker(&market.symbol).await {
                        Ok(ticker) => tickers.push(ticker),
                        Err(error) => {
                            warn!(symbol = %market.symbol, %error, "skipping ticker");
                        }
                    }
                }
                Ok(tickers)
            }
            other => other.refuse(self.id(), "fetchTickers"),
        }
    }

    async fn fetch_order_book(
        &self,
        symbol: &Symbol,
        limit: Option<u32>,
    ) -> VenueResult<OrderBook> {
        let _ = (symbol, limit);
        self.capabilities().fetch_order_book.refuse(self.id(), "fetchOrderBook")
    }

    async fn fetch_trades(&self, symbol: &Symbol, limit: Option<u32>) -> VenueResult<Vec<Trade>> {
        let _ = (symbol, limit);
        self.capabilities().fetch_trades.refuse(self.id(), "fetchTrades")
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: &str,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> VenueResult<Vec<Ohlcv>> {
        let _ = (symbol, timeframe, since, limit);
        self.capabilities().fetch_ohlcv.refuse(self.id(), "fetchOHLCV")
    }

    async fn fetch_funding_rate(&self, symbol: &Symbol) -> VenueResult<FundingRate> {
        let _ = symbol;
        self.capabilities().fetch_funding_rate.refuse(self.id(), "fetchFundingRate")
    }

    async fn fetch_funding_rate_history(
        &self,
        symbol: &Symbol,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> VenueResult<Vec<FundingRate>> {
        let _ = (symbol, since, limit);
        self.capabilities()
            .fetch_funding_rate_history
            .refuse(self.id(), "fetchFundingRateHistory")
    }

    /// Emulated status probe: `fetch_markets` success maps to `Ok`,
    /// failure to `Error(message)`.
    async fn fetch_status(&self) -> VenueResult<VenueStatus> {
        match self.capabilities().fetch_status {
            Capability::Emulated => match self.fetch_markets().await {
                Ok(_) => Ok(VenueStatus::Ok),
                Err(error) => Ok(VenueStatus::Error {
                    message: error.to_string(),
                }),
            },
            other => other.refuse(self.id(), "fetchStatus"),
        }
    }

    // ---------- trading ----------

    async fn create_order(&self, request: &OrderRequest) -> VenueResult<Order> {
        let _ = request;
        self.capabilities().create_order.refuse(self.id(), "createOrder")
    }

    async fn cancel_order(&self, id: &str, symbol: &Symbol) -> VenueResult<Order> {
        let _ = (id, symbol);
        self.capabilities().cancel_order.refuse(self.id(), "cancelOrder")
    }

    async fn cancel_all_orders(&self, symbol: Option<&Symbol>) -> VenueResult<Vec<Order>> {
        let _ = symbol;
        self.capabilities().cancel_all_orders.refuse(self.id(), "cancelAllOrders")
    }

    /// Emulated by iterating `create_order`; partial failure is returned,
    /// total failure throws.
    async fn create_batch_orders(
        &self,
        requests: &[OrderRequest],
    ) -> VenueResult<BatchResult<Order>> {
        match self.capabilities().create_batch_orders {
            Capability::Emulated => {
                let mut batch = BatchResult::default();
                for request in requests {
                    match self.create_order(request).await {
                        Ok(order) => batch.push_ok(order),
                        Err(error) => {
                            warn!(symbol = %request.symbol, %error, "batch order failed");
                            batch.push_err(error);
                        }
                    }
                }
                batch.into_result("createBatchOrders")
            }
            other => other.refuse(self.id(), "createBatchOrders"),
        }
    }

    /// Emulated by iterating `cancel_order`. On partial failure the
    /// successes and the error list are both returned; nothing is retried
    /// silently.
    async fn cancel_batch_orders(
        &self,
        ids: &[String],
        symbol: &Symbol,
    ) -> VenueResult<BatchResult<Order>> {
        match self.capabilities().cancel_batch_orders {
            Capability::Emulated => {
                let mut batch = BatchResult::default();
                for id in ids {
                    match self.cancel_order(id, symbol).await {
                        Ok(order) => batch.push_ok(order),
                        Err(error) => {
                            warn!(order_id = %id, %error, "batch cancel failed");
                            batch.push_err(error);
                        }
                    }
                }
                batch.into_result("cancelBatchOrders")
            }
            other => other.refuse(self.id(), "cancelBatchOrders"),
        }
    }

    async fn edit_order(&self, id: &str, request: &OrderRequest) -> VenueResult<Order> {
        let _ = (id, request);
        self.capabilities().edit_order.refuse(self.id(), "editOrder")
    }

    // ---------- account ----------

    async fn fetch_positions(&self, symbols: Option<&[Symbol]>) -> VenueResult<Vec<Position>> {
        let _ = symbols;
        self.capabilities().fetch_positions.refuse(self.id(), "fetchPositions")
    }

    async fn fetch_balance(&self) -> VenueResult<Vec<Balance>> {
        self.capabilities().fetch_balance.refuse(self.id(), "fetchBalance")
    }

    async fn fetch_open_orders(&self, symbol: Option<&Symbol>) -> VenueResult<Vec<Order>> {
        let _ = symbol;
        self.capabilities().fetch_open_orders.refuse(self.id(), "fetchOpenOrders")
    }

    async fn fetch_order(&self, id: &str, symbol: &Symbol) -> VenueResult<Order> {
        let _ = (id, symbol);
        self.capabilities().fetch_order.refuse(self.id(), "fetchOrder")
    }

    async fn fetch_order_history(
        &self,
        symbol: Option<&Symbol>,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> VenueResult<Vec<Order>> {
        let _ = (symbol, since, limit);
        self.capabilities().fetch_order_history.refuse(self.id(), "fetchOrderHistory")
    }

    async fn fetch_my_trades(
        &self,
        symbol: Option<&Symbol>,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> VenueResult<Vec<Trade>> {
        let _ = (symbol, since, limit);
        self.capabilities().fetch_my_trades.refuse(self.id(), "fetchMyTrades")
    }

    /// Venues running cross-margin only refuse with `NotSupported` rather
    /// than silently accepting.
    async fn set_leverage(&self, symbol: &Symbol, leverage: f64) -> VenueResult<()> {
        let _ = (symbol, leverage);
        self.capabilities().set_leverage.refuse(self.id(), "setLeverage")
    }

    async fn set_margin_mode(&self, symbol: &Symbol, mode: MarginMode) -> VenueResult<()> {
        let _ = (symbol, mode);
        self.capabilities().set_margin_mode.refuse(self.id(), "setMarginMode")
    }

    // ---------- streaming ----------

    async fn watch_order_book(&self, symbol: &Symbol) -> VenueResult<Feed<OrderBook>> {
        let _ = symbol;
        self.capabilities().watch_order_book.refuse(self.id(), "watchOrderBook")
    }

    async fn watch_trades(&self, symbol: &Symbol) -> VenueResult<Feed<Trade>> {
        let _ = symbol;
        self.capabilities().watch_trades.refuse(self.id(), "watchTrades")
    }

    async fn watch_ticker(&self, symbol: &Symbol) -> VenueResult<Feed<Ticker>> {
        let _ = symbol;
        self.capabilities().watch_ticker.refuse(self.id(), "watchTicker")
    }

    async fn watch_tickers(&self) -> VenueResult<Feed<Vec<Ticker>>> {
        self.capabilities().watch_tickers.refuse(self.id(), "watchTickers")
    }

    async fn watch_positions(&self) -> VenueResult<Feed<Vec<Position>>> {
        self.capabilities().watch_positions.refuse(self.id(), "watchPositions")
    }

    async fn watch_orders(&self, symbol: Option<&Symbol>) -> VenueResult<Feed<Order>> {
        let _ = symbol;
        self.capabilities().watch_orders.refuse(self.id(), "watchOrders")
    }

    async fn watch_balance(&self) -> VenueResult<Feed<Vec<Balance>>> {
        self.capabilities().watch_balance.refuse(self.id(), "watchBalance")
    }

    async fn watch_funding_rate(&self, symbol: &Symbol) -> VenueResult<Feed<FundingRate>> {
        let _ = symbol;
        self.capabilities().watch_funding_rate.refuse(self.id(), "watchFundingRate")
    }

    async fn watch_ohlcv(&self, symbol: &Symbol, timeframe: &str) -> VenueResult<Feed<Ohlcv>> {
        let _ = (symbol, timeframe);
        self.capabilities().watch_ohlcv.refuse(self.id(), "watchOHLCV")
    }

    async fn watch_my_trades(&self, symbol: Option<&Symbol>) -> VenueResult<Feed<Trade>> {
        let _ = symbol;
        self.capabilities().watch_my_trades.refuse(self.id(), "watchMyTrades")
    }

    // ---------- symbols ----------

    /// Deterministic, pure, never networks.
    fn symbol_to_venue(&self, symbol: &Symbol) -> VenueResult<SmolStr>;

    /// Canonical form when the venue symbol is recognized, the venue
    /// string unchanged otherwise.
    fn symbol_from_venue(&self, venue_symbol: &str) -> SmolStr;

    // ---------- health & metrics ----------

    /// Default probe: time `fetch_markets` and classify.
    async fn health_check(&self, config: Option<HealthCheckConfig>) -> VenueResult<HealthReport> {
        let config = config.unwrap_or_default();
        let started = tokio::time::Instant::now();
        let outcome = self.fetch_markets().await;
        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
        let api = match outcome {
            Ok(_) => ApiHealth {
                reachable: true,
                latency_ms,
                error: None,
            },
            Err(error) => ApiHealth {
                reachable: false,
                latency_ms,
                error: Some(error.to_string()),
            },
        };
        Ok(HealthReport::from_probe(api, &config, None, None, None))
    }

    fn metrics(&self) -> MetricsSnapshot;

    fn breaker_metrics(&self) -> BreakerMetrics;

    fn reset_metrics(&self);
}
