//! Hyperliquid perpetual DEX driver.
//!
//! POST-only REST surface (`/info` for reads, `/exchange` for actions),
//! EIP-712 agent signing with a monotonic time nonce, coin-indexed venue
//! symbols settling in USDC, and a channel/coin keyed WebSocket.

use crate::cache::MarketCache;
use crate::capability::{Capabilities, Capability};
use crate::config::VenueConfig;
use crate::driver::{Feed, VenueDriver};
use crate::health::{ApiHealth, HealthCheckConfig, HealthReport};
use crate::normalize::{util, Normalizer};
use crate::shared::BatchResult;
use crate::symbol_map;
use crate::validate::validate_order_request;
use async_trait::async_trait;
use futures::StreamExt;
use kestrel_integration::breaker::{BreakerMetrics, CircuitBreaker};
use kestrel_integration::http::{HttpClient, HttpTransport, ReqwestTransport, RetryPolicy};
use kestrel_integration::limit::{RateLimitConfig, RateLimiter};
use kestrel_integration::metric::{MetricsSnapshot, VenueMetrics};
use kestrel_integration::nonce::NonceManager;
use kestrel_integration::signer::{
    eip712::keccak256, Eip712Domain, Eip712Signer, Eip712Type, Eip712Value,
};
use kestrel_integration::websocket::{
    ChannelSpec, MessageRouter, TungsteniteTransport, WsConfig, WsFrame, WsRuntime, WsTransport,
};
use kestrel_markets::{
    Balance, BookLevel, ErrorKind, FundingRate, MarginMode, Market, Ohlcv, Order, OrderBook,
    OrderRequest, OrderSide, OrderStatus, OrderType, Position, PositionSide, Symbol, Ticker,
    TimeInForce, Trade, VenueError, VenueId, VenueResult, POSITION_EPSILON,
};
use reqwest::Method;
use serde_json::{json, Value};
use smol_str::SmolStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub mod model;

use model::*;

const MAINNET_REST: &str = "https://api.hyperliquid.xyz";
const TESTNET_REST: &str = "https://api.hyperliquid-testnet.xyz";
const MAINNET_WS: &str = "wss://api.hyperliquid.xyz/ws";
const TESTNET_WS: &str = "wss://api.hyperliquid-testnet.xyz/ws";

const SETTLE: &str = "USDC";

fn default_rate_limit() -> RateLimitConfig {
    RateLimitConfig::new(1_200, Duration::from_secs(60))
        .with_weight("exchange", 5)
        .with_weight("l2Book", 2)
}

fn capabilities() -> Capabilities {
    Capabilities {
        fetch_markets: Capability::Native,
        fetch_ticker: Capability::Native,
        fetch_tickers: Capability::Native,
        fetch_order_book: Capability::Native,
        fetch_trades: Capability::Native,
        fetch_ohlcv: Capability::Native,
        fetch_funding_rate: Capability::Native,
        fetch_funding_rate_history: Capability::Native,
        fetch_status: Capability::Emulated,
        create_order: Capability::Native,
        cancel_order: Capability::Native,
        cancel_all_orders: Capability::Emulated,
        create_batch_orders: Capability::Native,
        cancel_batch_orders: Capability::Native,
        fetch_positions: Capability::Native,
        fetch_balance: Capability::Native,
        fetch_open_orders: Capability::Native,
        fetch_order: Capability::Native,
        fetch_my_trades: Capability::Native,
        set_leverage: Capability::Native,
        watch_order_book: Capability::Native,
        watch_trades: Capability::Native,
        watch_ticker: Capability::Native,
        ..Capabilities::default()
    }
}

fn hl_ping() -> WsFrame {
    WsFrame::Text(r#"{"method":"ping"}"#.to_string())
}

/// Venue error strings -> taxonomy; unknown strings stay `Unknown` with
/// the message preserved.
fn kind_for_message(message: &str) -> ErrorKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("insufficient margin") || lower.contains("margin") {
        ErrorKind::InsufficientMargin
    } else if lower.contains("minimum value") || lower.contains("minimum size") {
        ErrorKind::MinimumOrderSize { min: 0.0, requested: 0.0 }
    } else if lower.contains("never placed") || lower.contains("unknown oid") {
        ErrorKind::OrderNotFound
    } else if lower.contains("could not immediately match") {
        ErrorKind::OrderRejected { reason: message.to_string() }
    } else if lower.contains("invalid") {
        ErrorKind::InvalidParameter
    } else if lower.contains("signature") {
        ErrorKind::InvalidSignature
    } else {
        ErrorKind::Unknown
    }
}

fn venue_error(message: &str) -> VenueError {
    VenueError::new(kind_for_message(message), message.to_string())
        .with_venue(VenueId::Hyperliquid)
}

fn order_status(status: &str) -> VenueResult<OrderStatus> {
    match status {
        "open" | "triggered" => Ok(OrderStatus::Open),
        "filled" => Ok(OrderStatus::Filled),
        "canceled" | "marginCanceled" | "liquidatedCanceled" | "openInterestCapCanceled" => {
            Ok(OrderStatus::Canceled)
        }
        "rejected" | "reduceOnlyRejected" => Ok(OrderStatus::Rejected),
        other => Err(VenueError::new(
            ErrorKind::Unknown,
            format!("unrecognized order status: {other}"),
        )),
    }
}

fn side_from_venue(side: &str) -> VenueResult<OrderSide> {
    match side {
        "B" => Ok(OrderSide::Buy),
        "A" => Ok(OrderSide::Sell),
        other => Err(VenueError::new(
            ErrorKind::Unknown,
            format!("unrecognized side: {other}"),
        )),
    }
}

fn parse_str(value: &str, what: &str) -> VenueResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
        .ok_or_else(|| util::malformed(what))
}

/// `levels: [[{px, sz, n}, ...], [...]]`.
fn parse_hl_levels(raw: &Value) -> VenueResult<Vec<BookLevel>> {
    raw.as_array()
        .ok_or_else(|| util::malformed("book side"))?
        .iter()
        .map(|level| {
            Ok(BookLevel {
                price: util::f64_field(level, "px")?,
                size: util::f64_field(level, "sz")?,
            })
        })
        .collect()
}

fn stream_router() -> MessageRouter {
    Arc::new(|value: &Value| {
        let channel = value.get("channel").and_then(Value::as_str)?;
        match channel {
            "l2Book" => {
                let coin = value.get("data").and_then(|data| data.get("coin"))?.as_str()?;
                Some(SmolStr::new(format!("l2Book:{coin}")))
            }
            "trades" => {
                let coin = value
                    .get("data")
                    .and_then(Value::as_array)
                    .and_then(|rows| rows.first())
                    .and_then(|row| row.get("coin"))?
                    .as_str()?;
                Some(SmolStr::new(format!("trades:{coin}")))
            }
            "allMids" => Some(SmolStr::new("allMids")),
            // Subscription acks and pongs are not channel traffic.
            _ => None,
        }
    })
}

/// Venue-shape <-> canonical translation for Hyperliquid.
///
/// Conventions for payloads that lack their own context on the wire:
/// markets take the `{"assetIndex", "universe"}` wrapper the driver builds
/// from `meta` (the same wrapper stored in `Market::raw`); tickers take
/// `{"name", "ctx"}` pairs from `metaAndAssetCtxs`; `order_request` emits
/// the venue order object without the `a` asset index, which the driver
/// injects from its market cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct HyperliquidNormalizer;

impl Normalizer for HyperliquidNormalizer {
    fn market(&self, raw: &Value) -> VenueResult<Market> {
        if raw.get("assetIndex").and_then(Value::as_u64).is_none() {
            return Err(util::malformed("assetIndex"));
        }
        let entry: HlUniverseEntry =
            serde_json::from_value(raw.get("universe").cloned().unwrap_or(Value::Null))
                .map_err(|_| util::malformed("universe entry"))?;
        // Perp prices carry `6 - szDecimals` decimal places.
        let price_precision = 6_u32.saturating_sub(entry.sz_decimals);
        let amount_step = 0.1_f64.powi(entry.sz_decimals as i32);
        Ok(Market {
            id: SmolStr::new(&entry.name),
            symbol: symbol_map::coin_to_canonical(&entry.name, SETTLE),
            base: SmolStr::new(entry.name.to_ascii_uppercase()),
            quote: SmolStr::new(SETTLE),
            settle: Some(SmolStr::new(SETTLE)),
            active: !entry.is_delisted,
            min_amount: amount_step,
            price_precision,
            amount_precision: entry.sz_decimals,
            price_tick_size: 0.1_f64.powi(price_precision as i32),
            amount_step_size: amount_step,
            maker_fee: 0.00015,
            taker_fee: 0.00045,
            max_leverage: entry.max_leverage.unwrap_or(50.0),
            funding_interval_hours: Some(1),
            raw: raw.clone(),
        })
    }

    fn ticker(&self, raw: &Value) -> VenueResult<Ticker> {
        let name = util::str_field(raw, "name")?;
        let ctx: HlAssetCtx =
            serde_json::from_value(raw.get("ctx").cloned().unwrap_or(Value::Null))
                .map_err(|_| util::malformed("assetCtx"))?;
        let mark = parse_str(&ctx.mark_px, "markPx")?;
        let prev_day = parse_str(&ctx.prev_day_px, "prevDayPx")?;
        let quote_volume = parse_str(&ctx.day_ntl_vlm, "dayNtlVlm")?;
        let change = mark - prev_day;
        Ok(Ticker {
            symbol: symbol_map::coin_to_canonical(name, SETTLE),
            last: mark,
            bid: None,
            ask: None,
            high: mark,
            low: mark,
            open: prev_day,
            close: mark,
            change,
            percentage: if prev_day > 0.0 { change / prev_day * 100.0 } else { 0.0 },
            base_volume: if mark > 0.0 { quote_volume / mark } else { 0.0 },
            quote_volume,
            timestamp: chrono::Utc::now().timestamp_millis(),
            raw: raw.clone(),
        })
    }

    fn order_book(&self, raw: &Value, symbol: &Symbol) -> VenueResult<OrderBook> {
        let levels = raw
            .get("levels")
            .and_then(Value::as_array)
            .ok_or_else(|| util::malformed("l2Book.levels"))?;
        if levels.len() < 2 {
            return Err(util::malformed("l2Book.levels"));
        }
        let mut book = OrderBook {
            symbol: symbol.clone(),
            timestamp: util::i64_field(raw, "time")
                .unwrap_or_else(|_| chrono::Utc::now().timestamp_millis()),
            bids: parse_hl_levels(&levels[0])?,
            asks: parse_hl_levels(&levels[1])?,
            venue: VenueId::Hyperliquid,
        };
        book.normalize();
        Ok(book)
    }

    fn trade(&self, raw: &Value, symbol: &Symbol) -> VenueResult<Trade> {
        let price = util::f64_field(raw, "px")?;
        let amount = util::f64_field(raw, "sz")?;
        Ok(Trade {
            id: SmolStr::new(
                raw.get("tid")
                    .and_then(Value::as_u64)
                    .map(|tid| tid.to_string())
                    .unwrap_or_default(),
            ),
            symbol: symbol.clone(),
            side: side_from_venue(util::str_field(raw, "side")?)?,
            price,
            amount,
            cost: price * amount,
            timestamp: util::i64_field(raw, "time")?,
            raw: raw.clone(),
        })
    }

    /// An `openOrders` row. `sz` is the remaining size; `origSz` the
    /// original when the venue returns it.
    fn order(&self, raw: &Value) -> VenueResult<Order> {
        let row: HlOpenOrder =
            serde_json::from_value(raw.clone()).map_err(|_| util::malformed("open order"))?;
        let remaining = parse_str(&row.sz, "sz")?;
        let amount = row
            .orig_sz
            .as_deref()
            .map(|orig| parse_str(orig, "origSz"))
            .transpose()?
            .unwrap_or(remaining);
        let filled = amount - remaining;
        let price = parse_str(&row.limit_px, "limitPx")?;
        Ok(Order {
            id: SmolStr::new(row.oid.to_string()),
            symbol: symbol_map::coin_to_canonical(&row.coin, SETTLE),
            kind: OrderType::Limit,
            side: side_from_venue(&row.side)?,
            amount,
            price: Some(price),
            status: if filled > POSITION_EPSILON {
                OrderStatus::PartiallyFilled
            } else {
                OrderStatus::Open
            },
            filled,
            remaining,
            average_price: None,
            cost: filled * price,
            reduce_only: row.reduce_only,
            post_only: false,
            client_order_id: row.cloid.as_deref().map(SmolStr::new),
            timestamp: row.timestamp,
            raw: raw.clone(),
        })
    }

    /// An `assetPositions` row; `None` when `szi` is flat.
    fn position(&self, raw: &Value) -> VenueResult<Option<Position>> {
        let position = raw.get("position").ok_or_else(|| util::malformed("position"))?;
        let signed_size = util::f64_field(position, "szi")?;
        if signed_size.abs() < POSITION_EPSILON {
            return Ok(None);
        }
        let leverage = position.get("leverage");
        let margin_mode = leverage
            .and_then(|leverage| leverage.get("type"))
            .and_then(Value::as_str)
            .map(|kind| {
                if kind == "isolated" {
                    MarginMode::Isolated
                } else {
                    MarginMode::Cross
                }
            })
            .unwrap_or(MarginMode::Cross);
        Ok(Some(Position {
            symbol: symbol_map::coin_to_canonical(util::str_field(position, "coin")?, SETTLE),
            side: if signed_size > 0.0 { PositionSide::Long } else { PositionSide::Short },
            size: signed_size.abs(),
            entry_price: util::f64_field_or(position, "entryPx", 0.0),
            mark_price: util::f64_field_or(position, "positionValue", 0.0) / signed_size.abs(),
            liquidation_price: util::f64_field(position, "liquidationPx").ok(),
            unrealized_pnl: util::f64_field_or(position, "unrealizedPnl", 0.0),
            realized_pnl: 0.0,
            leverage: leverage
                .and_then(|leverage| leverage.get("value"))
                .and_then(Value::as_f64)
                .unwrap_or(1.0),
            margin_mode,
            margin: util::f64_field_or(position, "marginUsed", 0.0),
            timestamp: util::i64_field(raw, "time")
                .unwrap_or_else(|_| chrono::Utc::now().timestamp_millis()),
        }))
    }

    /// The `clearinghouseState` body: a single USDC balance reconciled
    /// from `accountValue` and `withdrawable`.
    fn balances(&self, raw: &Value) -> VenueResult<Vec<Balance>> {
        let summary = raw
            .get("marginSummary")
            .ok_or_else(|| util::malformed("marginSummary"))?;
        let total = util::f64_field(summary, "accountValue")?;
        let free = util::f64_field_or(raw, "withdrawable", 0.0);
        Ok(vec![Balance {
            currency: SmolStr::new(SETTLE),
            total,
            free,
            used: total - free,
            raw: summary.clone(),
        }])
    }

    /// A `fundingHistory` row.
    fn funding_rate(&self, raw: &Value) -> VenueResult<FundingRate> {
        let row: HlFundingEntry =
            serde_json::from_value(raw.clone()).map_err(|_| util::malformed("funding entry"))?;
        Ok(FundingRate {
            symbol: symbol_map::coin_to_canonical(&row.coin, SETTLE),
            funding_rate: parse_str(&row.funding_rate, "fundingRate")?,
            funding_timestamp: row.time,
            next_funding_timestamp: None,
            mark_price: None,
            index_price: None,
            funding_interval_hours: Some(1),
        })
    }

    fn ohlcv(&self, raw: &Value) -> VenueResult<Ohlcv> {
        let row: HlCandle =
            serde_json::from_value(raw.clone()).map_err(|_| util::malformed("candle"))?;
        Ok(Ohlcv {
            timestamp: row.t,
            open: parse_str(&row.o, "o")?,
            high: parse_str(&row.h, "h")?,
            low: parse_str(&row.l, "l")?,
            close: parse_str(&row.c, "c")?,
            volume: parse_str(&row.v, "v")?,
        })
    }

    fn order_request(&self, request: &OrderRequest) -> VenueResult<Value> {
        let time_in_force = match (request.kind, request.time_in_force) {
            (OrderType::Market, _) => "Ioc",
            (_, Some(TimeInForce::Po)) => "Alo",
            (_, Some(TimeInForce::Ioc)) => "Ioc",
            (_, Some(TimeInForce::Fok)) => {
                return Err(VenueError::not_supported(VenueId::Hyperliquid, "timeInForce=FOK"))
            }
            _ => "Gtc",
        };
        let price = request.price.ok_or_else(|| {
            VenueError::new(
                ErrorKind::InvalidParameter,
                "hyperliquid orders require a limit/protection price",
            )
        })?;
        let mut order = json!({
            "b": request.side == OrderSide::Buy,
            "p": price.to_string(),
            "s": request.amount.to_string(),
            "r": request.reduce_only,
            "t": {"limit": {"tif": time_in_force}},
        });
        if let Some(cloid) = &request.client_order_id {
            order["c"] = Value::String(cloid.to_string());
        }
        Ok(order)
    }
}

/// The Hyperliquid driver.
pub struct Hyperliquid {
    config: VenueConfig,
    capabilities: Capabilities,
    metrics: Arc<VenueMetrics>,
    limiter: RateLimiter,
    http: HttpClient,
    signer: Option<Eip712Signer>,
    nonces: NonceManager,
    cache: MarketCache,
    ws: WsRuntime,
    normalizer: HyperliquidNormalizer,
    base_url: String,
}

impl std::fmt::Debug for Hyperliquid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hyperliquid")
            .field("testnet", &self.config.testnet)
            .field("authenticated", &self.signer.is_some())
            .finish()
    }
}

impl Hyperliquid {
    pub fn new(config: VenueConfig) -> VenueResult<Self> {
        Self::with_transports(
            config,
            Arc::new(ReqwestTransport::new()),
            Arc::new(TungsteniteTransport),
        )
    }

    /// Construction seam for tests: inject HTTP and WebSocket transports.
    pub fn with_transports(
        config: VenueConfig,
        http_transport: Arc<dyn HttpTransport>,
        ws_transport: Arc<dyn WsTransport>,
    ) -> VenueResult<Self> {
        let metrics = Arc::new(VenueMetrics::new(VenueId::Hyperliquid));
        let limiter = RateLimiter::with_metrics(
            config.rate_limit_config(default_rate_limit()),
            Some(Arc::clone(&metrics)),
        );
        let breaker =
            CircuitBreaker::with_metrics(config.breaker_config(), Some(Arc::clone(&metrics)));
        let http = HttpClient::new(
            VenueId::Hyperliquid,
            http_transport,
            breaker,
            RetryPolicy::default(),
            Some(config.timeout()),
            Arc::clone(&metrics),
        );

        let signer = config
            .api_private_key
            .as_ref()
            .map(|key| {
                Eip712Signer::new(key, Eip712Domain::new("Exchange", "1", 1337, [0u8; 20]))
            })
            .transpose()?;

        let ws_url = if config.testnet { TESTNET_WS } else { MAINNET_WS };
        let ws = WsRuntime::new(
            WsConfig::new(ws_url)
                .with_heartbeat(Duration::from_secs(30), Duration::from_secs(10))
                .with_ping(hl_ping),
            ws_transport,
            stream_router(),
            Arc::clone(&metrics),
        );

        let base_url = if config.testnet { TESTNET_REST } else { MAINNET_REST };
        Ok(Self {
            base_url: base_url.to_string(),
            capabilities: capabilities(),
            metrics,
            limiter,
            http,
            signer,
            nonces: NonceManager::from_clock(),
            cache: MarketCache::default(),
            ws,
            normalizer: HyperliquidNormalizer,
            config,
        })
    }

    fn signer(&self) -> VenueResult<&Eip712Signer> {
        self.signer.as_ref().ok_or_else(|| {
            VenueError::new(
                ErrorKind::InsufficientPermissions,
                "signing key not configured",
            )
            .with_venue(VenueId::Hyperliquid)
        })
    }

    /// The address used for account queries: explicit wallet (agent
    /// setups) or the signing key's own address.
    fn user_address(&self) -> VenueResult<String> {
        if let Some(wallet) = &self.config.wallet {
            return Ok(wallet.clone());
        }
        self.signer().map(|signer| signer.address_hex())
    }

    async fn info(&self, endpoint: &'static str, body: Value) -> VenueResult<Value> {
        self.limiter.acquire(Some(endpoint), None).await?;
        let url = format!("{}/info", self.base_url);
        let response = self
            .http
            .request(endpoint, Method::POST, &url, &[], Some(&body))
            .await?;
        Ok(response.body)
    }

    /// Signed `/exchange` action: allocate a time nonce, bind it into the
    /// EIP-712 agent message, submit, and interpret the status envelope.
    async fn exchange(&self, action: Value) -> VenueResult<Value> {
        let signer = self.signer()?;
        self.limiter.acquire(Some("exchange"), None).await?;

        let nonce = self.nonces.next();
        let mut preimage = serde_json::to_vec(&action).map_err(|error| {
            VenueError::new(ErrorKind::Validation, format!("action encoding: {error}"))
        })?;
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let connection_id = keccak256(&preimage);

        let source = if self.config.testnet { "b" } else { "a" };
        let agent = Eip712Type::new(
            "Agent",
            vec![("source", "string"), ("connectionId", "bytes32")],
        );
        let signature = signer.sign_typed(
            &agent,
            &[
                Eip712Value::String(source.to_string()),
                Eip712Value::Bytes32(connection_id),
            ],
        )?;
        let bytes = hex::decode(&signature[2..])
            .map_err(|_| VenueError::new(ErrorKind::InvalidSignature, "malformed signature"))?;
        let body = json!({
            "action": action,
            "nonce": nonce,
            "signature": {
                "r": format!("0x{}", hex::encode(&bytes[..32])),
                "s": format!("0x{}", hex::encode(&bytes[32..64])),
                "v": bytes[64],
            },
        });

        let url = format!("{}/exchange", self.base_url);
        let response = self
            .http
            .request("exchange", Method::POST, &url, &[], Some(&body))
            .await?;

        let envelope = response.body;
        match envelope.get("status").and_then(Value::as_str) {
            Some("ok") => Ok(envelope.get("response").cloned().unwrap_or(Value::Null)),
            Some("err") => {
                let message = envelope
                    .get("response")
                    .and_then(Value::as_str)
                    .unwrap_or("exchange action failed");
                Err(venue_error(message).with_correlation_id(response.correlation_id.clone()))
            }
            _ => Err(util::malformed("exchange envelope")),
        }
    }

    async fn markets_cached(&self) -> VenueResult<Vec<Market>> {
        if let Some(markets) = self.cache.get() {
            return Ok(markets.as_ref().clone());
        }
        let body = self.info("meta", json!({"type": "meta"})).await?;
        let universe = body
            .get("universe")
            .and_then(Value::as_array)
            .ok_or_else(|| util::malformed("meta.universe"))?;
        let markets = universe
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                self.normalizer
                    .market(&json!({"assetIndex": index, "universe": raw}))
            })
            .collect::<VenueResult<Vec<_>>>()?;
        self.cache.store(markets.clone());
        debug!(markets = markets.len(), "loaded hyperliquid universe");
        Ok(markets)
    }

    fn coin(&self, symbol: &Symbol) -> SmolStr {
        self.cache
            .market(symbol)
            .map(|market| market.id)
            .unwrap_or_else(|| SmolStr::new(symbol.base()))
    }

    fn asset_index(&self, symbol: &Symbol) -> VenueResult<u64> {
        self.cache
            .market(symbol)
            .and_then(|market| market.raw.get("assetIndex").and_then(Value::as_u64))
            .ok_or_else(|| {
                VenueError::new(
                    ErrorKind::InvalidSymbol,
                    format!("unknown market {symbol}; call initialize first"),
                )
                .with_venue(VenueId::Hyperliquid)
            })
    }

    /// Minimal canceled-order record for cancel acknowledgements, which
    /// carry no order details.
    fn canceled_order(id: &str, symbol: &Symbol) -> Order {
        Order {
            id: SmolStr::new(id),
            symbol: symbol.clone(),
            kind: OrderType::Limit,
            side: OrderSide::Buy,
            amount: 0.0,
            price: None,
            status: OrderStatus::Canceled,
            filled: 0.0,
            remaining: 0.0,
            average_price: None,
            cost: 0.0,
            reduce_only: false,
            post_only: false,
            client_order_id: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
            raw: Value::Null,
        }
    }

    fn order_payload(&self, request: &OrderRequest) -> VenueResult<Value> {
        let asset = self.asset_index(&request.symbol)?;
        let mut order = self.normalizer.order_request(request)?;
        order["a"] = Value::from(asset);
        Ok(order)
    }

    fn order_from_status(request: &OrderRequest, status: &Value) -> VenueResult<Order> {
        if let Some(message) = status.get("error").and_then(Value::as_str) {
            return Err(venue_error(message));
        }
        let (id, filled, average_price) = if let Some(resting) = status.get("resting") {
            (util::i64_field(resting, "oid")?.to_string(), 0.0, None)
        } else if let Some(filled) = status.get("filled") {
            (
                util::i64_field(filled, "oid")?.to_string(),
                util::f64_field(filled, "totalSz")?,
                Some(util::f64_field(filled, "avgPx")?),
            )
        } else {
            return Err(util::malformed("order status"));
        };

        let remaining = request.amount - filled;
        Ok(Order {
            id: SmolStr::new(id),
            symbol: request.symbol.clone(),
            kind: request.kind,
            side: request.side,
            amount: request.amount,
            price: request.price,
            status: if remaining <= POSITION_EPSILON {
                OrderStatus::Filled
            } else if filled > POSITION_EPSILON {
                OrderStatus::PartiallyFilled
            } else {
                OrderStatus::Open
            },
            filled,
            remaining: remaining.max(0.0),
            average_price,
            cost: average_price.unwrap_or(0.0) * filled,
            reduce_only: request.reduce_only,
            post_only: request.post_only,
            client_order_id: request.client_order_id.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            raw: status.clone(),
        })
    }

    fn subscription(kind: &str, coin: Option<&str>) -> ChannelSpec {
        let (channel, subscription) = match coin {
            Some(coin) => (
                format!("{kind}:{coin}"),
                json!({"type": kind, "coin": coin}),
            ),
            None => (kind.to_string(), json!({"type": kind})),
        };
        ChannelSpec::new(
            channel.as_str(),
            json!({"method": "subscribe", "subscription": subscription}),
        )
        .with_unsubscribe(json!({"method": "unsubscribe", "subscription": subscription}))
    }
}

#[async_trait]
impl VenueDriver for Hyperliquid {
    fn id(&self) -> VenueId {
        VenueId::Hyperliquid
    }

    fn display_name(&self) -> &str {
        "Hyperliquid"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn initialize(&self) -> VenueResult<()> {
        self.markets_cached().await?;
        self.nonces
            .sync_from_server(chrono::Utc::now().timestamp_millis() as u64);
        Ok(())
    }

    async fn disconnect(&self) -> VenueResult<()> {
        self.ws.disconnect().await;
        self.http.abort_all();
        self.limiter.destroy();
        self.cache.invalidate();
        self.nonces.reset();
        Ok(())
    }

    async fn fetch_markets(&self) -> VenueResult<Vec<Market>> {
        self.markets_cached().await
    }

    async fn fetch_ticker(&self, symbol: &Symbol) -> VenueResult<Ticker> {
        self.fetch_tickers()
            .await?
            .into_iter()
            .find(|ticker| &ticker.symbol == symbol)
            .ok_or_else(|| {
                VenueError::new(ErrorKind::InvalidSymbol, format!("unknown market {symbol}"))
                    .with_venue(VenueId::Hyperliquid)
            })
    }

    async fn fetch_tickers(&self) -> VenueResult<Vec<Ticker>> {
        let body = self
            .info("metaAndAssetCtxs", json!({"type": "metaAndAssetCtxs"}))
            .await?;
        let parts = body.as_array().ok_or_else(|| util::malformed("metaAndAssetCtxs"))?;
        if parts.len() < 2 {
            return Err(util::malformed("metaAndAssetCtxs"));
        }
        let universe = parts[0]
            .get("universe")
            .and_then(Value::as_array)
            .ok_or_else(|| util::malformed("universe"))?;
        let contexts = parts[1]
            .as_array()
            .ok_or_else(|| util::malformed("assetCtxs"))?;

        universe
            .iter()
            .zip(contexts.iter())
            .map(|(entry, ctx)| {
                let name = entry.get("name").cloned().unwrap_or(Value::Null);
                self.normalizer.ticker(&json!({"name": name, "ctx": ctx}))
            })
            .collect()
    }

    async fn fetch_order_book(
        &self,
        symbol: &Symbol,
        _limit: Option<u32>,
    ) -> VenueResult<OrderBook> {
        let coin = self.coin(symbol);
        let body = self
            .info("l2Book", json!({"type": "l2Book", "coin": coin.as_str()}))
            .await?;
        self.normalizer.order_book(&body, symbol)
    }

    async fn fetch_trades(&self, symbol: &Symbol, limit: Option<u32>) -> VenueResult<Vec<Trade>> {
        let coin = self.coin(symbol);
        let body = self
            .info("recentTrades", json!({"type": "recentTrades", "coin": coin.as_str()}))
            .await?;
        let mut trades = body
            .as_array()
            .ok_or_else(|| util::malformed("recentTrades"))?
            .iter()
            .map(|raw| self.normalizer.trade(raw, symbol))
            .collect::<VenueResult<Vec<_>>>()?;
        if let Some(limit) = limit {
            trades.truncate(limit as usize);
        }
        Ok(trades)
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: &str,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> VenueResult<Vec<Ohlcv>> {
        let coin = self.coin(symbol);
        let now = chrono::Utc::now().timestamp_millis();
        let start = since.unwrap_or(now - 24 * 3_600 * 1_000);
        let body = self
            .info(
                "candleSnapshot",
                json!({
                    "type": "candleSnapshot",
                    "req": {"coin": coin.as_str(), "interval": timeframe, "startTime": start, "endTime": now},
                }),
            )
            .await?;
        let mut candles = body
            .as_array()
            .ok_or_else(|| util::malformed("candleSnapshot"))?
            .iter()
            .map(|raw| self.normalizer.ohlcv(raw))
            .collect::<VenueResult<Vec<_>>>()?;
        if let Some(limit) = limit {
            let excess = candles.len().saturating_sub(limit as usize);
            candles.drain(..excess);
        }
        Ok(candles)
    }

    async fn fetch_funding_rate(&self, symbol: &Symbol) -> VenueResult<FundingRate> {
        let coin = self.coin(symbol);
        let body = self
            .info("metaAndAssetCtxs", json!({"type": "metaAndAssetCtxs"}))
            .await?;
        let parts = body.as_array().ok_or_else(|| util::malformed("metaAndAssetCtxs"))?;
        let universe = parts
            .first()
            .and_then(|meta| meta.get("universe"))
            .and_then(Value::as_array)
            .ok_or_else(|| util::malformed("universe"))?;
        let index = universe
            .iter()
            .position(|entry| entry.get("name").and_then(Value::as_str) == Some(coin.as_str()))
            .ok_or_else(|| {
                VenueError::new(ErrorKind::InvalidSymbol, format!("unknown market {symbol}"))
            })?;
        let ctx = parts
            .get(1)
            .and_then(Value::as_array)
            .and_then(|contexts| contexts.get(index))
            .ok_or_else(|| util::malformed("assetCtxs"))?;

        Ok(FundingRate {
            symbol: symbol.clone(),
            funding_rate: util::f64_field(ctx, "funding")?,
            funding_timestamp: chrono::Utc::now().timestamp_millis(),
            next_funding_timestamp: None,
            mark_price: util::f64_field(ctx, "markPx").ok(),
            index_price: util::f64_field(ctx, "oraclePx").ok(),
            funding_interval_hours: Some(1),
        })
    }

    async fn fetch_funding_rate_history(
        &self,
        symbol: &Symbol,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> VenueResult<Vec<FundingRate>> {
        let coin = self.coin(symbol);
        let start = since.unwrap_or(0);
        let body = self
            .info(
                "fundingHistory",
                json!({"type": "fundingHistory", "coin": coin.as_str(), "startTime": start}),
            )
            .await?;
        let mut history = body
            .as_array()
            .ok_or_else(|| util::malformed("fundingHistory"))?
            .iter()
            .map(|raw| self.normalizer.funding_rate(raw))
            .collect::<VenueResult<Vec<_>>>()?;
        if let Some(limit) = limit {
            history.truncate(limit as usize);
        }
        Ok(history)
    }

    async fn create_order(&self, request: &OrderRequest) -> VenueResult<Order> {
        validate_order_request(request, self.cache.market(&request.symbol).as_ref())?;
        let mut action = json!({
            "type": "order",
            "orders": [self.order_payload(request)?],
            "grouping": "na",
        });
        if self.config.builder_code_enabled {
            if let Some(builder) = &self.config.builder_code {
                action["builder"] = json!({"b": builder});
            }
        }
        let response = self.exchange(action).await?;
        let statuses = response
            .get("data")
            .and_then(|data| data.get("statuses"))
            .and_then(Value::as_array)
            .ok_or_else(|| util::malformed("order statuses"))?;
        let status = statuses.first().ok_or_else(|| util::malformed("order statuses"))?;
        Self::order_from_status(request, status)
    }

    async fn cancel_order(&self, id: &str, symbol: &Symbol) -> VenueResult<Order> {
        let oid: u64 = id.parse().map_err(|_| {
            VenueError::new(ErrorKind::InvalidParameter, format!("non-numeric order id: {id}"))
        })?;
        let asset = self.asset_index(symbol)?;
        let response = self
            .exchange(json!({
                "type": "cancel",
                "cancels": [{"a": asset, "o": oid}],
            }))
            .await?;
        let status = response
            .get("data")
            .and_then(|data| data.get("statuses"))
            .and_then(Value::as_array)
            .and_then(|statuses| statuses.first().cloned())
            .ok_or_else(|| util::malformed("cancel statuses"))?;
        if let Some(message) = status.get("error").and_then(Value::as_str) {
            return Err(venue_error(message));
        }
        Ok(Self::canceled_order(id, symbol))
    }

    /// Emulated: list open orders, then cancel them one by one.
    async fn cancel_all_orders(&self, symbol: Option<&Symbol>) -> VenueResult<Vec<Order>> {
        let open = self.fetch_open_orders(symbol).await?;
        let mut canceled = Vec::with_capacity(open.len());
        for order in &open {
            match self.cancel_order(&order.id, &order.symbol).await {
                Ok(done) => canceled.push(done),
                Err(error) if error.kind == ErrorKind::OrderNotFound => {
                    // Raced a fill; nothing left to cancel.
                }
                Err(error) => return Err(error),
            }
        }
        Ok(canceled)
    }

    async fn create_batch_orders(
        &self,
        requests: &[OrderRequest],
    ) -> VenueResult<BatchResult<Order>> {
        let mut orders = Vec::with_capacity(requests.len());
        for request in requests {
            validate_order_request(request, self.cache.market(&request.symbol).as_ref())?;
            orders.push(self.order_payload(request)?);
        }
        let response = self
            .exchange(json!({"type": "order", "orders": orders, "grouping": "na"}))
            .await?;
        let statuses = response
            .get("data")
            .and_then(|data| data.get("statuses"))
            .and_then(Value::as_array)
            .ok_or_else(|| util::malformed("order statuses"))?;

        let mut batch = BatchResult::default();
        for (request, status) in requests.iter().zip(statuses.iter()) {
            match Self::order_from_status(request, status) {
                Ok(order) => batch.push_ok(order),
                Err(error) => batch.push_err(error),
            }
        }
        batch.into_result("createBatchOrders")
    }

    async fn cancel_batch_orders(
        &self,
        ids: &[String],
        symbol: &Symbol,
    ) -> VenueResult<BatchResult<Order>> {
        let asset = self.asset_index(symbol)?;
        let mut cancels = Vec::with_capacity(ids.len());
        for id in ids {
            let oid: u64 = id.parse().map_err(|_| {
                VenueError::new(
                    ErrorKind::InvalidParameter,
                    format!("non-numeric order id: {id}"),
                )
            })?;
            cancels.push(json!({"a": asset, "o": oid}));
        }
        let response = self
            .exchange(json!({"type": "cancel", "cancels": cancels}))
            .await?;
        let statuses = response
            .get("data")
            .and_then(|data| data.get("statuses"))
            .and_then(Value::as_array)
            .ok_or_else(|| util::malformed("cancel statuses"))?;

        let mut batch = BatchResult::default();
        for (id, status) in ids.iter().zip(statuses.iter()) {
            if let Some(message) = status.get("error").and_then(Value::as_str) {
                batch.push_err(venue_error(message));
            } else {
                batch.push_ok(Self::canceled_order(id, symbol));
            }
        }
        batch.into_result("cancelBatchOrders")
    }

    async fn fetch_positions(&self, symbols: Option<&[Symbol]>) -> VenueResult<Vec<Position>> {
        let user = self.user_address()?;
        let body = self
            .info(
                "clearinghouseState",
                json!({"type": "clearinghouseState", "user": user}),
            )
            .await?;
        let rows = body
            .get("assetPositions")
            .and_then(Value::as_array)
            .ok_or_else(|| util::malformed("assetPositions"))?;

        let mut positions = rows
            .iter()
            .map(|raw| self.normalizer.position(raw))
            .collect::<VenueResult<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        if let Some(symbols) = symbols {
            positions.retain(|position| symbols.contains(&position.symbol));
        }
        Ok(positions)
    }

    async fn fetch_balance(&self) -> VenueResult<Vec<Balance>> {
        let user = self.user_address()?;
        let body = self
            .info(
                "clearinghouseState",
                json!({"type": "clearinghouseState", "user": user}),
            )
            .await?;
        self.normalizer.balances(&body)
    }

    async fn fetch_open_orders(&self, symbol: Option<&Symbol>) -> VenueResult<Vec<Order>> {
        let user = self.user_address()?;
        let body = self
            .info("openOrders", json!({"type": "openOrders", "user": user}))
            .await?;
        let rows = body.as_array().ok_or_else(|| util::malformed("openOrders"))?;
        let mut orders = rows
            .iter()
            .map(|raw| self.normalizer.order(raw))
            .collect::<VenueResult<Vec<_>>>()?;
        if let Some(symbol) = symbol {
            orders.retain(|order| &order.symbol == symbol);
        }
        Ok(orders)
    }

    async fn fetch_order(&self, id: &str, _symbol: &Symbol) -> VenueResult<Order> {
        let user = self.user_address()?;
        let oid: u64 = id.parse().map_err(|_| {
            VenueError::new(ErrorKind::InvalidParameter, format!("non-numeric order id: {id}"))
        })?;
        let body = self
            .info(
                "orderStatus",
                json!({"type": "orderStatus", "user": user, "oid": oid}),
            )
            .await?;
        if body.get("status").and_then(Value::as_str) != Some("order") {
            return Err(VenueError::new(
                ErrorKind::OrderNotFound,
                format!("order {id} not found"),
            )
            .with_venue(VenueId::Hyperliquid));
        }
        let envelope = body.get("order").ok_or_else(|| util::malformed("orderStatus"))?;
        let inner = envelope.get("order").ok_or_else(|| util::malformed("orderStatus"))?;
        let mut order = self.normalizer.order(inner)?;
        if let Some(status) = envelope.get("status").and_then(Value::as_str) {
            order.status = order_status(status)?;
            if order.status == OrderStatus::Filled {
                order.filled = order.amount;
                order.remaining = 0.0;
            }
        }
        Ok(order)
    }

    async fn fetch_my_trades(
        &self,
        symbol: Option<&Symbol>,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> VenueResult<Vec<Trade>> {
        let user = self.user_address()?;
        let body = self
            .info("userFills", json!({"type": "userFills", "user": user}))
            .await?;
        let rows = body.as_array().ok_or_else(|| util::malformed("userFills"))?;
        let mut trades = rows
            .iter()
            .map(|raw| {
                let fill: HlFill = serde_json::from_value(raw.clone())
                    .map_err(|_| util::malformed("fill"))?;
                let price = parse_str(&fill.px, "px")?;
                let amount = parse_str(&fill.sz, "sz")?;
                Ok(Trade {
                    id: SmolStr::new(
                        fill.tid
                            .map(|tid| tid.to_string())
                            .unwrap_or_else(|| fill.oid.to_string()),
                    ),
                    symbol: symbol_map::coin_to_canonical(&fill.coin, SETTLE),
                    side: side_from_venue(&fill.side)?,
                    price,
                    amount,
                    cost: price * amount,
                    timestamp: fill.time,
                    raw: raw.clone(),
                })
            })
            .collect::<VenueResult<Vec<_>>>()?;
        if let Some(symbol) = symbol {
            trades.retain(|trade| &trade.symbol == symbol);
        }
        if let Some(since) = since {
            trades.retain(|trade| trade.timestamp >= since);
        }
        if let Some(limit) = limit {
            trades.truncate(limit as usize);
        }
        Ok(trades)
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: f64) -> VenueResult<()> {
        let asset = self.asset_index(symbol)?;
        let max = self
            .cache
            .market(symbol)
            .map(|market| market.max_leverage)
            .unwrap_or(50.0);
        if !(1.0..=max).contains(&leverage) {
            return Err(VenueError::new(
                ErrorKind::InvalidParameter,
                format!("leverage {leverage} outside 1..={max}"),
            ));
        }
        self.exchange(json!({
            "type": "updateLeverage",
            "asset": asset,
            "isCross": true,
            "leverage": leverage as u64,
        }))
        .await?;
        Ok(())
    }

    async fn watch_order_book(&self, symbol: &Symbol) -> VenueResult<Feed<OrderBook>> {
        let coin = self.coin(symbol);
        let events = self
            .ws
            .subscribe(Self::subscription("l2Book", Some(coin.as_str())))?;
        let symbol = symbol.clone();
        let normalizer = self.normalizer;
        Ok(Box::pin(events.map(move |item| {
            item.and_then(|value| {
                let data = value.get("data").ok_or_else(|| util::malformed("l2Book"))?;
                normalizer.order_book(data, &symbol)
            })
        })))
    }

    async fn watch_trades(&self, symbol: &Symbol) -> VenueResult<Feed<Trade>> {
        let coin = self.coin(symbol);
        let events = self
            .ws
            .subscribe(Self::subscription("trades", Some(coin.as_str())))?;
        let symbol = symbol.clone();
        let normalizer = self.normalizer;
        let stream = events
            .map(move |item| match item {
                Err(error) => vec![Err(error)],
                Ok(value) => value
                    .get("data")
                    .and_then(Value::as_array)
                    .map(|rows| {
                        rows.iter()
                            .map(|raw| normalizer.trade(raw, &symbol))
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .flat_map(futures::stream::iter);
        Ok(Box::pin(stream))
    }

    async fn watch_ticker(&self, symbol: &Symbol) -> VenueResult<Feed<Ticker>> {
        let coin = self.coin(symbol);
        let events = self.ws.subscribe(Self::subscription("allMids", None))?;
        let symbol = symbol.clone();
        let stream = events.filter_map(move |item| {
            let symbol = symbol.clone();
            let coin = coin.clone();
            futures::future::ready(match item {
                Err(error) => Some(Err(error)),
                Ok(value) => value
                    .get("data")
                    .and_then(|data| data.get("mids"))
                    .and_then(|mids| mids.get(coin.as_str()))
                    .and_then(Value::as_str)
                    .and_then(|mid| mid.parse::<f64>().ok())
                    .map(|mid| {
                        Ok(Ticker {
                            symbol: symbol.clone(),
                            last: mid,
                            bid: None,
                            ask: None,
                            high: mid,
                            low: mid,
                            open: mid,
                            close: mid,
                            change: 0.0,
                            percentage: 0.0,
                            base_volume: 0.0,
                            quote_volume: 0.0,
                            timestamp: chrono::Utc::now().timestamp_millis(),
                            raw: Value::Null,
                        })
                    }),
            })
        });
        Ok(Box::pin(stream))
    }

    fn symbol_to_venue(&self, symbol: &Symbol) -> VenueResult<SmolStr> {
        Ok(self.coin(symbol))
    }

    fn symbol_from_venue(&self, venue_symbol: &str) -> SmolStr {
        SmolStr::new(symbol_map::coin_to_canonical(venue_symbol, SETTLE).as_str())
    }

    async fn health_check(&self, config: Option<HealthCheckConfig>) -> VenueResult<HealthReport> {
        let config = config.unwrap_or_default();
        let started = tokio::time::Instant::now();
        let outcome = self.info("meta", json!({"type": "meta"})).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
        let api = match outcome {
            Ok(_) => ApiHealth { reachable: true, latency_ms, error: None },
            Err(error) => ApiHealth {
                reachable: false,
                latency_ms,
                error: Some(error.to_string()),
            },
        };
        Ok(HealthReport::from_probe(
            api,
            &config,
            None,
            Some(self.signer.is_some()),
            Some(self.limiter.available_tokens()),
        ))
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn breaker_metrics(&self) -> BreakerMetrics {
        self.http.breaker().metrics()
    }

    fn reset_metrics(&self) {
        self.metrics.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_string_mapping() {
        assert_eq!(
            kind_for_message("Insufficient margin to place order"),
            ErrorKind::InsufficientMargin
        );
        assert!(matches!(
            kind_for_message("Order must have minimum value of $10"),
            ErrorKind::MinimumOrderSize { .. }
        ));
        assert_eq!(
            kind_for_message("Order was never placed, already canceled, or filled"),
            ErrorKind::OrderNotFound
        );
        assert!(matches!(
            kind_for_message("Post only order could not immediately match"),
            ErrorKind::OrderRejected { .. }
        ));
        // Total: anything else maps to Unknown with the message kept.
        assert_eq!(kind_for_message("weird new failure"), ErrorKind::Unknown);
    }

    #[test]
    fn test_order_status_table() {
        assert_eq!(order_status("open").unwrap(), OrderStatus::Open);
        assert_eq!(order_status("filled").unwrap(), OrderStatus::Filled);
        assert_eq!(order_status("marginCanceled").unwrap(), OrderStatus::Canceled);
        assert_eq!(order_status("reduceOnlyRejected").unwrap(), OrderStatus::Rejected);
        assert!(order_status("mystery").is_err());
    }

    #[test]
    fn test_market_normalization_from_universe_wrapper() {
        let raw = json!({
            "assetIndex": 3,
            "universe": {"name": "BTC", "szDecimals": 3, "maxLeverage": 40.0}
        });
        let market = HyperliquidNormalizer.market(&raw).unwrap();
        assert_eq!(market.symbol.as_str(), "BTC/USDC:USDC");
        assert_eq!(market.amount_precision, 3);
        assert_eq!(market.price_precision, 3);
        assert_eq!(market.max_leverage, 40.0);
        assert_eq!(market.raw["assetIndex"], 3);
        market.validate().unwrap();
    }

    #[test]
    fn test_book_normalization_sorts() {
        let raw = json!({
            "coin": "ETH",
            "time": 1_700_000_000_000_i64,
            "levels": [
                [{"px": "2990", "sz": "2", "n": 3}, {"px": "3000", "sz": "1.5", "n": 1}],
                [{"px": "3002", "sz": "1", "n": 1}, {"px": "3001", "sz": "4", "n": 2}]
            ]
        });
        let symbol = kestrel_markets::symbol::build_perpetual("ETH", "USDC");
        let book = HyperliquidNormalizer.order_book(&raw, &symbol).unwrap();
        assert_eq!(book.bids[0].price, 3_000.0);
        assert_eq!(book.asks[0].price, 3_001.0);
        book.validate_sorted().unwrap();
    }

    #[test]
    fn test_open_order_normalization_partial_fill() {
        let raw = json!({
            "coin": "BTC",
            "limitPx": "50000",
            "oid": 77,
            "side": "B",
            "sz": "0.4",
            "origSz": "1.0",
            "timestamp": 1_700_000_000_000_i64
        });
        let order = HyperliquidNormalizer.order(&raw).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.amount, 1.0);
        assert!((order.filled - 0.6).abs() < 1e-9);
        assert!((order.remaining - 0.4).abs() < 1e-9);
        order.check_invariants(1e-9).unwrap();
    }

    #[test]
    fn test_position_row_filtering_and_balance_reconciliation() {
        let open = json!({
            "position": {
                "coin": "ETH",
                "szi": "-2.0",
                "entryPx": "3000",
                "positionValue": "5800",
                "unrealizedPnl": "200",
                "liquidationPx": "3500",
                "marginUsed": "1160",
                "leverage": {"type": "cross", "value": 5}
            }
        });
        let position = HyperliquidNormalizer.position(&open).unwrap().unwrap();
        assert_eq!(position.side, PositionSide::Short);
        assert_eq!(position.size, 2.0);
        assert_eq!(position.mark_price, 2_900.0);
        assert_eq!(position.margin_mode, MarginMode::Cross);

        let flat = json!({"position": {"coin": "ETH", "szi": "0.0"}});
        assert!(HyperliquidNormalizer.position(&flat).unwrap().is_none());

        let state = json!({
            "marginSummary": {"accountValue": "1000"},
            "withdrawable": "900"
        });
        let balances = HyperliquidNormalizer.balances(&state).unwrap();
        assert_eq!(balances[0].total, 1_000.0);
        assert_eq!(balances[0].used, 100.0);
        balances[0].check(1e-9).unwrap();
    }

    #[test]
    fn test_order_request_tif_mapping() {
        let symbol = kestrel_markets::symbol::build_perpetual("BTC", "USDC");
        let post_only =
            OrderRequest::limit(symbol.clone(), OrderSide::Buy, 1.0, 50_000.0).post_only();
        let payload = HyperliquidNormalizer.order_request(&post_only).unwrap();
        assert_eq!(payload["t"]["limit"]["tif"], "Alo");
        assert_eq!(payload["b"], true);
        assert_eq!(payload["p"], "50000");
        assert!(payload.get("a").is_none());

        let mut fok = OrderRequest::limit(symbol, OrderSide::Sell, 1.0, 50_000.0);
        fok.time_in_force = Some(TimeInForce::Fok);
        let error = HyperliquidNormalizer.order_request(&fok).unwrap_err();
        assert_eq!(error.kind, ErrorKind::NotSupported);
    }

    #[test]
    fn test_stream_router() {
        let router = stream_router();
        let book = json!({"channel": "l2Book", "data": {"coin": "BTC", "levels": [[], []]}});
        assert_eq!(router(&book).unwrap(), "l2Book:BTC");
        let trades = json!({"channel": "trades", "data": [{"coin": "ETH", "px": "1"}]});
        assert_eq!(router(&trades).unwrap(), "trades:ETH");
        let mids = json!({"channel": "allMids", "data": {"mids": {}}});
        assert_eq!(router(&mids).unwrap(), "allMids");
        assert_eq!(router(&json!({"channel": "pong"})), None);
        assert_eq!(router(&json!({"channel": "subscriptionResponse"})), None);
    }

    #[test]
    fn test_ping_frame_is_venue_text() {
        match hl_ping() {
            WsFrame::Text(text) => assert_eq!(text, r#"{"method":"ping"}"#),
            other => panic!("unexpected ping frame: {other:?}"),
        }
    }
}
