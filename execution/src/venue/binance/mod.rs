//! Binance USD-M perpetual futures driver.
//!
//! REST surface under `/fapi`, HMAC-SHA256 query signing, concatenated
//! `BTCUSDT`-style venue symbols, and the multiplexed `fstream` WebSocket.

use crate::cache::MarketCache;
use crate::capability::{Capabilities, Capability};
use crate::config::VenueConfig;
use crate::driver::{Feed, VenueDriver};
use crate::health::{ApiHealth, HealthCheckConfig, HealthReport};
use crate::normalize::{util, Normalizer};
use crate::symbol_map;
use crate::validate::validate_order_request;
use async_trait::async_trait;
use futures::StreamExt;
use kestrel_integration::breaker::{BreakerMetrics, CircuitBreaker};
use kestrel_integration::http::{HttpClient, HttpTransport, ReqwestTransport, RetryPolicy};
use kestrel_integration::limit::{RateLimitConfig, RateLimiter};
use kestrel_integration::metric::{MetricsSnapshot, VenueMetrics};
use kestrel_integration::signer::{HmacQuerySigner, SignRequest, Signer};
use kestrel_integration::websocket::{
    ChannelSpec, MessageRouter, TungsteniteTransport, WsConfig, WsRuntime, WsTransport,
};
use kestrel_markets::{
    Balance, ErrorKind, FundingRate, MarginMode, Market, Ohlcv, Order, OrderBook, OrderRequest,
    OrderSide, OrderStatus, Position, PositionSide, Symbol, Ticker, TimeInForce, Trade,
    VenueError, VenueId, VenueResult, POSITION_EPSILON,
};
use reqwest::Method;
use serde_json::{json, Value};
use smol_str::SmolStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub mod model;

use model::*;

const MAINNET_REST: &str = "https://fapi.binance.com";
const TESTNET_REST: &str = "https://testnet.binancefuture.com";
const MAINNET_WS: &str = "wss://fstream.binance.com/ws";
const TESTNET_WS: &str = "wss://stream.binancefuture.com/ws";

/// Venue default: 2400 request weight per minute.
fn default_rate_limit() -> RateLimitConfig {
    RateLimitConfig::new(2_400, Duration::from_secs(60))
        .with_weight("depth", 5)
        .with_weight("klines", 5)
        .with_weight("account", 5)
        .with_weight("balance", 5)
        .with_weight("positionRisk", 5)
        .with_weight("allOrders", 5)
        .with_weight("userTrades", 5)
        .with_weight("ticker24hrAll", 40)
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
        cancel_all_orders: Capability::Native,
        create_batch_orders: Capability::Emulated,
        cancel_batch_orders: Capability::Emulated,
        edit_order: Capability::No,
        fetch_positions: Capability::Native,
        fetch_balance: Capability::Native,
        fetch_open_orders: Capability::Native,
        fetch_order: Capability::Native,
        fetch_order_history: Capability::Native,
        fetch_my_trades: Capability::Native,
        set_leverage: Capability::Native,
        set_margin_mode: Capability::Native,
        watch_order_book: Capability::Native,
        watch_trades: Capability::Native,
        watch_ticker: Capability::Native,
        watch_funding_rate: Capability::Native,
        watch_ohlcv: Capability::Native,
        ..Capabilities::default()
    }
}

/// Venue error codes -> taxonomy. Codes outside the table keep the
/// HTTP-status classification.
fn kind_for_code(code: i64) -> Option<ErrorKind> {
    match code {
        -1003 => Some(ErrorKind::RateLimit { retry_after_ms: None }),
        -1021 => Some(ErrorKind::ExpiredAuth),
        -1022 => Some(ErrorKind::InvalidSignature),
        -1102 | -1104 | -1106 | -4003 => Some(ErrorKind::InvalidParameter),
        -1121 => Some(ErrorKind::InvalidSymbol),
        -2010 => Some(ErrorKind::OrderRejected { reason: "new order rejected".to_string() }),
        -2011 | -2013 => Some(ErrorKind::OrderNotFound),
        -2018 => Some(ErrorKind::InsufficientBalance { required: 0.0, available: 0.0 }),
        -2019 => Some(ErrorKind::InsufficientMargin),
        -2021 => Some(ErrorKind::OrderRejected { reason: "order would immediately trigger".to_string() }),
        -4061 => Some(ErrorKind::InvalidOrder),
        -4164 => Some(ErrorKind::MinimumOrderSize { min: 0.0, requested: 0.0 }),
        _ => None,
    }
}

/// Remap a pipeline error using the venue `{code, msg}` body when present,
/// preserving provenance and the original error as cause.
fn map_venue_error(error: VenueError) -> VenueError {
    let Ok(body) = serde_json::from_str::<Value>(&error.message) else {
        return error;
    };
    let Some(code) = body.get("code").and_then(Value::as_i64) else {
        return error;
    };
    let Some(kind) = kind_for_code(code) else {
        return error.with_venue_code(code.to_string());
    };
    let message = body
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or("venue error")
        .to_string();
    let mut mapped = VenueError::new(kind, message).with_venue_code(code.to_string());
    mapped.venue = error.venue;
    mapped.correlation_id = error.correlation_id.clone();
    mapped.with_cause(error)
}

/// Venue order statuses -> canonical. Only clearly-live labels map to
/// `Open`.
fn order_status(status: &str) -> VenueResult<OrderStatus> {
    match status {
        "NEW" | "PENDING_NEW" | "ACCEPTED" => Ok(OrderStatus::Open),
        "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
        "FILLED" => Ok(OrderStatus::Filled),
        "CANCELED" | "CANCELLED" | "PENDING_CANCEL" => Ok(OrderStatus::Canceled),
        "REJECTED" => Ok(OrderStatus::Rejected),
        "EXPIRED" | "EXPIRED_IN_MATCH" => Ok(OrderStatus::Expired),
        other => Err(VenueError::new(
            ErrorKind::Unknown,
            format!("unrecognized order status: {other}"),
        )),
    }
}

fn side_from_venue(side: &str) -> VenueResult<OrderSide> {
    match side {
        "BUY" => Ok(OrderSide::Buy),
        "SELL" => Ok(OrderSide::Sell),
        other => Err(VenueError::new(
            ErrorKind::Unknown,
            format!("unrecognized order side: {other}"),
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

/// Venue-shape <-> canonical translation for Binance USD-M.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinanceNormalizer;

impl Normalizer for BinanceNormalizer {
    fn market(&self, raw: &Value) -> VenueResult<Market> {
        let market: BinanceMarket =
            serde_json::from_value(raw.clone()).map_err(|_| util::malformed("market"))?;

        let mut price_tick_size = 0.1_f64.powi(market.price_precision as i32);
        let mut amount_step_size = 0.1_f64.powi(market.quantity_precision as i32);
        let mut min_amount = amount_step_size;
        for filter in &market.filters {
            match filter.filter_type.as_str() {
                "PRICE_FILTER" => {
                    if let Some(tick) = &filter.tick_size {
                        price_tick_size = parse_str(tick, "tickSize")?;
                    }
                }
                "LOT_SIZE" => {
                    if let Some(step) = &filter.step_size {
                        amount_step_size = parse_str(step, "stepSize")?;
                    }
                    if let Some(min) = &filter.min_qty {
                        min_amount = parse_str(min, "minQty")?;
                    }
                }
                _ => {}
            }
        }

        Ok(Market {
            id: SmolStr::new(&market.symbol),
            symbol: kestrel_markets::symbol::build_perpetual(
                &market.base_asset,
                &market.quote_asset,
            ),
            base: SmolStr::new(market.base_asset.to_ascii_uppercase()),
            quote: SmolStr::new(market.quote_asset.to_ascii_uppercase()),
            settle: Some(SmolStr::new(market.quote_asset.to_ascii_uppercase())),
            active: market.status == "TRADING",
            min_amount,
            price_precision: market.price_precision,
            amount_precision: market.quantity_precision,
            price_tick_size,
            amount_step_size,
            maker_fee: 0.0002,
            taker_fee: 0.0004,
            max_leverage: 125.0,
            funding_interval_hours: Some(8),
            raw: raw.clone(),
        })
    }

    fn ticker(&self, raw: &Value) -> VenueResult<Ticker> {
        let ticker: BinanceTicker =
            serde_json::from_value(raw.clone()).map_err(|_| util::malformed("ticker"))?;
        let last = parse_str(&ticker.last_price, "lastPrice")?;
        Ok(Ticker {
            symbol: symbol_map::split_concat_symbol(&ticker.symbol)
                .unwrap_or_else(|| kestrel_markets::symbol::build_perpetual(&ticker.symbol, "USDT")),
            last,
            bid: None,
            ask: None,
            high: parse_str(&ticker.high_price, "highPrice")?,
            low: parse_str(&ticker.low_price, "lowPrice")?,
            open: parse_str(&ticker.open_price, "openPrice")?,
            close: last,
            change: parse_str(&ticker.price_change, "priceChange")?,
            percentage: parse_str(&ticker.price_change_percent, "priceChangePercent")?,
            base_volume: parse_str(&ticker.volume, "volume")?,
            quote_volume: parse_str(&ticker.quote_volume, "quoteVolume")?,
            timestamp: ticker.close_time,
            raw: raw.clone(),
        })
    }

    fn order_book(&self, raw: &Value, symbol: &Symbol) -> VenueResult<OrderBook> {
        let timestamp = util::i64_field(raw, "E")
            .or_else(|_| util::i64_field(raw, "T"))
            .unwrap_or_else(|_| chrono::Utc::now().timestamp_millis());
        let mut book = OrderBook {
            symbol: symbol.clone(),
            timestamp,
            bids: util::parse_levels(raw.get("bids").ok_or_else(|| util::malformed("bids"))?)?,
            asks: util::parse_levels(raw.get("asks").ok_or_else(|| util::malformed("asks"))?)?,
            venue: VenueId::BinanceUsdm,
        };
        book.normalize();
        Ok(book)
    }

    fn trade(&self, raw: &Value, symbol: &Symbol) -> VenueResult<Trade> {
        let price = util::f64_field(raw, "p")?;
        let amount = util::f64_field(raw, "q")?;
        // `m`: buyer is the maker, so the aggressor sold.
        let buyer_is_maker = raw.get("m").and_then(Value::as_bool).unwrap_or(false);
        Ok(Trade {
            id: SmolStr::new(
                raw.get("a")
                    .and_then(Value::as_i64)
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            ),
            symbol: symbol.clone(),
            side: if buyer_is_maker { OrderSide::Sell } else { OrderSide::Buy },
            price,
            amount,
            cost: price * amount,
            timestamp: util::i64_field(raw, "T")?,
            raw: raw.clone(),
        })
    }

    fn order(&self, raw: &Value) -> VenueResult<Order> {
        let order: BinanceOrder =
            serde_json::from_value(raw.clone()).map_err(|_| util::malformed("order"))?;
        let amount = parse_str(&order.orig_qty, "origQty")?;
        let filled = parse_str(&order.executed_qty, "executedQty")?;
        let average_price = order
            .avg_price
            .as_deref()
            .map(|avg| parse_str(avg, "avgPrice"))
            .transpose()?
            .filter(|avg| *avg > 0.0);
        let cost = match order.cum_quote.as_deref() {
            Some(cum_quote) => parse_str(cum_quote, "cumQuote")?,
            None => average_price.unwrap_or(0.0) * filled,
        };
        let price = parse_str(&order.price, "price")?;
        let time_in_force = order.time_in_force.as_deref();

        Ok(Order {
            id: SmolStr::new(order.order_id.to_string()),
            symbol: symbol_map::split_concat_or_raw(&order.symbol)
                .parse()
                .unwrap_or_else(|_| {
                    kestrel_markets::symbol::build_perpetual(&order.symbol, "USDT")
                }),
            kind: match order.order_type.as_str() {
                "LIMIT" => kestrel_markets::OrderType::Limit,
                "MARKET" => kestrel_markets::OrderType::Market,
                "STOP" => kestrel_markets::OrderType::StopLimit,
                "STOP_MARKET" => kestrel_markets::OrderType::StopMarket,
                other => {
                    return Err(VenueError::new(
                        ErrorKind::Unknown,
                        format!("unrecognized order type: {other}"),
                    ))
                }
            },
            side: side_from_venue(&order.side)?,
            amount,
            price: (price > 0.0).then_some(price),
            status: order_status(&order.status)?,
            filled,
            remaining: amount - filled,
            average_price,
            cost,
            reduce_only: order.reduce_only,
            post_only: time_in_force == Some("PO"),
            client_order_id: order.client_order_id.map(SmolStr::new),
            timestamp: order.update_time.or(order.time).unwrap_or_default(),
            raw: raw.clone(),
        })
    }

    fn position(&self, raw: &Value) -> VenueResult<Option<Position>> {
        let position: BinancePosition =
            serde_json::from_value(raw.clone()).map_err(|_| util::malformed("position"))?;
        let signed_size = parse_str(&position.position_amt, "positionAmt")?;
        if signed_size.abs() < POSITION_EPSILON {
            return Ok(None);
        }
        let margin = position
            .isolated_margin
            .as_deref()
            .map(|isolated| parse_str(isolated, "isolatedMargin"))
            .transpose()?
            .unwrap_or(0.0);
        let liquidation = parse_str(&position.liquidation_price, "liquidationPrice")?;
        Ok(Some(Position {
            symbol: symbol_map::split_concat_or_raw(&position.symbol)
                .parse()
                .unwrap_or_else(|_| {
                    kestrel_markets::symbol::build_perpetual(&position.symbol, "USDT")
                }),
            side: if signed_size > 0.0 { PositionSide::Long } else { PositionSide::Short },
            size: signed_size.abs(),
            entry_price: parse_str(&position.entry_price, "entryPrice")?,
            mark_price: parse_str(&position.mark_price, "markPrice")?,
            liquidation_price: (liquidation > 0.0).then_some(liquidation),
            unrealized_pnl: parse_str(&position.un_realized_profit, "unRealizedProfit")?,
            realized_pnl: 0.0,
            leverage: parse_str(&position.leverage, "leverage")?,
            margin_mode: if position.margin_type.eq_ignore_ascii_case("isolated") {
                MarginMode::Isolated
            } else {
                MarginMode::Cross
            },
            margin,
            timestamp: position.update_time.unwrap_or_default(),
        }))
    }

    fn balances(&self, raw: &Value) -> VenueResult<Vec<Balance>> {
        let rows: Vec<BinanceBalance> =
            serde_json::from_value(raw.clone()).map_err(|_| util::malformed("balances"))?;
        rows.into_iter()
            .map(|row| {
                let total = parse_str(&row.balance, "balance")?;
                let free = parse_str(&row.available_balance, "availableBalance")?;
                Ok(Balance {
                    currency: SmolStr::new(row.asset.to_ascii_uppercase()),
                    total,
                    free,
                    used: total - free,
                    raw: serde_json::to_value(&row).unwrap_or(Value::Null),
                })
            })
            .collect()
    }

    fn funding_rate(&self, raw: &Value) -> VenueResult<FundingRate> {
        let premium: BinancePremiumIndex =
            serde_json::from_value(raw.clone()).map_err(|_| util::malformed("premiumIndex"))?;
        Ok(FundingRate {
            symbol: symbol_map::split_concat_or_raw(&premium.symbol)
                .parse()
                .unwrap_or_else(|_| {
                    kestrel_markets::symbol::build_perpetual(&premium.symbol, "USDT")
                }),
            funding_rate: parse_str(&premium.last_funding_rate, "lastFundingRate")?,
            funding_timestamp: premium.time,
            next_funding_timestamp: Some(premium.next_funding_time),
            mark_price: Some(parse_str(&premium.mark_price, "markPrice")?),
            index_price: Some(parse_str(&premium.index_price, "indexPrice")?),
            funding_interval_hours: Some(8),
        })
    }

    fn ohlcv(&self, raw: &Value) -> VenueResult<Ohlcv> {
        let candle = raw.as_array().ok_or_else(|| util::malformed("kline"))?;
        if candle.len() < 6 {
            return Err(util::malformed("kline"));
        }
        Ok(Ohlcv {
            timestamp: candle[0].as_i64().ok_or_else(|| util::malformed("kline time"))?,
            open: util::parse_f64(&candle[1])?,
            high: util::parse_f64(&candle[2])?,
            low: util::parse_f64(&candle[3])?,
            close: util::parse_f64(&candle[4])?,
            volume: util::parse_f64(&candle[5])?,
        })
    }

    fn order_request(&self, request: &OrderRequest) -> VenueResult<Value> {
        let mut payload = serde_json::Map::new();
        payload.insert(
            "symbol".to_string(),
            Value::String(symbol_map::concat_symbol(&request.symbol).to_string()),
        );
        payload.insert(
            "side".to_string(),
            Value::String(request.side.as_str().to_ascii_uppercase()),
        );
        let order_type = match request.kind {
            kestrel_markets::OrderType::Limit => "LIMIT",
            kestrel_markets::OrderType::Market => "MARKET",
            kestrel_markets::OrderType::StopLimit => "STOP",
            kestrel_markets::OrderType::StopMarket => "STOP_MARKET",
        };
        payload.insert("type".to_string(), Value::String(order_type.to_string()));
        payload.insert("quantity".to_string(), Value::String(request.amount.to_string()));
        if let Some(price) = request.price {
            payload.insert("price".to_string(), Value::String(price.to_string()));
        }
        if let Some(stop_price) = request.stop_price {
            payload.insert("stopPrice".to_string(), Value::String(stop_price.to_string()));
        }
        if let Some(time_in_force) = request.time_in_force {
            let rendered = match time_in_force {
                TimeInForce::Gtc => "GTC",
                TimeInForce::Ioc => "IOC",
                TimeInForce::Fok => "FOK",
                TimeInForce::Po => "PO",
            };
            payload.insert("timeInForce".to_string(), Value::String(rendered.to_string()));
        }
        if request.reduce_only {
            payload.insert("reduceOnly".to_string(), Value::String("true".to_string()));
        }
        if let Some(client_order_id) = &request.client_order_id {
            payload.insert(
                "newClientOrderId".to_string(),
                Value::String(client_order_id.to_string()),
            );
        }
        Ok(Value::Object(payload))
    }
}

fn value_to_params(value: &Value) -> Vec<(String, String)> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                (key.clone(), rendered)
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn stream_router() -> MessageRouter {
    Arc::new(|value: &Value| {
        let event = value.get("e").and_then(Value::as_str)?;
        let symbol = value.get("s").and_then(Value::as_str)?.to_ascii_lowercase();
        match event {
            "depthUpdate" => Some(SmolStr::new(format!("{symbol}@depth20"))),
            "aggTrade" => Some(SmolStr::new(format!("{symbol}@aggTrade"))),
            "24hrTicker" => Some(SmolStr::new(format!("{symbol}@ticker"))),
            "markPriceUpdate" => Some(SmolStr::new(format!("{symbol}@markPrice"))),
            "kline" => {
                let interval = value
                    .get("k")
                    .and_then(|k| k.get("i"))
                    .and_then(Value::as_str)?;
                Some(SmolStr::new(format!("{symbol}@kline_{interval}")))
            }
            _ => None,
        }
    })
}

/// The Binance USD-M futures driver.
pub struct BinanceUsdm {
    config: VenueConfig,
    capabilities: Capabilities,
    metrics: Arc<VenueMetrics>,
    limiter: RateLimiter,
    http: HttpClient,
    signer: Option<HmacQuerySigner>,
    cache: MarketCache,
    ws: WsRuntime,
    normalizer: BinanceNormalizer,
    base_url: String,
}

impl std::fmt::Debug for BinanceUsdm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceUsdm")
            .field("testnet", &self.config.testnet)
            .field("authenticated", &self.signer.is_some())
            .finish()
    }
}

impl BinanceUsdm {
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
        let metrics = Arc::new(VenueMetrics::new(VenueId::BinanceUsdm));
        let limiter = RateLimiter::with_metrics(
            config.rate_limit_config(default_rate_limit()),
            Some(Arc::clone(&metrics)),
        );
        let breaker =
            CircuitBreaker::with_metrics(config.breaker_config(), Some(Arc::clone(&metrics)));
        let http = HttpClient::new(
            VenueId::BinanceUsdm,
            http_transport,
            breaker,
            RetryPolicy::default(),
            Some(config.timeout()),
            Arc::clone(&metrics),
        );

        let signer = match (&config.api_key, &config.api_secret) {
            (Some(api_key), Some(api_secret)) => {
                Some(HmacQuerySigner::new(api_key.clone(), api_secret.clone()))
            }
            _ => None,
        };

        let ws_url = if config.testnet { TESTNET_WS } else { MAINNET_WS };
        let ws = WsRuntime::new(
            WsConfig::new(ws_url)
                .with_heartbeat(Duration::from_secs(180), Duration::from_secs(10)),
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
            cache: MarketCache::default(),
            ws,
            normalizer: BinanceNormalizer,
            config,
        })
    }

    fn signer(&self) -> VenueResult<&HmacQuerySigner> {
        self.signer.as_ref().ok_or_else(|| {
            VenueError::new(
                ErrorKind::InsufficientPermissions,
                "API credentials not configured",
            )
            .with_venue(VenueId::BinanceUsdm)
        })
    }

    /// Rate-limit, sign when needed, execute, and map venue errors.
    async fn request(
        &self,
        endpoint: &'static str,
        method: Method,
        path: &str,
        params: Vec<(String, String)>,
        signed: bool,
    ) -> VenueResult<Value> {
        self.limiter.acquire(Some(endpoint), None).await?;

        let (params, headers) = if signed {
            let signed_request = self
                .signer()?
                .sign(SignRequest::new(method.as_str(), path).with_params(params))?;
            (signed_request.params, signed_request.headers)
        } else {
            (params, Vec::new())
        };

        let query = serde_urlencoded::to_string(&params).map_err(|error| {
            VenueError::new(ErrorKind::Validation, format!("query encoding: {error}"))
        })?;
        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };

        self.http
            .request(endpoint, method, &url, &headers, None)
            .await
            .map(|response| response.body)
            .map_err(map_venue_error)
    }

    async fn markets_cached(&self) -> VenueResult<Vec<Market>> {
        if let Some(markets) = self.cache.get() {
            return Ok(markets.as_ref().clone());
        }
        let body = self
            .request("exchangeInfo", Method::GET, "/fapi/v1/exchangeInfo", vec![], false)
            .await?;
        let rows = body
            .get("symbols")
            .and_then(Value::as_array)
            .ok_or_else(|| util::malformed("exchangeInfo.symbols"))?;
        let markets = rows
            .iter()
            .filter(|raw| {
                raw.get("contractType").and_then(Value::as_str).unwrap_or("PERPETUAL")
                    == "PERPETUAL"
            })
            .map(|raw| self.normalizer.market(raw))
            .collect::<VenueResult<Vec<_>>>()?;
        self.cache.store(markets.clone());
        debug!(markets = markets.len(), "loaded binance markets");
        Ok(markets)
    }

    fn venue_symbol(&self, symbol: &Symbol) -> SmolStr {
        self.cache
            .market(symbol)
            .map(|market| market.id)
            .unwrap_or_else(|| symbol_map::concat_symbol(symbol))
    }

    fn watch_channel(stream_name: &str) -> ChannelSpec {
        ChannelSpec::new(
            stream_name,
            json!({"method": "SUBSCRIBE", "params": [stream_name], "id": 1}),
        )
        .with_unsubscribe(json!({"method": "UNSUBSCRIBE", "params": [stream_name], "id": 1}))
    }
}

#[async_trait]
impl VenueDriver for BinanceUsdm {
    fn id(&self) -> VenueId {
        VenueId::BinanceUsdm
    }

    fn display_name(&self) -> &str {
        "Binance USD-M Futures"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn initialize(&self) -> VenueResult<()> {
        self.markets_cached().await?;
        Ok(())
    }

    async fn disconnect(&self) -> VenueResult<()> {
        self.ws.disconnect().await;
        self.http.abort_all();
        self.limiter.destroy();
        self.cache.invalidate();
        Ok(())
    }

    async fn fetch_markets(&self) -> VenueResult<Vec<Market>> {
        self.markets_cached().await
    }

    async fn fetch_ticker(&self, symbol: &Symbol) -> VenueResult<Ticker> {
        let body = self
            .request(
                "ticker24hr",
                Method::GET,
                "/fapi/v1/ticker/24hr",
                vec![("symbol".to_string(), self.venue_symbol(symbol).to_string())],
                false,
            )
            .await?;
        self.normalizer.ticker(&body)
    }

    async fn fetch_tickers(&self) -> VenueResult<Vec<Ticker>> {
        let body = self
            .request("ticker24hrAll", Method::GET, "/fapi/v1/ticker/24hr", vec![], false)
            .await?;
        body.as_array()
            .ok_or_else(|| util::malformed("tickers"))?
            .iter()
            .map(|raw| self.normalizer.ticker(raw))
            .collect()
    }

    async fn fetch_order_book(
        &self,
        symbol: &Symbol,
        limit: Option<u32>,
    ) -> VenueResult<OrderBook> {
        let mut params = vec![("symbol".to_string(), self.venue_symbol(symbol).to_string())];
        if let Some(limit) = limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        let body = self
            .request("depth", Method::GET, "/fapi/v1/depth", params, false)
            .await?;
        self.normalizer.order_book(&body, symbol)
    }

    async fn fetch_trades(&self, symbol: &Symbol, limit: Option<u32>) -> VenueResult<Vec<Trade>> {
        let mut params = vec![("symbol".to_string(), self.venue_symbol(symbol).to_string())];
        if let Some(limit) = limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        let body = self
            .request("aggTrades", Method::GET, "/fapi/v1/aggTrades", params, false)
            .await?;
        body.as_array()
            .ok_or_else(|| util::malformed("aggTrades"))?
            .iter()
            .map(|raw| self.normalizer.trade(raw, symbol))
            .collect()
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: &str,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> VenueResult<Vec<Ohlcv>> {
        let mut params = vec![
            ("symbol".to_string(), self.venue_symbol(symbol).to_string()),
            ("interval".to_string(), timeframe.to_string()),
        ];
        if let Some(since) = since {
            params.push(("startTime".to_string(), since.to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        let body = self
            .request("klines", Method::GET, "/fapi/v1/klines", params, false)
            .await?;
        body.as_array()
            .ok_or_else(|| util::malformed("klines"))?
            .iter()
            .map(|raw| self.normalizer.ohlcv(raw))
            .collect()
    }

    async fn fetch_funding_rate(&self, symbol: &Symbol) -> VenueResult<FundingRate> {
        let body = self
            .request(
                "premiumIndex",
                Method::GET,
                "/fapi/v1/premiumIndex",
                vec![("symbol".to_string(), self.venue_symbol(symbol).to_string())],
                false,
            )
            .await?;
        self.normalizer.funding_rate(&body)
    }

    async fn fetch_funding_rate_history(
        &self,
        symbol: &Symbol,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> VenueResult<Vec<FundingRate>> {
        let mut params = vec![("symbol".to_string(), self.venue_symbol(symbol).to_string())];
        if let Some(since) = since {
            params.push(("startTime".to_string(), since.to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        let body = self
            .request("fundingRate", Method::GET, "/fapi/v1/fundingRate", params, false)
            .await?;
        let rows: Vec<BinanceFundingEntry> =
            serde_json::from_value(body).map_err(|_| util::malformed("fundingRate"))?;
        Ok(rows
            .into_iter()
            .map(|row| FundingRate {
                symbol: symbol.clone(),
                funding_rate: row.funding_rate.parse().unwrap_or(0.0),
                funding_timestamp: row.funding_time,
                next_funding_timestamp: None,
                mark_price: None,
                index_price: None,
                funding_interval_hours: Some(8),
            })
            .collect())
    }

    async fn create_order(&self, request: &OrderRequest) -> VenueResult<Order> {
        validate_order_request(request, self.cache.market(&request.symbol).as_ref())?;
        let payload = self.normalizer.order_request(request)?;
        let body = self
            .request(
                "order",
                Method::POST,
                "/fapi/v1/order",
                value_to_params(&payload),
                true,
            )
            .await?;
        self.normalizer.order(&body)
    }

    async fn cancel_order(&self, id: &str, symbol: &Symbol) -> VenueResult<Order> {
        let body = self
            .request(
                "order",
                Method::DELETE,
                "/fapi/v1/order",
                vec![
                    ("symbol".to_string(), self.venue_symbol(symbol).to_string()),
                    ("orderId".to_string(), id.to_string()),
                ],
                true,
            )
            .await?;
        self.normalizer.order(&body)
    }

    async fn cancel_all_orders(&self, symbol: Option<&Symbol>) -> VenueResult<Vec<Order>> {
        let symbol = symbol.ok_or_else(|| {
            VenueError::new(
                ErrorKind::InvalidParameter,
                "cancelAllOrders requires a symbol on binance_usdm",
            )
        })?;
        let open = self.fetch_open_orders(Some(symbol)).await?;
        self.request(
            "allOpenOrders",
            Method::DELETE,
            "/fapi/v1/allOpenOrders",
            vec![("symbol".to_string(), self.venue_symbol(symbol).to_string())],
            true,
        )
        .await?;
        Ok(open)
    }

    async fn fetch_positions(&self, symbols: Option<&[Symbol]>) -> VenueResult<Vec<Position>> {
        let body = self
            .request(
                "positionRisk",
                Method::GET,
                "/fapi/v2/positionRisk",
                vec![],
                true,
            )
            .await?;
        let mut positions = body
            .as_array()
            .ok_or_else(|| util::malformed("positionRisk"))?
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
        let body = self
            .request("balance", Method::GET, "/fapi/v2/balance", vec![], true)
            .await?;
        self.normalizer.balances(&body)
    }

    async fn fetch_open_orders(&self, symbol: Option<&Symbol>) -> VenueResult<Vec<Order>> {
        let mut params = Vec::new();
        if let Some(symbol) = symbol {
            params.push(("symbol".to_string(), self.venue_symbol(symbol).to_string()));
        }
        let body = self
            .request("openOrders", Method::GET, "/fapi/v1/openOrders", params, true)
            .await?;
        body.as_array()
            .ok_or_else(|| util::malformed("openOrders"))?
            .iter()
            .map(|raw| self.normalizer.order(raw))
            .collect()
    }

    async fn fetch_order(&self, id: &str, symbol: &Symbol) -> VenueResult<Order> {
        let body = self
            .request(
                "order",
                Method::GET,
                "/fapi/v1/order",
                vec![
                    ("symbol".to_string(), self.venue_symbol(symbol).to_string()),
                    ("orderId".to_string(), id.to_string()),
                ],
                true,
            )
            .await?;
        self.normalizer.order(&body)
    }

    async fn fetch_order_history(
        &self,
        symbol: Option<&Symbol>,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> VenueResult<Vec<Order>> {
        let symbol = symbol.ok_or_else(|| {
            VenueError::new(
                ErrorKind::InvalidParameter,
                "fetchOrderHistory requires a symbol on binance_usdm",
            )
        })?;
        let mut params = vec![("symbol".to_string(), self.venue_symbol(symbol).to_string())];
        if let Some(since) = since {
            params.push(("startTime".to_string(), since.to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        let body = self
            .request("allOrders", Method::GET, "/fapi/v1/allOrders", params, true)
            .await?;
        body.as_array()
            .ok_or_else(|| util::malformed("allOrders"))?
            .iter()
            .map(|raw| self.normalizer.order(raw))
            .collect()
    }

    async fn fetch_my_trades(
        &self,
        symbol: Option<&Symbol>,
        since: Option<i64>,
        limit: Option<u32>,
    ) -> VenueResult<Vec<Trade>> {
        let symbol = symbol.ok_or_else(|| {
            VenueError::new(
                ErrorKind::InvalidParameter,
                "fetchMyTrades requires a symbol on binance_usdm",
            )
        })?;
        let mut params = vec![("symbol".to_string(), self.venue_symbol(symbol).to_string())];
        if let Some(since) = since {
            params.push(("startTime".to_string(), since.to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        let body = self
            .request("userTrades", Method::GET, "/fapi/v1/userTrades", params, true)
            .await?;
        let rows: Vec<BinanceUserTrade> =
            serde_json::from_value(body).map_err(|_| util::malformed("userTrades"))?;
        rows.into_iter()
            .map(|row| {
                let price = parse_str(&row.price, "price")?;
                let amount = parse_str(&row.qty, "qty")?;
                let cost = row
                    .quote_qty
                    .as_deref()
                    .map(|quote| parse_str(quote, "quoteQty"))
                    .transpose()?
                    .unwrap_or(price * amount);
                Ok(Trade {
                    id: SmolStr::new(row.id.to_string()),
                    symbol: symbol.clone(),
                    side: side_from_venue(&row.side)?,
                    price,
                    amount,
                    cost,
                    timestamp: row.time,
                    raw: serde_json::to_value(&row).unwrap_or(Value::Null),
                })
            })
            .collect()
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: f64) -> VenueResult<()> {
        if !(1.0..=125.0).contains(&leverage) {
            return Err(VenueError::new(
                ErrorKind::InvalidParameter,
                format!("leverage {leverage} outside 1..=125"),
            ));
        }
        self.request(
            "leverage",
            Method::POST,
            "/fapi/v1/leverage",
            vec![
                ("symbol".to_string(), self.venue_symbol(symbol).to_string()),
                ("leverage".to_string(), (leverage as u32).to_string()),
            ],
            true,
        )
        .await?;
        Ok(())
    }

    async fn set_margin_mode(&self, symbol: &Symbol, mode: MarginMode) -> VenueResult<()> {
        let margin_type = match mode {
            MarginMode::Cross => "CROSSED",
            MarginMode::Isolated => "ISOLATED",
        };
        self.request(
            "marginType",
            Method::POST,
            "/fapi/v1/marginType",
            vec![
                ("symbol".to_string(), self.venue_symbol(symbol).to_string()),
                ("marginType".to_string(), margin_type.to_string()),
            ],
            true,
        )
        .await?;
        Ok(())
    }

    async fn watch_order_book(&self, symbol: &Symbol) -> VenueResult<Feed<OrderBook>> {
        let stream_name = format!("{}@depth20", self.venue_symbol(symbol).to_ascii_lowercase());
        let events = self.ws.subscribe(Self::watch_channel(&stream_name))?;
        let symbol = symbol.clone();
        let normalizer = self.normalizer;
        Ok(Box::pin(events.map(move |item| {
            item.and_then(|value| {
                // The futures partial-depth push uses `b`/`a` for sides.
                let reshaped = json!({
                    "bids": value.get("b").cloned().unwrap_or(Value::Array(vec![])),
                    "asks": value.get("a").cloned().unwrap_or(Value::Array(vec![])),
                    "E": value.get("E").cloned().unwrap_or(Value::Null),
                });
                normalizer.order_book(&reshaped, &symbol)
            })
        })))
    }

    async fn watch_trades(&self, symbol: &Symbol) -> VenueResult<Feed<Trade>> {
        let stream_name = format!("{}@aggTrade", self.venue_symbol(symbol).to_ascii_lowercase());
        let events = self.ws.subscribe(Self::watch_channel(&stream_name))?;
        let symbol = symbol.clone();
        let normalizer = self.normalizer;
        Ok(Box::pin(events.map(move |item| {
            item.and_then(|value| normalizer.trade(&value, &symbol))
        })))
    }

    async fn watch_ticker(&self, symbol: &Symbol) -> VenueResult<Feed<Ticker>> {
        let stream_name = format!("{}@ticker", self.venue_symbol(symbol).to_ascii_lowercase());
        let events = self.ws.subscribe(Self::watch_channel(&stream_name))?;
        let symbol = symbol.clone();
        Ok(Box::pin(events.map(move |item| {
            item.and_then(|value| {
                let last = util::f64_field(&value, "c")?;
                Ok(Ticker {
                    symbol: symbol.clone(),
                    last,
                    bid: None,
                    ask: None,
                    high: util::f64_field(&value, "h")?,
                    low: util::f64_field(&value, "l")?,
                    open: util::f64_field(&value, "o")?,
                    close: last,
                    change: util::f64_field(&value, "p")?,
                    percentage: util::f64_field(&value, "P")?,
                    base_volume: util::f64_field(&value, "v")?,
                    quote_volume: util::f64_field(&value, "q")?,
                    timestamp: util::i64_field(&value, "E")?,
                    raw: value,
                })
            })
        })))
    }

    async fn watch_funding_rate(&self, symbol: &Symbol) -> VenueResult<Feed<FundingRate>> {
        let stream_name = format!("{}@markPrice", self.venue_symbol(symbol).to_ascii_lowercase());
        let events = self.ws.subscribe(Self::watch_channel(&stream_name))?;
        let symbol = symbol.clone();
        Ok(Box::pin(events.map(move |item| {
            item.and_then(|value| {
                Ok(FundingRate {
                    symbol: symbol.clone(),
                    funding_rate: util::f64_field(&value, "r")?,
                    funding_timestamp: util::i64_field(&value, "E")?,
                    next_funding_timestamp: util::i64_field(&value, "T").ok(),
                    mark_price: util::f64_field(&value, "p").ok(),
                    index_price: util::f64_field(&value, "i").ok(),
                    funding_interval_hours: Some(8),
                })
            })
        })))
    }

    async fn watch_ohlcv(&self, symbol: &Symbol, timeframe: &str) -> VenueResult<Feed<Ohlcv>> {
        let stream_name = format!(
            "{}@kline_{timeframe}",
            self.venue_symbol(symbol).to_ascii_lowercase()
        );
        let events = self.ws.subscribe(Self::watch_channel(&stream_name))?;
        Ok(Box::pin(events.map(move |item| {
            item.and_then(|value| {
                let candle = value.get("k").ok_or_else(|| util::malformed("kline"))?;
                Ok(Ohlcv {
                    timestamp: util::i64_field(candle, "t")?,
                    open: util::f64_field(candle, "o")?,
                    high: util::f64_field(candle, "h")?,
                    low: util::f64_field(candle, "l")?,
                    close: util::f64_field(candle, "c")?,
                    volume: util::f64_field(candle, "v")?,
                })
            })
        })))
    }

    fn symbol_to_venue(&self, symbol: &Symbol) -> VenueResult<SmolStr> {
        Ok(self.venue_symbol(symbol))
    }

    fn symbol_from_venue(&self, venue_symbol: &str) -> SmolStr {
        if let Some(markets) = self.cache.get() {
            if let Some(market) = markets.iter().find(|market| market.id == venue_symbol) {
                return SmolStr::new(market.symbol.as_str());
            }
        }
        symbol_map::split_concat_or_raw(venue_symbol)
    }

    async fn health_check(&self, config: Option<HealthCheckConfig>) -> VenueResult<HealthReport> {
        let config = config.unwrap_or_default();
        let started = tokio::time::Instant::now();
        let outcome = self
            .request("ping", Method::GET, "/fapi/v1/ping", vec![], false)
            .await;
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
            Some(self.signer.as_ref().map(Signer::has_credentials).unwrap_or(false)),
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
    fn test_order_status_table() {
        assert_eq!(order_status("NEW").unwrap(), OrderStatus::Open);
        assert_eq!(order_status("PARTIALLY_FILLED").unwrap(), OrderStatus::PartiallyFilled);
        assert_eq!(order_status("FILLED").unwrap(), OrderStatus::Filled);
        assert_eq!(order_status("CANCELED").unwrap(), OrderStatus::Canceled);
        assert_eq!(order_status("EXPIRED_IN_MATCH").unwrap(), OrderStatus::Expired);
        assert!(order_status("SOMETHING_ELSE").is_err());
    }

    #[test]
    fn test_error_code_mapping_preserves_provenance() {
        let pipeline_error = VenueError::new(
            ErrorKind::Network,
            r#"{"code":-1121,"msg":"Invalid symbol."}"#,
        )
        .with_venue(VenueId::BinanceUsdm)
        .with_correlation_id("corr-1");
        let mapped = map_venue_error(pipeline_error);
        assert_eq!(mapped.kind, ErrorKind::InvalidSymbol);
        assert_eq!(mapped.venue_code.as_deref(), Some("-1121"));
        assert_eq!(mapped.correlation_id.as_deref(), Some("corr-1"));
        assert!(mapped.cause.is_some());
    }

    #[test]
    fn test_error_mapping_is_total() {
        let unknown_code = VenueError::new(
            ErrorKind::ExchangeUnavailable,
            r#"{"code":-9999,"msg":"mystery"}"#,
        );
        let mapped = map_venue_error(unknown_code);
        // Unmapped codes keep the HTTP-status classification.
        assert_eq!(mapped.kind, ErrorKind::ExchangeUnavailable);
        assert_eq!(mapped.venue_code.as_deref(), Some("-9999"));

        let not_json = VenueError::new(ErrorKind::Timeout, "plain text");
        assert_eq!(map_venue_error(not_json).kind, ErrorKind::Timeout);
    }

    #[test]
    fn test_order_normalization_invariants() {
        let raw = json!({
            "orderId": 123456,
            "symbol": "BTCUSDT",
            "status": "NEW",
            "clientOrderId": "kestrel-1",
            "price": "50000",
            "avgPrice": "0",
            "origQty": "0.1",
            "executedQty": "0",
            "cumQuote": "0",
            "timeInForce": "PO",
            "type": "LIMIT",
            "reduceOnly": false,
            "side": "BUY",
            "time": 1700000000000i64,
            "updateTime": 1700000000000i64
        });
        let order = BinanceNormalizer.order(&raw).unwrap();
        assert_eq!(order.symbol.as_str(), "BTC/USDT:USDT");
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.filled, 0.0);
        assert_eq!(order.remaining, 0.1);
        assert!(order.post_only);
        assert_eq!(order.client_order_id.as_deref(), Some("kestrel-1"));
        order.check_invariants(1e-9).unwrap();
    }

    #[test]
    fn test_book_normalization_sorts_unordered_sides() {
        let raw = json!({
            "E": 1700000000000i64,
            "bids": [["49990", "2"], ["50000", "1.5"]],
            "asks": [["50020", "1"], ["50010", "3"]]
        });
        let symbol = kestrel_markets::symbol::build_perpetual("BTC", "USDT");
        let book = BinanceNormalizer.order_book(&raw, &symbol).unwrap();
        assert_eq!(book.bids[0].price, 50_000.0);
        assert_eq!(book.bids[0].size, 1.5);
        assert_eq!(book.bids[1].price, 49_990.0);
        assert_eq!(book.asks[0].price, 50_010.0);
        book.validate_sorted().unwrap();
    }

    #[test]
    fn test_position_row_filtering() {
        let open = json!({
            "symbol": "ETHUSDT",
            "positionAmt": "-2.0",
            "entryPrice": "3000",
            "markPrice": "2900",
            "unRealizedProfit": "200",
            "liquidationPrice": "3500",
            "leverage": "5",
            "marginType": "cross",
            "updateTime": 1700000000000i64
        });
        let position = BinanceNormalizer.position(&open).unwrap().unwrap();
        assert_eq!(position.side, PositionSide::Short);
        assert_eq!(position.size, 2.0);
        assert_eq!(position.margin_mode, MarginMode::Cross);

        let closed = json!({
            "symbol": "ETHUSDT",
            "positionAmt": "0.0",
            "entryPrice": "0",
            "markPrice": "2900",
            "unRealizedProfit": "0",
            "liquidationPrice": "0",
            "leverage": "5",
            "marginType": "cross"
        });
        assert!(BinanceNormalizer.position(&closed).unwrap().is_none());
    }

    #[test]
    fn test_order_request_carries_post_only_tif() {
        let request = OrderRequest::limit(
            kestrel_markets::symbol::build_perpetual("BTC", "USDT"),
            OrderSide::Buy,
            0.1,
            50_000.0,
        )
        .post_only();
        let payload = BinanceNormalizer.order_request(&request).unwrap();
        assert_eq!(payload["symbol"], "BTCUSDT");
        assert_eq!(payload["timeInForce"], "PO");
        assert_eq!(payload["type"], "LIMIT");
        assert_eq!(payload["quantity"], "0.1");
        assert_eq!(payload["price"], "50000");
    }

    #[test]
    fn test_balance_reconciliation() {
        let raw = json!([
            {"asset": "USDT", "balance": "1000", "availableBalance": "900"}
        ]);
        let balances = BinanceNormalizer.balances(&raw).unwrap();
        assert_eq!(balances[0].total, 1_000.0);
        assert_eq!(balances[0].free, 900.0);
        assert_eq!(balances[0].used, 100.0);
        balances[0].check(1e-9).unwrap();
    }

    #[test]
    fn test_stream_router() {
        let router = stream_router();
        let depth = json!({"e": "depthUpdate", "s": "BTCUSDT", "b": [], "a": []});
        assert_eq!(router(&depth).unwrap(), "btcusdt@depth20");
        let trade = json!({"e": "aggTrade", "s": "ETHUSDT"});
        assert_eq!(router(&trade).unwrap(), "ethusdt@aggTrade");
        let kline = json!({"e": "kline", "s": "BTCUSDT", "k": {"i": "1m"}});
        assert_eq!(router(&kline).unwrap(), "btcusdt@kline_1m");
        assert_eq!(router(&json!({"result": null, "id": 1})), None);
    }
}
