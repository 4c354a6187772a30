//! Binance USD-M futures wire models.

use serde::{Deserialize, Serialize};

/// One entry of `GET /fapi/v1/exchangeInfo` `symbols[]`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceMarket {
    pub symbol: String,
    #[serde(default)]
    pub contract_type: String,
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub margin_asset: String,
    pub price_precision: u32,
    pub quantity_precision: u32,
    #[serde(default)]
    pub filters: Vec<BinanceFilter>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceFilter {
    pub filter_type: String,
    #[serde(default)]
    pub tick_size: Option<String>,
    #[serde(default)]
    pub step_size: Option<String>,
    #[serde(default)]
    pub min_qty: Option<String>,
}

/// `GET /fapi/v1/ticker/24hr`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceTicker {
    pub symbol: String,
    pub price_change: String,
    pub price_change_percent: String,
    pub last_price: String,
    pub high_price: String,
    pub low_price: String,
    pub open_price: String,
    pub volume: String,
    pub quote_volume: String,
    pub close_time: i64,
}

/// `GET /fapi/v1/premiumIndex`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinancePremiumIndex {
    pub symbol: String,
    pub mark_price: String,
    pub index_price: String,
    pub last_funding_rate: String,
    pub next_funding_time: i64,
    pub time: i64,
}

/// One row of `GET /fapi/v1/fundingRate`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceFundingEntry {
    pub symbol: String,
    pub funding_rate: String,
    pub funding_time: i64,
}

/// Order response shared by create/cancel/query.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceOrder {
    pub order_id: u64,
    pub symbol: String,
    pub status: String,
    #[serde(default)]
    pub client_order_id: Option<String>,
    pub price: String,
    #[serde(default)]
    pub avg_price: Option<String>,
    pub orig_qty: String,
    pub executed_qty: String,
    #[serde(default)]
    pub cum_quote: Option<String>,
    #[serde(default)]
    pub time_in_force: Option<String>,
    #[serde(rename = "type")]
    pub order_type: String,
    #[serde(default)]
    pub reduce_only: bool,
    pub side: String,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub update_time: Option<i64>,
}

/// One row of `GET /fapi/v2/positionRisk`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinancePosition {
    pub symbol: String,
    pub position_amt: String,
    pub entry_price: String,
    pub mark_price: String,
    pub un_realized_profit: String,
    pub liquidation_price: String,
    pub leverage: String,
    pub margin_type: String,
    #[serde(default)]
    pub isolated_margin: Option<String>,
    #[serde(default)]
    pub update_time: Option<i64>,
}

/// One row of `GET /fapi/v2/balance`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceBalance {
    pub asset: String,
    pub balance: String,
    pub available_balance: String,
}

/// One row of `GET /fapi/v1/userTrades`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceUserTrade {
    pub id: u64,
    pub symbol: String,
    pub side: String,
    pub price: String,
    pub qty: String,
    pub quote_qty: Option<String>,
    pub time: i64,
}
