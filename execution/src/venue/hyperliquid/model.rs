//! Hyperliquid info/exchange wire models.

use serde::{Deserialize, Serialize};

/// One entry of `meta.universe`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HlUniverseEntry {
    pub name: String,
    pub sz_decimals: u32,
    #[serde(default)]
    pub max_leverage: Option<f64>,
    #[serde(default)]
    pub only_isolated: bool,
    #[serde(default)]
    pub is_delisted: bool,
}

/// One entry of `metaAndAssetCtxs[1]`, aligned with the universe by index.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HlAssetCtx {
    pub funding: String,
    pub mark_px: String,
    pub oracle_px: String,
    #[serde(default)]
    pub mid_px: Option<String>,
    pub prev_day_px: String,
    pub day_ntl_vlm: String,
    #[serde(default)]
    pub open_interest: Option<String>,
}

/// One row of `openOrders`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HlOpenOrder {
    pub coin: String,
    pub limit_px: String,
    pub oid: u64,
    /// `B` bid / `A` ask.
    pub side: String,
    /// Remaining size.
    pub sz: String,
    pub timestamp: i64,
    #[serde(default)]
    pub orig_sz: Option<String>,
    #[serde(default)]
    pub cloid: Option<String>,
    #[serde(default)]
    pub reduce_only: bool,
}

/// One row of `userFills`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HlFill {
    pub coin: String,
    pub px: String,
    pub sz: String,
    pub side: String,
    pub time: i64,
    pub oid: u64,
    #[serde(default)]
    pub tid: Option<u64>,
    #[serde(default)]
    pub fee: Option<String>,
    #[serde(default)]
    pub closed_pnl: Option<String>,
}

/// One row of `candleSnapshot`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HlCandle {
    pub t: i64,
    pub o: String,
    pub h: String,
    pub l: String,
    pub c: String,
    pub v: String,
}

/// One row of `fundingHistory`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HlFundingEntry {
    pub coin: String,
    pub funding_rate: String,
    pub time: i64,
}
