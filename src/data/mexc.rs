//! MEXC futures market data.
//!
//! Reads fair prices and daily klines from the public contract REST API,
//! or from a proxy exposing the same paths.
//!
//! Ticker: `GET /api/v1/contract/ticker?symbol=BTC_USDT`
//! Klines: `GET /api/v1/contract/kline/BTC_USDT?interval=Day1&start=..&end=..`
//! Auth: none.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::MarketDataSource;
use crate::types::ScanError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://contract.mexc.com";

/// How far back the kline request reaches. Comfortably more than MA30 needs.
const KLINE_LOOKBACK_DAYS: i64 = 120;

/// Longest slice of an error body kept in `ScanError::Http`.
const ERROR_BODY_LIMIT: usize = 200;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<TickerData>,
}

/// Numbers sometimes arrive as strings, so fields stay loosely typed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerData {
    #[serde(default)]
    last_price: Option<Value>,
    #[serde(default)]
    fair_price: Option<Value>,
    #[serde(default, rename = "fair_price")]
    fair_price_legacy: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct KlineResponse {
    #[serde(default)]
    data: Option<KlineData>,
}

/// Column-oriented kline payload; only closes are used.
#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(default)]
    close: Vec<Value>,
}

fn as_finite(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite())
}

fn parse_fair_price(symbol: &str, resp: TickerResponse) -> Result<f64, ScanError> {
    let data = match resp.data {
        Some(data) if resp.success => data,
        _ => return Err(ScanError::Malformed(format!("ticker fail for {symbol}"))),
    };

    data.fair_price
        .or(data.fair_price_legacy)
        .or(data.last_price)
        .as_ref()
        .and_then(as_finite)
        .ok_or_else(|| ScanError::InvalidPrice {
            symbol: symbol.to_string(),
        })
}

fn parse_closes(symbol: &str, resp: KlineResponse, min_count: usize) -> Result<Vec<f64>, ScanError> {
    let closes: Vec<f64> = resp
        .data
        .map(|d| d.close.iter().filter_map(as_finite).collect())
        .unwrap_or_default();

    if closes.len() < min_count {
        return Err(ScanError::InsufficientHistory {
            symbol: symbol.to_string(),
            have: closes.len(),
            need: min_count,
        });
    }
    Ok(closes)
}

/// Map a user-facing symbol to the exchange's contract name.
///
/// `BTCUSDT` becomes `BTC_USDT`; names already containing `_` pass through.
pub fn exchange_symbol(symbol: &str) -> String {
    let s = symbol.trim().to_uppercase();
    if s.contains('_') {
        return s;
    }
    match s.strip_suffix("USDT") {
        Some(base) if !base.is_empty() => format!("{base}_USDT"),
        _ => s,
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// MEXC futures REST client.
pub struct MexcClient {
    http: Client,
    base_url: String,
}

impl MexcClient {
    /// Create a client against `base_url` (the exchange or a proxy).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("trend-scanner/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for MEXC")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn ticker_url(&self, symbol: &str) -> String {
        format!(
            "{}/api/v1/contract/ticker?symbol={}",
            self.base_url,
            urlencoding::encode(&exchange_symbol(symbol)),
        )
    }

    fn kline_url(&self, symbol: &str, now: DateTime<Utc>) -> String {
        let end = now.timestamp();
        let start = (now - ChronoDuration::days(KLINE_LOOKBACK_DAYS)).timestamp();
        format!(
            "{}/api/v1/contract/kline/{}?interval=Day1&start={start}&end={end}",
            self.base_url,
            urlencoding::encode(&exchange_symbol(symbol)),
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ScanError> {
        debug!(url, "Fetching MEXC data");

        let resp = self
            .http
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ScanError::Request(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ScanError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(ScanError::Http {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        serde_json::from_str(&body).map_err(|e| ScanError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl MarketDataSource for MexcClient {
    async fn fetch_fair_price(&self, symbol: &str) -> Result<f64, ScanError> {
        let resp: TickerResponse = self.get_json(&self.ticker_url(symbol)).await?;
        parse_fair_price(symbol, resp)
    }

    async fn fetch_daily_closes(
        &self,
        symbol: &str,
        min_count: usize,
    ) -> Result<Vec<f64>, ScanError> {
        let resp: KlineResponse = self.get_json(&self.kline_url(symbol, Utc::now())).await?;
        parse_closes(symbol, resp, min_count)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
