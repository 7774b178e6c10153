//! Binance public market data feed.
//!
//! API: `GET {base}/api/v3/ticker/price?symbol={pair}` for the last price,
//! `GET {base}/api/v3/klines?symbol={pair}&interval=1d&limit={n}` for
//! daily bars.
//! Auth: None required.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::{get_json, http_client, parse_decimal, PriceFeed, PriceFetch};
use crate::types::{DailyBar, FenceError, PriceSample, Symbol};

const FEED_NAME: &str = "binance";

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

pub struct BinanceFeed {
    http: Client,
    base_url: String,
    /// Symbol → Binance pair ("ETH" → "ETHUSDT").
    pairs: BTreeMap<Symbol, String>,
}

impl BinanceFeed {
    pub fn new(base_url: &str, pairs: BTreeMap<Symbol, String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(FEED_NAME, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            pairs,
        })
    }

    fn pair(&self, symbol: &Symbol) -> Result<&str, FenceError> {
        self.pairs
            .get(symbol)
            .map(String::as_str)
            .ok_or_else(|| FenceError::UnknownSymbol {
                feed: FEED_NAME.to_string(),
                symbol: symbol.to_string(),
            })
    }

    fn to_fetch(symbol: &Symbol, ticker: TickerPrice) -> PriceFetch {
        match parse_decimal(&ticker.price) {
            Ok(price) => PriceSample::new(symbol.clone(), price, Utc::now())
                .map(PriceFetch::Sample)
                .unwrap_or_else(|e| PriceFetch::unavailable(e.to_string())),
            Err(reason) => PriceFetch::unavailable(reason),
        }
    }

    /// Klines are positional arrays:
    /// `[open_time_ms, open, high, low, close, volume, close_time_ms, ...]`
    /// with prices quoted as strings.
    fn parse_klines(rows: &[Vec<serde_json::Value>]) -> Result<Vec<DailyBar>, String> {
        rows.iter()
            .map(|row| -> Result<DailyBar, String> {
                let open_ms = row
                    .first()
                    .and_then(|v| v.as_i64())
                    .ok_or("kline missing open time")?;
                let field = |idx: usize, name: &str| -> Result<rust_decimal::Decimal, String> {
                    let raw = row
                        .get(idx)
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| format!("kline missing {name}"))?;
                    parse_decimal(raw)
                };
                let day = Utc
                    .timestamp_millis_opt(open_ms)
                    .single()
                    .ok_or("kline open time out of range")?
                    .date_naive();
                Ok(DailyBar { day, high: field(2, "high")?, low: field(3, "low")? })
            })
            .collect()
    }
}

#[async_trait]
impl PriceFeed for BinanceFeed {
    fn name(&self) -> &str {
        FEED_NAME
    }

    async fn fetch_price(&self, symbol: &Symbol) -> Result<PriceFetch, FenceError> {
        let pair = self.pair(symbol)?;
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, urlencoding::encode(pair));
        debug!(url = %url, "Fetching Binance ticker");

        Ok(match get_json::<TickerPrice>(self.http.get(&url)).await {
            Ok(ticker) => Self::to_fetch(symbol, ticker),
            Err(reason) => PriceFetch::unavailable(reason),
        })
    }

    async fn fetch_daily_bars(&self, symbol: &Symbol, days: usize) -> Result<Vec<DailyBar>, FenceError> {
        let pair = self.pair(symbol)?;
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval=1d&limit={}",
            self.base_url,
            urlencoding::encode(pair),
            days.max(1),
        );
        debug!(url = %url, "Fetching Binance daily klines");

        let unavailable = |reason: String| FenceError::FeedUnavailable {
            feed: FEED_NAME.to_string(),
            reason,
        };
        let rows: Vec<Vec<serde_json::Value>> =
            get_json(self.http.get(&url)).await.map_err(unavailable)?;
        Self::parse_klines(&rows).map_err(unavailable)
    }
}
