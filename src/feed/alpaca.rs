//! Alpaca market data and paper-trading account client.
//!
//! API: `GET {data}/v2/stocks/{ticker}/trades/latest` for the last trade,
//! `GET {data}/v2/stocks/{ticker}/bars?timeframe=1Day` for daily bars,
//! `GET {trading}/v2/account` to confirm credentials.
//! Auth: `APCA-API-KEY-ID` and `APCA-API-SECRET-KEY` headers.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use super::{get_json, http_client, parse_decimal, PriceFeed, PriceFetch};
use crate::config::{AlpacaConfig, AppConfig};
use crate::types::{DailyBar, FenceError, PriceSample, Symbol};

const FEED_NAME: &str = "alpaca";
/// Most bars one request returns.
const MAX_BARS: usize = 1000;

/// Key pair read from the environment. Never logged.
pub struct AlpacaCredentials {
    key_id: SecretString,
    secret_key: SecretString,
}

impl AlpacaCredentials {
    pub fn new(key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            key_id: SecretString::new(key_id.into()),
            secret_key: SecretString::new(secret_key.into()),
        }
    }

    /// Resolve both keys via the env-var names in `[feeds.alpaca]`.
    pub fn from_env(cfg: &AlpacaConfig) -> Result<Self> {
        let key_id = AppConfig::resolve_env(&cfg.key_id_env)?;
        let secret_key = AppConfig::resolve_env(&cfg.secret_key_env)?;
        Ok(Self::new(key_id, secret_key))
    }
}

impl std::fmt::Debug for AlpacaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AlpacaCredentials([REDACTED])")
    }
}

// -- Response shapes ---------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LatestTradeResponse {
    trade: Trade,
}

#[derive(Debug, Deserialize)]
struct Trade {
    /// Trade price.
    p: Decimal,
    /// Trade timestamp (RFC 3339).
    t: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct BarsResponse {
    /// `null` when the window holds no sessions.
    #[serde(default)]
    bars: Option<Vec<Bar>>,
}

#[derive(Debug, Deserialize)]
struct Bar {
    t: DateTime<Utc>,
    h: Decimal,
    l: Decimal,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    account_number: String,
    status: String,
    #[serde(default)]
    currency: Option<String>,
    cash: String,
    buying_power: String,
}

/// What the startup account check reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub account_number: String,
    pub status: String,
    pub currency: String,
    pub cash: Decimal,
    pub buying_power: Decimal,
}

impl TryFrom<AccountResponse> for AccountSummary {
    type Error = String;

    fn try_from(resp: AccountResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            account_number: resp.account_number,
            status: resp.status,
            currency: resp.currency.unwrap_or_else(|| "USD".to_string()),
            cash: parse_decimal(&resp.cash)?,
            buying_power: parse_decimal(&resp.buying_power)?,
        })
    }
}

// -- Client ------------------------------------------------------------------

pub struct AlpacaFeed {
    http: Client,
    data_url: String,
    trading_url: String,
    creds: AlpacaCredentials,
    /// Symbol → ticker ("SPY" → "SPY").
    tickers: BTreeMap<Symbol, String>,
}

impl AlpacaFeed {
    pub fn new(
        cfg: &AlpacaConfig,
        creds: AlpacaCredentials,
        tickers: BTreeMap<Symbol, String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            http: http_client(FEED_NAME, timeout)?,
            data_url: cfg.data_url.trim_end_matches('/').to_string(),
            trading_url: cfg.trading_url.trim_end_matches('/').to_string(),
            creds,
            tickers,
        })
    }

    fn authed(&self, url: &str) -> RequestBuilder {
        self.http
            .get(url)
            .header("APCA-API-KEY-ID", self.creds.key_id.expose_secret().as_str())
            .header("APCA-API-SECRET-KEY", self.creds.secret_key.expose_secret().as_str())
            .header("Accept", "application/json")
    }

    fn ticker(&self, symbol: &Symbol) -> Result<&str, FenceError> {
        self.tickers
            .get(symbol)
            .map(String::as_str)
            .ok_or_else(|| FenceError::UnknownSymbol {
                feed: FEED_NAME.to_string(),
                symbol: symbol.to_string(),
            })
    }

    fn latest_trade_url(&self, ticker: &str) -> String {
        format!("{}/v2/stocks/{}/trades/latest", self.data_url, urlencoding::encode(ticker))
    }

    /// Calendar lookback wide enough to cover `days` sessions across
    /// weekends and holidays.
    fn bars_url(&self, ticker: &str, days: usize, now: DateTime<Utc>) -> String {
        let sessions = days.min(MAX_BARS) as i64;
        let lookback = ChronoDuration::days(sessions * 2 + 7);
        let start = (now - lookback).format("%Y-%m-%d");
        format!(
            "{}/v2/stocks/{}/bars?timeframe=1Day&start={start}&limit={MAX_BARS}",
            self.data_url,
            urlencoding::encode(ticker),
        )
    }

    fn to_fetch(symbol: &Symbol, resp: LatestTradeResponse) -> PriceFetch {
        PriceSample::new(symbol.clone(), resp.trade.p, resp.trade.t)
            .map(PriceFetch::Sample)
            .unwrap_or_else(|e| PriceFetch::unavailable(e.to_string()))
    }

    /// Keep the most recent `days` bars, oldest first.
    fn to_daily_bars(resp: BarsResponse, days: usize) -> Vec<DailyBar> {
        let mut bars: Vec<DailyBar> = resp
            .bars
            .unwrap_or_default()
            .into_iter()
            .map(|b| DailyBar { day: b.t.date_naive(), high: b.h, low: b.l })
            .collect();
        bars.sort_by_key(|b| b.day);
        let skip = bars.len().saturating_sub(days);
        bars.split_off(skip)
    }

    /// Confirm the keys against the paper-trading account endpoint.
    pub async fn check_account(&self) -> Result<AccountSummary, FenceError> {
        let url = format!("{}/v2/account", self.trading_url);
        debug!(url = %url, "Checking Alpaca account");

        let unavailable = |reason: String| FenceError::FeedUnavailable {
            feed: FEED_NAME.to_string(),
            reason,
        };
        let resp: AccountResponse = get_json(self.authed(&url)).await.map_err(unavailable)?;
        let summary = AccountSummary::try_from(resp).map_err(unavailable)?;

        info!(
            account = %summary.account_number,
            status = %summary.status,
            cash = %summary.cash,
            buying_power = %summary.buying_power,
            "Alpaca account verified"
        );
        Ok(summary)
    }
}

#[async_trait]
impl PriceFeed for AlpacaFeed {
    fn name(&self) -> &str {
        FEED_NAME
    }

    async fn fetch_price(&self, symbol: &Symbol) -> Result<PriceFetch, FenceError> {
        let ticker = self.ticker(symbol)?;
        let url = self.latest_trade_url(ticker);
        debug!(url = %url, "Fetching Alpaca latest trade");

        Ok(match get_json::<LatestTradeResponse>(self.authed(&url)).await {
            Ok(resp) => Self::to_fetch(symbol, resp),
            Err(reason) => PriceFetch::unavailable(reason),
        })
    }

    async fn fetch_daily_bars(&self, symbol: &Symbol, days: usize) -> Result<Vec<DailyBar>, FenceError> {
        let ticker = self.ticker(symbol)?;
        let url = self.bars_url(ticker, days.max(1), Utc::now());
        debug!(url = %url, "Fetching Alpaca daily bars");

        let resp: BarsResponse = get_json(self.authed(&url))
            .await
            .map_err(|reason| FenceError::FeedUnavailable { feed: FEED_NAME.to_string(), reason })?;
        Ok(Self::to_daily_bars(resp, days))
    }
}
