//! Price feeds.
//!
//! Defines the `PriceFeed` trait and provides implementations for:
//! - Coinbase: spot prices for crypto pairs (no key)
//! - Binance: ticker prices and daily klines (no key)
//! - Alpaca: latest equity trades, daily bars, paper-account check
//!
//! Also holds the shared `QuoteBoard` and the background `Poller` that
//! keeps it current.

pub mod alpaca;
pub mod binance;
pub mod board;
pub mod coinbase;
pub mod poller;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, FeedKind};
use crate::types::{DailyBar, FenceError, PriceSample, Symbol};

/// What a feed returns for an ordinary request.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceFetch {
    Sample(PriceSample),
    /// Transient failure (timeout, non-2xx, malformed body). Not an error.
    Unavailable { reason: String },
}

impl PriceFetch {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        PriceFetch::Unavailable { reason: reason.into() }
    }
}

/// Abstraction over external price sources.
///
/// Transient failures come back as `PriceFetch::Unavailable`; `Err` is
/// reserved for programmer errors such as asking for an unmapped symbol.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Feed name for logging and identification.
    fn name(&self) -> &str;

    /// Latest price for `symbol`, or unavailable.
    async fn fetch_price(&self, symbol: &Symbol) -> Result<PriceFetch, FenceError>;

    /// Most recent `days` daily bars, oldest first.
    async fn fetch_daily_bars(&self, symbol: &Symbol, days: usize) -> Result<Vec<DailyBar>, FenceError> {
        let _ = (symbol, days);
        Err(FenceError::FeedUnavailable {
            feed: self.name().to_string(),
            reason: "daily bars are not supported by this feed".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Symbol → feed routing
// ---------------------------------------------------------------------------

/// Which feed serves each configured symbol.
#[derive(Clone, Default)]
pub struct FeedSet {
    routes: BTreeMap<Symbol, Arc<dyn PriceFeed>>,
    /// Kept concrete for the startup account check.
    alpaca: Option<Arc<alpaca::AlpacaFeed>>,
}

impl FeedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: Symbol, feed: Arc<dyn PriceFeed>) {
        self.routes.insert(symbol, feed);
    }

    pub fn feed_for(&self, symbol: &Symbol) -> Option<Arc<dyn PriceFeed>> {
        self.routes.get(symbol).cloned()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.routes.keys()
    }

    /// The Alpaca client, when any symbol routes to it.
    pub fn alpaca(&self) -> Option<&alpaca::AlpacaFeed> {
        self.alpaca.as_deref()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Build one client per feed kind in use and route every configured
    /// symbol to it.
    pub fn from_config(cfg: &AppConfig, timeout: Duration) -> Result<Self> {
        let mut set = FeedSet::new();

        let coinbase_map = remote_map(cfg, FeedKind::Coinbase)?;
        if !coinbase_map.is_empty() {
            let feed: Arc<dyn PriceFeed> = Arc::new(coinbase::CoinbaseFeed::new(
                &cfg.feeds.coinbase.base_url,
                coinbase_map.clone(),
                timeout,
            )?);
            for symbol in coinbase_map.into_keys() {
                set.insert(symbol, feed.clone());
            }
        }

        let binance_map = remote_map(cfg, FeedKind::Binance)?;
        if !binance_map.is_empty() {
            let feed: Arc<dyn PriceFeed> = Arc::new(binance::BinanceFeed::new(
                &cfg.feeds.binance.base_url,
                binance_map.clone(),
                timeout,
            )?);
            for symbol in binance_map.into_keys() {
                set.insert(symbol, feed.clone());
            }
        }

        let alpaca_map = remote_map(cfg, FeedKind::Alpaca)?;
        if !alpaca_map.is_empty() {
            let creds = alpaca::AlpacaCredentials::from_env(&cfg.feeds.alpaca)
                .context("Alpaca symbols are configured but credentials are missing")?;
            let client = Arc::new(alpaca::AlpacaFeed::new(
                &cfg.feeds.alpaca,
                creds,
                alpaca_map.clone(),
                timeout,
            )?);
            let feed: Arc<dyn PriceFeed> = client.clone();
            for symbol in alpaca_map.into_keys() {
                set.insert(symbol, feed.clone());
            }
            set.alpaca = Some(client);
        }

        Ok(set)
    }
}

fn remote_map(cfg: &AppConfig, kind: FeedKind) -> Result<BTreeMap<Symbol, String>> {
    cfg.symbols_for(kind)
        .map(|s| Ok((Symbol::new(&s.symbol)?, s.remote_id().to_string())))
        .collect()
}

// ---------------------------------------------------------------------------
// Shared HTTP helpers
// ---------------------------------------------------------------------------

/// Build the reqwest client every feed uses.
pub(crate) fn http_client(feed: &str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("FENCEWATCH/0.1.0")
        .build()
        .with_context(|| format!("Failed to build HTTP client for {feed}"))
}

/// Send a request and decode a JSON body. Every failure becomes a
/// human-readable reason string suitable for `PriceFetch::Unavailable`.
pub(crate) async fn get_json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, String> {
    let resp = request.send().await.map_err(|e| format!("request failed: {e}"))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(format!("HTTP {status}: {}", truncate(&body, 200)));
    }

    resp.json::<T>()
        .await
        .map_err(|e| format!("malformed response: {e}"))
}

/// Parse a decimal quoted as a JSON string ("64012.55").
pub(crate) fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw.trim()).map_err(|e| format!("unparseable price {raw:?}: {e}"))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
