//! Coinbase spot price feed.
//!
//! API: `GET {base}/v2/prices/{pair}/spot`
//! Auth: None required.
//! The spot endpoint carries no timestamp, so samples are stamped on receipt.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::{get_json, http_client, parse_decimal, PriceFeed, PriceFetch};
use crate::types::{FenceError, PriceSample, Symbol};

const FEED_NAME: &str = "coinbase";

#[derive(Debug, Deserialize)]
struct SpotResponse {
    data: SpotData,
}

#[derive(Debug, Deserialize)]
struct SpotData {
    /// Price as a decimal string.
    amount: String,
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    currency: Option<String>,
}

pub struct CoinbaseFeed {
    http: Client,
    base_url: String,
    /// Symbol → currency pair ("BTC" → "BTC-USD").
    pairs: BTreeMap<Symbol, String>,
}

impl CoinbaseFeed {
    pub fn new(base_url: &str, pairs: BTreeMap<Symbol, String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(FEED_NAME, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            pairs,
        })
    }

    fn spot_url(&self, pair: &str) -> String {
        format!("{}/v2/prices/{}/spot", self.base_url, urlencoding::encode(pair))
    }

    fn to_fetch(symbol: &Symbol, resp: SpotResponse) -> PriceFetch {
        let price = match parse_decimal(&resp.data.amount) {
            Ok(p) => p,
            Err(reason) => return PriceFetch::unavailable(reason),
        };
        PriceSample::new(symbol.clone(), price, Utc::now())
            .map(PriceFetch::Sample)
            .unwrap_or_else(|e| PriceFetch::unavailable(e.to_string()))
    }
}

#[async_trait]
impl PriceFeed for CoinbaseFeed {
    fn name(&self) -> &str {
        FEED_NAME
    }

    async fn fetch_price(&self, symbol: &Symbol) -> Result<PriceFetch, FenceError> {
        let pair = self.pairs.get(symbol).ok_or_else(|| FenceError::UnknownSymbol {
            feed: FEED_NAME.to_string(),
            symbol: symbol.to_string(),
        })?;

        let url = self.spot_url(pair);
        debug!(url = %url, "Fetching Coinbase spot");

        match get_json::<SpotResponse>(self.http.get(&url)).await {
            Ok(resp) => {
                debug!(
                    symbol = %symbol,
                    base = ?resp.data.base,
                    currency = ?resp.data.currency,
                    amount = %resp.data.amount,
                    "Coinbase spot received"
                );
                Ok(Self::to_fetch(symbol, resp))
            }
            Err(reason) => Ok(PriceFetch::unavailable(reason)),
        }
    }
}
