//! Mock price feed for integration testing.
//!
//! A deterministic `PriceFeed` whose prices, outages and daily bars are
//! fully controllable from test code. No network access.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use fencewatch::feed::{PriceFeed, PriceFetch};
use fencewatch::types::{DailyBar, FenceError, PriceSample, Symbol};

#[derive(Clone, Default)]
pub struct MockFeed {
    prices: Arc<Mutex<HashMap<Symbol, Decimal>>>,
    bars: Arc<Mutex<HashMap<Symbol, Vec<DailyBar>>>>,
    /// If set, every price request comes back unavailable with this reason.
    outage: Arc<Mutex<Option<String>>>,
    calls: Arc<Mutex<usize>>,
}

impl MockFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, symbol: &Symbol, price: Decimal) {
        self.prices.lock().unwrap().insert(symbol.clone(), price);
    }

    pub fn set_bars(&self, symbol: &Symbol, bars: Vec<DailyBar>) {
        self.bars.lock().unwrap().insert(symbol.clone(), bars);
    }

    /// Simulate the upstream going down.
    pub fn go_down(&self, reason: &str) {
        *self.outage.lock().unwrap() = Some(reason.to_string());
    }

    pub fn recover(&self) {
        *self.outage.lock().unwrap() = None;
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl PriceFeed for MockFeed {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_price(&self, symbol: &Symbol) -> Result<PriceFetch, FenceError> {
        *self.calls.lock().unwrap() += 1;
        if let Some(reason) = self.outage.lock().unwrap().clone() {
            return Ok(PriceFetch::Unavailable { reason });
        }
        let price = self.prices.lock().unwrap().get(symbol).copied();
        match price {
            Some(p) => Ok(PriceSample::new(symbol.clone(), p, Utc::now())
                .map(PriceFetch::Sample)
                .unwrap_or_else(|e| PriceFetch::unavailable(e.to_string()))),
            None => Err(FenceError::UnknownSymbol {
                feed: "mock".into(),
                symbol: symbol.to_string(),
            }),
        }
    }

    async fn fetch_daily_bars(&self, symbol: &Symbol, days: usize) -> Result<Vec<DailyBar>, FenceError> {
        let bars = self.bars.lock().unwrap().get(symbol).cloned().unwrap_or_default();
        let skip = bars.len().saturating_sub(days);
        Ok(bars[skip..].to_vec())
    }
}
