//! Shared quote board.
//!
//! One slot per configured symbol, written by the poller and read by the
//! desk, watcher and dashboard. Readers always take a `QuoteSnapshot`
//! copy; no lock is held across engine calls.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::types::{PriceSample, Symbol};

/// Freshness of a symbol's quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeedStatus {
    /// No sample has ever arrived.
    Waiting,
    Live,
    /// Last poll failed, or the last good sample is too old.
    Stale,
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedStatus::Waiting => write!(f, "WAITING"),
            FeedStatus::Live => write!(f, "LIVE"),
            FeedStatus::Stale => write!(f, "STALE"),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct QuoteSlot {
    last_good: Option<PriceSample>,
    last_attempt: Option<DateTime<Utc>>,
    last_error: Option<String>,
    consecutive_failures: u32,
}

/// Point-in-time copy of one slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteSnapshot {
    pub symbol: Symbol,
    pub status: FeedStatus,
    pub last_good: Option<PriceSample>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

impl QuoteSnapshot {
    /// Last known good price, regardless of freshness.
    pub fn price(&self) -> Option<Decimal> {
        self.last_good.as_ref().map(PriceSample::price)
    }

    /// Price only while the quote is live.
    pub fn fresh_price(&self) -> Option<Decimal> {
        match self.status {
            FeedStatus::Live => self.price(),
            FeedStatus::Waiting | FeedStatus::Stale => None,
        }
    }
}

pub struct QuoteBoard {
    slots: BTreeMap<Symbol, RwLock<QuoteSlot>>,
    stale_after: ChronoDuration,
}

impl QuoteBoard {
    pub fn new(symbols: impl IntoIterator<Item = Symbol>, stale_after: std::time::Duration) -> Self {
        let slots = symbols
            .into_iter()
            .map(|s| (s, RwLock::new(QuoteSlot::default())))
            .collect();
        Self {
            slots,
            stale_after: ChronoDuration::from_std(stale_after).unwrap_or_else(|_| ChronoDuration::days(365)),
        }
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.slots.contains_key(symbol)
    }

    /// Store a successful sample. Returns false for an unconfigured symbol.
    pub async fn record_sample(&self, sample: PriceSample) -> bool {
        let Some(slot) = self.slots.get(sample.symbol()) else {
            warn!(symbol = %sample.symbol(), "Sample for unconfigured symbol dropped");
            return false;
        };
        let mut slot = slot.write().await;
        if slot.consecutive_failures > 0 {
            debug!(
                symbol = %sample.symbol(),
                failures = slot.consecutive_failures,
                "Feed recovered"
            );
        }
        slot.last_attempt = Some(Utc::now());
        slot.last_error = None;
        slot.consecutive_failures = 0;
        slot.last_good = Some(sample);
        true
    }

    /// Record a failed poll. The last good sample is kept.
    pub async fn record_failure(&self, symbol: &Symbol, reason: impl Into<String>) -> bool {
        let Some(slot) = self.slots.get(symbol) else {
            return false;
        };
        let mut slot = slot.write().await;
        slot.last_attempt = Some(Utc::now());
        slot.last_error = Some(reason.into());
        slot.consecutive_failures = slot.consecutive_failures.saturating_add(1);
        true
    }

    pub async fn snapshot(&self, symbol: &Symbol) -> Option<QuoteSnapshot> {
        self.snapshot_at(symbol, Utc::now()).await
    }

    /// Snapshot with freshness judged against `now`.
    pub async fn snapshot_at(&self, symbol: &Symbol, now: DateTime<Utc>) -> Option<QuoteSnapshot> {
        let slot = self.slots.get(symbol)?.read().await.clone();
        let status = match &slot.last_good {
            None => FeedStatus::Waiting,
            Some(_) if slot.consecutive_failures > 0 => FeedStatus::Stale,
            Some(sample) if sample.age(now) > self.stale_after => FeedStatus::Stale,
            Some(_) => FeedStatus::Live,
        };
        Some(QuoteSnapshot {
            symbol: symbol.clone(),
            status,
            last_good: slot.last_good,
            last_attempt: slot.last_attempt,
            last_error: slot.last_error,
            consecutive_failures: slot.consecutive_failures,
        })
    }

    /// Snapshots for every configured symbol, in symbol order.
    pub async fn snapshot_all(&self) -> Vec<QuoteSnapshot> {
        let now = Utc::now();
        let mut out = Vec::with_capacity(self.slots.len());
        for symbol in self.slots.keys() {
            if let Some(snap) = self.snapshot_at(symbol, now).await {
                out.push(snap);
            }
        }
        out
    }
}
