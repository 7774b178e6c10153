//! Background price poller.
//!
//! A single task that fetches every configured symbol concurrently on a
//! fixed cadence and publishes results into the `QuoteBoard`. It is the
//! board's only writer. Failures never stop the loop.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::board::QuoteBoard;
use super::{FeedSet, PriceFetch};
use crate::types::Symbol;

/// Outcome counts for one polling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub updated: usize,
    pub failed: usize,
}

pub struct Poller {
    board: Arc<QuoteBoard>,
    feeds: FeedSet,
    interval: Duration,
    call_timeout: Duration,
}

impl Poller {
    pub fn new(board: Arc<QuoteBoard>, feeds: FeedSet, interval: Duration, call_timeout: Duration) -> Self {
        Self { board, feeds, interval, call_timeout }
    }

    /// Poll every routed symbol once.
    pub async fn poll_once(&self) -> PollReport {
        let symbols: Vec<Symbol> = self.feeds.symbols().cloned().collect();
        let results = join_all(symbols.iter().map(|s| self.poll_symbol(s))).await;

        let updated = results.iter().filter(|ok| **ok).count();
        let report = PollReport { updated, failed: results.len() - updated };
        debug!(updated = report.updated, failed = report.failed, "Poll cycle complete");
        report
    }

    /// Returns true when a fresh sample was stored.
    async fn poll_symbol(&self, symbol: &Symbol) -> bool {
        let Some(feed) = self.feeds.feed_for(symbol) else {
            return false;
        };

        let reason = match timeout(self.call_timeout, feed.fetch_price(symbol)).await {
            Ok(Ok(PriceFetch::Sample(sample))) if sample.symbol() == symbol => {
                return self.board.record_sample(sample).await;
            }
            Ok(Ok(PriceFetch::Sample(sample))) => {
                format!("feed returned a sample for {}", sample.symbol())
            }
            Ok(Ok(PriceFetch::Unavailable { reason })) => reason,
            Ok(Err(e)) => {
                error!(feed = feed.name(), symbol = %symbol, error = %e, "Feed rejected symbol");
                e.to_string()
            }
            Err(_) => format!("no response within {}s", self.call_timeout.as_secs_f32()),
        };

        warn!(feed = feed.name(), symbol = %symbol, reason = %reason, "Price unavailable");
        self.board.record_failure(symbol, reason).await;
        false
    }

    /// Run forever on the configured cadence.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                symbols = self.feeds.len(),
                interval_secs = self.interval.as_secs(),
                "Price poller started"
            );
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.poll_once().await;
            }
        })
    }
}
