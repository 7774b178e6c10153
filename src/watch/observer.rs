//! Breach observers.
//!
//! Notified when a fenced symbol's price moves outside its band. Failures
//! are reported to the watcher, which logs them and carries on.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::types::Symbol;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreachEvent {
    pub desk: String,
    pub symbol: Symbol,
    pub price: Decimal,
    pub fence_low: Decimal,
    pub fence_high: Decimal,
    /// Stake currently riding on the symbol.
    pub wager: Decimal,
    pub detected_at: DateTime<Utc>,
}

impl BreachEvent {
    /// Distance outside the nearest bound.
    pub fn overshoot(&self) -> Decimal {
        if self.price > self.fence_high {
            self.price - self.fence_high
        } else if self.price < self.fence_low {
            self.fence_low - self.price
        } else {
            Decimal::ZERO
        }
    }
}

#[async_trait]
pub trait BreachObserver: Send + Sync {
    fn name(&self) -> &str;

    async fn on_breach(&self, event: &BreachEvent) -> Result<()>;
}

/// Emits a `warn` line per breach.
pub struct LogObserver;

#[async_trait]
impl BreachObserver for LogObserver {
    fn name(&self) -> &str {
        "log"
    }

    async fn on_breach(&self, event: &BreachEvent) -> Result<()> {
        warn!(
            symbol = %event.symbol,
            price = %event.price,
            low = %event.fence_low,
            high = %event.fence_high,
            overshoot = %event.overshoot(),
            wager = %event.wager,
            "FENCE BREACHED"
        );
        Ok(())
    }
}

/// POSTs each breach as JSON to a configured URL.
pub struct WebhookObserver {
    http: Client,
    url: String,
}

impl WebhookObserver {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("FENCEWATCH/0.1.0")
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self { http, url: url.into() })
    }
}

#[async_trait]
impl BreachObserver for WebhookObserver {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn on_breach(&self, event: &BreachEvent) -> Result<()> {
        let resp = self
            .http
            .post(&self.url)
            .json(event)
            .send()
            .await
            .context("Webhook request failed")?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("Webhook returned HTTP {status}");
        }
        info!(symbol = %event.symbol, status = %status, "Breach webhook delivered");
        Ok(())
    }
}
