//! Watcher: the foreground containment loop.
//!
//! On each tick every fence is checked against the latest quote. A symbol
//! moving into `Breached` fires every registered observer once; it must
//! leave the breached state before it can fire again. Replacing a fence
//! starts its history afresh. Heartbeat symbols are only logged.

pub mod observer;

use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::desk::Desk;
use crate::types::{Containment, Fence, Symbol};
use observer::{BreachEvent, BreachObserver};

pub struct Watcher {
    desk: Arc<Desk>,
    observers: Vec<Arc<dyn BreachObserver>>,
    /// Containment last seen per symbol, tagged with the fence it was judged against.
    last: HashMap<Symbol, (Fence, Containment)>,
}

impl Watcher {
    pub fn new(desk: Arc<Desk>) -> Self {
        Self { desk, observers: Vec::new(), last: HashMap::new() }
    }

    pub fn with_observer(mut self, observer: Arc<dyn BreachObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// One pass over every fence. Returns the breaches that fired.
    pub async fn check_once(&mut self) -> Vec<BreachEvent> {
        let mut fired = Vec::new();

        for view in self.desk.fence_views().await {
            let symbol = view.fence.symbol.clone();
            let previous = self
                .last
                .insert(symbol.clone(), (view.fence.clone(), view.containment))
                .filter(|(fence, _)| fence == &view.fence)
                .map(|(_, containment)| containment);
            if view.containment != Containment::Breached || previous == Some(Containment::Breached) {
                continue;
            }
            let Some(price) = view.price else { continue };

            let event = BreachEvent {
                desk: self.desk.name().to_string(),
                symbol,
                price,
                fence_low: view.fence.low,
                fence_high: view.fence.high,
                wager: view.wager,
                detected_at: Utc::now(),
            };
            for obs in &self.observers {
                if let Err(e) = obs.on_breach(&event).await {
                    warn!(observer = obs.name(), symbol = %event.symbol, error = %e, "Breach observer failed");
                }
            }
            fired.push(event);
        }

        for quote in self.desk.quotes().await {
            if self.desk.is_heartbeat(&quote.symbol) {
                debug!(
                    symbol = %quote.symbol,
                    status = %quote.status,
                    price = ?quote.price(),
                    "Heartbeat"
                );
            }
        }

        fired
    }

    /// Tick every `period` until `shutdown` resolves.
    pub async fn run(mut self, period: Duration, shutdown: impl Future<Output = ()>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            interval_secs = period.as_secs(),
            observers = self.observers.len(),
            "Watching fences. Press Ctrl+C to stop."
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let fired = self.check_once().await;
                    if !fired.is_empty() {
                        info!(count = fired.len(), "Breaches detected this tick");
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received.");
                    break;
                }
            }
        }
    }
}
