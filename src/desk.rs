//! Desk: the single entry point the dashboard and watcher go through.
//!
//! Owns the engine state behind a lock, the per-symbol wagers and the
//! symbol table. Prices always come from a `QuoteBoard` snapshot taken
//! before the engine lock is acquired.

use anyhow::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::engine::{EngineState, FenceEngine};
use crate::feed::board::{FeedStatus, QuoteBoard, QuoteSnapshot};
use crate::feed::FeedSet;
use crate::types::{
    Containment, Fence, FenceError, LedgerOrder, SettlementRecord, Symbol, Wager,
};

/// A fence joined with the live quote and stake for display.
#[derive(Debug, Clone, Serialize)]
pub struct FenceView {
    pub fence: Fence,
    pub price: Option<Decimal>,
    pub status: FeedStatus,
    pub containment: Containment,
    pub wager: Decimal,
}

pub struct Desk {
    name: String,
    engine: RwLock<EngineState>,
    wagers: RwLock<BTreeMap<Symbol, Wager>>,
    board: Arc<QuoteBoard>,
    feeds: FeedSet,
    heartbeats: BTreeSet<Symbol>,
    ledger_order: LedgerOrder,
}

impl Desk {
    pub fn new(name: impl Into<String>, initial_bankroll: Decimal, board: Arc<QuoteBoard>, feeds: FeedSet) -> Self {
        Self {
            name: name.into(),
            engine: RwLock::new(EngineState::new(initial_bankroll)),
            wagers: RwLock::new(BTreeMap::new()),
            board,
            feeds,
            heartbeats: BTreeSet::new(),
            ledger_order: LedgerOrder::default(),
        }
    }

    pub fn with_heartbeats(mut self, heartbeats: impl IntoIterator<Item = Symbol>) -> Self {
        self.heartbeats = heartbeats.into_iter().collect();
        self
    }

    pub fn with_ledger_order(mut self, order: LedgerOrder) -> Self {
        self.ledger_order = order;
        self
    }

    /// Seed wagers. Entries for heartbeat symbols are ignored.
    pub fn with_default_wagers(mut self, wagers: impl IntoIterator<Item = Wager>) -> Self {
        let table = self.wagers.get_mut();
        for w in wagers {
            if self.heartbeats.contains(&w.symbol) {
                warn!(symbol = %w.symbol, "Ignoring default wager for heartbeat symbol");
                continue;
            }
            table.insert(w.symbol.clone(), w);
        }
        self
    }

    /// Wire a desk from configuration.
    pub fn from_config(cfg: &AppConfig, board: Arc<QuoteBoard>, feeds: FeedSet) -> Result<Self> {
        let mut heartbeats = Vec::new();
        let mut wagers = Vec::new();
        for entry in &cfg.symbols {
            let symbol = Symbol::new(&entry.symbol)?;
            if entry.heartbeat {
                heartbeats.push(symbol);
            } else if let Some(amount) = entry.default_wager {
                wagers.push(Wager::new(symbol, amount)?);
            }
        }

        Ok(Self::new(cfg.desk.name.clone(), cfg.desk.initial_bankroll, board, feeds)
            .with_heartbeats(heartbeats)
            .with_ledger_order(cfg.desk.ledger_order)
            .with_default_wagers(wagers))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ledger_order(&self) -> LedgerOrder {
        self.ledger_order
    }

    pub fn board(&self) -> &QuoteBoard {
        &self.board
    }

    pub fn is_heartbeat(&self, symbol: &Symbol) -> bool {
        self.heartbeats.contains(symbol)
    }

    /// Parse `raw` and require it to be a configured symbol.
    pub fn resolve(&self, raw: &str) -> Result<Symbol, FenceError> {
        let symbol = Symbol::new(raw)?;
        if !self.board.contains(&symbol) {
            return Err(FenceError::InvalidInput(format!("{symbol} is not a configured symbol")));
        }
        Ok(symbol)
    }

    fn ensure_bettable(&self, symbol: &Symbol) -> Result<(), FenceError> {
        if !self.board.contains(symbol) {
            return Err(FenceError::InvalidInput(format!("{symbol} is not a configured symbol")));
        }
        if self.is_heartbeat(symbol) {
            return Err(FenceError::InvalidInput(format!(
                "{symbol} is a heartbeat symbol and cannot be bet on"
            )));
        }
        Ok(())
    }

    async fn fresh_price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.board.snapshot(symbol).await.and_then(|s| s.fresh_price())
    }

    // -- Mutations -----------------------------------------------------------

    /// Centre a fence of `±buffer` on the current live price.
    pub async fn set_fence_at_market(&self, symbol: &Symbol, buffer: Decimal) -> Result<Fence, FenceError> {
        self.ensure_bettable(symbol)?;
        let price = self.fresh_price(symbol).await.ok_or_else(|| {
            FenceError::InvalidInput(format!("no live price for {symbol}; cannot set a fence"))
        })?;
        let mut state = self.engine.write().await;
        FenceEngine::set_fence(&mut state, symbol, price, buffer)
    }

    /// Fence from the trailing average of the last `window` daily bars.
    pub async fn derive_fence(&self, symbol: &Symbol, window: usize) -> Result<Fence, FenceError> {
        self.ensure_bettable(symbol)?;
        if window == 0 {
            return Err(FenceError::InvalidInput("fence window must be at least one day".into()));
        }
        let feed = self.feeds.feed_for(symbol).ok_or_else(|| {
            FenceError::InvalidInput(format!("{symbol} has no price feed"))
        })?;
        let bars = feed.fetch_daily_bars(symbol, window).await?;
        let mut state = self.engine.write().await;
        FenceEngine::set_fence_from_bars(&mut state, symbol, &bars, window)
    }

    pub async fn set_wager(&self, symbol: &Symbol, amount: Decimal) -> Result<Wager, FenceError> {
        self.ensure_bettable(symbol)?;
        let wager = Wager::new(symbol.clone(), amount)?;
        self.wagers.write().await.insert(symbol.clone(), wager.clone());
        info!(symbol = %symbol, amount = %amount, "Wager set");
        Ok(wager)
    }

    /// Stored wager, or a zero stake when none has been set.
    pub async fn wager(&self, symbol: &Symbol) -> Wager {
        self.wagers
            .read()
            .await
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| Wager { symbol: symbol.clone(), amount: Decimal::ZERO })
    }

    /// Settle the stored wager against the live price.
    ///
    /// A stale or missing quote is passed through as "no price", so the
    /// engine still reports a missing fence first.
    pub async fn settle(&self, symbol: &Symbol) -> Result<SettlementRecord, FenceError> {
        self.ensure_bettable(symbol)?;
        let snapshot = self.board.snapshot(symbol).await;
        let price = snapshot.as_ref().and_then(QuoteSnapshot::fresh_price);
        if price.is_none() {
            if let Some(snap) = &snapshot {
                warn!(symbol = %symbol, status = %snap.status, "Settlement attempted without a live quote");
            }
        }
        let wager = self.wager(symbol).await;
        let mut state = self.engine.write().await;
        FenceEngine::settle(&mut state, symbol, price, &wager)
    }

    pub async fn reset_ledger(&self) {
        FenceEngine::reset_ledger(&mut *self.engine.write().await);
    }

    pub async fn reset_bankroll(&self) -> Decimal {
        let mut state = self.engine.write().await;
        FenceEngine::reset_bankroll(&mut state);
        state.bankroll()
    }

    // -- Views ---------------------------------------------------------------

    pub async fn engine(&self) -> RwLockReadGuard<'_, EngineState> {
        self.engine.read().await
    }

    pub async fn quotes(&self) -> Vec<QuoteSnapshot> {
        self.board.snapshot_all().await
    }

    /// Containment against the last known good price.
    pub async fn containment(&self, symbol: &Symbol) -> Containment {
        let price = self.board.snapshot(symbol).await.and_then(|s| s.price());
        FenceEngine::evaluate_containment(&*self.engine.read().await, symbol, price)
    }

    /// Every fence with its quote, containment and stake.
    pub async fn fence_views(&self) -> Vec<FenceView> {
        let quotes: BTreeMap<Symbol, QuoteSnapshot> = self
            .board
            .snapshot_all()
            .await
            .into_iter()
            .map(|q| (q.symbol.clone(), q))
            .collect();
        let stakes: BTreeMap<Symbol, Decimal> = self
            .wagers
            .read()
            .await
            .iter()
            .map(|(s, w)| (s.clone(), w.amount))
            .collect();

        let state = self.engine.read().await;
        state
            .fences()
            .map(|fence| {
                let quote = quotes.get(&fence.symbol);
                let price = quote.and_then(QuoteSnapshot::price);
                FenceView {
                    fence: fence.clone(),
                    price,
                    status: quote.map(|q| q.status).unwrap_or(FeedStatus::Waiting),
                    containment: FenceEngine::evaluate_containment(&state, &fence.symbol, price),
                    wager: stakes.get(&fence.symbol).copied().unwrap_or(Decimal::ZERO),
                }
            })
            .collect()
    }
}
