//! Session state owned by one desk: fences, bankroll, scoreboard, ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{Fence, LedgerOrder, Score, SettlementRecord, Symbol};

/// Everything the settlement engine mutates.
///
/// Fields are only writable from inside the `engine` module; outside
/// callers get read-only accessors and copies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineState {
    pub(super) fences: BTreeMap<Symbol, Fence>,
    pub(super) bankroll: Decimal,
    pub(super) initial_bankroll: Decimal,
    pub(super) scoreboard: BTreeMap<Symbol, Score>,
    /// Oldest first. Append-only apart from an explicit ledger reset.
    pub(super) ledger: Vec<SettlementRecord>,
    pub(super) started_at: DateTime<Utc>,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (wins, losses) = self
            .scoreboard
            .values()
            .fold((0, 0), |(w, l), s| (w + s.wins, l + s.losses));
        write!(
            f,
            "bankroll=${:.2} | PnL=${:.2} | fences={} | settled={} (W{wins}/L{losses}) | ledger={}",
            self.bankroll,
            self.total_pnl(),
            self.fences.len(),
            wins + losses,
            self.ledger.len(),
        )
    }
}

impl EngineState {
    pub fn new(initial_bankroll: Decimal) -> Self {
        Self {
            fences: BTreeMap::new(),
            bankroll: initial_bankroll,
            initial_bankroll,
            scoreboard: BTreeMap::new(),
            ledger: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn fence(&self, symbol: &Symbol) -> Option<&Fence> {
        self.fences.get(symbol)
    }

    pub fn fences(&self) -> impl Iterator<Item = &Fence> {
        self.fences.values()
    }

    pub fn bankroll(&self) -> Decimal {
        self.bankroll
    }

    pub fn initial_bankroll(&self) -> Decimal {
        self.initial_bankroll
    }

    /// Bankroll movement since the last bankroll reset.
    pub fn total_pnl(&self) -> Decimal {
        self.bankroll.saturating_sub(self.initial_bankroll)
    }

    pub fn scoreboard(&self) -> &BTreeMap<Symbol, Score> {
        &self.scoreboard
    }

    pub fn score(&self, symbol: &Symbol) -> Score {
        self.scoreboard.get(symbol).copied().unwrap_or_default()
    }

    /// Copy of the ledger in the requested order.
    pub fn ledger(&self, order: LedgerOrder) -> Vec<SettlementRecord> {
        match order {
            LedgerOrder::OldestFirst => self.ledger.clone(),
            LedgerOrder::NewestFirst => self.ledger.iter().rev().cloned().collect(),
        }
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }

    /// Sum of ledger pnl for one symbol.
    pub fn pnl_for(&self, symbol: &Symbol) -> Decimal {
        self.ledger
            .iter()
            .filter(|r| &r.symbol == symbol)
            .fold(Decimal::ZERO, |acc, r| acc.saturating_add(r.pnl))
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}
