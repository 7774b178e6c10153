//! Fence settlement: the rules that turn a price, a fence and a wager
//! into a win/loss, a bankroll delta and a ledger entry.
//!
//! Every operation takes the session state explicitly. Queries borrow it
//! immutably; mutating operations validate all preconditions before the
//! first write so a failed call leaves the state untouched.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use super::state::EngineState;
use crate::types::{
    Containment, DailyBar, Fence, FenceError, FenceOrigin, Outcome, SettlementRecord, Symbol, Wager,
};

pub struct FenceEngine;

impl FenceEngine {
    /// Centre a fence of `±buffer` on `price`, replacing any existing fence.
    ///
    /// The low bound is clamped at zero. `buffer == 0` yields a degenerate
    /// fence where any deviation from `price` is a breach.
    pub fn set_fence(
        state: &mut EngineState,
        symbol: &Symbol,
        price: Decimal,
        buffer: Decimal,
    ) -> Result<Fence, FenceError> {
        if price <= Decimal::ZERO {
            return Err(FenceError::InvalidInput(format!(
                "cannot centre a fence for {symbol} on non-positive price {price}"
            )));
        }
        if buffer < Decimal::ZERO {
            return Err(FenceError::InvalidInput(format!(
                "fence buffer for {symbol} must not be negative, got {buffer}"
            )));
        }

        let high = price.checked_add(buffer).ok_or_else(|| {
            FenceError::InvalidInput(format!("fence for {symbol} overflows: {price} + {buffer}"))
        })?;

        let fence = Fence {
            symbol: symbol.clone(),
            low: (price - buffer).max(Decimal::ZERO),
            high,
            created_at: Utc::now(),
            origin: FenceOrigin::Centered { price, buffer },
        };
        Ok(Self::install(state, fence))
    }

    /// Build a fence from the mean daily high and low of the last `window`
    /// bars, replacing any existing fence.
    pub fn set_fence_from_bars(
        state: &mut EngineState,
        symbol: &Symbol,
        bars: &[DailyBar],
        window: usize,
    ) -> Result<Fence, FenceError> {
        if window == 0 {
            return Err(FenceError::InvalidInput("fence window must be at least one day".into()));
        }
        if bars.is_empty() {
            return Err(FenceError::InvalidInput(format!("no daily bars for {symbol}")));
        }

        let mut sorted: Vec<&DailyBar> = bars.iter().collect();
        sorted.sort_by_key(|b| b.day);
        let recent = &sorted[sorted.len().saturating_sub(window)..];

        if let Some(bad) = recent
            .iter()
            .find(|b| b.low <= Decimal::ZERO || b.high < b.low)
        {
            return Err(FenceError::InvalidInput(format!(
                "malformed bar for {symbol} on {}: low={} high={}",
                bad.day, bad.low, bad.high
            )));
        }

        let n = Decimal::from(recent.len());
        let mean = |mut values: &mut dyn Iterator<Item = Decimal>| {
            Iterator::try_fold(&mut values, Decimal::ZERO, Decimal::checked_add)
                .and_then(|total| total.checked_div(n))
                .ok_or_else(|| {
                    FenceError::InvalidInput(format!("trailing average for {symbol} overflows"))
                })
        };
        let low = mean(&mut recent.iter().map(|b| b.low))?;
        let high = mean(&mut recent.iter().map(|b| b.high))?;
        if low >= high {
            return Err(FenceError::InvalidInput(format!(
                "trailing average for {symbol} has no range (low={low}, high={high})"
            )));
        }

        let fence = Fence {
            symbol: symbol.clone(),
            low,
            high,
            created_at: Utc::now(),
            origin: FenceOrigin::TrailingAverage { window: recent.len() },
        };
        Ok(Self::install(state, fence))
    }

    /// Pure containment query; never mutates state.
    pub fn evaluate_containment(
        state: &EngineState,
        symbol: &Symbol,
        price: Option<Decimal>,
    ) -> Containment {
        let (Some(fence), Some(price)) = (state.fences.get(symbol), price) else {
            return Containment::Unknown;
        };
        if price <= Decimal::ZERO {
            return Containment::Unknown;
        }
        if fence.contains(price) {
            Containment::Inside
        } else {
            Containment::Breached
        }
    }

    /// Resolve `wager` against the symbol's fence at `price`.
    ///
    /// The fence is left in place, so the same band can be bet on again.
    pub fn settle(
        state: &mut EngineState,
        symbol: &Symbol,
        price: Option<Decimal>,
        wager: &Wager,
    ) -> Result<SettlementRecord, FenceError> {
        let fence = state.fences.get(symbol).ok_or_else(|| {
            FenceError::InvalidState(format!("no fence set for {symbol}"))
        })?;
        let price = match price {
            Some(p) if p > Decimal::ZERO => p,
            Some(p) => {
                return Err(FenceError::InvalidInput(format!(
                    "cannot settle {symbol} on non-positive price {p}"
                )))
            }
            None => {
                return Err(FenceError::InvalidInput(format!(
                    "no price available to settle {symbol}"
                )))
            }
        };
        if &wager.symbol != symbol {
            return Err(FenceError::InvalidInput(format!(
                "wager is for {}, not {symbol}",
                wager.symbol
            )));
        }
        if wager.amount < Decimal::ZERO {
            return Err(FenceError::InvalidInput(format!(
                "wager for {symbol} must not be negative, got {}",
                wager.amount
            )));
        }

        let (outcome, pnl) = if fence.contains(price) {
            (Outcome::Win, wager.amount)
        } else {
            (Outcome::Loss, -wager.amount)
        };
        let (fence_low, fence_high) = (fence.low, fence.high);
        let bankroll_after = state.bankroll.checked_add(pnl).ok_or_else(|| {
            FenceError::InvalidInput(format!(
                "settling {symbol} overflows the bankroll: {} {pnl:+}",
                state.bankroll
            ))
        })?;

        // Preconditions passed; everything below is infallible.
        state.bankroll = bankroll_after;
        let score = state.scoreboard.entry(symbol.clone()).or_default();
        match outcome {
            Outcome::Win => score.wins += 1,
            Outcome::Loss => score.losses += 1,
        }

        let record = SettlementRecord {
            id: Uuid::new_v4(),
            symbol: symbol.clone(),
            price,
            fence_low,
            fence_high,
            wager: wager.amount,
            outcome,
            pnl,
            bankroll_after: state.bankroll,
            settled_at: Utc::now(),
        };
        state.ledger.push(record.clone());

        info!(
            symbol = %symbol,
            outcome = %outcome,
            price = %price,
            pnl = format!("{pnl:+.2}"),
            bankroll = format!("${:.2}", state.bankroll),
            "Wager settled"
        );

        Ok(record)
    }

    /// Clear the settlement history. Bankroll and scoreboard are untouched.
    pub fn reset_ledger(state: &mut EngineState) {
        let cleared = state.ledger.len();
        state.ledger.clear();
        info!(cleared, "Ledger reset");
    }

    /// Restore the bankroll to its initial value. Explicit user action only.
    pub fn reset_bankroll(state: &mut EngineState) {
        info!(
            from = format!("${:.2}", state.bankroll),
            to = format!("${:.2}", state.initial_bankroll),
            "Bankroll reset"
        );
        state.bankroll = state.initial_bankroll;
    }

    fn install(state: &mut EngineState, fence: Fence) -> Fence {
        debug!(
            symbol = %fence.symbol,
            low = %fence.low,
            high = %fence.high,
            origin = ?fence.origin,
            replaced = state.fences.contains_key(&fence.symbol),
            "Fence set"
        );
        state.fences.insert(fence.symbol.clone(), fence.clone());
        fence
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
