//! Shared types for the FENCEWATCH desk.
//!
//! These types form the data model used across all modules: symbols,
//! price samples, fences, wagers and settlement records, plus the
//! domain error enum. Engine, feed and dashboard modules depend on
//! them without depending on each other.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Symbol
// ---------------------------------------------------------------------------

/// Opaque identifier for a tradable instrument ("SPY", "BTC").
///
/// Normalised to upper case so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: &str) -> Result<Self, FenceError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(FenceError::InvalidInput("symbol must not be empty".into()));
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Symbol {
    type Err = FenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = FenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::new(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

// ---------------------------------------------------------------------------
// Price samples
// ---------------------------------------------------------------------------

/// A single observed price. Only constructible with a positive price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSample {
    symbol: Symbol,
    price: Decimal,
    observed_at: DateTime<Utc>,
}

impl PriceSample {
    pub fn new(symbol: Symbol, price: Decimal, observed_at: DateTime<Utc>) -> Result<Self, FenceError> {
        if price <= Decimal::ZERO {
            return Err(FenceError::InvalidInput(format!(
                "price for {symbol} must be positive, got {price}"
            )));
        }
        Ok(Self { symbol, price, observed_at })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Age of the sample relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.observed_at
    }
}

impl fmt::Display for PriceSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ${:.2} @ {}",
            self.symbol,
            self.price,
            self.observed_at.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

/// One trading day's range, used for trailing-average fences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub day: NaiveDate,
    pub high: Decimal,
    pub low: Decimal,
}

// ---------------------------------------------------------------------------
// Fences & wagers
// ---------------------------------------------------------------------------

/// How a fence was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FenceOrigin {
    /// Buffer centred on a known price.
    Centered { price: Decimal, buffer: Decimal },
    /// Mean daily high/low over a trailing window of bars.
    TrailingAverage { window: usize },
}

/// A closed price band `[low, high]` for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fence {
    pub symbol: Symbol,
    pub low: Decimal,
    pub high: Decimal,
    pub created_at: DateTime<Utc>,
    pub origin: FenceOrigin,
}

impl Fence {
    /// Closed-interval check: boundary prices count as contained.
    pub fn contains(&self, price: Decimal) -> bool {
        self.low <= price && price <= self.high
    }

    pub fn width(&self) -> Decimal {
        self.high - self.low
    }
}

impl fmt::Display for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:.2} – {:.2}]", self.symbol, self.low, self.high)
    }
}

/// Amount staked on a symbol staying inside its fence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    pub symbol: Symbol,
    pub amount: Decimal,
}

impl Wager {
    pub fn new(symbol: Symbol, amount: Decimal) -> Result<Self, FenceError> {
        if amount < Decimal::ZERO {
            return Err(FenceError::InvalidInput(format!(
                "wager for {symbol} must not be negative, got {amount}"
            )));
        }
        Ok(Self { symbol, amount })
    }
}

// ---------------------------------------------------------------------------
// Containment & settlement
// ---------------------------------------------------------------------------

/// Result of checking a price against a symbol's fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Containment {
    Inside,
    Breached,
    /// No fence, or no usable price.
    Unknown,
}

impl fmt::Display for Containment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Containment::Inside => write!(f, "INSIDE"),
            Containment::Breached => write!(f, "BREACHED"),
            Containment::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Win,
    Loss,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Win => write!(f, "WIN"),
            Outcome::Loss => write!(f, "LOSS"),
        }
    }
}

/// Immutable ledger entry produced by one settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id: Uuid,
    pub symbol: Symbol,
    pub price: Decimal,
    pub fence_low: Decimal,
    pub fence_high: Decimal,
    pub wager: Decimal,
    pub outcome: Outcome,
    /// `+wager` on a win, `-wager` on a loss.
    pub pnl: Decimal,
    pub bankroll_after: Decimal,
    pub settled_at: DateTime<Utc>,
}

impl fmt::Display for SettlementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.pnl >= Decimal::ZERO { "+" } else { "" };
        write!(
            f,
            "{} {} @ {:.2} in [{:.2} – {:.2}] pnl={sign}{:.2} bankroll=${:.2}",
            self.symbol,
            self.outcome,
            self.price,
            self.fence_low,
            self.fence_high,
            self.pnl,
            self.bankroll_after,
        )
    }
}

/// Per-symbol win/loss tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub wins: u64,
    pub losses: u64,
}

impl Score {
    pub fn total(&self) -> u64 {
        self.wins + self.losses
    }

    /// Win rate as a percentage. Returns 0.0 if nothing settled.
    pub fn win_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            (self.wins as f64 / self.total() as f64) * 100.0
        }
    }
}

/// Display order for the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl std::str::FromStr for LedgerOrder {
    type Err = FenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "newest" | "newest_first" | "desc" => Ok(LedgerOrder::NewestFirst),
            "oldest" | "oldest_first" | "asc" => Ok(LedgerOrder::OldestFirst),
            _ => Err(FenceError::InvalidInput(format!("unknown ledger order: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for FENCEWATCH.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FenceError {
    /// Malformed or missing price, wager, buffer or symbol.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation requires state that does not exist (e.g. no fence).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Feed unavailable ({feed}): {reason}")]
    FeedUnavailable { feed: String, reason: String },

    /// Programmer error: a feed was asked for a symbol it has no mapping for.
    #[error("Feed {feed} has no mapping for symbol {symbol}")]
    UnknownSymbol { feed: String, symbol: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    #[test]
    fn test_symbol_normalises_case() {
        assert_eq!(sym("spy"), sym("SPY"));
        assert_eq!(sym("  btc ").as_str(), "BTC");
    }

    #[test]
    fn test_symbol_rejects_empty() {
        assert!(matches!(Symbol::new("   "), Err(FenceError::InvalidInput(_))));
    }

    #[test]
    fn test_symbol_deserializes_through_validation() {
        let parsed: Symbol = serde_json::from_str("\"eth\"").unwrap();
        assert_eq!(parsed.as_str(), "ETH");
        assert!(serde_json::from_str::<Symbol>("\"\"").is_err());
    }

    #[test]
    fn test_price_sample_rejects_non_positive() {
        let now = Utc::now();
        assert!(PriceSample::new(sym("SPY"), dec!(0), now).is_err());
        assert!(PriceSample::new(sym("SPY"), dec!(-1.5), now).is_err());
        let ok = PriceSample::new(sym("SPY"), dec!(690.25), now).unwrap();
        assert_eq!(ok.price(), dec!(690.25));
    }

    #[test]
    fn test_fence_contains_is_closed_interval() {
        let fence = Fence {
            symbol: sym("SPY"),
            low: dec!(680),
            high: dec!(700),
            created_at: Utc::now(),
            origin: FenceOrigin::Centered { price: dec!(690), buffer: dec!(10) },
        };
        assert!(fence.contains(dec!(680)));
        assert!(fence.contains(dec!(700)));
        assert!(fence.contains(dec!(695)));
        assert!(!fence.contains(dec!(679.99)));
        assert!(!fence.contains(dec!(700.01)));
        assert_eq!(fence.width(), dec!(20));
    }

    #[test]
    fn test_wager_rejects_negative() {
        assert!(Wager::new(sym("SPY"), dec!(-1)).is_err());
        assert!(Wager::new(sym("SPY"), dec!(0)).is_ok());
    }

    #[test]
    fn test_score_win_rate() {
        let score = Score { wins: 3, losses: 1 };
        assert_eq!(score.total(), 4);
        assert!((score.win_rate() - 75.0).abs() < 1e-10);
        assert_eq!(Score::default().win_rate(), 0.0);
    }

    #[test]
    fn test_ledger_order_from_str() {
        assert_eq!("newest".parse::<LedgerOrder>().unwrap(), LedgerOrder::NewestFirst);
        assert_eq!("ASC".parse::<LedgerOrder>().unwrap(), LedgerOrder::OldestFirst);
        assert!("sideways".parse::<LedgerOrder>().is_err());
    }

    #[test]
    fn test_outcome_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Outcome::Win).unwrap(), "\"WIN\"");
        assert_eq!(serde_json::to_string(&Outcome::Loss).unwrap(), "\"LOSS\"");
    }

    #[test]
    fn test_record_display() {
        let record = SettlementRecord {
            id: Uuid::new_v4(),
            symbol: sym("SPY"),
            price: dec!(695),
            fence_low: dec!(680),
            fence_high: dec!(700),
            wager: dec!(200),
            outcome: Outcome::Win,
            pnl: dec!(200),
            bankroll_after: dec!(1200),
            settled_at: Utc::now(),
        };
        let text = format!("{record}");
        assert!(text.contains("SPY WIN"));
        assert!(text.contains("pnl=+200.00"));
    }
}
