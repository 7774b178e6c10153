//! Core engine: fence definitions, containment checks, and settlement.
//!
//! `EngineState` holds everything a session owns (fences, bankroll,
//! scoreboard, ledger). `FenceEngine` is stateless and operates on a
//! borrowed state, so construction and reset stay explicit.

pub mod state;
pub mod settlement;

pub use settlement::FenceEngine;
pub use state::EngineState;
