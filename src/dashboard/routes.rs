//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<Desk>`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use crate::desk::{Desk, FenceView};
use crate::feed::board::QuoteSnapshot;
use crate::types::{Fence, LedgerOrder, SettlementRecord, Wager};

pub type AppState = Arc<Desk>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub desk: String,
    pub bankroll: Decimal,
    pub initial_bankroll: Decimal,
    pub total_pnl: Decimal,
    pub ledger_size: usize,
    pub fences: usize,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreEntry {
    pub symbol: String,
    pub wins: u64,
    pub losses: u64,
    pub total: u64,
    pub win_rate: f64,
    /// Sum of pnl over the current ledger.
    pub ledger_pnl: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    pub order: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetFenceRequest {
    pub buffer: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct DeriveFenceRequest {
    pub window: usize,
}

#[derive(Debug, Deserialize)]
pub struct SetWagerRequest {
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct BankrollResponse {
    pub bankroll: Decimal,
}

// ---------------------------------------------------------------------------
// Read-only handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(desk): State<AppState>) -> Json<StatusResponse> {
    let state = desk.engine().await;
    Json(StatusResponse {
        desk: desk.name().to_string(),
        bankroll: state.bankroll(),
        initial_bankroll: state.initial_bankroll(),
        total_pnl: state.total_pnl(),
        ledger_size: state.ledger_len(),
        fences: state.fences().count(),
        started_at: state.started_at(),
        uptime_secs: state.uptime().num_seconds(),
    })
}

/// GET /api/quotes
pub async fn get_quotes(State(desk): State<AppState>) -> Json<Vec<QuoteSnapshot>> {
    Json(desk.quotes().await)
}

/// GET /api/fences
pub async fn get_fences(State(desk): State<AppState>) -> Json<Vec<FenceView>> {
    Json(desk.fence_views().await)
}

/// GET /api/scoreboard
pub async fn get_scoreboard(State(desk): State<AppState>) -> Json<Vec<ScoreEntry>> {
    let state = desk.engine().await;
    let entries = state
        .scoreboard()
        .iter()
        .map(|(symbol, score)| ScoreEntry {
            symbol: symbol.to_string(),
            wins: score.wins,
            losses: score.losses,
            total: score.total(),
            win_rate: score.win_rate(),
            ledger_pnl: state.pnl_for(symbol),
        })
        .collect();
    Json(entries)
}

/// GET /api/ledger?order=newest|oldest
pub async fn get_ledger(
    State(desk): State<AppState>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<Vec<SettlementRecord>>, ApiError> {
    let order = match query.order.as_deref() {
        Some(raw) => raw.parse::<LedgerOrder>()?,
        None => desk.ledger_order(),
    };
    Ok(Json(desk.engine().await.ledger(order)))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Mutating handlers
// ---------------------------------------------------------------------------

/// POST /api/fences/:symbol
pub async fn set_fence(
    State(desk): State<AppState>,
    Path(symbol): Path<String>,
    Json(req): Json<SetFenceRequest>,
) -> Result<Json<Fence>, ApiError> {
    let symbol = desk.resolve(&symbol)?;
    Ok(Json(desk.set_fence_at_market(&symbol, req.buffer).await?))
}

/// POST /api/fences/:symbol/derive
pub async fn derive_fence(
    State(desk): State<AppState>,
    Path(symbol): Path<String>,
    Json(req): Json<DeriveFenceRequest>,
) -> Result<Json<Fence>, ApiError> {
    let symbol = desk.resolve(&symbol)?;
    Ok(Json(desk.derive_fence(&symbol, req.window).await?))
}

/// PUT /api/wagers/:symbol
pub async fn set_wager(
    State(desk): State<AppState>,
    Path(symbol): Path<String>,
    Json(req): Json<SetWagerRequest>,
) -> Result<Json<Wager>, ApiError> {
    let symbol = desk.resolve(&symbol)?;
    Ok(Json(desk.set_wager(&symbol, req.amount).await?))
}

/// POST /api/settle/:symbol
pub async fn settle(
    State(desk): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<SettlementRecord>, ApiError> {
    let symbol = desk.resolve(&symbol)?;
    Ok(Json(desk.settle(&symbol).await?))
}

/// DELETE /api/ledger
pub async fn reset_ledger(State(desk): State<AppState>) -> StatusCode {
    desk.reset_ledger().await;
    StatusCode::NO_CONTENT
}

/// POST /api/bankroll/reset
pub async fn reset_bankroll(State(desk): State<AppState>) -> Json<BankrollResponse> {
    Json(BankrollResponse { bankroll: desk.reset_bankroll().await })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
