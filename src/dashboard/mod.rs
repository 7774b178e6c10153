//! Dashboard: Axum web server for monitoring and operating the desk.
//!
//! Serves a JSON REST API over the shared `Desk`.
//! CORS enabled for local development.

pub mod error;
pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use routes::AppState;

/// Start the dashboard web server.
///
/// Binds before returning so a taken port fails startup; serving runs in
/// a background task.
pub async fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Dashboard server starting on http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Dashboard server error");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/quotes", get(routes::get_quotes))
        .route("/api/fences", get(routes::get_fences))
        .route("/api/fences/:symbol", post(routes::set_fence))
        .route("/api/fences/:symbol/derive", post(routes::derive_fence))
        .route("/api/wagers/:symbol", put(routes::set_wager))
        .route("/api/settle/:symbol", post(routes::settle))
        .route("/api/scoreboard", get(routes::get_scoreboard))
        .route("/api/ledger", get(routes::get_ledger).delete(routes::reset_ledger))
        .route("/api/bankroll/reset", post(routes::reset_bankroll))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desk::Desk;
    use crate::feed::board::QuoteBoard;
    use crate::feed::{FeedSet, MockPriceFeed, PriceFeed, PriceFetch};
    use crate::types::{DailyBar, FenceError, PriceSample, Symbol};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    async fn test_state() -> AppState {
        let board = Arc::new(QuoteBoard::new([sym("SPY"), sym("BTC")], Duration::from_secs(30)));
        board
            .record_sample(PriceSample::new(sym("SPY"), dec!(690), Utc::now()).unwrap())
            .await;
        Arc::new(Desk::new("dash", dec!(1000), board, FeedSet::new()))
    }

    struct SpotOnly;

    #[async_trait]
    impl PriceFeed for SpotOnly {
        fn name(&self) -> &str {
            "spot-only"
        }

        async fn fetch_price(&self, _symbol: &Symbol) -> Result<PriceFetch, FenceError> {
            Ok(PriceFetch::unavailable("offline"))
        }
    }

    fn state_with_feed(feed: Arc<dyn PriceFeed>) -> AppState {
        let board = Arc::new(QuoteBoard::new([sym("SPY")], Duration::from_secs(30)));
        let mut feeds = FeedSet::new();
        feeds.insert(sym("SPY"), feed);
        Arc::new(Desk::new("dash", dec!(1000), board, feeds))
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_req(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = build_router(test_state().await);
        let resp = app.oneshot(get_req("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let app = build_router(test_state().await);
        let resp = app.oneshot(get_req("/api/status")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["bankroll"].as_f64().unwrap(), 1000.0);
        assert_eq!(json["ledger_size"], 0);
    }

    #[tokio::test]
    async fn test_quotes_endpoint() {
        let app = build_router(test_state().await);
        let resp = app.oneshot(get_req("/api/quotes")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        let quotes = json.as_array().unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0]["symbol"], "BTC");
        assert_eq!(quotes[0]["status"], "WAITING");
        assert_eq!(quotes[1]["status"], "LIVE");
    }

    #[tokio::test]
    async fn test_set_fence_then_list() {
        let app = build_router(test_state().await);
        let resp = app
            .clone()
            .oneshot(json_req("POST", "/api/fences/spy", r#"{"buffer": 10}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let fence = body_json(resp).await;
        assert_eq!(fence["low"].as_f64().unwrap(), 680.0);

        let resp = app.oneshot(get_req("/api/fences")).await.unwrap();
        let json = body_json(resp).await;
        assert_eq!(json[0]["containment"], "inside");
    }

    #[tokio::test]
    async fn test_settle_without_fence_is_conflict() {
        let app = build_router(test_state().await);
        let resp = app.oneshot(json_req("POST", "/api/settle/SPY", "")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let json = body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("no fence"));
    }

    #[tokio::test]
    async fn test_fence_on_waiting_quote_is_unprocessable() {
        let app = build_router(test_state().await);
        let resp = app
            .oneshot(json_req("POST", "/api/fences/BTC", r#"{"buffer": 100}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_full_round_trip_over_http() {
        let app = build_router(test_state().await);
        app.clone()
            .oneshot(json_req("POST", "/api/fences/SPY", r#"{"buffer": 10}"#))
            .await
            .unwrap();
        let resp = app
            .clone()
            .oneshot(json_req("PUT", "/api/wagers/SPY", r#"{"amount": 200}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.clone().oneshot(json_req("POST", "/api/settle/SPY", "")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let record = body_json(resp).await;
        assert_eq!(record["outcome"], "WIN");

        let resp = app.clone().oneshot(get_req("/api/ledger?order=oldest")).await.unwrap();
        assert_eq!(body_json(resp).await.as_array().unwrap().len(), 1);

        let resp = app
            .clone()
            .oneshot(Request::builder().method("DELETE").uri("/api/ledger").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = app.clone().oneshot(get_req("/api/status")).await.unwrap();
        let status = body_json(resp).await;
        assert_eq!(status["ledger_size"], 0);
        assert_eq!(status["bankroll"].as_f64().unwrap(), 1200.0);

        let resp = app.oneshot(json_req("POST", "/api/bankroll/reset", "")).await.unwrap();
        assert_eq!(body_json(resp).await["bankroll"].as_f64().unwrap(), 1000.0);
    }

    #[tokio::test]
    async fn test_negative_wager_rejected() {
        let app = build_router(test_state().await);
        let resp = app
            .oneshot(json_req("PUT", "/api/wagers/SPY", r#"{"amount": -5}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_derive_fence_from_bars() {
        let mut feed = MockPriceFeed::new();
        feed.expect_fetch_daily_bars().returning(|_, _| {
            let day = |d| NaiveDate::from_ymd_opt(2026, 3, d).unwrap();
            Ok(vec![
                DailyBar { day: day(2), high: dec!(700), low: dec!(680) },
                DailyBar { day: day(3), high: dec!(710), low: dec!(690) },
            ])
        });
        let app = build_router(state_with_feed(Arc::new(feed)));

        let resp = app
            .clone()
            .oneshot(json_req("POST", "/api/fences/SPY/derive", r#"{"window": 2}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let fence = body_json(resp).await;
        assert_eq!(fence["low"].as_f64().unwrap(), 685.0);
        assert_eq!(fence["high"].as_f64().unwrap(), 705.0);

        let resp = app
            .oneshot(json_req("POST", "/api/fences/SPY/derive", r#"{"window": 0}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_derive_fence_without_bars_support_is_unavailable() {
        let app = build_router(state_with_feed(Arc::new(SpotOnly)));
        let resp = app
            .oneshot(json_req("POST", "/api/fences/SPY/derive", r#"{"window": 5}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("spot-only"));
    }
}
