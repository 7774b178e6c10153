//! FENCEWATCH: paper price-fence betting desk.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! starts the price poller and dashboard, and runs the containment
//! watcher until Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use fencewatch::config;
use fencewatch::dashboard;
use fencewatch::desk::Desk;
use fencewatch::feed::board::QuoteBoard;
use fencewatch::feed::poller::Poller;
use fencewatch::feed::FeedSet;
use fencewatch::types::Symbol;
use fencewatch::watch::observer::{LogObserver, WebhookObserver};
use fencewatch::watch::Watcher;

const BANNER: &str = r#"
 ___ ___ _  _  ___ _____      ___ _____ ___ _  _
| __| __| \| |/ __| __\ \    / /_\_   _/ __| || |
| _|| _|| .` | (__| _| \ \/\/ / _ \| || (__| __ |
|_| |___|_|\_|\___|___| \_/\_/_/ \_\_| \___|_||_|

  Paper price-fence betting desk
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        desk = %cfg.desk.name,
        symbols = cfg.symbols.len(),
        initial_bankroll = %cfg.desk.initial_bankroll,
        poll_interval_secs = cfg.polling.interval_secs,
        "FENCEWATCH starting up"
    );

    // -- Feeds & quote board ---------------------------------------------

    let feeds = FeedSet::from_config(&cfg, cfg.polling.timeout())?;
    let symbols = cfg
        .symbols
        .iter()
        .map(|s| Symbol::new(&s.symbol))
        .collect::<Result<Vec<_>, _>>()?;
    let board = Arc::new(QuoteBoard::new(
        symbols,
        Duration::from_secs(cfg.polling.stale_after_secs),
    ));

    if let Some(alpaca) = feeds.alpaca() {
        if let Err(e) = alpaca.check_account().await {
            warn!(error = %e, "Alpaca account check failed; equity quotes may be unavailable");
        }
    }

    let poller = Poller::new(board.clone(), feeds.clone(), cfg.polling.interval(), cfg.polling.timeout());
    poller.spawn();

    // -- Desk & dashboard ------------------------------------------------

    let desk = Arc::new(Desk::from_config(&cfg, board, feeds)?);

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(desk.clone(), cfg.dashboard.port).await?;
    }

    // -- Watcher ---------------------------------------------------------

    let mut watcher = Watcher::new(desk.clone()).with_observer(Arc::new(LogObserver));
    if let Some(env) = cfg.alerts.webhook_url_env.as_deref() {
        match config::AppConfig::resolve_env(env) {
            Ok(url) => {
                info!(env, "Breach webhook enabled");
                watcher = watcher.with_observer(Arc::new(WebhookObserver::new(url, cfg.polling.timeout())?));
            }
            Err(e) => warn!(error = %e, "Breach webhook disabled"),
        }
    }

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    watcher
        .run(Duration::from_secs(cfg.desk.watch_interval_secs), shutdown)
        .await;

    let state = desk.engine().await;
    info!(
        bankroll = format!("${:.2}", state.bankroll()),
        pnl = format!("${:.2}", state.total_pnl()),
        settled = state.ledger_len(),
        "FENCEWATCH shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fencewatch=info"));

    let json_logging = std::env::var("FENCEWATCH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
