//! End-to-end settlement scenarios through the poller, desk and watcher.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use fencewatch::config::AppConfig;
use fencewatch::desk::Desk;
use fencewatch::feed::board::{FeedStatus, QuoteBoard};
use fencewatch::feed::poller::{PollReport, Poller};
use fencewatch::feed::{FeedSet, PriceFeed};
use fencewatch::types::{Containment, DailyBar, FenceError, LedgerOrder, Outcome, Symbol};
use fencewatch::watch::Watcher;

use crate::mock_feed::MockFeed;

fn sym(s: &str) -> Symbol {
    Symbol::new(s).unwrap()
}

struct Harness {
    feed: MockFeed,
    poller: Poller,
    desk: Arc<Desk>,
}

impl Harness {
    fn new() -> Self {
        let feed = MockFeed::new();
        feed.set_price(&sym("SPY"), dec!(690));
        feed.set_price(&sym("BTC"), dec!(64000));
        feed.set_price(&sym("ETH"), dec!(3000));

        let shared: Arc<dyn PriceFeed> = Arc::new(feed.clone());
        let mut feeds = FeedSet::new();
        for s in ["SPY", "BTC", "ETH"] {
            feeds.insert(sym(s), shared.clone());
        }

        let board = Arc::new(QuoteBoard::new(feeds.symbols().cloned(), Duration::from_secs(30)));
        let poller = Poller::new(board.clone(), feeds.clone(), Duration::from_secs(2), Duration::from_secs(1));
        let desk = Arc::new(
            Desk::new("integration", dec!(10000), board, feeds).with_heartbeats([sym("ETH")]),
        );
        Self { feed, poller, desk }
    }

    async fn tick(&self) -> PollReport {
        self.poller.poll_once().await
    }
}

#[tokio::test]
async fn test_win_then_loss_against_same_fence() {
    let h = Harness::new();
    assert_eq!(h.tick().await, PollReport { updated: 3, failed: 0 });

    let spy = sym("SPY");
    let fence = h.desk.set_fence_at_market(&spy, dec!(10)).await.unwrap();
    assert_eq!((fence.low, fence.high), (dec!(680), dec!(700)));
    h.desk.set_wager(&spy, dec!(200)).await.unwrap();

    h.feed.set_price(&spy, dec!(695));
    h.tick().await;
    let win = h.desk.settle(&spy).await.unwrap();
    assert_eq!(win.outcome, Outcome::Win);
    assert_eq!(win.bankroll_after, dec!(10200));

    h.feed.set_price(&spy, dec!(705));
    h.tick().await;
    let loss = h.desk.settle(&spy).await.unwrap();
    assert_eq!(loss.outcome, Outcome::Loss);
    assert_eq!(loss.pnl, dec!(-200));

    let state = h.desk.engine().await;
    assert_eq!(state.bankroll(), dec!(10000));
    assert_eq!(state.score(&spy).wins, 1);
    assert_eq!(state.score(&spy).losses, 1);
    assert_eq!(state.pnl_for(&spy), Decimal::ZERO);

    let newest = state.ledger(LedgerOrder::NewestFirst);
    assert_eq!(newest[0].id, loss.id);
    assert_eq!(newest[1].id, win.id);
    assert!(state.fence(&spy).is_some());
}

#[tokio::test]
async fn test_outage_blocks_settlement_but_keeps_last_price() {
    let h = Harness::new();
    h.tick().await;
    let spy = sym("SPY");
    h.desk.set_fence_at_market(&spy, dec!(10)).await.unwrap();
    h.desk.set_wager(&spy, dec!(200)).await.unwrap();

    h.feed.go_down("HTTP 503");
    assert_eq!(h.tick().await.failed, 3);

    let quote = h.desk.board().snapshot(&spy).await.unwrap();
    assert_eq!(quote.status, FeedStatus::Stale);
    assert_eq!(quote.price(), Some(dec!(690)));
    assert_eq!(h.desk.containment(&spy).await, Containment::Inside);

    let err = h.desk.settle(&spy).await.unwrap_err();
    assert!(matches!(err, FenceError::InvalidInput(_)));
    {
        let state = h.desk.engine().await;
        assert_eq!(state.bankroll(), dec!(10000));
        assert_eq!(state.ledger_len(), 0);
    }

    h.feed.recover();
    h.tick().await;
    assert_eq!(h.desk.settle(&spy).await.unwrap().outcome, Outcome::Win);
    assert!(h.feed.calls() >= 9);
}

#[tokio::test]
async fn test_settle_without_fence_leaves_state_untouched() {
    let h = Harness::new();
    h.tick().await;
    let before = h.desk.engine().await.clone();

    let err = h.desk.settle(&sym("BTC")).await.unwrap_err();
    assert!(matches!(err, FenceError::InvalidState(_)));
    assert_eq!(*h.desk.engine().await, before);
}

#[tokio::test]
async fn test_heartbeat_is_quoted_but_not_bettable() {
    let h = Harness::new();
    h.tick().await;
    let eth = sym("ETH");
    assert_eq!(h.desk.board().snapshot(&eth).await.unwrap().fresh_price(), Some(dec!(3000)));
    assert!(matches!(
        h.desk.set_fence_at_market(&eth, dec!(50)).await,
        Err(FenceError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_trailing_average_fence() {
    let h = Harness::new();
    let day = |d| NaiveDate::from_ymd_opt(2026, 3, d).unwrap();
    h.feed.set_bars(
        &sym("BTC"),
        vec![
            DailyBar { day: day(2), high: dec!(66000), low: dec!(62000) },
            DailyBar { day: day(3), high: dec!(65000), low: dec!(63000) },
            DailyBar { day: day(4), high: dec!(67000), low: dec!(64000) },
        ],
    );

    let fence = h.desk.derive_fence(&sym("BTC"), 2).await.unwrap();
    assert_eq!(fence.low, dec!(63500));
    assert_eq!(fence.high, dec!(66000));

    h.tick().await;
    assert_eq!(h.desk.containment(&sym("BTC")).await, Containment::Inside);
}

#[tokio::test]
async fn test_watcher_observes_breach_after_poll() {
    let h = Harness::new();
    h.tick().await;
    let spy = sym("SPY");
    h.desk.set_fence_at_market(&spy, dec!(10)).await.unwrap();
    h.desk.set_wager(&spy, dec!(150)).await.unwrap();

    let mut watcher = Watcher::new(h.desk.clone());
    assert!(watcher.check_once().await.is_empty());

    h.feed.set_price(&spy, dec!(712));
    h.tick().await;
    let fired = watcher.check_once().await;
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].symbol, spy);
    assert_eq!(fired[0].wager, dec!(150));
    assert_eq!(fired[0].overshoot(), dec!(12));
}

#[tokio::test]
async fn test_resets_are_independent() {
    let h = Harness::new();
    h.tick().await;
    let btc = sym("BTC");
    h.desk.set_fence_at_market(&btc, dec!(1000)).await.unwrap();
    h.desk.set_wager(&btc, dec!(500)).await.unwrap();
    h.feed.set_price(&btc, dec!(66000));
    h.tick().await;
    h.desk.settle(&btc).await.unwrap();

    h.desk.reset_ledger().await;
    {
        let state = h.desk.engine().await;
        assert_eq!(state.ledger_len(), 0);
        assert_eq!(state.bankroll(), dec!(9500));
        assert_eq!(state.score(&btc).losses, 1);
    }

    assert_eq!(h.desk.reset_bankroll().await, dec!(10000));
    assert_eq!(h.desk.engine().await.score(&btc).losses, 1);
}

#[tokio::test]
async fn test_desk_from_config() {
    let cfg = AppConfig::from_toml_str(
        r#"
        [desk]
        name = "cfg-desk"
        initial_bankroll = 5000
        ledger_order = "oldest_first"

        [dashboard]
        enabled = false
        port = 0

        [[symbols]]
        symbol = "SPY"
        feed = "alpaca"
        default_wager = 250

        [[symbols]]
        symbol = "ETH"
        feed = "binance"
        remote = "ETHUSDT"
        heartbeat = true
        default_wager = 10
        "#,
    )
    .unwrap();

    let board = Arc::new(QuoteBoard::new([sym("SPY"), sym("ETH")], Duration::from_secs(30)));
    let desk = Desk::from_config(&cfg, board, FeedSet::new()).unwrap();

    assert_eq!(desk.name(), "cfg-desk");
    assert_eq!(desk.ledger_order(), LedgerOrder::OldestFirst);
    assert_eq!(desk.engine().await.bankroll(), dec!(5000));
    assert_eq!(desk.wager(&sym("SPY")).await.amount, dec!(250));
    assert!(desk.is_heartbeat(&sym("ETH")));
    assert_eq!(desk.wager(&sym("ETH")).await.amount, Decimal::ZERO);
}
