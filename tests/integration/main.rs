//! Integration tests: the desk, poller and watcher wired together over
//! an in-memory feed.

mod mock_feed;
mod settlement_flow;
