//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (broker keys, webhook URLs) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use crate::types::{LedgerOrder, Symbol};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub desk: DeskConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub symbols: Vec<SymbolConfig>,
    #[serde(default)]
    pub feeds: FeedsConfig,
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeskConfig {
    pub name: String,
    pub initial_bankroll: Decimal,
    /// Cadence of the foreground containment check.
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,
    #[serde(default)]
    pub ledger_order: LedgerOrder,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    /// Upper bound on a single feed call.
    #[serde(default = "default_poll_timeout")]
    pub timeout_secs: u64,
    /// A sample older than this is reported stale even if polls succeed.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            timeout_secs: default_poll_timeout(),
            stale_after_secs: default_stale_after(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which upstream a symbol is polled from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Coinbase,
    Binance,
    Alpaca,
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedKind::Coinbase => write!(f, "coinbase"),
            FeedKind::Binance => write!(f, "binance"),
            FeedKind::Alpaca => write!(f, "alpaca"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SymbolConfig {
    pub symbol: String,
    pub feed: FeedKind,
    /// Upstream identifier ("BTC-USD", "BTCUSDT"). Defaults to `symbol`.
    #[serde(default)]
    pub remote: Option<String>,
    /// Displayed for liveness only; excluded from betting.
    #[serde(default)]
    pub heartbeat: bool,
    #[serde(default)]
    pub default_wager: Option<Decimal>,
}

impl SymbolConfig {
    pub fn remote_id(&self) -> &str {
        self.remote.as_deref().unwrap_or(&self.symbol)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FeedsConfig {
    #[serde(default)]
    pub coinbase: CoinbaseConfig,
    #[serde(default)]
    pub binance: BinanceConfig,
    #[serde(default)]
    pub alpaca: AlpacaConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CoinbaseConfig {
    #[serde(default = "default_coinbase_url")]
    pub base_url: String,
}

impl Default for CoinbaseConfig {
    fn default() -> Self {
        Self { base_url: default_coinbase_url() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BinanceConfig {
    #[serde(default = "default_binance_url")]
    pub base_url: String,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self { base_url: default_binance_url() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlpacaConfig {
    #[serde(default = "default_alpaca_data_url")]
    pub data_url: String,
    #[serde(default = "default_alpaca_trading_url")]
    pub trading_url: String,
    #[serde(default = "default_alpaca_key_env")]
    pub key_id_env: String,
    #[serde(default = "default_alpaca_secret_env")]
    pub secret_key_env: String,
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self {
            data_url: default_alpaca_data_url(),
            trading_url: default_alpaca_trading_url(),
            key_id_env: default_alpaca_key_env(),
            secret_key_env: default_alpaca_secret_env(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AlertsConfig {
    /// Env var holding a URL that receives breach events as JSON.
    pub webhook_url_env: Option<String>,
}

fn default_watch_interval() -> u64 { 2 }
fn default_poll_interval() -> u64 { 2 }
fn default_poll_timeout() -> u64 { 5 }
fn default_stale_after() -> u64 { 30 }
fn default_coinbase_url() -> String { "https://api.coinbase.com".to_string() }
fn default_binance_url() -> String { "https://api.binance.com".to_string() }
fn default_alpaca_data_url() -> String { "https://data.alpaca.markets".to_string() }
fn default_alpaca_trading_url() -> String { "https://paper-api.alpaca.markets".to_string() }
fn default_alpaca_key_env() -> String { "APCA_API_KEY_ID".to_string() }
fn default_alpaca_secret_env() -> String { "APCA_API_SECRET_KEY".to_string() }

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to load config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the desk cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("at least one [[symbols]] entry is required");
        }
        let mut seen = HashSet::new();
        for entry in &self.symbols {
            let symbol = Symbol::new(&entry.symbol)
                .with_context(|| format!("invalid symbol entry {:?}", entry.symbol))?;
            if !seen.insert(symbol.clone()) {
                bail!("symbol {symbol} is configured twice");
            }
            if entry.remote_id().trim().is_empty() {
                bail!("symbol {symbol} has an empty remote id");
            }
            if let Some(w) = entry.default_wager {
                if w < Decimal::ZERO {
                    bail!("symbol {symbol} has a negative default wager");
                }
            }
        }
        if self.polling.interval_secs == 0 {
            bail!("polling.interval_secs must be positive");
        }
        if self.polling.timeout_secs == 0 {
            bail!("polling.timeout_secs must be positive");
        }
        if self.desk.watch_interval_secs == 0 {
            bail!("desk.watch_interval_secs must be positive");
        }
        Ok(())
    }

    /// Symbols configured for a given feed.
    pub fn symbols_for(&self, kind: FeedKind) -> impl Iterator<Item = &SymbolConfig> {
        self.symbols.iter().filter(move |s| s.feed == kind)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
