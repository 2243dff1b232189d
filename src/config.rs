//! Configuration types for perp-momentum

use crate::candles::HISTORY_CAPACITY;
use crate::error::EngineError;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Environment variable overriding `order_url` from the config file
const ORDER_URL_ENV: &str = "ORDER_URL";

/// Shared-credential environment fallbacks, used while accounts migrate to
/// per-account keys in the config file
const API_KEY_ENV: &str = "API_KEY";
const API_SECRET_ENV: &str = "API_SECRET";

/// Default health endpoint port
const DEFAULT_HEALTH_PORT: u16 = 3000;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Exchange REST base URL
    pub order_url: String,
    /// Kline stream interval (e.g. "1m")
    pub websocket_interval: String,
    /// Kline interval used for REST backfill
    pub api_interval: String,
    /// Health endpoint port
    #[serde(default = "default_health_port")]
    pub health_port: u16,
    pub pairs: Vec<PairConfig>,
    pub accounts: Vec<AccountConfig>,
}

/// Per-pair trading parameters
#[derive(Debug, Clone, Deserialize)]
pub struct PairConfig {
    pub symbol: String,
    /// Anomaly multiplier applied to the rolling average move
    pub threshold: Decimal,
    /// Additive buffer on stop distances to cover trading fees
    pub fees_exemption_percentage: Decimal,
    /// How many recent candle moves feed the past-sum comparison
    pub num_previous_candles: usize,
    /// Entry notional in USDT
    pub usdt_amount: Decimal,
    /// Optional webhook notified on entries and closures
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Exchange account credentials
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
}

fn default_health_port() -> u16 {
    DEFAULT_HEALTH_PORT
}

impl Config {
    /// Load configuration from a JSON file and apply environment overrides
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Environment overrides: `ORDER_URL` supersedes the file value, and
    /// shared `API_KEY`/`API_SECRET` fill accounts that carry no explicit
    /// credentials. Explicit per-account credentials always win.
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ORDER_URL_ENV) {
            if !url.is_empty() {
                self.order_url = url;
            }
        }
        let env_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        let env_secret = std::env::var(API_SECRET_ENV).unwrap_or_default();
        for account in &mut self.accounts {
            if account.api_key.is_empty() {
                account.api_key = env_key.clone();
            }
            if account.api_secret.is_empty() {
                account.api_secret = env_secret.clone();
            }
        }
    }

    /// Startup validation; any failure here is fatal
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.order_url.is_empty() {
            return Err(EngineError::Config("order_url is empty".into()));
        }
        if self.pairs.is_empty() {
            return Err(EngineError::Config("no pairs configured".into()));
        }
        if self.accounts.is_empty() {
            return Err(EngineError::Config("no accounts configured".into()));
        }
        for pair in &self.pairs {
            if pair.symbol.is_empty() {
                return Err(EngineError::Config("pair with empty symbol".into()));
            }
            if pair.threshold <= Decimal::ZERO {
                return Err(EngineError::Config(format!(
                    "{}: threshold must be positive",
                    pair.symbol
                )));
            }
            if pair.fees_exemption_percentage < Decimal::ZERO {
                return Err(EngineError::Config(format!(
                    "{}: fees_exemption_percentage must be non-negative",
                    pair.symbol
                )));
            }
            if pair.num_previous_candles == 0 || pair.num_previous_candles > HISTORY_CAPACITY {
                return Err(EngineError::Config(format!(
                    "{}: num_previous_candles must be in 1..={}",
                    pair.symbol, HISTORY_CAPACITY
                )));
            }
            if pair.usdt_amount <= Decimal::ZERO {
                return Err(EngineError::Config(format!(
                    "{}: usdt_amount must be positive",
                    pair.symbol
                )));
            }
        }
        let mut names = std::collections::HashSet::new();
        for account in &self.accounts {
            if account.name.is_empty() {
                return Err(EngineError::Config("account with empty name".into()));
            }
            if !names.insert(account.name.as_str()) {
                return Err(EngineError::Config(format!(
                    "duplicate account name: {}",
                    account.name
                )));
            }
            if account.api_key.is_empty() || account.api_secret.is_empty() {
                return Err(EngineError::Config(format!(
                    "account {} is missing credentials",
                    account.name
                )));
            }
        }
        Ok(())
    }

    /// Look up a pair by symbol
    pub fn pair(&self, symbol: &str) -> Option<&PairConfig> {
        self.pairs.iter().find(|p| p.symbol == symbol)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.pairs.iter().map(|p| p.symbol.clone()).collect()
    }
}
