//! Shared test fixtures: mock gateway and engine wiring helpers

use async_trait::async_trait;
use perp_momentum::candles::Candle;
use perp_momentum::config::{AccountConfig, Config, PairConfig};
use perp_momentum::error::{EngineError, Result};
use perp_momentum::gateway::{
    EntryReceipt, OrderGateway, OrderSide, SymbolPrecision, UserStreamEvent,
};
use perp_momentum::state::{AccountState, FileStore, StateStore, TriggerSide};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Recorded trail-stop placement
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedStop {
    pub symbol: String,
    pub stop_price: Decimal,
}

/// Mock exchange gateway recording all engine intent.
///
/// `place_delay` simulates gateway latency so tests can race two ticks
/// against one in-flight placement.
#[derive(Default)]
pub struct MockGateway {
    pub entries: Mutex<Vec<(String, OrderSide, Decimal, Decimal)>>,
    pub placed_stops: Mutex<Vec<PlacedStop>>,
    pub closes: Mutex<Vec<String>>,
    pub position_exists: bool,
    pub place_delay: Option<Duration>,
    pub place_failures: AtomicU32,
    pub backfill: Mutex<Vec<Candle>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place_delay(delay: Duration) -> Self {
        Self {
            place_delay: Some(delay),
            ..Self::default()
        }
    }
}

#[async_trait]
impl OrderGateway for MockGateway {
    async fn symbol_precision(&self, _symbol: &str) -> Result<SymbolPrecision> {
        Ok(SymbolPrecision {
            price: 4,
            quantity: 3,
        })
    }

    async fn submit_entry_with_stop(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Result<EntryReceipt> {
        self.entries
            .lock()
            .unwrap()
            .push((symbol.to_string(), side, quantity, stop_price));
        Ok(EntryReceipt {
            entry_order_id: 1000 + self.entries.lock().unwrap().len() as i64,
            stop_order_id: 2000,
        })
    }

    async fn place_trail_stop(
        &self,
        symbol: &str,
        _position_side: TriggerSide,
        stop_price: Decimal,
    ) -> Result<()> {
        if let Some(delay) = self.place_delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .place_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EngineError::Transport("simulated failure".into()));
        }
        self.placed_stops.lock().unwrap().push(PlacedStop {
            symbol: symbol.to_string(),
            stop_price,
        });
        Ok(())
    }

    async fn cancel_all_open_orders(&self, _symbol: &str) -> Result<()> {
        Ok(())
    }

    async fn close_position(&self, symbol: &str) -> Result<()> {
        self.closes.lock().unwrap().push(symbol.to_string());
        Ok(())
    }

    async fn has_open_position(&self, _symbol: &str) -> Result<bool> {
        Ok(self.position_exists)
    }

    async fn recent_closed_candles(
        &self,
        _symbol: &str,
        _interval: &str,
        _limit: usize,
    ) -> Result<Vec<Candle>> {
        Ok(self.backfill.lock().unwrap().clone())
    }

    async fn subscribe_user_stream(&self) -> Result<mpsc::Receiver<UserStreamEvent>> {
        let (_tx, rx) = mpsc::channel(16);
        Ok(rx)
    }
}

/// A pair with the worked-example parameters: 1% arm threshold comes from
/// a detector firing at dynamic threshold 2%
pub fn btc_pair() -> PairConfig {
    PairConfig {
        symbol: "BTCUSDT".to_string(),
        threshold: dec!(3),
        fees_exemption_percentage: dec!(0.1),
        num_previous_candles: 5,
        usdt_amount: dec!(100),
        webhook_url: None,
    }
}

pub fn test_config() -> Arc<Config> {
    let json = serde_json::json!({
        "order_url": "https://example.invalid",
        "websocket_interval": "1m",
        "api_interval": "1m",
        "pairs": [{
            "symbol": "BTCUSDT",
            "threshold": 3.0,
            "fees_exemption_percentage": 0.1,
            "num_previous_candles": 5,
            "usdt_amount": 100
        }],
        "accounts": [
            { "name": "alpha", "api_key": "k", "api_secret": "s" },
            { "name": "beta", "api_key": "k", "api_secret": "s" }
        ]
    });
    Arc::new(serde_json::from_value(json).unwrap())
}

/// Account state over a throwaway file store, initialized for BTCUSDT
pub async fn fresh_state(accounts: &[&str]) -> Arc<AccountState> {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn StateStore> = Arc::new(FileStore::new(dir.keep()));
    let state = Arc::new(AccountState::new(store));
    for account in accounts {
        state
            .initialize(account, &["BTCUSDT".to_string()])
            .await
            .unwrap();
    }
    state
}

/// An info-less AccountLogs for wiring test reconcilers
pub fn no_account_logs() -> Arc<perp_momentum::telemetry::AccountLogs> {
    let accounts: Vec<AccountConfig> = Vec::new();
    let (logs, _guards) = perp_momentum::telemetry::AccountLogs::create(&accounts).unwrap();
    Arc::new(logs)
}

pub fn candle(open_time: i64, open: Decimal, close: Decimal) -> Candle {
    Candle {
        open_time,
        close_time: open_time + 60_000,
        open,
        high: open.max(close),
        low: open.min(close),
        close,
        volume: dec!(1),
        quote_volume: Decimal::ZERO,
        trade_count: 0,
    }
}
