//! Market feed port
//!
//! Delivers kline updates for the configured pairs over a channel.

mod binance;

pub use binance::BinanceKlineFeed;

use crate::candles::Candle;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One kline update from the market stream.
///
/// Every update carries a full candle snapshot; `is_closed` marks the
/// final update for the bar.
#[derive(Debug, Clone)]
pub struct KlineEvent {
    pub symbol: String,
    pub candle: Candle,
    pub is_closed: bool,
}

/// Trait for market feed implementations
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Subscribe to kline updates for all configured pairs
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<KlineEvent>>;
}
