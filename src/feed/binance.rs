//! Binance futures kline stream

use super::{KlineEvent, MarketFeed};
use crate::candles::Candle;
use crate::ws::{WsClient, WsConfig, WsMessage};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tokio::sync::mpsc;

/// Binance futures combined-stream base URL
const BINANCE_WS_URL: &str = "wss://fstream.binance.com/stream";

/// Combined-stream wrapper: `{"stream": "...", "data": {...}}`
#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    #[serde(rename = "data")]
    data: KlineMessage,
}

/// Kline event message
#[derive(Debug, Deserialize)]
struct KlineMessage {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "k")]
    kline: KlinePayload,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    /// Bar open time
    #[serde(rename = "t")]
    open_time: i64,
    /// Bar close time
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    /// Quote asset volume
    #[serde(rename = "q", default)]
    quote_volume: String,
    /// Number of trades
    #[serde(rename = "n", default)]
    trade_count: u64,
    /// Whether this bar is closed
    #[serde(rename = "x")]
    is_closed: bool,
}

/// Kline websocket feed over the combined stream for all configured pairs.
///
/// Connection management (bounded reconnection, fixed retry delay,
/// ping/pong) is the shared [`WsClient`]'s job; reconnecting to the
/// combined-stream URL re-subscribes every configured pair.
pub struct BinanceKlineFeed {
    symbols: Vec<String>,
    interval: String,
}

impl BinanceKlineFeed {
    pub fn new(symbols: Vec<String>, interval: impl Into<String>) -> Self {
        Self {
            symbols,
            interval: interval.into(),
        }
    }

    /// Combined-stream URL subscribing every pair at the interval
    fn build_ws_url(&self) -> String {
        let streams = self
            .symbols
            .iter()
            .map(|s| format!("{}@kline_{}", s.to_lowercase(), self.interval))
            .collect::<Vec<_>>()
            .join("/");
        format!("{BINANCE_WS_URL}?streams={streams}")
    }

    fn parse_message(msg: &str) -> Option<KlineEvent> {
        let envelope: StreamEnvelope = serde_json::from_str(msg).ok()?;
        let message = envelope.data;
        if message.event_type != "kline" {
            return None;
        }

        let k = message.kline;
        let candle = Candle {
            open_time: k.open_time,
            close_time: k.close_time,
            open: Decimal::from_str(&k.open).ok()?,
            high: Decimal::from_str(&k.high).ok()?,
            low: Decimal::from_str(&k.low).ok()?,
            close: Decimal::from_str(&k.close).ok()?,
            volume: Decimal::from_str(&k.volume).ok()?,
            quote_volume: Decimal::from_str(&k.quote_volume).unwrap_or_default(),
            trade_count: k.trade_count,
        };

        Some(KlineEvent {
            symbol: message.symbol,
            candle,
            is_closed: k.is_closed,
        })
    }
}

#[async_trait]
impl MarketFeed for BinanceKlineFeed {
    async fn subscribe(&self) -> anyhow::Result<mpsc::Receiver<KlineEvent>> {
        let (tx, rx) = mpsc::channel(1024);

        tracing::info!(
            symbols = ?self.symbols,
            interval = %self.interval,
            "subscribing to kline streams"
        );

        let ws = WsClient::new(WsConfig::new(self.build_ws_url()));
        let mut ws_rx = ws.connect();

        tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                match msg {
                    WsMessage::Text(text) => {
                        if let Some(event) = Self::parse_message(&text) {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    WsMessage::Connected => {
                        tracing::info!(target: "ws", "kline stream connected");
                    }
                    WsMessage::Reconnecting { attempt } => {
                        tracing::warn!(target: "ws", attempt, "kline stream reconnecting");
                    }
                    WsMessage::Disconnected => {
                        tracing::error!(target: "ws", "kline stream disconnected, market feed is down");
                        return;
                    }
                    _ => {}
                }
            }
        });

        Ok(rx)
    }
}
