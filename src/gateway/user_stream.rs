//! User data stream: listen key lifecycle and event parsing

use super::binance::BinanceGateway;
use super::{OrderUpdate, PositionUpdate, UserStreamEvent};
use crate::error::{EngineError, Result};
use crate::ws::{WsClient, WsConfig, WsMessage};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;

/// User stream websocket base
const USER_STREAM_WS_URL: &str = "wss://fstream.binance.com/ws";

/// Listen keys expire after 60 minutes; refresh at half that
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Deserialize)]
struct ListenKeyResponse {
    #[serde(rename = "listenKey")]
    listen_key: String,
}

#[derive(Debug, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "a", default)]
    account: Option<WireAccountData>,
    #[serde(rename = "o", default)]
    order: Option<WireOrderData>,
}

#[derive(Debug, Deserialize)]
struct WireAccountData {
    #[serde(rename = "P", default)]
    positions: Vec<WirePosition>,
}

#[derive(Debug, Deserialize)]
struct WirePosition {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "pa")]
    position_amount: String,
    #[serde(rename = "ep")]
    entry_price: String,
    #[serde(rename = "ps")]
    position_side: String,
}

#[derive(Debug, Deserialize)]
struct WireOrderData {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "X")]
    order_status: String,
    #[serde(rename = "o")]
    order_type: String,
    #[serde(rename = "ap", default)]
    average_price: String,
    #[serde(rename = "sp", default)]
    stop_price: String,
    #[serde(rename = "L", default)]
    last_filled_price: String,
}

fn parse_decimal(raw: &str) -> Decimal {
    Decimal::from_str(raw).unwrap_or_default()
}

/// Parse one user-stream text frame into an engine event.
///
/// Unknown event types and malformed frames yield `None`; the stream
/// carries housekeeping events the engine does not consume.
fn parse_event(text: &str) -> Option<UserStreamEvent> {
    let envelope: WireEnvelope = serde_json::from_str(text).ok()?;
    match envelope.event_type.as_str() {
        "ACCOUNT_UPDATE" => {
            let positions = envelope
                .account?
                .positions
                .into_iter()
                .map(|p| PositionUpdate {
                    symbol: p.symbol,
                    position_amount: parse_decimal(&p.position_amount),
                    entry_price: parse_decimal(&p.entry_price),
                    position_side: p.position_side,
                })
                .collect();
            Some(UserStreamEvent::AccountUpdate(positions))
        }
        "ORDER_TRADE_UPDATE" => {
            let order = envelope.order?;
            Some(UserStreamEvent::OrderUpdate(OrderUpdate {
                symbol: order.symbol,
                order_status: order.order_status,
                order_type: order.order_type,
                average_price: parse_decimal(&order.average_price),
                stop_price: parse_decimal(&order.stop_price),
                last_filled_price: parse_decimal(&order.last_filled_price),
            }))
        }
        _ => None,
    }
}

async fn start_listen_key(gateway: &BinanceGateway) -> Result<String> {
    let url = format!("{}/fapi/v1/listenKey", gateway.base_url());
    let response: ListenKeyResponse = gateway
        .http()
        .post(&url)
        .header("X-MBX-APIKEY", gateway.api_key())
        .send()
        .await?
        .error_for_status()
        .map_err(|e| EngineError::Transport(e.to_string()))?
        .json()
        .await?;
    Ok(response.listen_key)
}

/// Open the user stream for one account: acquire a listen key, connect
/// the websocket, keep the key alive, and deliver parsed events.
pub(super) async fn subscribe(
    gateway: &BinanceGateway,
) -> Result<mpsc::Receiver<UserStreamEvent>> {
    let listen_key = start_listen_key(gateway).await?;
    let account = gateway.account().to_string();
    tracing::info!(account = %account, "user stream listen key acquired");

    let ws = WsClient::new(WsConfig::new(format!("{USER_STREAM_WS_URL}/{listen_key}")));
    let mut ws_rx = ws.connect();

    let (tx, rx) = mpsc::channel(256);

    // Keepalive loop; a failed refresh is logged and retried next round,
    // the websocket itself reconnects independently
    let keepalive_gateway_url = gateway.base_url().to_string();
    let keepalive_api_key = gateway.api_key().to_string();
    let keepalive_account = account.clone();
    let http = gateway.http().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let url = format!("{keepalive_gateway_url}/fapi/v1/listenKey");
            let result = http
                .put(&url)
                .header("X-MBX-APIKEY", &keepalive_api_key)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = result {
                tracing::warn!(account = %keepalive_account, error = %e, "listen key keepalive failed");
            }
        }
    });

    tokio::spawn(async move {
        while let Some(msg) = ws_rx.recv().await {
            match msg {
                WsMessage::Text(text) => {
                    if let Some(event) = parse_event(&text) {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                WsMessage::Connected => {
                    tracing::info!(target: "ws", account = %account, "user stream connected");
                }
                WsMessage::Disconnected => {
                    tracing::error!(target: "ws", account = %account, "user stream disconnected");
                    return;
                }
                _ => {}
            }
        }
    });

    Ok(rx)
}
