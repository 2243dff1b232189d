//! WebSocket client with bounded automatic reconnection

use super::types::{WsConfig, WsError, WsMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Reconnecting WebSocket client.
///
/// The attempt counter resets on every successful connection, so the cap
/// bounds consecutive failures, not connection lifetime. After the cap is
/// reached the client emits `Disconnected` and stays down.
pub struct WsClient {
    config: WsConfig,
}

impl WsClient {
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self::new(WsConfig::new(url))
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Connect and return a receiver for messages.
    ///
    /// Spawns a background task owning the connection; the receiver sees
    /// `Connected`/`Reconnecting`/`Disconnected` status events interleaved
    /// with traffic.
    pub fn connect(&self) -> mpsc::Receiver<WsMessage> {
        let (tx, rx) = mpsc::channel(1024);
        let config = self.config.clone();

        tokio::spawn(async move {
            if let Err(e) = Self::run_connection_loop(config, tx).await {
                tracing::error!(target: "ws", error = %e, "WebSocket connection loop failed");
            }
        });

        rx
    }

    async fn run_connection_loop(
        config: WsConfig,
        tx: mpsc::Sender<WsMessage>,
    ) -> Result<(), WsError> {
        let mut failed_attempts = 0;

        loop {
            match Self::connect_and_stream(&config, &tx, &mut failed_attempts).await {
                Ok(()) => {
                    tracing::info!(target: "ws", "WebSocket connection closed cleanly");
                    let _ = tx.send(WsMessage::Disconnected).await;
                    break;
                }
                Err(e) => {
                    failed_attempts += 1;
                    tracing::warn!(
                        target: "ws",
                        error = %e,
                        attempt = failed_attempts,
                        "WebSocket connection error, reconnecting"
                    );

                    if config.max_reconnect_attempts > 0
                        && failed_attempts >= config.max_reconnect_attempts
                    {
                        tracing::error!(
                            target: "ws",
                            attempts = failed_attempts,
                            url = %config.url,
                            "max reconnection attempts reached, staying disconnected"
                        );
                        let _ = tx.send(WsMessage::Disconnected).await;
                        return Err(WsError::MaxReconnectsExceeded);
                    }

                    if tx.is_closed() {
                        tracing::info!(target: "ws", "receiver dropped, stopping reconnection");
                        break;
                    }

                    let _ = tx
                        .send(WsMessage::Reconnecting {
                            attempt: failed_attempts,
                        })
                        .await;
                    sleep(config.reconnect_delay).await;
                }
            }
        }

        Ok(())
    }

    async fn connect_and_stream(
        config: &WsConfig,
        tx: &mpsc::Sender<WsMessage>,
        failed_attempts: &mut u32,
    ) -> Result<(), WsError> {
        tracing::info!(target: "ws", url = %config.url, "connecting to WebSocket");

        let (ws_stream, _response) = connect_async(&config.url)
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        tracing::info!(target: "ws", "WebSocket connected");
        // A successful open resets the failure budget
        *failed_attempts = 0;

        if tx.send(WsMessage::Connected).await.is_err() {
            return Ok(());
        }

        let mut ping_interval = tokio::time::interval(config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if tx.send(WsMessage::Text(text)).await.is_err() {
                                tracing::debug!(target: "ws", "receiver dropped, closing connection");
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            if tx.send(WsMessage::Binary(data)).await.is_err() {
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!(target: "ws", "received close frame");
                            return Err(WsError::ConnectionFailed("server closed connection".into()));
                        }
                        Some(Err(e)) => {
                            return Err(WsError::ConnectionFailed(e.to_string()));
                        }
                        None => {
                            return Err(WsError::ConnectionFailed("stream ended unexpectedly".into()));
                        }
                        _ => {}
                    }
                }

                _ = ping_interval.tick() => {
                    write.send(Message::Ping(vec![])).await
                        .map_err(|e| WsError::SendFailed(e.to_string()))?;
                }
            }
        }
    }
}
