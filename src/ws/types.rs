//! WebSocket types and configuration

use std::time::Duration;
use thiserror::Error;

/// WebSocket client configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// WebSocket URL to connect to
    pub url: String,
    /// Reconnection attempts before giving up (0 = infinite)
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnection attempts
    pub reconnect_delay: Duration,
    /// Interval for sending ping frames
    pub ping_interval: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
        }
    }
}

impl WsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn max_reconnects(mut self, n: u32) -> Self {
        self.max_reconnect_attempts = n;
        self
    }

    pub fn reconnect_delay(mut self, d: Duration) -> Self {
        self.reconnect_delay = d;
        self
    }

    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.ping_interval = d;
        self
    }
}

/// Messages delivered to the consumer, including connection status events
#[derive(Debug, Clone)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
    Connected,
    Disconnected,
    Reconnecting { attempt: u32 },
}

#[derive(Debug, Clone, Error)]
pub enum WsError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectsExceeded,
    #[error("send failed: {0}")]
    SendFailed(String),
}
