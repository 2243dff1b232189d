//! Reusable WebSocket client
//!
//! Connection management with bounded reconnection, fixed retry delay,
//! and ping/pong keepalive. Used by the market feed and the user stream.

mod client;
mod types;

pub use client::WsClient;
pub use types::{WsConfig, WsError, WsMessage};
