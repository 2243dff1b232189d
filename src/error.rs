//! Engine error kinds

use thiserror::Error;

/// Errors surfaced by the trading engine and its ports.
///
/// Per-tick errors are contained at the (account, symbol) boundary by the
/// engine loop; only `Config` is fatal, and only at startup.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid or missing configuration; fatal at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// Network or exchange failure; retried where annotated, else surfaced
    #[error("transport error: {0}")]
    Transport(String),

    /// The exchange already holds a position for this symbol; entry aborted
    #[error("position already exists on exchange for {symbol}")]
    PositionAlreadyExists { symbol: String },

    /// Entry filled but the protective stop could not be placed
    #[error("stop-loss placement failed for {symbol}: {reason}")]
    StopLossPlacementFailed { symbol: String, reason: String },

    /// Detector invoked with an empty candle history
    #[error("no candle history for {0}")]
    MissingHistory(String),

    /// Symbol is not part of the configured pair set
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// Impossible position state; the position is forced back to idle
    #[error("invariant violation for {account}/{symbol}: {detail}")]
    InvariantViolation {
        account: String,
        symbol: String,
        detail: String,
    },
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
