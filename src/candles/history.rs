//! Fixed-capacity rolling candle history

use super::{Candle, HISTORY_CAPACITY};
use crate::error::{EngineError, Result};
use std::collections::{HashMap, VecDeque};

/// The most recent closed candles per configured symbol.
///
/// Entries are strictly ordered by `open_time`; a late update for the last
/// bar replaces it in place, so repeated close messages are idempotent.
pub struct CandleHistory {
    candles: HashMap<String, VecDeque<Candle>>,
    capacity: usize,
}

impl CandleHistory {
    /// Create a history for the configured symbol set
    pub fn new(symbols: impl IntoIterator<Item = String>) -> Self {
        let candles = symbols
            .into_iter()
            .map(|s| (s, VecDeque::with_capacity(HISTORY_CAPACITY)))
            .collect();
        Self {
            candles,
            capacity: HISTORY_CAPACITY,
        }
    }

    /// Append a closed candle, replacing the last entry when its
    /// `open_time` did not advance. Evicts the oldest entry at capacity.
    pub fn append(&mut self, symbol: &str, candle: Candle) -> Result<()> {
        let deque = self
            .candles
            .get_mut(symbol)
            .ok_or_else(|| EngineError::UnknownSymbol(symbol.to_string()))?;

        match deque.back_mut() {
            Some(last) if candle.open_time <= last.open_time => {
                *last = candle;
            }
            _ => {
                if deque.len() == self.capacity {
                    deque.pop_front();
                }
                deque.push_back(candle);
            }
        }
        Ok(())
    }

    /// Ordered copy of the history for a symbol
    pub fn snapshot(&self, symbol: &str) -> Result<Vec<Candle>> {
        self.candles
            .get(symbol)
            .map(|d| d.iter().cloned().collect())
            .ok_or_else(|| EngineError::UnknownSymbol(symbol.to_string()))
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.candles.get(symbol).map_or(0, |d| d.len())
    }

    pub fn is_empty(&self, symbol: &str) -> bool {
        self.len(symbol) == 0
    }
}
