//! Candle value type

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// An immutable OHLCV bar for one interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time, milliseconds since epoch
    pub open_time: i64,
    /// Bar close time, milliseconds since epoch; always after `open_time`
    pub close_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    /// Quote-asset volume when the wire provides it
    #[serde(default)]
    pub quote_volume: Decimal,
    /// Trades in the bar when the wire provides it
    #[serde(default)]
    pub trade_count: u64,
}

impl Candle {
    /// Absolute open-to-close move as a percentage of the open.
    ///
    /// This is the only candle statistic the movement detector consumes.
    pub fn body_move_pct(&self) -> Decimal {
        if self.open.is_zero() {
            return Decimal::ZERO;
        }
        ((self.close - self.open) / self.open * dec!(100)).abs()
    }
}
