//! Movement detection on closed candles
//!
//! Applies the anomaly rule over the rolling history when a candle closes:
//! the candle's body move must beat both a dynamic threshold derived from
//! the average historical move and the summed moves of the recent window.

use crate::candles::Candle;
use crate::config::PairConfig;
use crate::error::{EngineError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// A detected anomalous movement for one symbol.
///
/// Carries everything needed to arm accounts; the detector itself never
/// touches positions or orders.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementSignal {
    pub symbol: String,
    /// Close of the triggering candle; entry thresholds measure from here
    pub lock_close_price: Decimal,
    /// Dynamic threshold the candle beat (percent)
    pub dynamic_threshold: Decimal,
    /// Arm threshold handed to accounts: half the dynamic threshold
    pub movement_threshold: Decimal,
    /// The triggering candle's body move (percent)
    pub current_diff: Decimal,
    /// Sum of the recent window's body moves (percent)
    pub past_sum: Decimal,
}

/// Per-pair detector over closed-candle history
pub struct MovementDetector {
    pair: PairConfig,
}

impl MovementDetector {
    pub fn new(pair: PairConfig) -> Self {
        Self { pair }
    }

    pub fn symbol(&self) -> &str {
        &self.pair.symbol
    }

    /// Evaluate a just-closed candle against the history as it stood
    /// before that candle is appended.
    ///
    /// `history` must not include `candle`; the engine appends it only
    /// after every account has seen the evaluation.
    pub fn evaluate(&self, candle: &Candle, history: &[Candle]) -> Result<Option<MovementSignal>> {
        if history.is_empty() {
            return Err(EngineError::MissingHistory(self.pair.symbol.clone()));
        }

        let diffs: Vec<Decimal> = history.iter().map(Candle::body_move_pct).collect();
        let average_diff: Decimal =
            diffs.iter().sum::<Decimal>() / Decimal::from(diffs.len() as u64);
        let dynamic_threshold = self.pair.threshold * average_diff;

        let window = self.pair.num_previous_candles.min(diffs.len());
        let past_sum: Decimal = diffs[diffs.len() - window..].iter().sum();

        let current_diff = candle.body_move_pct();

        if current_diff > dynamic_threshold && current_diff > past_sum {
            Ok(Some(MovementSignal {
                symbol: self.pair.symbol.clone(),
                lock_close_price: candle.close,
                dynamic_threshold,
                movement_threshold: dynamic_threshold / dec!(2),
                current_diff,
                past_sum,
            }))
        } else {
            Ok(None)
        }
    }
}
