//! Per-(account, symbol) position record

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle of a position: `idle → armed → entering → open → idle`.
///
/// Any state may collapse back to `Idle` when the exchange reports a flat
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Idle,
    Armed,
    Entering,
    Open,
}

/// Direction of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSide {
    Long,
    Short,
}

impl TriggerSide {
    pub fn is_long(self) -> bool {
        self == TriggerSide::Long
    }
}

/// Position record owned by `AccountState`.
///
/// Optional fields are well-defined per status: `lock_close_price` and
/// `movement_threshold` are set from `Armed` onward, `entry_price` and
/// `trigger_side` only while `Open`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub status: PositionStatus,
    pub entry_price: Option<Decimal>,
    pub lock_close_price: Option<Decimal>,
    pub movement_threshold: Option<Decimal>,
    pub trigger_side: Option<TriggerSide>,
    /// Remaining profit targets, nearest first
    #[serde(default)]
    pub triggers: Vec<Decimal>,
    /// Trailing stop installed when the same-index trigger fires
    #[serde(default)]
    pub stop_prices: Vec<Decimal>,
    /// Guard against concurrent stop-loss placement
    #[serde(default)]
    pub is_placing_stop_loss_running: bool,
}

impl Position {
    pub fn idle() -> Self {
        Self {
            status: PositionStatus::Idle,
            entry_price: None,
            lock_close_price: None,
            movement_threshold: None,
            trigger_side: None,
            triggers: Vec::new(),
            stop_prices: Vec::new(),
            is_placing_stop_loss_running: false,
        }
    }

    /// Wipe every field back to the cleared idle state. Used when the
    /// exchange reports a flat position.
    pub fn clear(&mut self) {
        *self = Position::idle();
    }

    /// Validate the state invariants; the offending detail on failure.
    ///
    /// Checked after every mutation. A violation forces the position back
    /// to idle and triggers reconciliation from the exchange.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        if self.triggers.len() != self.stop_prices.len() {
            return Err(format!(
                "ladder length mismatch: {} triggers vs {} stops",
                self.triggers.len(),
                self.stop_prices.len()
            ));
        }
        match self.status {
            PositionStatus::Open => {
                if self.entry_price.map_or(true, |p| p <= Decimal::ZERO) {
                    return Err("open position without positive entry_price".into());
                }
                if self.trigger_side.is_none() {
                    return Err("open position without trigger_side".into());
                }
            }
            PositionStatus::Armed | PositionStatus::Entering => {
                if self.lock_close_price.map_or(true, |p| p <= Decimal::ZERO) {
                    return Err(format!(
                        "{:?} position without positive lock_close_price",
                        self.status
                    ));
                }
                if self.movement_threshold.map_or(true, |m| m <= Decimal::ZERO) {
                    return Err(format!(
                        "{:?} position without positive movement_threshold",
                        self.status
                    ));
                }
            }
            PositionStatus::Idle => {}
        }
        if let Some(side) = self.trigger_side {
            let ascending = side.is_long();
            for pair in self.triggers.windows(2) {
                let ok = if ascending {
                    pair[0] < pair[1]
                } else {
                    pair[0] > pair[1]
                };
                if !ok {
                    return Err("triggers not strictly monotonic for side".into());
                }
            }
            // Stops only need to move in the profit direction; rounding to
            // stored precision may produce equal consecutive values
            for pair in self.stop_prices.windows(2) {
                let ok = if ascending {
                    pair[0] <= pair[1]
                } else {
                    pair[0] >= pair[1]
                };
                if !ok {
                    return Err("stop_prices not monotonic in profit direction".into());
                }
            }
        }
        Ok(())
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::idle()
    }
}
