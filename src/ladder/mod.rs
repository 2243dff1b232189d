//! Trigger ladder computation
//!
//! At position open the engine precomputes an ordered ladder of profit
//! targets and the trailing stop to install when each target is reached.
//! The ladder is pure arithmetic over the entry fill; advancing it at
//! runtime is [`runner::TriggerRunner`]'s job.

mod runner;

pub use runner::TriggerRunner;

use crate::state::TriggerSide;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Default number of ladder rungs
pub const DEFAULT_RUNG_COUNT: usize = 20;

/// Stored ladder values are rounded to 8 decimal places
const STORED_DECIMALS: u32 = 8;

/// A computed ladder: `triggers[i]` fires the installation of
/// `stop_prices[i]`. Both are index-aligned and equally long.
#[derive(Debug, Clone, PartialEq)]
pub struct Ladder {
    pub triggers: Vec<Decimal>,
    pub stop_prices: Vec<Decimal>,
}

/// Build the geometric ladder for a freshly opened position.
///
/// Both percentages are whole-number percents (`1.0` = 1%). Triggers step
/// away from the entry in the profit direction by multiples of the
/// movement threshold; each stop compounds the previous one by the
/// threshold plus the fees exemption.
pub fn build(
    entry_price: Decimal,
    side: TriggerSide,
    movement_threshold: Decimal,
    fees_exemption: Decimal,
    count: usize,
) -> Ladder {
    let m = movement_threshold / dec!(100);
    let f = fees_exemption / dec!(100);

    let (seed_factor, stop_factor) = match side {
        TriggerSide::Long => (Decimal::ONE - m - f, Decimal::ONE + m + f),
        TriggerSide::Short => (Decimal::ONE + m + f, Decimal::ONE - m - f),
    };

    let mut triggers = Vec::with_capacity(count);
    let mut stop_prices = Vec::with_capacity(count);
    let mut stop = (entry_price * seed_factor).round_dp(STORED_DECIMALS);

    for i in 1..=count {
        let step = m * Decimal::from(i as u64);
        let trigger = match side {
            TriggerSide::Long => entry_price * (Decimal::ONE + step),
            TriggerSide::Short => entry_price * (Decimal::ONE - step),
        };
        stop = (stop * stop_factor).round_dp(STORED_DECIMALS);
        triggers.push(trigger.round_dp(STORED_DECIMALS));
        stop_prices.push(stop);
    }

    Ladder {
        triggers,
        stop_prices,
    }
}
