//! Ladder advancement on price ticks

use crate::engine::KeyedTryLocks;
use crate::error::{EngineError, Result};
use crate::gateway::{round_price, OrderGateway};
use crate::state::{AccountState, PositionStatus, TriggerSide};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Trail-stop placement attempts per ladder advance; no backoff
const PLACE_ATTEMPTS: u32 = 3;

/// Advances an open position's ladder: when the head trigger is breached,
/// installs the matching trailing stop and pops the rung.
///
/// The head is only popped after the gateway confirms the stop, so a
/// failed placement leaves the ladder unchanged for the next tick.
pub struct TriggerRunner {
    state: Arc<AccountState>,
    trigger_locks: Arc<KeyedTryLocks>,
}

impl TriggerRunner {
    pub fn new(state: Arc<AccountState>, trigger_locks: Arc<KeyedTryLocks>) -> Self {
        Self {
            state,
            trigger_locks,
        }
    }

    /// Evaluate one tick for one open position
    pub async fn on_tick(
        &self,
        gateway: &dyn OrderGateway,
        account: &str,
        symbol: &str,
        price: Decimal,
    ) -> Result<()> {
        let Some(snapshot) = self.state.get_position(account, symbol).await else {
            return Ok(());
        };
        if snapshot.status != PositionStatus::Open || snapshot.triggers.is_empty() {
            return Ok(());
        }
        let Some(side) = snapshot.trigger_side else {
            return Ok(());
        };

        let head_trigger = snapshot.triggers[0];
        let breached = match side {
            TriggerSide::Long => price >= head_trigger,
            TriggerSide::Short => price <= head_trigger,
        };
        if !breached {
            return Ok(());
        }

        // One ladder advance at a time; a contending tick skips
        let Some(_guard) = self.trigger_locks.try_acquire(account, symbol) else {
            tracing::debug!(account, symbol, "ladder advance in flight, skipping tick");
            return Ok(());
        };

        // Re-read under the lock; abort if another advance got here first
        let Some(current) = self.state.get_position(account, symbol).await else {
            return Ok(());
        };
        if current.status != PositionStatus::Open
            || current.triggers.first() != Some(&head_trigger)
            || current.stop_prices.first() != snapshot.stop_prices.first()
        {
            tracing::debug!(account, symbol, "ladder head changed since snapshot, aborting");
            return Ok(());
        }
        let stop_price = current.stop_prices[0];

        let precision = gateway.symbol_precision(symbol).await?;
        let stop_to_place = round_price(stop_price, &precision);

        self.state
            .update_position(account, symbol, |p| {
                p.is_placing_stop_loss_running = true;
            })
            .await?;

        let placed = self
            .place_with_retries(gateway, account, symbol, side, stop_to_place)
            .await;

        match placed {
            Ok(()) => {
                let updated = self
                    .state
                    .update_position(account, symbol, |p| {
                        p.triggers.remove(0);
                        p.stop_prices.remove(0);
                        p.is_placing_stop_loss_running = false;
                    })
                    .await?;
                tracing::info!(
                    account,
                    symbol,
                    trigger = %head_trigger,
                    stop = %stop_to_place,
                    remaining = updated.triggers.len(),
                    "trailing stop advanced"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    account,
                    symbol,
                    error = %e,
                    "trail stop placement exhausted retries, closing position"
                );
                let close_result = gateway.close_position(symbol).await;
                self.state
                    .update_position(account, symbol, |p| {
                        p.is_placing_stop_loss_running = false;
                    })
                    .await?;
                close_result
            }
        }
    }

    async fn place_with_retries(
        &self,
        gateway: &dyn OrderGateway,
        account: &str,
        symbol: &str,
        side: TriggerSide,
        stop_price: Decimal,
    ) -> Result<()> {
        let mut last_error = None;
        for attempt in 1..=PLACE_ATTEMPTS {
            match gateway.place_trail_stop(symbol, side, stop_price).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        account,
                        symbol,
                        attempt,
                        error = %e,
                        "trail stop placement failed"
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| EngineError::Transport("no attempts made".into())))
    }
}
