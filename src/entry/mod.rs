//! Entry engine: armed-threshold checks and position opening
//!
//! Runs on every price tick for an armed (account, symbol). A breach of
//! the lock-price threshold submits the paired market entry + protective
//! stop through the gateway; the position completes its transition to
//! open when the user stream reports the fill.

use crate::config::PairConfig;
use crate::engine::{HeldGuards, KeyedTryLocks};
use crate::error::{EngineError, Result};
use crate::gateway::{round_price, round_quantity, OrderGateway, OrderSide};
use crate::state::{AccountState, PositionStatus};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

/// A detected threshold breach
#[derive(Debug, Clone, Copy, PartialEq)]
struct Breach {
    side: OrderSide,
    /// Protective stop before precision rounding
    stop_price: Decimal,
}

/// Stateless entry checker shared by every account.
///
/// The entry lock is held from `armed → entering` through either the open
/// transition or rollback. Since the open transition arrives later on the
/// user stream, a successful submission parks its guard in `entry_guards`;
/// the user-stream reconciler releases it when the position opens or the
/// exchange reports flat.
pub struct EntryEngine {
    state: Arc<AccountState>,
    entry_locks: Arc<KeyedTryLocks>,
    entry_guards: Arc<HeldGuards>,
}

impl EntryEngine {
    pub fn new(
        state: Arc<AccountState>,
        entry_locks: Arc<KeyedTryLocks>,
        entry_guards: Arc<HeldGuards>,
    ) -> Self {
        Self {
            state,
            entry_locks,
            entry_guards,
        }
    }

    /// Evaluate one tick for one account. No-op unless the position is
    /// armed and the price breaches the lock threshold.
    pub async fn on_tick(
        &self,
        gateway: &dyn OrderGateway,
        account: &str,
        pair: &PairConfig,
        price: Decimal,
    ) -> Result<()> {
        let symbol = pair.symbol.as_str();
        let Some(position) = self.state.get_position(account, symbol).await else {
            return Ok(());
        };
        if position.status != PositionStatus::Armed {
            return Ok(());
        }
        let (Some(lock_price), Some(threshold)) =
            (position.lock_close_price, position.movement_threshold)
        else {
            return Ok(());
        };

        let Some(breach) = detect_breach(price, lock_price, threshold) else {
            return Ok(());
        };

        // Duplicate-entry guard: a contending tick skips instead of queueing
        let Some(guard) = self.entry_locks.try_acquire(account, symbol) else {
            tracing::debug!(account, symbol, "entry already in flight, skipping tick");
            return Ok(());
        };

        self.state
            .update_position(account, symbol, |p| {
                p.status = PositionStatus::Entering;
            })
            .await?;

        match self
            .submit_entry(gateway, account, pair, price, breach)
            .await
        {
            Ok(()) => {
                // Keep the lock held until the user stream settles the
                // outcome: the reconciler releases it on open or flat
                self.entry_guards.stash(account, symbol, guard);
                Ok(())
            }
            Err(EngineError::PositionAlreadyExists { symbol }) => {
                // The exchange already holds this symbol; release the lock
                // and let state follow the exchange via the user stream.
                tracing::debug!(account, %symbol, "position already exists at exchange, entry aborted");
                Ok(())
            }
            Err(e) => {
                // Rollback releases the lock with the guard; revert to
                // armed unless the user stream already reconciled
                self.state
                    .update_position(account, symbol, |p| {
                        if p.status == PositionStatus::Entering {
                            p.status = PositionStatus::Armed;
                        }
                    })
                    .await?;
                Err(e)
            }
        }
    }

    async fn submit_entry(
        &self,
        gateway: &dyn OrderGateway,
        account: &str,
        pair: &PairConfig,
        price: Decimal,
        breach: Breach,
    ) -> Result<()> {
        let symbol = pair.symbol.as_str();
        let precision = gateway.symbol_precision(symbol).await?;
        let quantity = round_quantity(pair.usdt_amount / price, &precision);
        if quantity.is_zero() {
            return Err(EngineError::Config(format!(
                "{symbol}: usdt_amount {} rounds to zero quantity at price {price}",
                pair.usdt_amount
            )));
        }
        let stop_price = round_price(breach.stop_price, &precision);

        if gateway.has_open_position(symbol).await? {
            return Err(EngineError::PositionAlreadyExists {
                symbol: symbol.to_string(),
            });
        }

        tracing::info!(
            account,
            symbol,
            side = breach.side.as_str(),
            %price,
            %quantity,
            %stop_price,
            "entry threshold breached, submitting paired orders"
        );

        match gateway
            .submit_entry_with_stop(symbol, breach.side, quantity, stop_price)
            .await
        {
            Ok(receipt) => {
                tracing::info!(
                    account,
                    symbol,
                    entry_order_id = receipt.entry_order_id,
                    stop_order_id = receipt.stop_order_id,
                    "paired orders accepted, awaiting fill"
                );
                Ok(())
            }
            Err(EngineError::StopLossPlacementFailed { symbol, reason }) => {
                tracing::error!(
                    account,
                    %symbol,
                    reason,
                    "stop-loss leg failed, closing just-opened position"
                );
                gateway.close_position(&symbol).await?;
                Err(EngineError::StopLossPlacementFailed { symbol, reason })
            }
            Err(e) => Err(e),
        }
    }
}

/// Check the armed thresholds: an upward breach goes long with a stop
/// below the price, a downward breach goes short with a stop above it.
fn detect_breach(price: Decimal, lock_price: Decimal, movement_threshold: Decimal) -> Option<Breach> {
    let m = movement_threshold / dec!(100);
    if price >= lock_price * (Decimal::ONE + m) {
        Some(Breach {
            side: OrderSide::Buy,
            stop_price: price * (Decimal::ONE - m),
        })
    } else if price <= lock_price * (Decimal::ONE - m) {
        Some(Breach {
            side: OrderSide::Sell,
            stop_price: price * (Decimal::ONE + m),
        })
    } else {
        None
    }
}
