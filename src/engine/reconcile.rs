//! User-stream reconciliation into the position state machine

use super::HeldGuards;
use crate::config::Config;
use crate::gateway::UserStreamEvent;
use crate::ladder::{self, DEFAULT_RUNG_COUNT};
use crate::notify::WebhookNotifier;
use crate::state::{AccountState, PositionStatus, TriggerSide};
use crate::telemetry::AccountLogs;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Applies exchange-reported account changes to one account's positions.
///
/// A zero position amount clears the record back to idle, discarding any
/// remaining ladder. A non-zero amount records the fill, completes
/// `entering → open`, and builds the trigger ladder from the reported
/// entry price. Both outcomes settle an in-flight entry, so both release
/// the parked entry lock for the key.
pub struct UserStreamReconciler {
    account: String,
    state: Arc<AccountState>,
    config: Arc<Config>,
    notifier: WebhookNotifier,
    account_logs: Arc<AccountLogs>,
    entry_guards: Arc<HeldGuards>,
}

impl UserStreamReconciler {
    pub fn new(
        account: impl Into<String>,
        state: Arc<AccountState>,
        config: Arc<Config>,
        notifier: WebhookNotifier,
        account_logs: Arc<AccountLogs>,
        entry_guards: Arc<HeldGuards>,
    ) -> Self {
        Self {
            account: account.into(),
            state,
            config,
            notifier,
            account_logs,
            entry_guards,
        }
    }

    /// Drain the user stream until it closes
    pub async fn consume(self, mut rx: mpsc::Receiver<UserStreamEvent>) {
        while let Some(event) = rx.recv().await {
            self.apply(event).await;
        }
        tracing::warn!(account = %self.account, "user stream consumer stopped");
    }

    /// Apply one user-stream event
    pub async fn apply(&self, event: UserStreamEvent) {
        match event {
            UserStreamEvent::AccountUpdate(positions) => {
                for update in positions {
                    if self.config.pair(&update.symbol).is_none() {
                        continue;
                    }
                    if update.is_flat() {
                        self.handle_flat(&update.symbol).await;
                    } else {
                        self.handle_fill(&update.symbol, update.position_amount, update.entry_price)
                            .await;
                    }
                }
            }
            UserStreamEvent::OrderUpdate(order) => {
                tracing::debug!(
                    account = %self.account,
                    symbol = %order.symbol,
                    status = %order.order_status,
                    order_type = %order.order_type,
                    average_price = %order.average_price,
                    stop_price = %order.stop_price,
                    "order update"
                );
                if order.is_filled() {
                    self.account_logs.info(
                        &self.account,
                        &order.symbol,
                        "order_filled",
                        &format!(
                            "type={} avg_price={} last_fill={}",
                            order.order_type, order.average_price, order.last_filled_price
                        ),
                    );
                }
            }
        }
    }

    async fn handle_flat(&self, symbol: &str) {
        let account = self.account.as_str();
        self.entry_guards.release(account, symbol);
        let was = self.state.get_position(account, symbol).await;
        if let Err(e) = self.state.reset_to_idle(account, symbol).await {
            tracing::error!(account, symbol, error = %e, "reset to idle failed");
            return;
        }

        let had_state = was.map_or(false, |p| p.status != PositionStatus::Idle);
        if had_state {
            tracing::info!(account, symbol, "exchange reports flat, position cleared");
            self.account_logs
                .info(account, symbol, "position_closed", "flat at exchange");
            if let Some(url) = self.webhook_for(symbol) {
                self.notifier
                    .notify(&url, "position_closed", account, symbol, json!({}));
            }
        }
    }

    async fn handle_fill(&self, symbol: &str, position_amount: Decimal, entry_price: Decimal) {
        let account = self.account.as_str();
        if entry_price <= Decimal::ZERO {
            tracing::warn!(account, symbol, %entry_price, "fill without entry price, skipping");
            return;
        }
        // The open transition completes the entry; the lock taken at
        // armed → entering is released here
        self.entry_guards.release(account, symbol);
        let side = if position_amount > Decimal::ZERO {
            TriggerSide::Long
        } else {
            TriggerSide::Short
        };
        let fees_exemption = self
            .config
            .pair(symbol)
            .map(|p| p.fees_exemption_percentage)
            .unwrap_or_default();

        let result = self
            .state
            .update_position(account, symbol, |p| {
                let opening = p.status != PositionStatus::Open;
                p.status = PositionStatus::Open;
                p.entry_price = Some(entry_price);
                p.trigger_side = Some(side);
                if opening && p.triggers.is_empty() {
                    match p.movement_threshold {
                        Some(threshold) => {
                            let rungs = ladder::build(
                                entry_price,
                                side,
                                threshold,
                                fees_exemption,
                                DEFAULT_RUNG_COUNT,
                            );
                            p.triggers = rungs.triggers;
                            p.stop_prices = rungs.stop_prices;
                        }
                        None => {
                            tracing::warn!(
                                account,
                                symbol,
                                "open without movement threshold, ladder not built"
                            );
                        }
                    }
                }
            })
            .await;

        match result {
            Ok(position) => {
                tracing::info!(
                    account,
                    symbol,
                    %entry_price,
                    side = ?side,
                    rungs = position.triggers.len(),
                    "position open"
                );
                self.account_logs.info(
                    account,
                    symbol,
                    "position_open",
                    &format!("entry={entry_price} side={side:?} amount={position_amount}"),
                );
                if let Some(url) = self.webhook_for(symbol) {
                    self.notifier.notify(
                        &url,
                        "position_open",
                        account,
                        symbol,
                        json!({
                            "entry_price": entry_price.to_string(),
                            "position_amount": position_amount.to_string(),
                        }),
                    );
                }
            }
            Err(e) => {
                tracing::error!(account, symbol, error = %e, "fill reconciliation failed");
            }
        }
    }

    fn webhook_for(&self, symbol: &str) -> Option<String> {
        self.config
            .pair(symbol)
            .and_then(|p| p.webhook_url.clone())
    }
}
