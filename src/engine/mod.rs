//! Engine loop: wires the market feed to per-account processing
//!
//! Owns startup backfill, per-tick dispatch, candle-close detection,
//! user-stream reconciliation, and graceful shutdown. Per-account errors
//! are contained here so one account's failure never stops another's
//! processing or drops the feed.

mod locks;
mod reconcile;

pub use locks::{HeldGuards, KeyGuard, KeyedTryLocks};
pub use reconcile::UserStreamReconciler;

use crate::candles::{CandleHistory, HISTORY_CAPACITY};
use crate::clock::{self, Stopwatch};
use crate::config::Config;
use crate::detector::MovementDetector;
use crate::entry::EntryEngine;
use crate::error::EngineError;
use crate::feed::{KlineEvent, MarketFeed};
use crate::gateway::OrderGateway;
use crate::ladder::TriggerRunner;
use crate::notify::WebhookNotifier;
use crate::state::AccountState;
use crate::telemetry::AccountLogs;
use futures_util::future::join_all;
use std::sync::Arc;

/// The running engine for one process
pub struct Engine {
    config: Arc<Config>,
    state: Arc<AccountState>,
    gateways: Vec<(String, Arc<dyn OrderGateway>)>,
    feed: Arc<dyn MarketFeed>,
    entry: EntryEngine,
    runner: TriggerRunner,
    entry_guards: Arc<HeldGuards>,
    detectors: Vec<MovementDetector>,
    history: CandleHistory,
    notifier: WebhookNotifier,
    account_logs: Arc<AccountLogs>,
}

impl Engine {
    pub fn new(
        config: Arc<Config>,
        state: Arc<AccountState>,
        feed: Arc<dyn MarketFeed>,
        gateways: Vec<(String, Arc<dyn OrderGateway>)>,
        account_logs: Arc<AccountLogs>,
    ) -> Self {
        let entry_guards = HeldGuards::new();
        let entry = EntryEngine::new(
            Arc::clone(&state),
            KeyedTryLocks::new(),
            Arc::clone(&entry_guards),
        );
        let runner = TriggerRunner::new(Arc::clone(&state), KeyedTryLocks::new());
        let detectors = config
            .pairs
            .iter()
            .map(|pair| MovementDetector::new(pair.clone()))
            .collect();
        let history = CandleHistory::new(config.symbols());

        Self {
            config,
            state,
            gateways,
            feed,
            entry,
            runner,
            entry_guards,
            detectors,
            history,
            notifier: WebhookNotifier::new(),
            account_logs,
        }
    }

    /// Run until interrupted: initialize accounts, subscribe streams,
    /// backfill history, then process kline messages.
    pub async fn run(mut self) -> anyhow::Result<()> {
        self.config.validate()?;

        let symbols = self.config.symbols();
        for (account, _) in &self.gateways {
            self.state.initialize(account, &symbols).await?;
            tracing::info!(account, "account state initialized");
        }

        for (account, gateway) in &self.gateways {
            let rx = gateway.subscribe_user_stream().await?;
            let reconciler = UserStreamReconciler::new(
                account.clone(),
                Arc::clone(&self.state),
                Arc::clone(&self.config),
                self.notifier.clone(),
                Arc::clone(&self.account_logs),
                Arc::clone(&self.entry_guards),
            );
            tokio::spawn(reconciler.consume(rx));
        }

        self.backfill().await?;

        let mut feed_rx = self.feed.subscribe().await?;
        tracing::info!("engine running");

        loop {
            tokio::select! {
                event = feed_rx.recv() => {
                    match event {
                        Some(event) => self.handle_kline(event).await,
                        None => {
                            tracing::error!("market feed closed, stopping engine");
                            break;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupt received, shutting down");
                    break;
                }
            }
        }

        // Dropping the feed receiver stops message intake; file loggers
        // flush when the telemetry guard drops in main.
        Ok(())
    }

    /// Seed the rolling history with the last closed candles from REST
    async fn backfill(&mut self) -> anyhow::Result<()> {
        let (_, gateway) = self
            .gateways
            .first()
            .ok_or_else(|| EngineError::Config("no accounts configured".into()))?;

        for symbol in self.config.symbols() {
            let candles = gateway
                .recent_closed_candles(&symbol, &self.config.api_interval, HISTORY_CAPACITY)
                .await?;
            let count = candles.len();
            for candle in candles {
                self.history.append(&symbol, candle)?;
            }
            tracing::info!(symbol, count, "backfilled candle history");
        }
        Ok(())
    }

    /// Process one kline message: arm checks and ladder advances for all
    /// accounts, then on bar close the movement detector and history
    /// append (in that order, so the detector sees history without the
    /// closing candle).
    async fn handle_kline(&mut self, event: KlineEvent) {
        let Some(pair) = self.config.pair(&event.symbol).cloned() else {
            return;
        };
        let price = event.candle.close;
        let watch = Stopwatch::start();

        let entry = &self.entry;
        let runner = &self.runner;
        let ticks = self.gateways.iter().map(|(account, gateway)| {
            let pair = &pair;
            async move {
                if let Err(e) = entry.on_tick(gateway.as_ref(), account, pair, price).await {
                    tracing::error!(account, symbol = %pair.symbol, error = %e, "entry check failed");
                }
                if let Err(e) = runner
                    .on_tick(gateway.as_ref(), account, &pair.symbol, price)
                    .await
                {
                    tracing::error!(account, symbol = %pair.symbol, error = %e, "trigger runner failed");
                }
            }
        });
        join_all(ticks).await;

        if event.is_closed {
            self.on_candle_close(&event).await;
            if let Err(e) = self.history.append(&event.symbol, event.candle.clone()) {
                tracing::error!(symbol = %event.symbol, error = %e, "history append failed");
            }
        }

        tracing::debug!(
            symbol = %event.symbol,
            %price,
            closed = event.is_closed,
            elapsed_ms = watch.elapsed_ms() as u64,
            "kline processed"
        );
    }

    async fn on_candle_close(&self, event: &KlineEvent) {
        let Some(detector) = self.detectors.iter().find(|d| d.symbol() == event.symbol) else {
            return;
        };
        let history = match self.history.snapshot(&event.symbol) {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(symbol = %event.symbol, error = %e, "history snapshot failed");
                return;
            }
        };

        let signal = match detector.evaluate(&event.candle, &history) {
            Ok(Some(signal)) => signal,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(symbol = %event.symbol, error = %e, "movement detector skipped");
                return;
            }
        };
        if signal.movement_threshold <= rust_decimal::Decimal::ZERO {
            // A flat history makes the dynamic threshold degenerate;
            // arming at a zero threshold would enter on any tick
            tracing::debug!(symbol = %signal.symbol, "zero movement threshold, not arming");
            return;
        }

        tracing::info!(
            symbol = %signal.symbol,
            lock = %signal.lock_close_price,
            current_diff = %signal.current_diff,
            dynamic_threshold = %signal.dynamic_threshold,
            past_sum = %signal.past_sum,
            candle_close = %clock::format_epoch_ms(event.candle.close_time),
            "anomalous movement detected"
        );

        for (account, _) in &self.gateways {
            match self
                .state
                .arm_if_eligible(
                    account,
                    &signal.symbol,
                    signal.lock_close_price,
                    signal.movement_threshold,
                )
                .await
            {
                Ok(Some(_)) => {
                    tracing::info!(
                        account,
                        symbol = %signal.symbol,
                        lock = %signal.lock_close_price,
                        threshold = %signal.movement_threshold,
                        "account armed"
                    );
                    self.account_logs.info(
                        account,
                        &signal.symbol,
                        "armed",
                        &format!(
                            "lock={} threshold={}",
                            signal.lock_close_price, signal.movement_threshold
                        ),
                    );
                }
                Ok(None) => {
                    tracing::debug!(
                        account,
                        symbol = %signal.symbol,
                        "account not re-armed (position entering or open)"
                    );
                }
                Err(e) => {
                    tracing::error!(account, symbol = %signal.symbol, error = %e, "arming failed");
                }
            }
        }
    }
}

