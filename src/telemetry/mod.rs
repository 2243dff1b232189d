//! Telemetry: structured logging split across files
//!
//! Console output plus `trading.log` (info), `debug.log` (debug),
//! `websocket.log` (socket traffic, `ws` target) and one info-level file
//! per account under `logs/accounts/`. All timestamps render in IST.

mod accounts;
mod logging;

pub use accounts::AccountLogs;
pub use logging::init_logging;

use crate::config::AccountConfig;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

/// Keeps the non-blocking writers alive; dropping it flushes all log
/// files, which is the last step of shutdown.
pub struct TelemetryGuard {
    _guards: Vec<WorkerGuard>,
}

/// Initialize all logging sinks. Returns the guard and the per-account
/// log handles used by the engine.
pub fn init_telemetry(
    log_level: &str,
    accounts: &[AccountConfig],
) -> anyhow::Result<(TelemetryGuard, Arc<AccountLogs>)> {
    let mut guards = init_logging(log_level)?;
    let (account_logs, account_guards) = AccountLogs::create(accounts)?;
    guards.extend(account_guards);
    Ok((TelemetryGuard { _guards: guards }, Arc::new(account_logs)))
}
