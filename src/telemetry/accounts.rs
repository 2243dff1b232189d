//! Per-account trade log files

use crate::config::AccountConfig;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};

/// Directory for the per-account files
const ACCOUNTS_LOG_DIR: &str = "logs/accounts";

/// One info-level log file per configured account at
/// `logs/accounts/<name>.log`.
///
/// Account names are known at startup, so the writers are created once
/// and handed to the engine.
pub struct AccountLogs {
    writers: HashMap<String, NonBlocking>,
}

impl AccountLogs {
    pub fn create(accounts: &[AccountConfig]) -> anyhow::Result<(Self, Vec<WorkerGuard>)> {
        if !accounts.is_empty() {
            std::fs::create_dir_all(ACCOUNTS_LOG_DIR)?;
        }

        let mut writers = HashMap::new();
        let mut guards = Vec::new();
        for account in accounts {
            let appender = tracing_appender::rolling::never(
                Path::new(ACCOUNTS_LOG_DIR),
                format!("{}.log", account.name),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            writers.insert(account.name.clone(), writer);
            guards.push(guard);
        }
        Ok((Self { writers }, guards))
    }

    /// Append one structured line to the account's file
    pub fn info(&self, account: &str, symbol: &str, event: &str, message: &str) {
        let Some(writer) = self.writers.get(account) else {
            return;
        };
        let line = format!(
            "{} INFO {} {} {}\n",
            crate::clock::ist_now().format("%Y-%m-%d %H:%M:%S%.3f"),
            event,
            symbol,
            message,
        );
        let mut writer = writer.clone();
        if let Err(e) = writer.write_all(line.as_bytes()) {
            tracing::warn!(account, error = %e, "account log write failed");
        }
    }
}
