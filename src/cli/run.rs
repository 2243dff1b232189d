//! Run command implementation

use crate::config::Config;
use crate::engine::Engine;
use crate::feed::{BinanceKlineFeed, MarketFeed};
use crate::gateway::{BinanceGateway, OrderGateway};
use crate::health;
use crate::state::{AccountState, FileStore, StateStore};
use crate::telemetry::AccountLogs;
use anyhow::Result;
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory for persisted account state files
    #[arg(long, default_value = ".")]
    pub state_dir: String,
}

impl RunArgs {
    pub async fn execute(&self, config: Arc<Config>, account_logs: Arc<AccountLogs>) -> Result<()> {
        config.validate()?;

        let store: Arc<dyn StateStore> = Arc::new(FileStore::new(&self.state_dir));
        let state = Arc::new(AccountState::new(store));

        let mut gateways: Vec<(String, Arc<dyn OrderGateway>)> = Vec::new();
        for account in &config.accounts {
            let gateway = BinanceGateway::new(
                &account.name,
                &config.order_url,
                &account.api_key,
                &account.api_secret,
            )?;

            gateway.sync_time().await?;
            match gateway.available_usdt().await {
                Ok(balance) => {
                    tracing::info!(account = %account.name, %balance, "available USDT balance");
                }
                Err(e) => {
                    tracing::warn!(account = %account.name, error = %e, "balance check failed");
                }
            }

            gateways.push((account.name.clone(), Arc::new(gateway)));
        }

        let feed: Arc<dyn MarketFeed> = Arc::new(BinanceKlineFeed::new(
            config.symbols(),
            config.websocket_interval.clone(),
        ));

        let health_port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = health::serve(health_port).await {
                tracing::error!(error = %e, "health endpoint failed");
            }
        });

        let engine = Engine::new(config, state, feed, gateways, account_logs);
        engine.run().await
    }
}
