use clap::Parser;
use perp_momentum::cli::{Cli, Commands};
use perp_momentum::config::Config;
use perp_momentum::telemetry;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .map_err(|e| anyhow::anyhow!("could not load config from {}: {e}", cli.config))?;

    match cli.command {
        Commands::Run(args) => {
            let (guard, account_logs) = telemetry::init_telemetry("info", &config.accounts)?;
            tracing::info!(
                pairs = config.pairs.len(),
                accounts = config.accounts.len(),
                "starting perp-momentum"
            );
            let result = args.execute(Arc::new(config), account_logs).await;
            // Dropping the guard flushes every log file before exit
            drop(guard);
            result?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Order URL: {}", config.order_url);
            println!(
                "  Intervals: ws={} api={}",
                config.websocket_interval, config.api_interval
            );
            println!("  Health port: {}", config.health_port);
            for pair in &config.pairs {
                println!(
                    "  Pair: {} threshold={} fees_exemption={}% window={} notional={} USDT",
                    pair.symbol,
                    pair.threshold,
                    pair.fees_exemption_percentage,
                    pair.num_previous_candles,
                    pair.usdt_amount
                );
            }
            for account in &config.accounts {
                println!("  Account: {}", account.name);
            }
        }
    }

    Ok(())
}
