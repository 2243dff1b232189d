//! CLI interface for perp-momentum
//!
//! Provides subcommands for:
//! - `run`: Start the trading engine
//! - `config`: Show the parsed configuration

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "perp-momentum")]
#[command(about = "Momentum-trading engine for perpetual futures")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the trading engine
    Run(RunArgs),
    /// Show the parsed configuration
    Config,
}
