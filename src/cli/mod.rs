//! CLI interface for poly-engine
//!
//! Provides subcommands for:
//! - `run`: Start the trading engine (paper unless configured live)
//! - `positions`: Show the persisted position table
//! - `config`: Show the effective configuration

mod positions;
mod run;

pub use positions::PositionsArgs;
pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "poly-engine")]
#[command(about = "Position lifecycle engine for Polymarket 15-minute up/down markets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the engine
    Run(RunArgs),
    /// Show persisted positions
    Positions(PositionsArgs),
    /// Show the effective configuration
    Config,
}
