//! pgunit CLI - connection checks and config inspection for pgunit
//!
//! Provides:
//! - Connectivity check with the library's retry schedule (`check`)
//! - Effective configuration display and validation (`config`)
//! - A read-only walk through a nested unit of work (`demo`)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "pgunit",
    author,
    version,
    about = "Shared Postgres units of work: connection checks and config inspection"
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// TOML config file (defaults to PG_* environment variables)
    #[arg(long = "config", short = 'c', global = true, env = "PGUNIT_CONFIG")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect with retry and run a liveness query
    Check(commands::check::CheckArgs),
    /// Show or validate the effective configuration
    Config(config::ConfigArgs),
    /// Run a read-only nested unit of work against the database
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_setup::init(&tracing_setup::TracingConfig { debug: cli.debug }).ok();

    match cli.command {
        Commands::Check(args) => {
            let config = config::load(cli.config_path.as_deref())?;
            commands::check::run_check(config, args).await?
        }
        Commands::Config(args) => config::run_config(args, cli.config_path)?,
        Commands::Demo => {
            let config = config::load(cli.config_path.as_deref())?;
            commands::demo::run_demo(config).await?
        }
    }

    Ok(())
}
