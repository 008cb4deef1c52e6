use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pgunit_core::PgConfig;

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration (password redacted)
    Show(ShowArgs),
    /// Check the configuration without connecting
    Validate,
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Print as JSON instead of TOML
    #[arg(long)]
    pub json: bool,
}

/// Load config from a TOML file, or from PG_* environment variables
pub fn load(path: Option<&Path>) -> Result<PgConfig> {
    match path {
        Some(path) => PgConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => PgConfig::from_env().context("Failed to load config from environment"),
    }
}

pub fn run_config(args: ConfigArgs, path: Option<PathBuf>) -> Result<()> {
    let config = load(path.as_deref())?;

    match args.command {
        ConfigCommands::Show(args) => run_show(config, args),
        ConfigCommands::Validate => {
            println!(
                "✓ config ok: {}@{}:{} (schema {})",
                config.db_name, config.host, config.port, config.schema
            );
            Ok(())
        }
    }
}

fn run_show(mut config: PgConfig, args: ShowArgs) -> Result<()> {
    if !config.password.is_empty() {
        config.password = "<redacted>".to_string();
    }

    let rendered = if args.json {
        serde_json::to_string_pretty(&config)?
    } else {
        toml::to_string_pretty(&config)?
    };
    println!("{rendered}");
    Ok(())
}
