use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pgunit_core::{ConnectionFactory, Database, PgConfig, RetryPolicy};
use tracing::info;

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Number of connection attempts before giving up
    #[arg(long, default_value = "8")]
    pub attempts: u32,

    /// Seconds to wait between attempts
    #[arg(long, default_value = "4")]
    pub delay_secs: u64,
}

/// Connect with retry and run a liveness query.
///
/// Unlike the library's fail-fast startup path, a failed check is reported
/// as an ordinary error so the exit status is meaningful to scripts.
pub async fn run_check(config: PgConfig, args: CheckArgs) -> Result<()> {
    let factory = ConnectionFactory::default().with_retry(RetryPolicy {
        attempts: args.attempts,
        delay: Duration::from_secs(args.delay_secs),
    });

    let db = factory
        .open(&config)
        .await
        .context("Database is unreachable")?;

    let rows = db.execute("SELECT 1;").await.context("Liveness query failed")?;
    info!(rows, "liveness query returned");
    db.close().await;

    println!("✓ {}@{} is reachable", config.db_name, config.host);
    Ok(())
}
