//! Opening the database handle
//!
//! Connection failures are retried a fixed number of times with a fixed
//! delay. `ConnectionFactory::connect` treats exhaustion as fatal and exits
//! the process; `ConnectionFactory::open` reports it as an error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::PgConfig;
use crate::db::{Database, PgDatabase};
use crate::error::{Error, Result};

/// Maximum number of connection attempts.
const DEFAULT_CONNECT_ATTEMPTS: u32 = 8;

/// Delay between connection attempts.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(4);

/// Exit status used when the database cannot be reached at all.
const EXIT_CONNECTION_FAILED: i32 = 1;

/// Fixed retry schedule: no backoff, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_CONNECT_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Performs a single connection attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, config: &PgConfig) -> Result<Arc<dyn Database>>;
}

/// Opens a tuned sqlx Postgres pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self, config: &PgConfig) -> Result<Arc<dyn Database>> {
        let db = PgDatabase::connect(config).await?;
        Ok(Arc::new(db))
    }
}

/// Terminates the process with the given status.
pub type ExitHook = fn(i32) -> !;

/// Opens database handles with retry.
pub struct ConnectionFactory {
    connector: Arc<dyn Connector>,
    retry: RetryPolicy,
    exit: ExitHook,
}

impl Default for ConnectionFactory {
    fn default() -> Self {
        Self::new(Arc::new(PgConnector))
    }
}

impl ConnectionFactory {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            retry: RetryPolicy::default(),
            exit: std::process::exit,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the process exit used by `connect` on exhaustion
    pub fn with_exit_hook(mut self, exit: ExitHook) -> Self {
        self.exit = exit;
        self
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Open a handle, retrying on failure.
    ///
    /// Returns `Error::ConnectionExhausted` carrying the last failure once
    /// every attempt has failed.
    pub async fn open(&self, config: &PgConfig) -> Result<Arc<dyn Database>> {
        let attempts = self.retry.attempts.max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            info!(
                "connecting to postgres {}@{}... (attempt {} of {})",
                config.db_name, config.host, attempt, attempts
            );

            match self.connector.connect(config).await {
                Ok(db) => {
                    info!(
                        "successfully connected to postgres {}@{}",
                        config.db_name, config.host
                    );
                    return Ok(db);
                }
                Err(err) => {
                    error!(
                        attempt,
                        "connecting to postgres {}@{} FAILED: {}",
                        config.db_name,
                        config.host,
                        err
                    );
                    last = Some(err);
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.retry.delay).await;
            }
        }

        Err(Error::ConnectionExhausted {
            host: config.host.clone(),
            db_name: config.db_name.clone(),
            attempts,
            source: Box::new(last.unwrap_or_else(|| Error::config("no connection attempt made"))),
        })
    }

    /// Open a handle or terminate the process.
    ///
    /// Startup cannot continue without the database, so exhaustion is not
    /// returned to the caller.
    pub async fn connect(&self, config: &PgConfig) -> Arc<dyn Database> {
        match self.open(config).await {
            Ok(db) => db,
            Err(err) => {
                error!("can't connect to db: {}", err);
                (self.exit)(EXIT_CONNECTION_FAILED)
            }
        }
    }
}

/// Fire a trivial liveness query and discard the result.
pub async fn check_connection(db: &dyn Database) {
    if let Err(err) = db.execute("SELECT 1;").await {
        warn!("connection check failed: {}", err);
    }
}
