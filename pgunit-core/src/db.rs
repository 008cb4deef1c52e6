//! Database capability used by the transaction layer
//!
//! The transaction context only needs to begin, commit, roll back and run a
//! statement against an opaque handle. `Database` and `DatabaseTransaction`
//! describe that capability; `PgDatabase` is the sqlx/Postgres implementation.
//! Tests substitute in-memory fakes.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use crate::config::PgConfig;
use crate::error::Result;

/// One open database transaction.
///
/// `commit` and `rollback` consume the handle so it cannot be reused
/// after finalization.
#[async_trait]
pub trait DatabaseTransaction: Send {
    /// Run a statement inside the transaction, returning rows affected
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// A pooled database handle.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    /// Open a new transaction on a pooled connection
    async fn begin(&self) -> Result<Box<dyn DatabaseTransaction>>;

    /// Run a statement outside any transaction, returning rows affected
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Close every pooled connection
    async fn close(&self);
}

/// Postgres connection pool.
#[derive(Clone, Debug)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool tuned from `config`: max open connections, connection
    /// max lifetime and statement logging.
    pub async fn connect(config: &PgConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max_connections())
            .max_lifetime(config.connection_max_lifetime())
            .connect_with(config.connect_options())
            .await?;
        Ok(Self { pool })
    }

    /// The underlying sqlx pool, for callers that want typed queries
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> Result<Box<dyn DatabaseTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let done = sqlx::query(sql).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// An open Postgres transaction borrowed from the pool.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgTransaction {
    /// The underlying sqlx transaction, for callers that want typed queries
    pub fn inner(&mut self) -> &mut Transaction<'static, Postgres> {
        &mut self.tx
    }
}

#[async_trait]
impl DatabaseTransaction for PgTransaction {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let done = sqlx::query(sql).execute(&mut *self.tx).await?;
        Ok(done.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
