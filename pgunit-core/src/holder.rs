//! Process-wide database handle
//!
//! A `ConnectionHolder` wraps the one live handle every transaction context
//! draws from. Build one explicitly with `ConnectionHolder::new` and pass it
//! down, or use `ConnectionHolder::instance` for the lazily opened global.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::PgConfig;
use crate::connect::{check_connection, ConnectionFactory};
use crate::db::Database;

static GLOBAL_HOLDER: HolderCell = HolderCell::new();

/// Owns the live database handle.
pub struct ConnectionHolder {
    db: Arc<dyn Database>,
}

impl ConnectionHolder {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// The process-wide holder, connecting on first use.
    ///
    /// The first caller's config wins; later calls return the same holder
    /// whatever config they pass. Exits the process if the database cannot
    /// be reached.
    pub async fn instance(config: &PgConfig) -> Arc<ConnectionHolder> {
        GLOBAL_HOLDER
            .get_or_connect(config, &ConnectionFactory::default())
            .await
    }

    /// Non-transactional handle
    pub fn database(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Liveness probe, result discarded
    pub async fn check(&self) {
        check_connection(self.db.as_ref()).await;
    }
}

/// One-time initializer for a `ConnectionHolder`.
///
/// Concurrent first callers wait on a single connection attempt.
pub struct HolderCell {
    cell: OnceCell<Arc<ConnectionHolder>>,
}

impl Default for HolderCell {
    fn default() -> Self {
        Self::new()
    }
}

impl HolderCell {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    pub async fn get_or_connect(
        &self,
        config: &PgConfig,
        factory: &ConnectionFactory,
    ) -> Arc<ConnectionHolder> {
        self.cell
            .get_or_init(|| async {
                debug!("initializing connection holder for {}@{}", config.db_name, config.host);
                let db = factory.connect(config).await;
                Arc::new(ConnectionHolder::new(db))
            })
            .await
            .clone()
    }

    /// The holder if it has already been created
    pub fn get(&self) -> Option<Arc<ConnectionHolder>> {
        self.cell.get().cloned()
    }
}
