//! Structured error types for pgunit-core.
//!
//! Uses `thiserror` so library consumers can match on transaction-state
//! failures. The `pgunit` binary wraps these in `anyhow`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pgunit-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Every connection attempt failed
    #[error("connecting to postgres {db_name}@{host} failed after {attempts} attempts: {source}")]
    ConnectionExhausted {
        host: String,
        db_name: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// The context was rolled back and can no longer be used
    #[error("the transaction has been rolled back")]
    TransactionRolledBack,

    /// Commit was called without an active transaction
    #[error("not in a transaction, begin() has not been called")]
    NotInTransaction,

    /// Underlying database error (begin, commit, rollback, exec)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// Config file could not be read
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Config file is not valid TOML
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias for pgunit-core operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a config error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create an I/O error tied to a path
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the error reports a poisoned (rolled back) context
    pub fn is_rolled_back(&self) -> bool {
        matches!(self, Self::TransactionRolledBack)
    }
}
