//! pgunit-core: shared units of work over a Postgres connection pool
//!
//! Nested calls reuse one in-flight transaction through a
//! [`TransactionContext`] carried in a [`Scope`]; only the call that began
//! the transaction can commit it.

pub mod config;
pub mod connect;
pub mod db;
pub mod error;
pub mod holder;
pub mod scope;
pub mod transaction;

#[cfg(test)]
mod fake;

pub use config::PgConfig;
pub use connect::{
    check_connection, ConnectionFactory, Connector, ExitHook, PgConnector, RetryPolicy,
};
pub use db::{Database, DatabaseTransaction, PgDatabase, PgTransaction};
pub use error::{Error, Result};
pub use holder::{ConnectionHolder, HolderCell};
pub use scope::{global_transaction_context, transaction_context, Scope};
pub use transaction::{Provider, TransactionContext, TxState, TxToken};
