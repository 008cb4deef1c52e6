//! Ownership-aware shared transactions
//!
//! A `TransactionContext` lets nested calls share one database transaction
//! without knowing whether one is already open. The first `begin` opens the
//! transaction and hands out the owning token; nested `begin` calls join it
//! and get a fresh token that owns nothing. Only a `commit` with the owning
//! token finalizes, so every level can follow the same pattern:
//!
//! ```ignore
//! async fn place_order(scope: &Scope, holder: &Arc<ConnectionHolder>) -> Result<()> {
//!     let (tx, scope) = transaction_context(scope, holder);
//!     let token = tx.begin().await?;
//!
//!     let result = async {
//!         tx.execute("INSERT INTO orders ...").await?;
//!         reserve_stock(&scope, holder).await // joins the same transaction
//!     }
//!     .await;
//!
//!     match result {
//!         Ok(()) => tx.commit(token).await,
//!         Err(err) => {
//!             tx.rollback().await.ok();
//!             Err(err)
//!         }
//!     }
//! }
//! ```
//!
//! `rollback` from any level cancels the shared transaction and poisons the
//! context: every later `begin`, `commit`, `rollback` or `provider` fails
//! with `Error::TransactionRolledBack`.
//!
//! A context belongs to one logical call chain. The internal lock only makes
//! it shareable across `.await` points; it does not make interleaved use from
//! unrelated tasks meaningful.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error};
use uuid::Uuid;

use crate::db::{Database, DatabaseTransaction};
use crate::error::{Error, Result};
use crate::holder::ConnectionHolder;

/// Proof of ownership for a transaction; only its holder can commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxToken(Uuid);

impl TxToken {
    /// A fresh random 128-bit token
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TxToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Observable state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Active,
    /// Terminal
    RolledBack,
}

/// Handle and token live and die together.
struct ActiveTx {
    handle: Box<dyn DatabaseTransaction>,
    token: TxToken,
}

#[derive(Default)]
struct Inner {
    active: Option<ActiveTx>,
    rolled_back: bool,
}

impl Inner {
    fn state(&self) -> TxState {
        if self.rolled_back {
            TxState::RolledBack
        } else if self.active.is_some() {
            TxState::Active
        } else {
            TxState::Idle
        }
    }
}

/// Shared unit of work for one call chain.
pub struct TransactionContext {
    holder: Arc<ConnectionHolder>,
    inner: Mutex<Inner>,
}

impl TransactionContext {
    pub fn new(holder: Arc<ConnectionHolder>) -> Self {
        Self {
            holder,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Start a transaction, or join the one in flight.
    ///
    /// The first call opens a database transaction and returns its owning
    /// token. A nested call opens nothing and returns a fresh token that is
    /// never stored, so its `commit` is a no-op.
    pub async fn begin(&self) -> Result<TxToken> {
        let mut inner = self.inner.lock().await;
        if inner.rolled_back {
            return Err(Error::TransactionRolledBack);
        }

        let token = TxToken::random();
        if let Some(active) = &inner.active {
            debug!(tx = %active.token, caller = %token, "use existing transaction");
            return Ok(token);
        }

        let handle = self.holder.database().begin().await.map_err(|err| {
            error!(tx = %token, "cannot begin transaction: {}", err);
            err
        })?;
        inner.active = Some(ActiveTx { handle, token });
        debug!(tx = %token, "new transaction");

        Ok(token)
    }

    /// Commit the transaction if `token` owns it.
    ///
    /// A non-owning token is accepted and ignored; the transaction stays
    /// open for its owner. On a database error the context is still reset
    /// to idle and the error is returned as-is.
    pub async fn commit(&self, token: TxToken) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.rolled_back {
            return Err(Error::TransactionRolledBack);
        }

        match inner.active.take() {
            None => Err(Error::NotInTransaction),
            Some(active) if active.token != token => {
                debug!(tx = %active.token, caller = %token, "commit by non-owner ignored");
                inner.active = Some(active);
                Ok(())
            }
            Some(active) => {
                debug!(tx = %active.token, "disposing transaction");
                active.handle.commit().await.map_err(|err| {
                    error!(tx = %active.token, "cannot commit transaction: {}", err);
                    err
                })
            }
        }
    }

    /// Cancel the shared transaction and poison the context.
    ///
    /// Any caller may roll back. With nothing in flight this is a no-op;
    /// a second rollback after a real one is an error.
    pub async fn rollback(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.rolled_back {
            return Err(Error::TransactionRolledBack);
        }

        let Some(active) = inner.active.take() else {
            debug!("no active transaction to roll back");
            return Ok(());
        };

        inner.rolled_back = true;
        debug!(tx = %active.token, "disposing transaction after rollback");
        active.handle.rollback().await.map_err(|err| {
            error!(tx = %active.token, "cannot rollback: {}", err);
            err
        })
    }

    /// Handle for running statements.
    ///
    /// Inside a transaction this is the transaction itself, otherwise the
    /// holder's pooled handle. The context stays locked while a
    /// transactional provider is alive, so drop it before calling into code
    /// that uses the same context.
    pub async fn provider(&self) -> Result<Provider<'_>> {
        let inner = self.inner.lock().await;
        if inner.rolled_back {
            error!("transaction has been rolled back!");
            return Err(Error::TransactionRolledBack);
        }

        if inner.active.is_some() {
            Ok(Provider {
                handle: ProviderHandle::Transaction(inner),
            })
        } else {
            Ok(Provider {
                handle: ProviderHandle::Pool(self.holder.database().clone()),
            })
        }
    }

    /// Run one statement through the current provider
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        self.provider().await?.execute(sql).await
    }

    pub async fn state(&self) -> TxState {
        self.inner.lock().await.state()
    }

    pub async fn in_transaction(&self) -> bool {
        self.state().await == TxState::Active
    }

    pub async fn was_rolled_back(&self) -> bool {
        self.state().await == TxState::RolledBack
    }

    pub fn holder(&self) -> &Arc<ConnectionHolder> {
        &self.holder
    }
}

/// Statement runner returned by `TransactionContext::provider`.
pub struct Provider<'a> {
    handle: ProviderHandle<'a>,
}

enum ProviderHandle<'a> {
    Transaction(MutexGuard<'a, Inner>),
    Pool(Arc<dyn Database>),
}

impl Provider<'_> {
    pub fn is_transactional(&self) -> bool {
        matches!(self.handle, ProviderHandle::Transaction(_))
    }

    /// Token of the transaction this provider runs in
    pub fn token(&self) -> Option<TxToken> {
        match &self.handle {
            ProviderHandle::Transaction(inner) => inner.active.as_ref().map(|a| a.token),
            ProviderHandle::Pool(_) => None,
        }
    }

    /// Run a statement, returning rows affected
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        match &mut self.handle {
            ProviderHandle::Transaction(inner) => match inner.active.as_mut() {
                Some(active) => active.handle.execute(sql).await,
                None => Err(Error::NotInTransaction),
            },
            ProviderHandle::Pool(db) => db.execute(sql).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::fake;

    fn context() -> (Arc<fake::FakeDatabase>, TransactionContext) {
        let (db, holder) = fake::holder();
        (db, TransactionContext::new(holder))
    }

    #[tokio::test]
    async fn nested_begin_joins_without_ownership() {
        let (db, ctx) = context();

        let outer = ctx.begin().await.unwrap();
        assert_eq!(ctx.state().await, TxState::Active);

        let inner = ctx.begin().await.unwrap();
        assert_ne!(inner, outer);
        assert_eq!(db.count("begin"), 1);

        ctx.commit(TxToken::random()).await.unwrap();
        assert_eq!(ctx.state().await, TxState::Active);
        assert_eq!(db.count("commit"), 0);

        ctx.commit(outer).await.unwrap();
        assert_eq!(ctx.state().await, TxState::Idle);
        assert_eq!(db.ops(), vec!["begin", "commit"]);
    }

    #[tokio::test]
    async fn nested_commit_leaves_transaction_open() {
        let (db, ctx) = context();

        let outer = ctx.begin().await.unwrap();
        let middle = ctx.begin().await.unwrap();
        let innermost = ctx.begin().await.unwrap();

        ctx.commit(innermost).await.unwrap();
        ctx.commit(middle).await.unwrap();
        assert_eq!(ctx.state().await, TxState::Active);
        assert_eq!(db.count("commit"), 0);

        ctx.execute("INSERT INTO audit VALUES (1)").await.unwrap();
        ctx.commit(outer).await.unwrap();

        assert_eq!(ctx.state().await, TxState::Idle);
        assert_eq!(
            db.ops(),
            vec!["begin", "tx exec INSERT INTO audit VALUES (1)", "commit"]
        );
    }

    #[tokio::test]
    async fn commit_after_finalize_is_not_in_transaction() {
        let (_db, ctx) = context();

        let token = ctx.begin().await.unwrap();
        ctx.commit(token).await.unwrap();

        assert!(matches!(ctx.commit(token).await, Err(Error::NotInTransaction)));
        assert!(matches!(
            ctx.commit(TxToken::random()).await,
            Err(Error::NotInTransaction)
        ));
    }

    #[tokio::test]
    async fn fresh_context_commit_fails() {
        let (db, ctx) = context();
        assert!(matches!(
            ctx.commit(TxToken::random()).await,
            Err(Error::NotInTransaction)
        ));
        assert!(db.ops().is_empty());
    }

    #[tokio::test]
    async fn rollback_poisons_context() {
        let (db, ctx) = context();

        let token = ctx.begin().await.unwrap();
        ctx.rollback().await.unwrap();
        assert_eq!(ctx.state().await, TxState::RolledBack);
        assert_eq!(db.ops(), vec!["begin", "rollback"]);

        assert!(ctx.commit(token).await.unwrap_err().is_rolled_back());
        assert!(ctx.begin().await.unwrap_err().is_rolled_back());
        assert!(ctx.rollback().await.unwrap_err().is_rolled_back());
        assert!(ctx.provider().await.err().unwrap().is_rolled_back());
        assert!(ctx.was_rolled_back().await);
        assert_eq!(db.count("begin"), 1);
    }

    #[tokio::test]
    async fn idle_rollback_is_a_no_op() {
        let (db, ctx) = context();

        ctx.rollback().await.unwrap();
        assert!(db.ops().is_empty());
        assert_eq!(ctx.state().await, TxState::Idle);

        // The context is still usable afterwards
        let token = ctx.begin().await.unwrap();
        ctx.commit(token).await.unwrap();
        assert_eq!(db.ops(), vec!["begin", "commit"]);
    }

    #[tokio::test]
    async fn rollback_after_commit_is_a_no_op() {
        let (db, ctx) = context();

        let token = ctx.begin().await.unwrap();
        ctx.commit(token).await.unwrap();
        ctx.rollback().await.unwrap();

        assert_eq!(ctx.state().await, TxState::Idle);
        assert_eq!(db.count("rollback"), 0);
    }

    #[tokio::test]
    async fn commit_failure_resets_to_idle() {
        let (db, ctx) = context();
        db.fail_commit.store(true, Ordering::SeqCst);

        let token = ctx.begin().await.unwrap();
        let err = ctx.commit(token).await.unwrap_err();

        assert!(matches!(err, Error::Database(sqlx::Error::Protocol(_))));
        assert_eq!(ctx.state().await, TxState::Idle);
        assert!(!ctx.in_transaction().await);
    }

    #[tokio::test]
    async fn rollback_failure_still_poisons() {
        let (db, ctx) = context();
        db.fail_rollback.store(true, Ordering::SeqCst);

        ctx.begin().await.unwrap();
        let err = ctx.rollback().await.unwrap_err();

        assert!(matches!(err, Error::Database(_)));
        assert_eq!(ctx.state().await, TxState::RolledBack);
        assert!(ctx.begin().await.unwrap_err().is_rolled_back());
    }

    #[tokio::test]
    async fn begin_failure_leaves_context_idle() {
        let (db, ctx) = context();
        db.fail_begin.store(true, Ordering::SeqCst);

        assert!(matches!(ctx.begin().await, Err(Error::Database(_))));
        assert_eq!(ctx.state().await, TxState::Idle);

        db.fail_begin.store(false, Ordering::SeqCst);
        assert!(ctx.begin().await.is_ok());
    }

    #[tokio::test]
    async fn provider_follows_state() {
        let (db, ctx) = context();

        {
            let mut provider = ctx.provider().await.unwrap();
            assert!(!provider.is_transactional());
            assert_eq!(provider.token(), None);
            provider.execute("SELECT 1").await.unwrap();
        }

        let token = ctx.begin().await.unwrap();
        {
            let mut provider = ctx.provider().await.unwrap();
            assert!(provider.is_transactional());
            assert_eq!(provider.token(), Some(token));
            provider.execute("UPDATE stock SET qty = qty - 1").await.unwrap();
        }
        ctx.execute("INSERT INTO audit VALUES (1)").await.unwrap();
        ctx.commit(token).await.unwrap();

        assert_eq!(
            db.ops(),
            vec![
                "exec SELECT 1",
                "begin",
                "tx exec UPDATE stock SET qty = qty - 1",
                "tx exec INSERT INTO audit VALUES (1)",
                "commit",
            ]
        );
    }

    #[test]
    fn tokens_are_unique() {
        let a = TxToken::random();
        let b = TxToken::random();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }
}
