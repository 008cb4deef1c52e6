//! Recording in-memory database for unit tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::db::{Database, DatabaseTransaction};
use crate::error::Result;
use crate::holder::ConnectionHolder;

#[derive(Default)]
pub struct FakeDatabase {
    log: Arc<Mutex<Vec<String>>>,
    pub fail_begin: AtomicBool,
    pub fail_commit: Arc<AtomicBool>,
    pub fail_rollback: Arc<AtomicBool>,
}

impl FakeDatabase {
    pub fn ops(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|o| *o == op).count()
    }
}

/// Build a holder around a fresh fake, returning both
pub fn holder() -> (Arc<FakeDatabase>, Arc<ConnectionHolder>) {
    let db = Arc::new(FakeDatabase::default());
    let holder = Arc::new(ConnectionHolder::new(db.clone()));
    (db, holder)
}

#[async_trait]
impl Database for FakeDatabase {
    async fn begin(&self) -> Result<Box<dyn DatabaseTransaction>> {
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut.into());
        }
        self.log.lock().unwrap().push("begin".into());
        Ok(Box::new(FakeTransaction {
            log: self.log.clone(),
            fail_commit: self.fail_commit.clone(),
            fail_rollback: self.fail_rollback.clone(),
        }))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.log.lock().unwrap().push(format!("exec {sql}"));
        Ok(1)
    }

    async fn close(&self) {}
}

struct FakeTransaction {
    log: Arc<Mutex<Vec<String>>>,
    fail_commit: Arc<AtomicBool>,
    fail_rollback: Arc<AtomicBool>,
}

#[async_trait]
impl DatabaseTransaction for FakeTransaction {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.log.lock().unwrap().push(format!("tx exec {sql}"));
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.log.lock().unwrap().push("commit".into());
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(sqlx::Error::Protocol("commit failed".into()).into());
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.log.lock().unwrap().push("rollback".into());
        if self.fail_rollback.load(Ordering::SeqCst) {
            return Err(sqlx::Error::Protocol("rollback failed".into()).into());
        }
        Ok(())
    }
}
