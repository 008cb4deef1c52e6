//! Recording fake database shared by the integration tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pgunit_core::{ConnectionHolder, Database, DatabaseTransaction, Result};

#[derive(Default)]
pub struct RecordingDb {
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingDb {
    pub fn ops(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|o| *o == op).count()
    }
}

pub fn holder() -> (Arc<RecordingDb>, Arc<ConnectionHolder>) {
    let db = Arc::new(RecordingDb::default());
    let holder = Arc::new(ConnectionHolder::new(db.clone()));
    (db, holder)
}

#[async_trait]
impl Database for RecordingDb {
    async fn begin(&self) -> Result<Box<dyn DatabaseTransaction>> {
        self.log.lock().unwrap().push("begin".into());
        Ok(Box::new(RecordingTx {
            log: self.log.clone(),
        }))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.log.lock().unwrap().push(format!("exec {sql}"));
        Ok(1)
    }

    async fn close(&self) {}
}

struct RecordingTx {
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl DatabaseTransaction for RecordingTx {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.log.lock().unwrap().push(format!("tx exec {sql}"));
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.log.lock().unwrap().push("commit".into());
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.log.lock().unwrap().push("rollback".into());
        Ok(())
    }
}
