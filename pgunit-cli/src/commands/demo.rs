//! Walk through a nested unit of work against a live database.
//!
//! Only `SELECT` statements are issued, so nothing is written.

use std::sync::Arc;

use anyhow::{Context, Result};
use pgunit_core::{transaction_context, ConnectionHolder, PgConfig, Scope, TxState, TxToken};

/// What each level of the demo observed
#[derive(Debug)]
pub struct DemoReport {
    pub outer: TxToken,
    pub inner: TxToken,
    /// Whether the transaction survived the inner commit
    pub open_after_inner_commit: bool,
    pub final_state: TxState,
}

pub async fn run_demo(config: PgConfig) -> Result<()> {
    let holder = ConnectionHolder::instance(&config).await;
    holder.check().await;

    let report = run_nested(&holder).await?;
    println!("outer  begin  -> token {}", report.outer);
    println!("inner  begin  -> token {} (joined)", report.inner);
    println!(
        "inner  commit -> transaction still open: {}",
        report.open_after_inner_commit
    );
    println!("outer  commit -> {:?}", report.final_state);

    Ok(())
}

/// Outer unit of work calling a nested one on the same scope
pub async fn run_nested(holder: &Arc<ConnectionHolder>) -> Result<DemoReport> {
    let (tx, scope) = transaction_context(&Scope::new(), holder);
    let outer = tx.begin().await?;

    let (inner, open_after_inner_commit) = match inner_step(&scope, holder).await {
        Ok(observed) => observed,
        Err(err) => {
            tx.rollback().await.ok();
            return Err(err);
        }
    };

    tx.commit(outer).await.context("Outer commit failed")?;

    Ok(DemoReport {
        outer,
        inner,
        open_after_inner_commit,
        final_state: tx.state().await,
    })
}

async fn inner_step(scope: &Scope, holder: &Arc<ConnectionHolder>) -> Result<(TxToken, bool)> {
    let (tx, _) = transaction_context(scope, holder);

    let token = tx.begin().await?;
    tx.execute("SELECT 1").await?;
    tx.commit(token).await?;

    Ok((token, tx.state().await == TxState::Active))
}
