//! Call-scoped value propagation
//!
//! `Scope` is a typed key-value carrier passed down a call chain (one per
//! request, job, etc). It is immutable: adding a value returns a new scope
//! and leaves the original untouched, so values only flow downwards.
//! `transaction_context` uses it to let nested calls find the transaction
//! their caller started.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::PgConfig;
use crate::holder::ConnectionHolder;
use crate::transaction::TransactionContext;

#[derive(Clone, Default)]
pub struct Scope {
    values: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of this scope that also carries `value`, replacing any value
    /// of the same type
    pub fn with_value<T: Any + Send + Sync>(&self, value: T) -> Self {
        self.with_shared(Arc::new(value))
    }

    pub fn with_shared<T: Any + Send + Sync>(&self, value: Arc<T>) -> Self {
        let mut values = (*self.values).clone();
        values.insert(TypeId::of::<T>(), value);
        Self {
            values: Arc::new(values),
        }
    }

    pub fn value<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.values
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("values", &self.values.len())
            .finish()
    }
}

/// The transaction context carried by `scope`, creating one if needed.
///
/// Returns the context and the scope nested calls should receive. When the
/// scope already carries a context it is returned unchanged; otherwise a new
/// idle context bound to `holder` is attached to a new scope.
pub fn transaction_context(
    scope: &Scope,
    holder: &Arc<ConnectionHolder>,
) -> (Arc<TransactionContext>, Scope) {
    if let Some(ctx) = scope.value::<TransactionContext>() {
        return (ctx, scope.clone());
    }

    let ctx = Arc::new(TransactionContext::new(holder.clone()));
    let scope = scope.with_shared(ctx.clone());
    (ctx, scope)
}

/// Like `transaction_context`, drawing from the process-wide holder.
///
/// Connects on first use with `config`; later configs are ignored.
pub async fn global_transaction_context(
    scope: &Scope,
    config: &PgConfig,
) -> (Arc<TransactionContext>, Scope) {
    if let Some(ctx) = scope.value::<TransactionContext>() {
        return (ctx, scope.clone());
    }

    let holder = ConnectionHolder::instance(config).await;
    transaction_context(scope, &holder)
}
