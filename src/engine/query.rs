//! Per-query state shared by every matrix cell of one query

use super::hydrate::HydrateCache;
use super::retry::RetryPolicy;
use crate::config::Connection;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Rows the query still needs. Only ever decremented.
#[derive(Debug)]
pub struct RowBudget {
    remaining: AtomicU64,
}

impl RowBudget {
    const UNLIMITED: u64 = u64::MAX;

    pub fn new(limit: Option<u64>) -> Self {
        Self {
            remaining: AtomicU64::new(limit.unwrap_or(Self::UNLIMITED)),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Remaining rows, `None` when the query has no limit
    pub fn remaining(&self) -> Option<u64> {
        match self.remaining.load(Ordering::Acquire) {
            Self::UNLIMITED => None,
            n => Some(n),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == Some(0)
    }

    /// Claim one row. Returns false once the budget is spent.
    pub fn try_take(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match n {
                0 => None,
                Self::UNLIMITED => Some(n),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

/// Everything one query shares across its cells
#[derive(Clone)]
pub struct QueryContext {
    pub query_id: Uuid,
    connection: Arc<Connection>,
    hydrate: Arc<HydrateCache>,
    budget: Arc<RowBudget>,
    cancel: CancellationToken,
    retry: RetryPolicy,
}

impl QueryContext {
    pub fn new(connection: Arc<Connection>, limit: Option<u64>) -> Self {
        let retry = RetryPolicy::from_connection(&connection);
        Self {
            query_id: Uuid::new_v4(),
            connection,
            hydrate: Arc::new(HydrateCache::new()),
            budget: Arc::new(RowBudget::new(limit)),
            cancel: CancellationToken::new(),
            retry,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn hydrate(&self) -> &HydrateCache {
        &self.hydrate
    }

    pub fn budget(&self) -> &RowBudget {
        &self.budget
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Abandon the query: in-flight calls are dropped, listers stop
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
