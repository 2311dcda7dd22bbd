//! Hydrate Cache
//!
//! Query-scoped memoization of expensive lookups (tenancy record, compartment
//! tree, availability domains). Concurrent requests for a key that is still
//! being computed join the in-flight computation instead of starting their own.
//!
//! A failed computation is shared by everyone waiting on it, then forgotten,
//! so a later request computes again.

use crate::error::EngineError;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type AnyValue = Arc<dyn Any + Send + Sync>;
type SharedCompute = Shared<BoxFuture<'static, Result<AnyValue, EngineError>>>;

/// Cache key: which lookup, for which connection (and optional argument)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HydrateKey {
    pub function: &'static str,
    pub connection: String,
    pub argument: Option<String>,
}

impl HydrateKey {
    pub fn new(function: &'static str, connection: &str) -> Self {
        Self {
            function,
            connection: connection.to_string(),
            argument: None,
        }
    }

    pub fn with_argument(mut self, argument: &str) -> Self {
        self.argument = Some(argument.to_string());
        self
    }
}

impl fmt::Display for HydrateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}", self.function, self.connection)?;
        if let Some(arg) = &self.argument {
            write!(f, ", {}", arg)?;
        }
        write!(f, "]")
    }
}

enum Entry {
    Pending { generation: u64, compute: SharedCompute },
    Resolved(AnyValue),
}

#[derive(Default)]
pub struct HydrateCache {
    entries: Mutex<HashMap<HydrateKey, Entry>>,
    generation: AtomicU64,
}

impl HydrateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, or run `compute` to produce it.
    /// `compute` is only invoked when no resolved or in-flight entry exists.
    pub async fn get_or_compute<T, F, Fut>(&self, key: HydrateKey, compute: F) -> Result<T, EngineError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, EngineError>> + Send + 'static,
    {
        let (generation, shared) = {
            let mut entries = self.entries.lock();
            match entries.get(&key) {
                Some(Entry::Resolved(value)) => return downcast(&key, value),
                Some(Entry::Pending { generation, compute }) => (*generation, compute.clone()),
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %key, "hydrate compute");
                    let fut = compute();
                    let shared = async move { fut.await.map(|v| Arc::new(v) as AnyValue) }
                        .boxed()
                        .shared();
                    entries.insert(
                        key.clone(),
                        Entry::Pending {
                            generation,
                            compute: shared.clone(),
                        },
                    );
                    (generation, shared)
                }
            }
        };

        let result = shared.await;

        {
            let mut entries = self.entries.lock();
            let current = matches!(
                entries.get(&key),
                Some(Entry::Pending { generation: g, .. }) if *g == generation
            );
            if current {
                match &result {
                    Ok(value) => {
                        entries.insert(key.clone(), Entry::Resolved(value.clone()));
                    }
                    Err(_) => {
                        entries.remove(&key);
                    }
                }
            }
        }

        downcast(&key, &result?)
    }

    /// Whether a resolved value is held for `key`
    pub fn is_resolved(&self, key: &HydrateKey) -> bool {
        matches!(self.entries.lock().get(key), Some(Entry::Resolved(_)))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn downcast<T: Clone + 'static>(key: &HydrateKey, value: &AnyValue) -> Result<T, EngineError> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| EngineError::Hydrate {
            key: key.to_string(),
            message: format!("cached value is not a {}", std::any::type_name::<T>()),
        })
}
