//! LRU-backed async function decorator.
//!
//! Wraps an async function so that successful results are reused for equal
//! arguments. Failures are never cached: the next call with the same
//! arguments runs the function again.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::lru::LruCache;

/// Sizing of a [`CachedFn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Maximum number of cached results.
    pub len: usize,
    /// Time to live of a cached result, in milliseconds. `None` keeps
    /// results until they are evicted.
    pub ttl_ms: Option<u64>,
}

impl CacheOptions {
    /// The TTL as a `Duration`.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.map(Duration::from_millis)
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            len: 100,
            ttl_ms: None,
        }
    }
}

type AsyncFn<A, T, E> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// An async function whose successful results are cached by argument.
pub struct CachedFn<A, T, E> {
    f: AsyncFn<A, T, E>,
    cache: Mutex<LruCache<A, T>>,
}

impl<A, T, E> CachedFn<A, T, E>
where
    A: Hash + Eq + Clone + Send + 'static,
    T: Clone + Send + 'static,
    E: Send + 'static,
{
    /// Wrap `f`.
    pub fn new<F, Fut>(options: CacheOptions, f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |args| f(args).boxed()),
            cache: Mutex::new(LruCache::new(options.len).with_default_ttl(options.ttl())),
        }
    }

    /// Call through the cache.
    pub async fn call(&self, args: A) -> Result<T, E> {
        let hit = self.cache.lock().get(&args).cloned();
        if let Some(value) = hit {
            trace!("cached result reused");
            return Ok(value);
        }

        let outcome = (self.f)(args.clone()).await;
        if let Ok(value) = &outcome {
            self.cache.lock().insert(args, value.clone());
        }
        outcome
    }

    /// Whether a live result is cached for `args`.
    pub fn is_cached(&self, args: &A) -> bool {
        self.cache.lock().contains(args)
    }

    /// Drop every cached result.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

impl<A, T, E> fmt::Debug for CachedFn<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedFn").finish_non_exhaustive()
    }
}
