//! Keyed async cache with request deduplication
//!
//! Server state lives here between requests. Each [`QueryKey`] maps to
//! one cache entry holding the last fetched value, its age, and any
//! in-flight fetch. Concurrent fetches for the same key share a single
//! future; stale entries serve their cached value immediately while a
//! background refetch runs; entries nobody subscribes to are garbage
//! collected after a configurable horizon.

mod key;

pub use key::QueryKey;

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::retry::RetryPolicy;

type CachedValue = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, Result<CachedValue, ApiError>>>;
type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<CachedValue, ApiError>> + Send + Sync>;

/// Lifecycle of a cache entry's most recent fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Observable snapshot of one cache entry
#[derive(Debug, Clone)]
pub struct QueryState {
    pub status: FetchStatus,
    pub is_stale: bool,
    pub has_data: bool,
    pub last_error: Option<ApiError>,
}

/// Per-fetch overrides; unset fields fall back to the client defaults
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    pub stale_time: Option<Duration>,
}

impl FetchOptions {
    pub fn stale_time(duration: Duration) -> Self {
        Self { stale_time: Some(duration) }
    }
}

struct Entry {
    data: Option<CachedValue>,
    updated_at: Option<Instant>,
    /// Staleness window the value was fetched under
    stale_time: Duration,
    /// Explicit invalidation, independent of age
    stale: bool,
    status: FetchStatus,
    last_error: Option<ApiError>,
    inflight: Option<SharedFetch>,
    /// Retained so invalidation can refetch without a caller present
    fetcher: Option<Fetcher>,
    subscribers: usize,
    touched: Instant,
}

impl Entry {
    fn new(stale_time: Duration) -> Self {
        Self {
            data: None,
            updated_at: None,
            stale_time,
            stale: false,
            status: FetchStatus::Idle,
            last_error: None,
            inflight: None,
            fetcher: None,
            subscribers: 0,
            touched: Instant::now(),
        }
    }

    fn is_fresh(&self) -> bool {
        !self.stale
            && self
                .updated_at
                .map(|at| at.elapsed() < self.stale_time)
                .unwrap_or(false)
    }
}

struct QueryInner {
    entries: Mutex<HashMap<QueryKey, Entry>>,
    stale_time: Duration,
    cache_time: Duration,
    retry: RetryPolicy,
}

/// Shared cache handle; cheap to clone
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<QueryInner>,
}

impl QueryClient {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            inner: Arc::new(QueryInner {
                entries: Mutex::new(HashMap::new()),
                stale_time: config.stale_time,
                cache_time: config.cache_time,
                retry: RetryPolicy::new(config.retry_attempts, config.retry_backoff),
            }),
        }
    }

    /// Resolve `key` through the cache.
    ///
    /// Fresh entries return the cached value without touching the
    /// network. A stale entry returns its cached value immediately and
    /// kicks off a background refetch. A cold entry awaits the fetch,
    /// joining any already-in-flight one for the same key.
    pub async fn fetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<Arc<T>, ApiError>
    where
        T: Any + Send + Sync,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        self.fetch_with(key, FetchOptions::default(), fetcher).await
    }

    pub async fn fetch_with<T, F, Fut>(
        &self,
        key: &QueryKey,
        options: FetchOptions,
        fetcher: F,
    ) -> Result<Arc<T>, ApiError>
    where
        T: Any + Send + Sync,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        enum Plan {
            Cached(CachedValue),
            Await(SharedFetch),
        }

        let fetcher = erase_fetcher(self.inner.retry, fetcher);
        let stale_time = options.stale_time.unwrap_or(self.inner.stale_time);

        let plan = {
            let mut entries = self.inner.entries.lock();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(stale_time));
            entry.fetcher = Some(Arc::clone(&fetcher));
            entry.stale_time = stale_time;
            entry.touched = Instant::now();

            match entry.data.clone() {
                Some(data) if entry.is_fresh() => {
                    trace!(%key, "cache hit");
                    Plan::Cached(data)
                }
                Some(data) => {
                    // Stale-while-revalidate: serve what we have, refresh
                    // in the background.
                    if entry.inflight.is_none() {
                        debug!(%key, "stale hit, revalidating in background");
                        start_fetch(&self.inner, key, fetcher, entry);
                    }
                    Plan::Cached(data)
                }
                None => {
                    let shared = match &entry.inflight {
                        Some(inflight) => {
                            trace!(%key, "joining in-flight fetch");
                            inflight.clone()
                        }
                        None => start_fetch(&self.inner, key, fetcher, entry),
                    };
                    Plan::Await(shared)
                }
            }
        };

        match plan {
            Plan::Cached(value) => downcast(key, value),
            Plan::Await(shared) => downcast(key, shared.await?),
        }
    }

    /// Force a fresh fetch, bypassing staleness checks. Joins an
    /// in-flight fetch if one is already running for this key.
    pub async fn refetch<T: Any + Send + Sync>(&self, key: &QueryKey) -> Result<Arc<T>, ApiError> {
        let shared = {
            let mut entries = self.inner.entries.lock();
            let entry = entries
                .get_mut(key)
                .ok_or_else(|| ApiError::Config(format!("no query registered for key {key}")))?;
            match &entry.inflight {
                Some(inflight) => inflight.clone(),
                None => {
                    let fetcher = entry.fetcher.clone().ok_or_else(|| {
                        ApiError::Config(format!("no fetcher registered for key {key}"))
                    })?;
                    start_fetch(&self.inner, key, fetcher, entry)
                }
            }
        };
        downcast(key, shared.await?)
    }

    /// Mark entries stale. Keys with active subscribers refetch
    /// immediately in the background; the rest refetch on next access.
    pub fn invalidate(&self, keys: &[QueryKey]) {
        let mut entries = self.inner.entries.lock();
        for key in keys {
            let Some(entry) = entries.get_mut(key) else { continue };
            entry.stale = true;
            debug!(%key, subscribers = entry.subscribers, "invalidated");
            if entry.subscribers > 0 && entry.inflight.is_none() {
                if let Some(fetcher) = entry.fetcher.clone() {
                    start_fetch(&self.inner, key, fetcher, entry);
                }
            }
        }
    }

    /// Run a mutation, then invalidate its declared keys on success.
    /// Transient failures retry under the same bounded policy as reads.
    pub async fn mutate<T, F, Fut>(
        &self,
        invalidates: &[QueryKey],
        op: F,
    ) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let value = self.inner.retry.run(op).await?;
        self.invalidate(invalidates);
        Ok(value)
    }

    /// Register interest in a key; the entry is exempt from garbage
    /// collection while the returned guard lives.
    pub fn subscribe(&self, key: &QueryKey) -> QuerySubscription {
        let mut entries = self.inner.entries.lock();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(self.inner.stale_time));
        entry.subscribers += 1;
        QuerySubscription { inner: Arc::clone(&self.inner), key: key.clone() }
    }

    pub fn state(&self, key: &QueryKey) -> Option<QueryState> {
        let entries = self.inner.entries.lock();
        entries.get(key).map(|entry| QueryState {
            status: entry.status,
            is_stale: entry.data.is_some() && !entry.is_fresh(),
            has_data: entry.data.is_some(),
            last_error: entry.last_error.clone(),
        })
    }

    /// Drop subscriber-free entries untouched for longer than the cache
    /// horizon. Entries with an in-flight fetch survive the sweep.
    pub fn sweep(&self) {
        let cache_time = self.inner.cache_time;
        let mut entries = self.inner.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.subscribers > 0
                || entry.inflight.is_some()
                || entry.touched.elapsed() <= cache_time
        });
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, remaining = entries.len(), "cache sweep");
        }
    }

    /// Discard all cached state, e.g. on sign-out
    pub fn clear(&self) {
        self.inner.entries.lock().clear();
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.inner.entries.lock().len()
    }
}

/// Subscription handle; dropping it releases the entry for GC
pub struct QuerySubscription {
    inner: Arc<QueryInner>,
    key: QueryKey,
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        let mut entries = self.inner.entries.lock();
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.subscribers = entry.subscribers.saturating_sub(1);
            if entry.subscribers == 0 {
                entry.touched = Instant::now();
            }
        }
    }
}

/// Begin a fetch for `key`, recording it on the entry and spawning a
/// driver task so the fetch commits even if every awaiter drops.
fn start_fetch(
    inner: &Arc<QueryInner>,
    key: &QueryKey,
    fetcher: Fetcher,
    entry: &mut Entry,
) -> SharedFetch {
    let write_back = Arc::clone(inner);
    let write_key = key.clone();

    let shared = async move {
        let result = (*fetcher)().await;
        let mut entries = write_back.entries.lock();
        // Entry may have been cleared while the fetch ran.
        if let Some(entry) = entries.get_mut(&write_key) {
            entry.inflight = None;
            match &result {
                Ok(value) => {
                    entry.data = Some(Arc::clone(value));
                    entry.updated_at = Some(Instant::now());
                    entry.touched = Instant::now();
                    entry.stale = false;
                    entry.last_error = None;
                    entry.status = FetchStatus::Success;
                }
                Err(err) => {
                    // Stale data is kept; the error rides alongside it.
                    entry.last_error = Some(err.clone());
                    entry.status = FetchStatus::Error;
                }
            }
        }
        result
    }
    .boxed()
    .shared();

    entry.inflight = Some(shared.clone());
    entry.status = FetchStatus::Loading;
    tokio::spawn(shared.clone().map(|_| ()));
    shared
}

fn erase_fetcher<T, F, Fut>(retry: RetryPolicy, fetcher: F) -> Fetcher
where
    T: Any + Send + Sync,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
    let fetcher = Arc::new(fetcher);
    Arc::new(move || {
        let fetcher = Arc::clone(&fetcher);
        async move {
            retry
                .run(|| (*fetcher)())
                .await
                .map(|value| Arc::new(value) as CachedValue)
        }
        .boxed()
    })
}

fn downcast<T: Any + Send + Sync>(key: &QueryKey, value: CachedValue) -> Result<Arc<T>, ApiError> {
    value
        .downcast::<T>()
        .map_err(|_| ApiError::Config(format!("cached value for key {key} holds a different type")))
}
