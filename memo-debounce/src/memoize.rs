use crate::config::MemoizeConfig;
use crate::error::Error;
use crate::store::{CacheStore, StrongStore, WeakStore};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::{Future, FutureExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Something that happened inside a memoized function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEvent {
    Hit,
    Miss,
    Storing,
    Cleared,
}

impl fmt::Display for CacheEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheEvent::Hit => "cache hit",
            CacheEvent::Miss => "cache miss",
            CacheEvent::Storing => "storing",
            CacheEvent::Cleared => "cache cleared",
        };
        f.write_str(name)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries held by the store. For a weak store this includes entries
    /// whose key is gone but which have not been swept yet.
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub clears: u64,
    pub last_write_at: Option<DateTime<Utc>>,
}

/// Receives every cache event together with the state right after it
pub type DebugReporter = Arc<dyn Fn(CacheEvent, &CacheStats) + Send + Sync>;

type KeyFn<A, K> = Arc<dyn Fn(&A) -> K + Send + Sync>;

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    stores: u64,
    clears: u64,
    last_write_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Eviction {
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct Shared<S> {
    store: S,
    ttl: Option<Duration>,
    runtime: Option<Handle>,
    reporter: Option<DebugReporter>,
    counters: Mutex<Counters>,
    eviction: Mutex<Eviction>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: CacheStore> Shared<S> {
    fn stats(&self) -> CacheStats {
        let counters = lock(&self.counters);
        CacheStats {
            entries: self.store.held(),
            hits: counters.hits,
            misses: counters.misses,
            stores: counters.stores,
            clears: counters.clears,
            last_write_at: counters.last_write_at,
        }
    }

    fn report(&self, event: CacheEvent) {
        log::trace!("Memoized function event: {}", event);
        if let Some(reporter) = &self.reporter {
            reporter(event, &self.stats());
        }
    }

    // Callers hold the eviction lock so no write can slip in between the
    // generation check and the clear.
    fn clear_store(&self, _eviction: &mut Eviction) {
        self.store.clear();
        lock(&self.counters).clears += 1;
    }

    fn evict(&self, generation: u64) {
        {
            let mut eviction = lock(&self.eviction);
            if eviction.generation != generation {
                log::trace!("Eviction timer {} is stale", generation);
                return;
            }
            eviction.timer = None;
            log::debug!("Cache TTL elapsed, evicting all entries");
            self.clear_store(&mut eviction);
        }
        self.cleared();
    }

    fn cleared(&self) {
        log::info!("Cache cleared");
        self.report(CacheEvent::Cleared);
    }
}

impl<S> Drop for Shared<S> {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.eviction).timer.take() {
            timer.abort();
        }
    }
}

/// The cache behind a memoized function: a store plus an optional shared
/// eviction timer.
///
/// Every write restarts the timer, and when it fires the whole store is
/// discarded. A cache under constant write pressure therefore never evicts.
pub struct MemoCache<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for MemoCache<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> MemoCache<S>
where
    S: CacheStore + 'static,
{
    fn new(store: S, ttl: Option<Duration>, reporter: Option<DebugReporter>) -> Result<Self, Error> {
        let runtime = match ttl {
            Some(_) => Some(Handle::try_current().map_err(|_| Error::NoRuntime("cache eviction"))?),
            None => None,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                store,
                ttl,
                runtime,
                reporter,
                counters: Mutex::default(),
                eviction: Mutex::default(),
            }),
        })
    }

    /// Get the stored value for `key`, counting a hit or a miss
    pub fn lookup(&self, key: &S::Key) -> Option<S::Value> {
        match self.shared.store.get(key) {
            Some(value) => {
                lock(&self.shared.counters).hits += 1;
                log::debug!("Cache hit");
                self.shared.report(CacheEvent::Hit);
                Some(value)
            }
            None => {
                lock(&self.shared.counters).misses += 1;
                log::debug!("Cache miss");
                self.shared.report(CacheEvent::Miss);
                None
            }
        }
    }

    /// Store a freshly computed value and restart the eviction timer
    pub fn put(&self, key: S::Key, value: S::Value) {
        self.shared.report(CacheEvent::Storing);
        {
            let mut eviction = lock(&self.shared.eviction);
            self.shared.store.insert(key, value);
            {
                let mut counters = lock(&self.shared.counters);
                counters.stores += 1;
                counters.last_write_at = Some(Utc::now());
            }
            self.restart_eviction(&mut eviction);
        }
        log::debug!("Stored in cache");
    }

    fn restart_eviction(&self, eviction: &mut Eviction) {
        let (Some(ttl), Some(runtime)) = (self.shared.ttl, &self.shared.runtime) else {
            return;
        };

        let deadline = Instant::now() + ttl;
        eviction.generation += 1;
        let generation = eviction.generation;

        if let Some(previous) = eviction.timer.take() {
            previous.abort();
        }

        let shared: Weak<Shared<S>> = Arc::downgrade(&self.shared);
        eviction.timer = Some(runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(shared) = shared.upgrade() {
                shared.evict(generation);
            }
        }));
    }

    /// Discard every entry and disarm the eviction timer
    pub fn clear(&self) {
        {
            let mut eviction = lock(&self.shared.eviction);
            eviction.generation += 1;
            if let Some(timer) = eviction.timer.take() {
                timer.abort();
            }
            self.shared.clear_store(&mut eviction);
        }
        self.shared.cleared();
    }

    pub fn len(&self) -> usize {
        self.shared.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.store.is_empty()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.shared.ttl
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.shared.stats()
    }

    /// Direct access to the underlying store
    pub fn store(&self) -> &S {
        &self.shared.store
    }
}

/// Built cache plus the key extractor that feeds it
pub struct CacheParts<A, S: CacheStore> {
    cache: MemoCache<S>,
    extract_key: KeyFn<A, S::Key>,
}

/// Options accepted by [`memoize`] and [`memoize_async`]
pub trait MemoizeOptions<A, R> {
    type Store: CacheStore<Value = R> + 'static;

    fn build(self) -> Result<CacheParts<A, Self::Store>, Error>;
}

/// Strong store with an optional whole-cache TTL
pub struct StrongOptions<A, K> {
    extract_key: KeyFn<A, K>,
    ttl: Option<Duration>,
    reporter: Option<DebugReporter>,
}

impl<A, K> StrongOptions<A, K> {
    pub fn new<F>(extract_key: F) -> Self
    where
        F: Fn(&A) -> K + Send + Sync + 'static,
    {
        Self {
            extract_key: Arc::new(extract_key),
            ttl: None,
            reporter: None,
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn config(mut self, config: &MemoizeConfig) -> Self {
        self.ttl = config.ttl();
        self
    }

    pub fn reporter<F>(mut self, reporter: F) -> Self
    where
        F: Fn(CacheEvent, &CacheStats) + Send + Sync + 'static,
    {
        self.reporter = Some(Arc::new(reporter));
        self
    }
}

impl<A, K, R> MemoizeOptions<A, R> for StrongOptions<A, K>
where
    K: Hash + Eq + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    type Store = StrongStore<K, R>;

    fn build(self) -> Result<CacheParts<A, Self::Store>, Error> {
        Ok(CacheParts {
            cache: MemoCache::new(StrongStore::new(), self.ttl, self.reporter)?,
            extract_key: self.extract_key,
        })
    }
}

/// Weak store keyed by object identity. Entries go away with their key
/// object, so there is no TTL.
pub struct WeakOptions<A, T: ?Sized> {
    extract_key: KeyFn<A, Arc<T>>,
    reporter: Option<DebugReporter>,
}

impl<A, T: ?Sized> WeakOptions<A, T> {
    pub fn new<F>(extract_key: F) -> Self
    where
        F: Fn(&A) -> Arc<T> + Send + Sync + 'static,
    {
        Self {
            extract_key: Arc::new(extract_key),
            reporter: None,
        }
    }

    pub fn reporter<F>(mut self, reporter: F) -> Self
    where
        F: Fn(CacheEvent, &CacheStats) + Send + Sync + 'static,
    {
        self.reporter = Some(Arc::new(reporter));
        self
    }
}

impl<A, T, R> MemoizeOptions<A, R> for WeakOptions<A, T>
where
    T: ?Sized + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    type Store = WeakStore<T, R>;

    fn build(self) -> Result<CacheParts<A, Self::Store>, Error> {
        Ok(CacheParts {
            cache: MemoCache::new(WeakStore::new(), None, self.reporter)?,
            extract_key: self.extract_key,
        })
    }
}

/// Memoize a plain function
pub fn memoize<A, R, E, F, O>(
    func: F,
    options: O,
) -> Result<Memoized<A, R, E, <O as MemoizeOptions<A, R>>::Store>, Error>
where
    F: Fn(A) -> Result<R, E> + Send + Sync + 'static,
    O: MemoizeOptions<A, R>,
    R: Clone,
{
    let parts = options.build()?;
    Ok(Memoized {
        cache: parts.cache,
        extract_key: parts.extract_key,
        func: Arc::new(func),
    })
}

/// Memoize an async function
pub fn memoize_async<A, R, E, F, Fut, O>(
    func: F,
    options: O,
) -> Result<AsyncMemoized<A, R, E, <O as MemoizeOptions<A, R>>::Store>, Error>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    O: MemoizeOptions<A, R>,
    R: Clone,
{
    let parts = options.build()?;
    Ok(AsyncMemoized {
        cache: parts.cache,
        extract_key: parts.extract_key,
        func: Arc::new(move |args: A| func(args).boxed()),
    })
}

/// A memoized plain function
pub struct Memoized<A, R, E, S: CacheStore> {
    cache: MemoCache<S>,
    extract_key: KeyFn<A, S::Key>,
    func: Arc<dyn Fn(A) -> Result<R, E> + Send + Sync>,
}

impl<A, R, E, S: CacheStore> Clone for Memoized<A, R, E, S> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            extract_key: Arc::clone(&self.extract_key),
            func: Arc::clone(&self.func),
        }
    }
}

impl<A, R, E, S> Memoized<A, R, E, S>
where
    S: CacheStore<Value = R> + 'static,
    R: Clone,
{
    /// Return the stored result for this call's key, or compute and store it.
    /// Errors are passed through and never stored.
    pub fn call(&self, args: A) -> Result<R, E> {
        let key = (self.extract_key)(&args);
        if let Some(value) = self.cache.lookup(&key) {
            return Ok(value);
        }

        let value = (self.func)(args)?;
        self.cache.put(key, value.clone());
        Ok(value)
    }

    pub fn cache(&self) -> &MemoCache<S> {
        &self.cache
    }
}

/// A memoized async function
pub struct AsyncMemoized<A, R, E, S: CacheStore> {
    cache: MemoCache<S>,
    extract_key: KeyFn<A, S::Key>,
    func: Arc<dyn Fn(A) -> BoxFuture<'static, Result<R, E>> + Send + Sync>,
}

impl<A, R, E, S: CacheStore> Clone for AsyncMemoized<A, R, E, S> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            extract_key: Arc::clone(&self.extract_key),
            func: Arc::clone(&self.func),
        }
    }
}

impl<A, R, E, S> AsyncMemoized<A, R, E, S>
where
    S: CacheStore<Value = R> + 'static,
    R: Clone,
{
    /// A hit resolves on first poll without calling the function
    pub async fn call(&self, args: A) -> Result<R, E> {
        let key = (self.extract_key)(&args);
        if let Some(value) = self.cache.lookup(&key) {
            return Ok(value);
        }

        let value = (self.func)(args).await?;
        self.cache.put(key, value.clone());
        Ok(value)
    }

    pub fn cache(&self) -> &MemoCache<S> {
        &self.cache
    }
}

/// Memoized plain function with a strong store
pub type StrongMemoized<A, K, R, E> = Memoized<A, R, E, StrongStore<K, R>>;
/// Memoized plain function keyed by object identity
pub type WeakMemoized<A, T, R, E> = Memoized<A, R, E, WeakStore<T, R>>;
