use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Storage behind a memoized function
pub trait CacheStore: Send + Sync {
    type Key;
    type Value;

    fn get(&self, key: &Self::Key) -> Option<Self::Value>;

    /// Insert or overwrite the entry for `key`
    fn insert(&self, key: Self::Key, value: Self::Value);

    fn clear(&self);

    /// Number of reachable entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries held, reachable or not. Cheaper than `len` for
    /// stores that reclaim lazily.
    fn held(&self) -> usize {
        self.len()
    }
}

/// Keyed map holding its keys and values strongly
pub struct StrongStore<K, V> {
    entries: DashMap<K, V>,
}

impl<K, V> StrongStore<K, V>
where
    K: Hash + Eq,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<K, V> Default for StrongStore<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CacheStore for StrongStore<K, V>
where
    K: Hash + Eq + Send + Sync,
    V: Clone + Send + Sync,
{
    type Key = K;
    type Value = V;

    fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn insert(&self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

const MIN_SWEEP_THRESHOLD: usize = 16;

struct WeakEntry<T: ?Sized, V> {
    key: Weak<T>,
    value: V,
}

/// Map keyed by object identity that does not keep its keys alive.
///
/// An entry stops being reachable as soon as the last `Arc` of its key is
/// dropped. The value is released on the next sweep, which runs on writes
/// once the map has doubled since the previous sweep, or on [`WeakStore::purge`].
pub struct WeakStore<T: ?Sized, V> {
    entries: DashMap<usize, WeakEntry<T, V>>,
    sweep_threshold: AtomicUsize,
}

impl<T: ?Sized, V> WeakStore<T, V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            sweep_threshold: AtomicUsize::new(MIN_SWEEP_THRESHOLD),
        }
    }

    // The entry's Weak keeps the allocation alive, so an address cannot be
    // reused by another object while its entry exists.
    fn address(key: &Arc<T>) -> usize {
        Arc::as_ptr(key) as *const () as usize
    }

    /// Drop entries whose key object is gone. Returns how many were removed.
    pub fn purge(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.key.strong_count() > 0);
        let removed = before - self.entries.len();

        self.sweep_threshold.store(
            (self.entries.len() * 2).max(MIN_SWEEP_THRESHOLD),
            Ordering::Relaxed,
        );

        if removed > 0 {
            log::debug!("Purged {} unreachable weak cache entries", removed);
        }
        removed
    }
}

impl<T: ?Sized, V> Default for WeakStore<T, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, V> CacheStore for WeakStore<T, V>
where
    T: ?Sized + Send + Sync,
    V: Clone + Send + Sync,
{
    type Key = Arc<T>;
    type Value = V;

    fn get(&self, key: &Arc<T>) -> Option<V> {
        self.entries
            .get(&Self::address(key))
            .filter(|entry| entry.value().key.strong_count() > 0)
            .map(|entry| entry.value().value.clone())
    }

    fn insert(&self, key: Arc<T>, value: V) {
        if self.entries.len() >= self.sweep_threshold.load(Ordering::Relaxed) {
            self.purge();
        }

        self.entries.insert(
            Self::address(&key),
            WeakEntry {
                key: Arc::downgrade(&key),
                value,
            },
        );
    }

    fn clear(&self) {
        self.entries.clear();
        self.sweep_threshold.store(MIN_SWEEP_THRESHOLD, Ordering::Relaxed);
    }

    fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().key.strong_count() > 0)
            .count()
    }

    fn held(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strong_store_overwrites() {
        let store: StrongStore<String, i32> = StrongStore::new();
        assert!(store.is_empty());

        store.insert("a".to_string(), 1);
        store.insert("a".to_string(), 2);
        store.insert("b".to_string(), 3);

        assert_eq!(store.get(&"a".to_string()), Some(2));
        assert_eq!(store.len(), 2);

        store.clear();
        assert_eq!(store.get(&"a".to_string()), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_weak_store_uses_identity() {
        let store: WeakStore<String, i32> = WeakStore::new();
        let first = Arc::new(String::from("same"));
        let second = Arc::new(String::from("same"));

        store.insert(first.clone(), 1);

        assert_eq!(store.get(&first), Some(1));
        assert_eq!(store.get(&second), None);
    }

    #[test]
    fn test_weak_store_entry_unreachable_after_key_dropped() {
        let store: WeakStore<u64, Arc<Vec<u8>>> = WeakStore::new();
        let key = Arc::new(7u64);
        let value = Arc::new(vec![0u8; 64]);

        store.insert(key.clone(), value.clone());
        assert_eq!(store.len(), 1);
        assert_eq!(Arc::strong_count(&value), 2);

        drop(key);
        assert_eq!(store.len(), 0);
        assert_eq!(store.held(), 1);
        assert_eq!(store.purge(), 1);
        assert_eq!(store.held(), 0);
        assert_eq!(Arc::strong_count(&value), 1);
    }

    #[test]
    fn test_weak_store_sweeps_on_write() {
        let store: WeakStore<usize, usize> = WeakStore::new();

        for i in 0..MIN_SWEEP_THRESHOLD {
            store.insert(Arc::new(i), i);
        }
        // Every key above was dropped right away
        assert_eq!(store.len(), 0);

        let live = Arc::new(usize::MAX);
        store.insert(live.clone(), 1);

        assert_eq!(store.entries.len(), 1);
        assert_eq!(store.get(&live), Some(1));
    }
}
