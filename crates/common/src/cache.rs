//! Generic memoized key/value store
//!
//! Keys of any structure are admitted through a caller-supplied hash
//! function, so composite keys (tuples, specs) can be used transparently.
//! No TTL and no eviction: callers scope one instance per report-building
//! session and inject it where needed. Safe for concurrent use because
//! every mutation is idempotent and single-key.

use dashmap::DashMap;

type HashFn<K> = Box<dyn Fn(&K) -> String + Send + Sync>;

/// Session-scoped memoization cache keyed through a derived string hash
pub struct Cache<K, V> {
    entries: DashMap<String, V>,
    hash: HashFn<K>,
}

impl<K, V: Clone> Cache<K, V> {
    pub fn new(hash: impl Fn(&K) -> String + Send + Sync + 'static) -> Self {
        Self {
            entries: DashMap::new(),
            hash: Box::new(hash),
        }
    }

    pub fn has(&self, key: &K) -> bool {
        self.entries.contains_key(&(self.hash)(key))
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(&(self.hash)(key)).map(|v| v.clone())
    }

    /// Store a value; a `None` value deletes the entry instead (an explicit
    /// invalidation, not a no-op).
    pub fn set(&self, key: &K, value: Option<V>) {
        let hashed = (self.hash)(key);
        match value {
            Some(value) => {
                self.entries.insert(hashed, value);
            }
            None => {
                self.entries.remove(&hashed);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> std::fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("entries", &self.entries.len())
            .finish()
    }
}
