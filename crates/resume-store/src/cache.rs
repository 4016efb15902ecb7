//! Bounded query embedding cache.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use lru::LruCache;

/// LRU cache from exact query string to its embedding.
///
/// Entries beyond the capacity evict the least recently used query.
pub struct QueryCache {
    inner: Mutex<LruCache<String, Arc<Vec<f32>>>>,
}

impl QueryCache {
    /// Create a cache holding at most `capacity` queries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Arc<Vec<f32>>>> {
        // Poisoning is ignored: entries are immutable values.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a query, marking it most recently used.
    pub fn get(&self, query: &str) -> Option<Arc<Vec<f32>>> {
        self.lock().get(query).cloned()
    }

    pub fn insert(&self, query: impl Into<String>, embedding: Vec<f32>) -> Arc<Vec<f32>> {
        let embedding = Arc::new(embedding);
        self.lock().put(query.into(), Arc::clone(&embedding));
        embedding
    }

    /// All entries ordered from least to most recently used.
    pub fn entries(&self) -> Vec<(String, Vec<f32>)> {
        self.lock()
            .iter()
            .rev()
            .map(|(q, e)| (q.clone(), e.as_ref().clone()))
            .collect()
    }

    /// Insert entries given least to most recently used.
    pub fn restore(&self, entries: Vec<(String, Vec<f32>)>) {
        let mut cache = self.lock();
        for (query, embedding) in entries {
            cache.put(query, Arc::new(embedding));
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
