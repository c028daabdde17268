//! Bounded, time-expiring embedding cache keyed by content hash

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::ingestion::hash_content;

struct CacheEntry {
    vector: Vec<f32>,
    inserted_at: Instant,
    last_used: u64,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Logical clock for LRU ordering
    tick: u64,
    hits: u64,
    misses: u64,
}

/// LRU + TTL cache for embedding vectors
///
/// Hits skip the provider entirely. Eviction is least-recently-used once the
/// size bound is exceeded; entries past their TTL are dropped on access.
pub struct EmbeddingCache {
    inner: Mutex<CacheInner>,
    max_entries: usize,
    ttl: Duration,
}

impl EmbeddingCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                tick: 0,
                hits: 0,
                misses: 0,
            }),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    /// Cache key for a text: SHA-256 of its content
    pub fn key_for(text: &str) -> String {
        hash_content(text)
    }

    /// Look up a vector; expired entries are removed, live hits bump recency
    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        enum Lookup {
            Hit(Vec<f32>),
            Expired,
            Miss,
        }

        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;

        let lookup = match inner.entries.get_mut(key) {
            Some(entry) if entry.inserted_at.elapsed() > self.ttl => Lookup::Expired,
            Some(entry) => {
                entry.last_used = tick;
                Lookup::Hit(entry.vector.clone())
            }
            None => Lookup::Miss,
        };

        match lookup {
            Lookup::Hit(vector) => {
                inner.hits += 1;
                Some(vector)
            }
            Lookup::Expired => {
                inner.entries.remove(key);
                inner.misses += 1;
                None
            }
            Lookup::Miss => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert a vector, evicting the least-recently-used entry beyond the bound
    pub fn put(&self, key: String, vector: Vec<f32>) {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;

        inner.entries.insert(
            key,
            CacheEntry {
                vector,
                inserted_at: Instant::now(),
                last_used: tick,
            },
        );

        while inner.entries.len() > self.max_entries {
            let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            inner.entries.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit/miss counters for operators
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            max_entries: self.max_entries,
            ttl_seconds: self.ttl.as_secs(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub max_entries: usize,
    pub ttl_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_after_put() {
        let cache = EmbeddingCache::new(10, Duration::from_secs(60));
        cache.put("k1".into(), vec![1.0, 2.0]);
        assert_eq!(cache.get("k1"), Some(vec![1.0, 2.0]));
        assert_eq!(cache.get("k2"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn ttl_expiry_drops_entry() {
        let cache = EmbeddingCache::new(10, Duration::from_millis(0));
        cache.put("k1".into(), vec![1.0]);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k1"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn lru_eviction_beyond_bound() {
        let cache = EmbeddingCache::new(2, Duration::from_secs(60));
        cache.put("a".into(), vec![1.0]);
        cache.put("b".into(), vec![2.0]);

        // Touch "a" so "b" becomes the least recently used
        assert!(cache.get("a").is_some());

        cache.put("c".into(), vec![3.0]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn key_is_stable_per_content() {
        assert_eq!(EmbeddingCache::key_for("abc"), EmbeddingCache::key_for("abc"));
        assert_ne!(EmbeddingCache::key_for("abc"), EmbeddingCache::key_for("abd"));
    }
}
