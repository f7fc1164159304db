use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Map with a fixed maximum entry age. Expired entries read as absent and are
/// dropped lazily on `set` / `purge_expired`; there is no background sweeper
/// and no shared global instance - callers own their cache.
pub struct TtlCache<K, V> {
    max_age: Duration,
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K: Eq + Hash, V> TtlCache<K, V> {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).and_then(|entry| {
            if entry.inserted_at.elapsed() < self.max_age {
                Some(&entry.value)
            } else {
                None
            }
        })
    }

    pub fn set(&mut self, key: K, value: V) {
        self.purge_expired();
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn delete(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn purge_expired(&mut self) {
        let max_age = self.max_age;
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < max_age);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
