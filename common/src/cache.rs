use std::{collections::HashMap, hash::Hash};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at_ms: u64,
}

/// Memo table whose entries expire a fixed time after they were stored.
#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    ttl_ms: u64,
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl_ms,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &K, now_ms: u64) -> Option<V> {
        let expired = {
            let entry = self.entries.get(key)?;
            self.is_expired(entry, now_ms)
        };

        if expired {
            self.entries.remove(key);
            return None;
        }

        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Stale entries for other keys are dropped on every insert.
    pub fn insert(&mut self, key: K, value: V, now_ms: u64) {
        self.purge_expired(now_ms);
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at_ms: now_ms,
            },
        );
    }

    pub fn purge_expired(&mut self, now_ms: u64) {
        let ttl_ms = self.ttl_ms;
        self.entries
            .retain(|_, entry| now_ms.saturating_sub(entry.stored_at_ms) < ttl_ms);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now_ms: u64) -> bool {
        now_ms.saturating_sub(entry.stored_at_ms) >= self.ttl_ms
    }
}
