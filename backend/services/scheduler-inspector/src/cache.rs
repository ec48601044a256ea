use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Time-windowed response cache keyed by request shape.
pub struct TtlCache<V> {
    entries: DashMap<String, (Instant, V)>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let hit = self
            .entries
            .get(key)
            .filter(|entry| entry.0.elapsed() < self.ttl)
            .map(|entry| entry.1.clone());
        if hit.is_none() {
            self.entries.remove(key);
        }
        hit
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.gc();
        self.entries.insert(key.into(), (Instant::now(), value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn gc(&self) {
        let ttl = self.ttl;
        let now = Instant::now();
        self.entries.retain(|_, (stored, _)| now.duration_since(*stored) < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_fresh_entries() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1u32);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn expires_entries() {
        let cache = TtlCache::new(Duration::from_millis(0));
        cache.insert("a", 1u32);
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }
}
