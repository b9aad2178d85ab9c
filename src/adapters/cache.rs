//! Web-search result cache
//!
//! The only cross-request shared mutable state in the service besides the
//! rate-limit counter. Entries expire on a TTL and total size is bounded, so
//! identical `(query, options)` bursts within the TTL reuse one provider
//! call. Last-writer-wins on the same key is acceptable: entries are
//! idempotent re-fetches.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::debug;

use crate::models::Source;

/// Cache entry with TTL support
#[derive(Debug, Clone)]
struct CacheEntry {
    sources: Vec<Source>,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(sources: Vec<Source>, ttl: Duration) -> Self {
        Self {
            sources,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Cache statistics
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// TTL + size-bounded cache for normalized web-search results
pub struct SearchCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    stats: Arc<RwLock<CacheStats>>,
    ttl: Duration,
    max_entries: usize,
}

impl SearchCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(CacheStats::default())),
            ttl,
            max_entries,
        }
    }

    /// Normalized cache key for a `(query, options)` pair
    pub fn key(query: &str, max_results: usize, depth: &str) -> String {
        format!("{}|{max_results}|{depth}", query.trim().to_lowercase())
    }

    /// Get cached sources; expired entries are removed on access
    pub async fn get(&self, key: &str) -> Option<Vec<Source>> {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get(key) {
            if entry.is_expired() {
                entries.remove(key);
                self.record_miss().await;
                debug!("Search cache miss (expired) for {key}");
                return None;
            }
            self.record_hit().await;
            debug!("Search cache hit for {key}");
            return Some(entry.sources.clone());
        }

        self.record_miss().await;
        None
    }

    /// Insert sources, evicting when the bound is reached
    pub async fn insert(&self, key: String, sources: Vec<Source>) {
        let mut entries = self.entries.write().await;

        if entries.len() >= self.max_entries {
            self.evict(&mut entries).await;
        }

        entries.insert(key, CacheEntry::new(sources, self.ttl));
    }

    /// Remove all expired entries
    pub async fn cleanup_expired(&self) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| !entry.is_expired());
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    /// Drop expired entries first; if still over the bound, drop an
    /// arbitrary tenth to make room
    async fn evict(&self, entries: &mut HashMap<String, CacheEntry>) {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());

        if entries.len() >= self.max_entries {
            let evict_count = (entries.len() / 10).max(1);
            let keys: Vec<String> = entries.keys().take(evict_count).cloned().collect();
            for key in keys {
                entries.remove(&key);
            }
        }

        let evicted = (before - entries.len()) as u64;
        if evicted > 0 {
            let mut stats = self.stats.write().await;
            stats.evictions += evicted;
            debug!("Evicted {evicted} search cache entries");
        }
    }

    async fn record_hit(&self) {
        self.stats.write().await.hits += 1;
    }

    async fn record_miss(&self) {
        self.stats.write().await.misses += 1;
    }
}

impl Clone for SearchCache {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            stats: self.stats.clone(),
            ttl: self.ttl,
            max_entries: self.max_entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    fn sources() -> Vec<Source> {
        vec![Source::new("t", "https://example.com", "s", SourceKind::Web)]
    }

    #[tokio::test]
    async fn hit_within_ttl() {
        let cache = SearchCache::new(Duration::from_secs(300), 100);
        let key = SearchCache::key("Acme reviews", 5, "basic");
        cache.insert(key.clone(), sources()).await;

        let cached = cache.get(&key).await;
        assert!(cached.is_some());
        assert_eq!(cached.unwrap().len(), 1);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = SearchCache::new(Duration::from_millis(0), 100);
        let key = SearchCache::key("q", 5, "basic");
        cache.insert(key.clone(), sources()).await;

        // Zero TTL: expired by the time we read it back
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.stats().await.misses, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let cache = SearchCache::new(Duration::from_millis(0), 100);
        cache.insert("stale".to_string(), sources()).await;
        let fresh = SearchCache {
            ttl: Duration::from_secs(300),
            ..cache.clone()
        };
        fresh.insert("fresh".to_string(), sources()).await;

        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.cleanup_expired().await;

        assert_eq!(cache.len().await, 1);
        assert!(fresh.get("fresh").await.is_some());
    }

    #[tokio::test]
    async fn key_normalizes_query_text() {
        assert_eq!(
            SearchCache::key("  Acme Reviews ", 5, "basic"),
            SearchCache::key("acme reviews", 5, "basic")
        );
        assert_ne!(
            SearchCache::key("acme", 5, "basic"),
            SearchCache::key("acme", 10, "basic")
        );
    }

    #[tokio::test]
    async fn bound_triggers_eviction() {
        let cache = SearchCache::new(Duration::from_secs(300), 10);
        for i in 0..12 {
            cache.insert(format!("k{i}"), sources()).await;
        }
        assert!(cache.len().await <= 11);
        assert!(cache.stats().await.evictions > 0);
    }
}
