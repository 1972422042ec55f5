use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::{SearchOptions, SearchResult};
use crate::config::CacheConfig;

#[derive(Debug, Clone)]
struct CacheEntry {
    results: Vec<SearchResult>,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

/// TTL-bounded result cache with insertion-order (FIFO) eviction.
///
/// Expiry is checked on lookup only; an expired entry is dropped the first
/// time it is asked for.
#[derive(Debug)]
pub struct ResultCache {
    ttl: Duration,
    max_size: usize,
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

#[derive(Serialize)]
struct KeyParts<'a> {
    query: String,
    options: &'a SearchOptions,
}

/// Stable key: lowercased, trimmed query plus the serialized options.
pub fn cache_key(query: &str, options: &SearchOptions) -> String {
    let parts = KeyParts {
        query: query.trim().to_lowercase(),
        options,
    };
    serde_json::to_string(&parts).unwrap_or_else(|_| parts.query.clone())
}

impl ResultCache {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            ttl,
            max_size: max_size.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let ttl_ms = i64::try_from(config.ttl_ms).unwrap_or(i64::MAX);
        Self::new(Duration::milliseconds(ttl_ms), config.max_size)
    }

    pub fn get(&mut self, key: &str) -> Option<Vec<SearchResult>> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&mut self, key: &str, now: DateTime<Utc>) -> Option<Vec<SearchResult>> {
        let expired = now - self.entries.get(key)?.stored_at > self.ttl;
        if expired {
            tracing::debug!(key, "cache entry expired");
            self.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.results.clone())
    }

    pub fn put(&mut self, key: String, results: Vec<SearchResult>) {
        self.put_at(key, results, Utc::now());
    }

    /// Stores `results`. Re-putting a key replaces it in place without
    /// changing its eviction slot.
    pub fn put_at(&mut self, key: String, results: Vec<SearchResult>, now: DateTime<Utc>) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.results = results;
            entry.stored_at = now;
            return;
        }

        if self.entries.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                tracing::debug!(key = %oldest, "evicting oldest cache entry");
                self.entries.remove(&oldest);
            }
        }

        self.order.push_back(key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                results,
                stored_at: now,
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            keys: self.order.iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        self.order.retain(|k| k != key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn results(tag: &str) -> Vec<SearchResult> {
        vec![SearchResult::new(
            "test",
            tag,
            format!("https://example.com/{}", tag),
            "snippet",
            0.5,
        )]
    }

    #[test]
    fn equivalent_queries_share_a_key() {
        let options = SearchOptions::default();
        assert_eq!(
            cache_key("  Rust Async ", &options),
            cache_key("rust async", &options)
        );

        let other = SearchOptions {
            language: Some("de".into()),
            ..SearchOptions::default()
        };
        assert_ne!(cache_key("rust async", &options), cache_key("rust async", &other));
    }

    #[test]
    fn hit_within_ttl() {
        let mut cache = ResultCache::new(Duration::milliseconds(1000), 10);
        let start = t0();
        cache.put_at("k".into(), results("a"), start);
        let hit = cache
            .get_at("k", start + Duration::milliseconds(1000))
            .expect("entry is still live at exactly ttl");
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].id, results("a")[0].id);
    }

    #[test]
    fn expired_entry_is_purged() {
        let mut cache = ResultCache::new(Duration::milliseconds(1000), 10);
        let start = t0();
        cache.put_at("k".into(), results("a"), start);
        assert_eq!(cache.stats().size, 1);

        assert!(cache.get_at("k", start + Duration::milliseconds(1001)).is_none());
        assert_eq!(cache.stats().size, 0);
        assert!(cache.stats().keys.is_empty());
    }

    #[test]
    fn evicts_oldest_inserted_when_full() {
        let mut cache = ResultCache::new(Duration::milliseconds(60_000), 3);
        let start = t0();
        for key in ["a", "b", "c", "d"] {
            cache.put_at(key.into(), results(key), start);
        }

        assert_eq!(cache.len(), 3);
        assert!(cache.get_at("a", start).is_none());
        for key in ["b", "c", "d"] {
            assert!(cache.get_at(key, start).is_some(), "{} should be cached", key);
        }
    }

    #[test]
    fn eviction_ignores_access_recency() {
        let mut cache = ResultCache::new(Duration::milliseconds(60_000), 2);
        let start = t0();
        cache.put_at("a".into(), results("a"), start);
        cache.put_at("b".into(), results("b"), start);
        assert!(cache.get_at("a", start).is_some());

        cache.put_at("c".into(), results("c"), start);
        assert!(cache.get_at("a", start).is_none());
        assert!(cache.get_at("b", start).is_some());
    }

    #[test]
    fn reput_keeps_slot() {
        let mut cache = ResultCache::new(Duration::milliseconds(60_000), 2);
        let start = t0();
        cache.put_at("a".into(), results("a"), start);
        cache.put_at("b".into(), results("b"), start);
        cache.put_at("a".into(), results("a2"), start);

        assert_eq!(cache.stats().keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(cache.get_at("a", start).unwrap()[0].title, "a2");
    }

    #[test]
    fn clear_empties_everything() {
        let mut cache = ResultCache::new(Duration::milliseconds(60_000), 2);
        cache.put("a".into(), results("a"));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats { size: 0, keys: vec![] });
    }
}
