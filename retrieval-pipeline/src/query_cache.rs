use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::storage::types::SearchResult;
use lru::LruCache;
use unicode_normalization::UnicodeNormalization;

/// Canonical form used for cache keys: NFKC, lowercase, single spaces.
pub fn normalize_query(query: &str) -> String {
    query
        .nfkc()
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    n_results: usize,
    deduplicate: bool,
}

#[derive(Debug)]
struct CacheEntry {
    results: Arc<Vec<SearchResult>>,
    inserted_at: Instant,
}

/// Short-lived memo of complete hybrid results. Only successful searches are
/// stored.
///
/// Reads use `peek`, so the recency order is insertion order and trimming
/// evicts the oldest writes.
pub struct QueryCache {
    ttl: Duration,
    max_entries: usize,
    trim_count: usize,
    entries: LruCache<CacheKey, CacheEntry>,
}

impl QueryCache {
    pub fn new(ttl: Duration, max_entries: usize, trim_count: usize) -> Self {
        Self {
            ttl,
            max_entries,
            trim_count: trim_count.max(1),
            entries: LruCache::unbounded(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(
        &mut self,
        query: &str,
        n_results: usize,
        deduplicate: bool,
    ) -> Option<Arc<Vec<SearchResult>>> {
        self.get_at(query, n_results, deduplicate, Instant::now())
    }

    pub fn put(
        &mut self,
        query: &str,
        n_results: usize,
        deduplicate: bool,
        results: Arc<Vec<SearchResult>>,
    ) {
        self.put_at(query, n_results, deduplicate, results, Instant::now());
    }

    /// Expired entries are dropped on read.
    pub fn get_at(
        &mut self,
        query: &str,
        n_results: usize,
        deduplicate: bool,
        now: Instant,
    ) -> Option<Arc<Vec<SearchResult>>> {
        let key = key(query, n_results, deduplicate);
        let entry = self.entries.peek(&key)?;
        if now.saturating_duration_since(entry.inserted_at) < self.ttl {
            return Some(Arc::clone(&entry.results));
        }
        self.entries.pop(&key);
        None
    }

    /// Once the cache holds more than `max_entries`, the oldest
    /// `trim_count` entries are evicted.
    pub fn put_at(
        &mut self,
        query: &str,
        n_results: usize,
        deduplicate: bool,
        results: Arc<Vec<SearchResult>>,
        now: Instant,
    ) {
        self.entries.put(
            key(query, n_results, deduplicate),
            CacheEntry {
                results,
                inserted_at: now,
            },
        );

        if self.entries.len() > self.max_entries {
            for _ in 0..self.trim_count {
                if self.entries.pop_lru().is_none() {
                    break;
                }
            }
        }
    }
}

fn key(query: &str, n_results: usize, deduplicate: bool) -> CacheKey {
    CacheKey {
        query: normalize_query(query),
        n_results,
        deduplicate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(label: &str) -> Arc<Vec<SearchResult>> {
        Arc::new(vec![SearchResult {
            id: label.into(),
            chunk_id: format!("{label}_chunk_0"),
            title: label.into(),
            url: String::new(),
            content: String::new(),
            category: String::new(),
            last_updated: String::new(),
            chunk_index: 0,
            total_chunks: 1,
            score: 1.0,
            semantic_score: 0.0,
            keyword_score: 0.0,
        }])
    }

    #[test]
    fn normalization_ignores_case_and_spacing() {
        assert_eq!(normalize_query("  Line   WEIGHT\tguide "), "line weight guide");
        // Full-width letters fold under NFKC.
        assert_eq!(normalize_query("ＲＥＶＩＴ"), "revit");
    }

    #[test]
    fn entries_expire_after_ttl() {
        let mut cache = QueryCache::new(Duration::from_secs(300), 100, 20);
        let start = Instant::now();
        cache.put_at("line weights", 10, true, results("a"), start);

        let hit = cache.get_at("LINE  weights", 10, true, start + Duration::from_secs(299));
        assert_eq!(hit.map(|r| r[0].id.clone()), Some("a".to_string()));

        assert!(cache
            .get_at("line weights", 10, false, start + Duration::from_secs(1))
            .is_none());
        assert!(cache
            .get_at("line weights", 5, true, start + Duration::from_secs(1))
            .is_none());

        assert!(cache
            .get_at("line weights", 10, true, start + Duration::from_secs(300))
            .is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn overflow_trims_oldest_entries() {
        let mut cache = QueryCache::new(Duration::from_secs(300), 100, 20);
        let start = Instant::now();
        for i in 0..101u64 {
            cache.put_at(
                &format!("query {i}"),
                10,
                true,
                results("x"),
                start + Duration::from_millis(i),
            );
        }
        assert_eq!(cache.len(), 81);
        let now = start + Duration::from_secs(1);
        assert!(cache.get_at("query 0", 10, true, now).is_none());
        assert!(cache.get_at("query 19", 10, true, now).is_none());
        assert!(cache.get_at("query 20", 10, true, now).is_some());
        assert!(cache.get_at("query 100", 10, true, now).is_some());
    }

    #[test]
    fn reads_do_not_protect_old_entries_from_trimming() {
        let mut cache = QueryCache::new(Duration::from_secs(300), 3, 1);
        let start = Instant::now();
        cache.put_at("first", 10, true, results("a"), start);
        cache.put_at("second", 10, true, results("b"), start);
        cache.put_at("third", 10, true, results("c"), start);
        assert!(cache.get_at("first", 10, true, start).is_some());

        cache.put_at("fourth", 10, true, results("d"), start);
        assert_eq!(cache.len(), 3);
        assert!(cache.get_at("first", 10, true, start).is_none());
        assert!(cache.get_at("second", 10, true, start).is_some());

        // Rewriting a key makes it the newest entry again.
        cache.put_at("second", 10, true, results("b2"), start);
        cache.put_at("fifth", 10, true, results("e"), start);
        assert!(cache.get_at("third", 10, true, start).is_none());
        let hit = cache.get_at("second", 10, true, start);
        assert_eq!(hit.map(|r| r[0].id.clone()), Some("b2".to_string()));
    }
}
