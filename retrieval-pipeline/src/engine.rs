use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use common::{
    error::AppError,
    storage::{
        snapshot::IndexSnapshot,
        types::{IndexStats, SearchResult},
    },
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::RetrievalTuning,
    hybrid, keyword,
    query_cache::{normalize_query, QueryCache},
    vector,
};

/// Owns the loaded snapshot and answers hybrid queries against it.
///
/// The snapshot is read-only and shared, so concurrent searches never lock
/// it. Only the query cache sits behind a mutex, and it is never held across
/// an await.
pub struct SearchEngine {
    snapshot: Option<Arc<IndexSnapshot>>,
    provider: Arc<EmbeddingProvider>,
    tuning: RetrievalTuning,
    cache: Mutex<QueryCache>,
}

impl SearchEngine {
    pub fn new(
        snapshot: Option<Arc<IndexSnapshot>>,
        provider: Arc<EmbeddingProvider>,
        tuning: RetrievalTuning,
    ) -> Self {
        let cache = QueryCache::new(
            tuning.cache_ttl,
            tuning.cache_max_entries,
            tuning.cache_trim_count,
        );
        Self {
            snapshot,
            provider,
            tuning,
            cache: Mutex::new(cache),
        }
    }

    /// Loads the snapshot from the configured index directory. A missing or
    /// corrupt snapshot leaves the engine without an index rather than failing.
    pub fn from_config(config: &AppConfig, provider: Arc<EmbeddingProvider>) -> Self {
        let index_dir = config.index_dir();
        let snapshot = IndexSnapshot::load(&index_dir).map(Arc::new);
        if snapshot.is_none() {
            warn!(index_dir = %index_dir.display(), "No usable search index found");
        }
        Self::new(snapshot, provider, RetrievalTuning::from(config))
    }

    pub fn has_index(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn tuning(&self) -> &RetrievalTuning {
        &self.tuning
    }

    pub fn stats(&self) -> Result<IndexStats, AppError> {
        Ok(self.snapshot()?.stats())
    }

    fn snapshot(&self) -> Result<&Arc<IndexSnapshot>, AppError> {
        self.snapshot.as_ref().ok_or_else(|| {
            AppError::Configuration(
                "search index is not available; build it with build-index first".into(),
            )
        })
    }

    /// Semantic and keyword search merged into one ranked list.
    ///
    /// When the query embedding cannot be computed the search degrades to
    /// keyword results only, and that degraded answer is not cached.
    #[instrument(skip_all, fields(n_results = n_results, deduplicate = deduplicate))]
    pub async fn hybrid_search(
        &self,
        query: &str,
        n_results: usize,
        deduplicate: bool,
    ) -> Result<Vec<SearchResult>, AppError> {
        let started = Instant::now();
        let snapshot = Arc::clone(self.snapshot()?);
        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return Err(AppError::Validation("query is required".into()));
        }
        if n_results == 0 {
            return Ok(Vec::new());
        }

        if hybrid::is_catalog_query(&normalized, &self.tuning) {
            info!("Answering with the document catalog");
            return Ok(vec![hybrid::catalog_result(&snapshot)]);
        }

        if let Some(cached) = self.cache_get(&normalized, n_results, deduplicate) {
            debug!(
                results = cached.len(),
                total_ms = started.elapsed().as_millis(),
                "Query cache hit"
            );
            return Ok(cached.as_ref().clone());
        }

        let fetch = n_results.saturating_mul(self.tuning.candidate_multiplier);

        let embed_started = Instant::now();
        // The cache key is normalized; the provider sees the query as written.
        let embedding = self.provider.embed(query.trim()).await;
        let embed_ms = embed_started.elapsed().as_millis();

        let vector_started = Instant::now();
        let (semantic, degraded) = match embedding {
            Ok(query_vector) => (
                vector::search(
                    &snapshot,
                    &query_vector,
                    fetch,
                    self.tuning.similarity_threshold,
                ),
                false,
            ),
            Err(err) => {
                warn!(error = %err, "Query embedding failed, using keyword results only");
                (Vec::new(), true)
            }
        };
        let vector_ms = vector_started.elapsed().as_millis();

        let keyword_started = Instant::now();
        let lexical = keyword::search(&snapshot, &normalized, fetch);
        let keyword_ms = keyword_started.elapsed().as_millis();

        let merge_started = Instant::now();
        let semantic_hits = semantic.len();
        let keyword_hits = lexical.len();
        let ranked = hybrid::merge(&snapshot, &normalized, semantic, lexical, &self.tuning);
        let mut results = hybrid::to_results(&snapshot, &ranked);
        if deduplicate {
            results = hybrid::dedupe_by_url(results, self.tuning.max_chunks_per_url);
        }
        results.truncate(n_results);
        let merge_ms = merge_started.elapsed().as_millis();

        info!(
            semantic_hits,
            keyword_hits,
            results = results.len(),
            degraded,
            embed_ms,
            vector_ms,
            keyword_ms,
            merge_ms,
            total_ms = started.elapsed().as_millis(),
            "Hybrid search finished"
        );

        if !degraded {
            self.cache_put(&normalized, n_results, deduplicate, &results);
        }
        Ok(results)
    }

    fn cache_get(
        &self,
        query: &str,
        n_results: usize,
        deduplicate: bool,
    ) -> Option<Arc<Vec<SearchResult>>> {
        match self.cache.lock() {
            Ok(mut cache) => cache.get(query, n_results, deduplicate),
            Err(poisoned) => poisoned.into_inner().get(query, n_results, deduplicate),
        }
    }

    fn cache_put(
        &self,
        query: &str,
        n_results: usize,
        deduplicate: bool,
        results: &[SearchResult],
    ) {
        let results = Arc::new(results.to_vec());
        match self.cache.lock() {
            Ok(mut cache) => cache.put(query, n_results, deduplicate, results),
            Err(poisoned) => poisoned
                .into_inner()
                .put(query, n_results, deduplicate, results),
        }
    }
}
