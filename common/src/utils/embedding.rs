use std::{
    collections::{hash_map::DefaultHasher, HashMap},
    hash::{Hash, Hasher},
    sync::Arc,
    time::Duration,
};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio_retry::{strategy::ExponentialBackoff, RetryIf};
use tracing::{debug, instrument, warn};

use crate::{
    error::AppError,
    utils::{
        config::AppConfig,
        embedding_cache::{cache_key, EmbeddingCache},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    OpenAI,
    Hashed,
}

impl std::str::FromStr for EmbeddingBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "hashed" => Ok(Self::Hashed),
            other => Err(AppError::Configuration(format!(
                "unknown embedding backend '{other}'. Expected 'openai' or 'hashed'."
            ))),
        }
    }
}

/// Text-to-vector conversion with an optional persistent memo in front.
#[derive(Clone)]
pub struct EmbeddingProvider {
    inner: EmbeddingInner,
    cache: Option<Arc<EmbeddingCache>>,
}

#[derive(Clone)]
enum EmbeddingInner {
    OpenAI(Arc<OpenAiEmbedder>),
    Hashed { dimension: usize },
}

impl EmbeddingProvider {
    /// Builds the configured backend. The remote backend gets the on-disk
    /// cache; hashed embeddings are cheap enough to recompute.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        match config.embedding_backend {
            EmbeddingBackend::OpenAI => {
                let embedder = OpenAiEmbedder::from_config(config)?;
                let cache = EmbeddingCache::new(config.embedding_cache_path());
                Ok(Self::new_openai(embedder).with_cache(Arc::new(cache)))
            }
            EmbeddingBackend::Hashed => Self::new_hashed(config.embedding_dimensions as usize),
        }
    }

    pub fn new_openai(embedder: OpenAiEmbedder) -> Self {
        Self {
            inner: EmbeddingInner::OpenAI(Arc::new(embedder)),
            cache: None,
        }
    }

    pub fn new_hashed(dimension: usize) -> Result<Self, AppError> {
        Ok(Self {
            inner: EmbeddingInner::Hashed {
                dimension: dimension.max(1),
            },
            cache: None,
        })
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<EmbeddingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            EmbeddingInner::OpenAI(_) => "openai",
            EmbeddingInner::Hashed { .. } => "hashed",
        }
    }

    pub fn dimension(&self) -> usize {
        match &self.inner {
            EmbeddingInner::OpenAI(embedder) => embedder.dimensions,
            EmbeddingInner::Hashed { dimension } => *dimension,
        }
    }

    pub fn model_code(&self) -> &str {
        match &self.inner {
            EmbeddingInner::OpenAI(embedder) => &embedder.model,
            EmbeddingInner::Hashed { .. } => "hashed",
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.embed_batch(&[text.to_owned()])
            .await?
            .pop()
            .ok_or_else(|| AppError::Provider("no embedding returned for input".into()))
    }

    /// Embeds `texts`, preserving input order. With a cache attached only
    /// uncached texts reach the backend, and the cache file is flushed after
    /// every backend batch that produced new entries.
    #[instrument(skip_all, fields(backend = self.backend_label(), inputs = texts.len()))]
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let Some(cache) = &self.cache else {
            return self.embed_uncached(texts).await;
        };

        let model = self.model_code().to_owned();
        let dimension = self.dimension();
        let keys: Vec<String> = texts
            .iter()
            .map(|text| cache_key(&model, dimension, text))
            .collect();

        let mut results = cache.get_many(&keys).await;

        // Unique misses in first-seen order; repeated texts are sent once.
        let mut pending: Vec<(String, String)> = Vec::new();
        let mut pending_index: HashMap<&str, usize> = HashMap::new();
        for ((key, text), hit) in keys.iter().zip(texts).zip(&results) {
            if hit.is_none() && !pending_index.contains_key(key.as_str()) {
                pending_index.insert(key.as_str(), pending.len());
                pending.push((key.clone(), text.clone()));
            }
        }

        debug!(
            hits = texts.len() - results.iter().filter(|r| r.is_none()).count(),
            misses = pending.len(),
            "Embedding cache lookup"
        );

        let mut fresh: HashMap<String, Vec<f32>> = HashMap::with_capacity(pending.len());
        for batch in pending.chunks(self.batch_size()) {
            let inputs: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            let vectors = self.embed_uncached(&inputs).await?;
            let entries: Vec<(String, Vec<f32>)> = batch
                .iter()
                .map(|(key, _)| key.clone())
                .zip(vectors)
                .collect();
            cache.insert_and_flush(entries.clone()).await?;
            fresh.extend(entries);
        }

        for (slot, key) in results.iter_mut().zip(&keys) {
            if slot.is_none() {
                *slot = fresh.get(key).cloned();
            }
        }

        results
            .into_iter()
            .map(|vector| {
                vector.ok_or_else(|| AppError::Provider("embedding missing after batch".into()))
            })
            .collect()
    }

    fn batch_size(&self) -> usize {
        match &self.inner {
            EmbeddingInner::OpenAI(embedder) => embedder.batch_size,
            EmbeddingInner::Hashed { .. } => usize::MAX,
        }
    }

    async fn embed_uncached(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        match &self.inner {
            EmbeddingInner::Hashed { dimension } => Ok(texts
                .iter()
                .map(|text| hashed_embedding(text, *dimension))
                .collect()),
            EmbeddingInner::OpenAI(embedder) => {
                let mut vectors = Vec::with_capacity(texts.len());
                for batch in texts.chunks(embedder.batch_size) {
                    vectors.extend(embedder.embed_with_retry(batch).await?);
                }
                Ok(vectors)
            }
        }
    }
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    batch_size: usize,
    max_retries: usize,
    backoff_base: Duration,
}

impl OpenAiEmbedder {
    /// A missing API key is not an error here; requests fail with a
    /// configuration error instead, so a daemon can still start and serve
    /// keyword results.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.embedding_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.openai_base_url.trim_end_matches('/')),
            api_key: config
                .openai_api_key
                .as_ref()
                .map(|key| key.trim().to_owned())
                .filter(|key| !key.is_empty()),
            model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions as usize,
            batch_size: config.embedding_batch_size.max(1),
            max_retries: config.embedding_max_retries,
            backoff_base: Duration::from_millis(config.embedding_backoff_base_ms),
        })
    }

    /// Retries rate limits and transient failures with `2^attempt × base`
    /// delays, then gives up with the last error.
    async fn embed_with_retry(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let factor = u64::try_from(self.backoff_base.as_millis()).unwrap_or(u64::MAX);
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(factor)
            .take(self.max_retries);

        RetryIf::start(
            strategy,
            || self.request(inputs),
            |err: &AppError| {
                let retry = err.is_transient();
                if retry {
                    warn!(error = %err, "Embedding request failed, retrying");
                }
                retry
            },
        )
        .await
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AppError::Configuration("no API key configured for the embedding provider".into())
        })?;

        let body = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            let message = format!("embeddings request failed ({status}): {detail}");
            return Err(if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                AppError::TransientProvider(message)
            } else {
                AppError::Provider(message)
            });
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|err| {
            AppError::Provider(format!("could not parse embeddings response: {err}"))
        })?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != inputs.len() {
            return Err(AppError::Provider(format!(
                "provider returned {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

// Helper functions for hashed embeddings
fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dim = dimension.max(1);
    let mut vector = vec![0.0f32; dim];
    if text.is_empty() {
        return vector;
    }

    let mut token_count = 0f32;
    for token in tokens(text) {
        token_count += 1.0;
        let idx = bucket(&token, dim);
        if let Some(slot) = vector.get_mut(idx) {
            *slot += 1.0;
        }
    }

    if token_count == 0.0 {
        return vector;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }

    vector
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_lowercase())
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % dimension
}
