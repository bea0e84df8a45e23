#![allow(clippy::missing_docs_in_private_items)]
//! Startup plumbing shared by the `search-daemon`, `search-once` and
//! `build-index` binaries.

use std::{path::Path, sync::Arc};

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{
    storage::{
        sync::{sync_index, SyncOutcome, SyncStatus},
        types::SearchResult,
    },
    utils::{
        config::{get_config, get_config_from, AppConfig},
        embedding::EmbeddingProvider,
        status::StatusCell,
    },
};
use daemon_client::SearchResponse;
use retrieval_pipeline::SearchEngine;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logs go to stderr; stdout is reserved for the ready line and results.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => get_config_from(path)
            .with_context(|| format!("reading config file {}", path.display()))?,
        None => get_config().context("reading configuration")?,
    };
    Ok(config)
}

/// Pulls a fresh index copy from `index_source_dir`, when one is configured.
/// Failures are logged; the daemon then serves whatever local copy it has.
pub async fn sync_local_index(config: &AppConfig) -> Option<SyncOutcome> {
    let source = config.index_source_dir()?;
    let local = config.index_dir();

    let status = Arc::new(StatusCell::new(SyncStatus::default()));
    let mut reader = status.reader();
    let progress = tokio::spawn(async move {
        while reader.changed().await {
            let current = reader.snapshot();
            info!(phase = ?current.phase, message = %current.message, "Index sync");
        }
    });

    let cell = Arc::clone(&status);
    let outcome = tokio::task::spawn_blocking(move || sync_index(&source, &local, &cell)).await;
    drop(status);
    progress.await.ok();

    match outcome {
        Ok(Ok(outcome)) => Some(outcome),
        Ok(Err(err)) => {
            warn!(error = %err, "Continuing with the local index copy");
            None
        }
        Err(err) => {
            warn!(error = %err, "Index sync task failed");
            None
        }
    }
}

pub fn build_engine(config: &AppConfig) -> anyhow::Result<SearchEngine> {
    let provider = Arc::new(
        EmbeddingProvider::from_config(config).context("setting up the embedding provider")?,
    );
    info!(
        backend = provider.backend_label(),
        model = provider.model_code(),
        dimension = provider.dimension(),
        "Embedding provider ready"
    );
    Ok(SearchEngine::from_config(config, provider))
}

/// The query comes either as a plain argument or base64 encoded, which keeps
/// quoting out of the way when another program spawns us.
pub fn decode_query(plain: Option<&str>, encoded: Option<&str>) -> anyhow::Result<String> {
    match (plain, encoded) {
        (_, Some(encoded)) => {
            let bytes = STANDARD
                .decode(encoded.trim())
                .context("query is not valid base64")?;
            String::from_utf8(bytes).context("decoded query is not valid UTF-8")
        }
        (Some(plain), None) => Ok(plain.to_string()),
        (None, None) => anyhow::bail!("query is required"),
    }
}

pub async fn run_search(
    config: &AppConfig,
    query: &str,
    n_results: usize,
    deduplicate: bool,
) -> anyhow::Result<Vec<SearchResult>> {
    let engine = build_engine(config)?;
    let results = engine.hybrid_search(query, n_results, deduplicate).await?;
    Ok(results)
}

/// Turns a search outcome into the wire body. Failures carry the full
/// error chain as `traceback`.
pub fn render_outcome(outcome: anyhow::Result<Vec<SearchResult>>) -> SearchResponse {
    match outcome {
        Ok(results) => SearchResponse {
            success: true,
            results,
            error: None,
            traceback: None,
        },
        Err(err) => SearchResponse {
            success: false,
            results: Vec::new(),
            error: Some(err.to_string()),
            traceback: Some(format!("{err:?}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{storage::types::Document, utils::embedding::EmbeddingBackend};
    use ingestion_pipeline::{ChunkerConfig, IndexBuilder};

    fn hashed_config(data_dir: &Path) -> AppConfig {
        AppConfig {
            embedding_backend: EmbeddingBackend::Hashed,
            embedding_dimensions: 64,
            data_dir: data_dir.to_string_lossy().into_owned(),
            similarity_threshold: 0.0,
            ..AppConfig::default()
        }
    }

    #[test]
    fn base64_wins_over_plain_query() {
        let encoded = STANDARD.encode("line weights \"quoted\"");
        assert_eq!(
            decode_query(Some("ignored"), Some(&encoded)).expect("decode"),
            "line weights \"quoted\""
        );
        assert_eq!(decode_query(Some("plain"), None).expect("plain"), "plain");
        assert!(decode_query(None, None).is_err());
        assert!(decode_query(None, Some("%%%")).is_err());
    }

    #[test]
    fn failures_carry_a_traceback() {
        let err = anyhow::anyhow!("index missing").context("running search");
        let body = render_outcome(Err(err));
        assert!(!body.success);
        assert_eq!(body.error.as_deref(), Some("running search"));
        assert!(body
            .traceback
            .as_deref()
            .is_some_and(|trace| trace.contains("index missing")));

        let ok = render_outcome(Ok(Vec::new()));
        assert!(ok.success);
        assert!(ok.error.is_none());
    }

    #[tokio::test]
    async fn one_shot_search_over_a_built_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = hashed_config(dir.path());

        let provider = Arc::new(EmbeddingProvider::from_config(&config).expect("provider"));
        let builder = IndexBuilder::new(provider, ChunkerConfig::from(&config));
        let docs = vec![
            Document::new(
                "line-weights",
                "Line Weight Guidelines",
                "https://standards/line-weights",
                "Cut lines are drawn with heavier pens than projection lines.",
            ),
            Document::new(
                "sheets",
                "Sheet Setup",
                "https://standards/sheets",
                "Title blocks carry the sheet number and revision.",
            ),
        ];
        builder
            .build(&docs, &config.index_dir())
            .await
            .expect("build index");

        let results = run_search(&config, "line weight pens", 1, true)
            .await
            .expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "line-weights");
    }

    #[tokio::test]
    async fn missing_index_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let body = render_outcome(run_search(&hashed_config(dir.path()), "anything", 3, true).await);
        assert!(!body.success);
        assert!(body
            .error
            .as_deref()
            .is_some_and(|err| err.contains("search index is not available")));
    }

    #[tokio::test]
    async fn sync_is_skipped_without_a_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(sync_local_index(&hashed_config(dir.path())).await.is_none());
    }
}
