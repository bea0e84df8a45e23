use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use common::utils::embedding::EmbeddingProvider;
use ingestion_pipeline::{ChunkerConfig, IndexBuilder, JsonFileSource};
use standards_search::{init_tracing, load_config};

/// Chunks and embeds a JSON array of documents into an index snapshot.
#[derive(Debug, Parser)]
#[command(name = "build-index", version)]
struct Args {
    /// JSON file holding the documents to index.
    #[arg(long)]
    documents: PathBuf,
    /// Output directory; defaults to the configured index directory.
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let provider = Arc::new(
        EmbeddingProvider::from_config(&config).context("setting up the embedding provider")?,
    );
    let builder = IndexBuilder::new(provider, ChunkerConfig::from(&config));
    let out = args.out.unwrap_or_else(|| config.index_dir());

    let report = builder
        .build(&JsonFileSource::new(args.documents), &out)
        .await
        .context("building the index")?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
