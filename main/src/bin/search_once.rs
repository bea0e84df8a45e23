use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use standards_search::{decode_query, init_tracing, load_config, render_outcome, run_search};
use tracing::error;

/// Runs a single search against the local index and prints the JSON result.
#[derive(Debug, Parser)]
#[command(name = "search-once", version)]
struct Args {
    /// Query text.
    query: Option<String>,
    /// Base64-encoded query; takes precedence over the positional query.
    #[arg(long = "base64")]
    encoded_query: Option<String>,
    /// Write the JSON result here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    n_results: Option<usize>,
    /// Keep every chunk rather than at most two per URL.
    #[arg(long)]
    no_dedupe: bool,
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    let outcome = async {
        let config = load_config(args.config.as_deref())?;
        let query = decode_query(args.query.as_deref(), args.encoded_query.as_deref())?;
        let n_results = args.n_results.unwrap_or(config.max_results);
        run_search(&config, &query, n_results, !args.no_dedupe).await
    }
    .await;

    let response = render_outcome(outcome);
    let success = response.success;
    let body = match serde_json::to_string(&response) {
        Ok(body) => body,
        Err(err) => {
            error!(error = %err, "Could not serialize search response");
            return ExitCode::FAILURE;
        }
    };

    match &args.output {
        Some(path) => {
            if let Err(err) = std::fs::write(path, body) {
                error!(path = %path.display(), error = %err, "Could not write search output");
                return ExitCode::FAILURE;
            }
        }
        None => println!("{body}"),
    }

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
