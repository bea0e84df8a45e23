use std::{io::Write, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use common::utils::daemon_state::{DaemonState, READY_PREFIX};
use daemon_server::{api_state::ApiState, serve, shutdown_on_signal};
use standards_search::{build_engine, init_tracing, load_config, sync_local_index};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Warm search daemon. Binds an ephemeral localhost port, publishes it in
/// the state file, prints the ready line and serves until idle.
#[derive(Debug, Parser)]
#[command(name = "search-daemon", version)]
struct Args {
    /// Config file to read instead of `./config`.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Serve the local index copy without checking the index source.
    #[arg(long)]
    skip_sync: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    if args.skip_sync {
        info!("Index sync skipped");
    } else if let Some(outcome) = sync_local_index(&config).await {
        info!(?outcome, "Index sync finished");
    }

    let engine = Arc::new(build_engine(&config)?);
    if !engine.has_index() {
        warn!(
            index_dir = %config.index_dir().display(),
            "Starting without an index; searches will fail until one is built"
        );
    }

    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .context("binding the daemon port")?;
    let port = listener.local_addr()?.port();

    let state_file = config.state_file();
    DaemonState::for_current_process(port)
        .write(&state_file)
        .context("publishing daemon state")?;

    let state = ApiState::new(
        engine,
        Duration::from_secs(config.idle_timeout_secs),
        state_file,
    );
    tokio::spawn(shutdown_on_signal(state.shutdown.clone()));

    // The launcher waits for this exact line on stdout.
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{READY_PREFIX}{port}")?;
    stdout.flush()?;
    drop(stdout);

    serve(listener, state).await?;
    Ok(())
}
