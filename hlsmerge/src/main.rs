mod error;
mod server;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use hlsmerge_core::{
    bootstrap::{build_engines, build_fetcher, load_config},
    logging, PlaylistFetcher,
};

use server::AppState;

#[derive(Parser, Debug)]
#[command(name = "hlsmerge")]
#[command(about = "Merge redundant live HLS origins into one playlist", long_about = None)]
struct Args {
    /// Path to a YAML config file
    #[arg(long, short, env = "HLSMERGE_CONFIG_PATH")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let config = load_config(args.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Starting hlsmerge v{}", env!("CARGO_PKG_VERSION"));

    // 3. Playlist fetches are time-boxed; segment forwarding only bounds connecting
    let fetcher: Arc<dyn PlaylistFetcher> = Arc::new(build_fetcher(&config)?);
    let client = hlsmerge_proxy::build_segment_client(config.fetch.connect_timeout())?;
    let engines = build_engines(&config, &fetcher);

    let shutdown = CancellationToken::new();
    let pollers: Vec<_> = engines
        .iter()
        .map(|engine| Arc::clone(engine).start(shutdown.child_token()))
        .collect();
    info!("Started {} stream poller(s)", pollers.len());

    // 4. Serve until a shutdown signal arrives
    let server_shutdown = shutdown.clone();
    let state = AppState::new(&engines, client);
    let address = config.http_address();
    let server = tokio::spawn(async move {
        if let Err(e) = server::serve(&address, state, server_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    shutdown_signal().await;
    shutdown.cancel();

    for poller in pollers {
        if let Err(e) = poller.await {
            error!("Poller task failed: {}", e);
        }
    }
    if let Err(e) = server.await {
        error!("HTTP server task failed: {}", e);
    }

    info!("hlsmerge stopped");
    Ok(())
}

/// Wait for SIGTERM or Ctrl+C
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
