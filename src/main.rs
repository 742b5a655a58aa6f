mod bootstrap;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use livelog::Coordinator;

#[tokio::main]
async fn main() -> Result<()> {
    let args = bootstrap::Args::parse();
    bootstrap::setup_logging(&args.log_level);

    tracing::info!("livelog v{} starting", livelog::VERSION);

    let config = args
        .load_config()
        .with_context(|| format!("loading {}", args.config.display()))?;
    let addr = config.bind_addr();
    tracing::info!(files = config.files.len(), base_url = %config.base_url, "configuration loaded");

    let coordinator = Arc::new(Coordinator::new(config)?);
    let monitor = coordinator.start()?;

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    tokio::select! {
        result = livelog::serve(Arc::clone(&coordinator), listener) => {
            monitor.abort();
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received; shutting down");
            monitor.abort();
        }
    }

    Ok(())
}
