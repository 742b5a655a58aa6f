use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use livelog::{Config, WatchMode};

/// Streams appended log lines to WebSocket viewers.
#[derive(Debug, Parser)]
#[command(name = "livelog", version, about)]
pub struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "livelog.json")]
    pub config: PathBuf,

    /// Log level or filter directive, e.g. `debug` or `livelog=trace`.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Overrides `bindPort` from the configuration file.
    #[arg(long)]
    pub bind_port: Option<u16>,

    /// Poll files instead of relying on native notifications.
    #[arg(long)]
    pub poll: bool,
}

impl Args {
    pub fn load_config(&self) -> livelog::Result<Config> {
        let mut config = Config::load(&self.config)?;

        if let Some(port) = self.bind_port {
            config.bind_port = port;
        }
        if self.poll {
            config.watch_mode = WatchMode::Poll;
        }

        Ok(config)
    }
}

/// Initialise the global `tracing` subscriber. Falls back to `info` if the
/// directive does not parse.
pub fn setup_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
