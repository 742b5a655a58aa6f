//! Error taxonomy for the tailing engine.
//!
//! Only configuration errors are fatal. Everything else is scoped to a single
//! file or a single viewer and is logged by the component that hits it.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::router::ViewerId;

#[derive(Debug, Error)]
pub enum Error {
    /// A monitored file could not be opened or read.
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A filesystem subscription could not be established for a path.
    #[error("Failed to watch {}: {reason}", path.display())]
    WatchSetup { path: PathBuf, reason: String },

    /// A viewer's channel rejected a send.
    #[error("Failed to deliver to viewer {0}")]
    Delivery(ViewerId),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A redaction or severity pattern did not compile.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The configuration file is not valid JSON for [`Config`](crate::Config).
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The push channel to a viewer failed.
    #[error("Transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn watch_setup(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::WatchSetup {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error should abort startup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::Pattern(_) | Error::ConfigParse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
