//! Configuration file loading.
//!
//! The configuration is a JSON document with camelCase keys. Every key except
//! `files` has a default.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::router::DEFAULT_QUEUE_CAPACITY;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub bind_host: String,
    pub bind_port: u16,
    /// Only consumed by the HTTP front end to locate the push channel.
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub censor_pattern: Option<String>,
    pub enable_colors: bool,
    pub severity_patterns: SeverityPatterns,
    /// Maximum number of lines replayed per file to a new viewer.
    pub playback_buffer: usize,
    /// Live events a viewer may fall behind by before it is disconnected.
    pub viewer_queue: usize,
    /// Milliseconds between scans when polling.
    pub poll_interval: u64,
    pub watch_mode: WatchMode,
    /// Milliseconds a removed file has to reappear before its lines are
    /// dropped.
    pub removal_grace_ms: u64,
    /// Treat a file that shrinks below the delivered position as a new file.
    pub detect_truncation: bool,
    pub files: Vec<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SeverityPatterns {
    pub debug: String,
    pub warning: String,
    pub error: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    #[default]
    Native,
    Poll,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_host: "0.0.0.0".to_string(),
            bind_port: 8080,
            base_url: "http://localhost:8080".to_string(),
            censor_pattern: None,
            enable_colors: true,
            severity_patterns: SeverityPatterns::default(),
            playback_buffer: 50,
            viewer_queue: DEFAULT_QUEUE_CAPACITY,
            poll_interval: 1000,
            watch_mode: WatchMode::Native,
            removal_grace_ms: 50,
            detect_truncation: false,
            files: Vec::new(),
        }
    }
}

impl Default for SeverityPatterns {
    fn default() -> Self {
        SeverityPatterns {
            debug: r"(?i)\[(.*)?(DEBUG|FINE(ST)?)\]".to_string(),
            warning: r"(?i)\[(.*)?WARN(ING)?\]".to_string(),
            error: r"(?i)\[(.*)?ERROR\]".to_string(),
        }
    }
}

impl Config {
    /// Reads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
        let config = Self::from_json(&raw)?;
        tracing::debug!(path = %path.display(), files = config.files.len(), "loaded configuration");
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.files.is_empty() {
            return Err(Error::Config("no files configured".to_string()));
        }
        if self.viewer_queue == 0 {
            return Err(Error::Config("viewerQueue must be positive".to_string()));
        }
        if self.watch_mode == WatchMode::Poll && self.poll_interval == 0 {
            return Err(Error::Config("pollInterval must be positive".to_string()));
        }
        if let Some(path) = self.files.iter().find(|p| p.file_name().is_none()) {
            return Err(Error::Config(format!(
                "{} does not name a file",
                path.display()
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    pub fn removal_grace(&self) -> Duration {
        Duration::from_millis(self.removal_grace_ms)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }
}
