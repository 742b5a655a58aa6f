//! Stable, opaque identifiers for monitored paths.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Opaque token standing in for a file path on the wire.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Memoizing path → [`FileId`] registry.
///
/// The ID is the lowercase hex SHA-256 of the path string exactly as
/// configured, so it is stable across restarts for the same configuration.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    cache: RwLock<HashMap<String, FileId>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity_of(&self, path: &str) -> FileId {
        if let Some(id) = self.cache.read().get(path) {
            return id.clone();
        }

        self.cache
            .write()
            .entry(path.to_owned())
            .or_insert_with(|| digest(path))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

/// A configured file, fixed for the lifetime of the process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MonitoredFile {
    id: FileId,
    name: String,
    path: PathBuf,
}

impl MonitoredFile {
    pub fn new(registry: &IdentityRegistry, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = registry.identity_of(&path.to_string_lossy());
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        MonitoredFile { id, name, path }
    }

    pub fn id(&self) -> &FileId {
        &self.id
    }

    /// Basename of the configured path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The path as configured.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn digest(path: &str) -> FileId {
    FileId(hex::encode(Sha256::digest(path.as_bytes())))
}
