//! Wire events sent to viewers.
//!
//! Serialized as `{"event": "<name>", "data": {...}}`.

use serde::Serialize;

use crate::identity::FileId;
use crate::severity::Severity;

/// Version announced in every handshake.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum Event {
    Handshake(Handshake),
    Message(LineMessage),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Handshake {
    pub version: String,
    pub files: Vec<FileEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FileEntry {
    #[serde(rename = "fileID")]
    pub file_id: FileId,
    #[serde(rename = "fileName")]
    pub file_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineMessage {
    #[serde(rename = "fileID")]
    pub file_id: FileId,
    #[serde(rename = "fileName")]
    pub file_name: String,
    pub message: String,
    #[serde(rename = "type")]
    pub severity: Severity,
}

impl Event {
    pub fn to_json(&self) -> String {
        // Only strings and unit enums inside, serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn as_message(&self) -> Option<&LineMessage> {
        match self {
            Event::Message(msg) => Some(msg),
            Event::Handshake(_) => None,
        }
    }

    pub fn as_handshake(&self) -> Option<&Handshake> {
        match self {
            Event::Handshake(hs) => Some(hs),
            Event::Message(_) => None,
        }
    }
}
