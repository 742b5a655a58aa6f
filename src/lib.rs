//! Tails a fixed set of (namely log) files and fans newly appended lines out
//! to any number of connected viewers.
//!
//! A viewer that connects late first receives a handshake listing every file,
//! then a bounded replay of the most recent lines of each file, then live
//! lines as they are appended.
//!
//! ## Example
//!
//! ```no_run
//! use livelog::{Config, Coordinator};
//!
//! #[tokio::main]
//! async fn main() -> livelog::Result<()> {
//!     let config = Config {
//!         files: vec!["some/file.log".into(), "/some/other/file.log".into()],
//!         playback_buffer: 20,
//!         ..Config::default()
//!     };
//!
//!     let coordinator = Coordinator::new(config)?;
//!     let _monitor = coordinator.start()?;
//!
//!     // Handshake, replay, then every line appended from now on.
//!     let mut viewer = coordinator.connect();
//!     while let Some(event) = viewer.recv().await {
//!         println!("{}", event.to_json());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Caveats
//!
//! New lines are detected by position, not by content. A file truncated in
//! place and rewritten is only picked up again once it grows past what was
//! already delivered, unless `detectTruncation` is enabled, in which case the
//! rewritten content is delivered from the start. Deleting and re-creating a
//! file after the removal grace period delivers its whole new content.
//!
//! The parent directory of every monitored file must exist, since that is
//! what gets watched.

mod censor;
mod config;
mod coordinator;
mod error;
mod events;
mod identity;
mod monitor;
mod protocol;
mod router;
mod server;
mod severity;
mod store;

pub use censor::{Censor, PLACEHOLDER};
pub use config::{Config, SeverityPatterns, WatchMode};
pub use coordinator::{Coordinator, MonitorHandle};
pub use error::{Error, Result};
pub use events::{FileEvent, FileEventKind, MuxedEvents};
pub use identity::{FileId, IdentityRegistry, MonitoredFile};
pub use monitor::FileMonitor;
pub use protocol::{Event, FileEntry, Handshake, LineMessage, VERSION};
pub use router::{BroadcastRouter, Viewer, ViewerId, DEFAULT_QUEUE_CAPACITY};
pub use server::serve;
pub use severity::{Classifier, Severity};
pub use store::LineStore;

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
