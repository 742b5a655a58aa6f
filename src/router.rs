//! Fan-out of lines to connected viewers.
//!
//! A viewer is the receiving half of a bounded channel. The router keeps the
//! sending halves and either targets one viewer (handshake and replay on
//! connect) or broadcasts to all of them (live lines). A viewer whose queue
//! fills up is dropped rather than buffered without limit.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task;

use futures_util::stream::Stream as FuturesStream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::censor::Censor;
use crate::error::Error;
use crate::identity::MonitoredFile;
use crate::protocol::{Event, FileEntry, Handshake, LineMessage, VERSION};
use crate::severity::Classifier;
use crate::store::LineStore;

/// Live events a viewer may fall behind by before it is dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ViewerId(pub u64);

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receiving end of a connected viewer.
///
/// Dropping it disconnects the viewer; the router notices on the next
/// broadcast. Call [`BroadcastRouter::disconnect`] to deregister right away.
#[derive(Debug)]
pub struct Viewer {
    id: ViewerId,
    rx: mpsc::Receiver<Event>,
}

impl Viewer {
    pub fn id(&self) -> ViewerId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Returns an already queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl FuturesStream for Viewer {
    type Item = Event;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

struct Registered {
    id: ViewerId,
    tx: mpsc::Sender<Event>,
}

pub struct BroadcastRouter {
    viewers: Mutex<Vec<Registered>>,
    next_id: AtomicU64,
    censor: Censor,
    classifier: Classifier,
    playback_buffer: usize,
    queue_capacity: usize,
}

impl fmt::Debug for BroadcastRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastRouter")
            .field("viewers", &self.viewer_count())
            .field("censor", &self.censor.is_enabled())
            .field("playback_buffer", &self.playback_buffer)
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

impl BroadcastRouter {
    pub fn new(censor: Censor, classifier: Classifier, playback_buffer: usize) -> Self {
        BroadcastRouter {
            viewers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            censor,
            classifier,
            playback_buffer,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Sets how many live events a viewer may have queued. Clamped to 1.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn handshake(files: &[MonitoredFile]) -> Event {
        Event::Handshake(Handshake {
            version: VERSION.to_string(),
            files: files
                .iter()
                .map(|file| FileEntry {
                    file_id: file.id().clone(),
                    file_name: file.name().to_string(),
                })
                .collect(),
        })
    }

    /// Builds the `message` event for a line, or `None` for a blank line.
    ///
    /// Severity is decided on the raw text, before redaction.
    pub fn envelope(&self, file: &MonitoredFile, line: &str) -> Option<Event> {
        if line.trim().is_empty() {
            return None;
        }

        Some(Event::Message(LineMessage {
            file_id: file.id().clone(),
            file_name: file.name().to_string(),
            message: self.censor.apply(line).into_owned(),
            severity: self.classifier.classify(line),
        }))
    }

    /// Sends the handshake and the replay backlog of every file to a new
    /// viewer, then registers it for broadcasts.
    ///
    /// `stores` must line up with `files`. The caller is expected to keep
    /// the stores from changing for the duration of the call, so that the
    /// backlog and later broadcasts neither overlap nor leave a gap.
    pub fn connect(&self, files: &[MonitoredFile], stores: &[&LineStore]) -> Viewer {
        let mut backlog = vec![Self::handshake(files)];
        for (file, store) in files.iter().zip(stores) {
            for line in store.snapshot_tail(self.playback_buffer) {
                backlog.extend(self.envelope(file, &line));
            }
        }
        let replayed = backlog.len() - 1;

        // Room for the whole backlog on top of the live allowance.
        let (tx, rx) = mpsc::channel(backlog.len() + self.queue_capacity);
        let id = ViewerId(self.next_id.fetch_add(1, Ordering::Relaxed));

        for event in backlog {
            // Cannot fail: `rx` is alive and the capacity covers the backlog.
            let _ = tx.try_send(event);
        }

        self.viewers.lock().push(Registered { id, tx });
        tracing::debug!(viewer = %id, replayed, "viewer connected");

        Viewer { id, rx }
    }

    /// Delivers one line to every connected viewer. Viewers whose channel is
    /// gone or full are dropped without affecting the others; a dropped
    /// viewer sees its stream end once it drains what was already queued.
    ///
    /// Returns the number of viewers the line was delivered to.
    pub fn push_new(&self, file: &MonitoredFile, line: &str) -> usize {
        let Some(event) = self.envelope(file, line) else {
            return 0;
        };

        let mut viewers = self.viewers.lock();
        let mut sent = 0;

        viewers.retain(|viewer| match viewer.tx.try_send(event.clone()) {
            Ok(()) => {
                sent += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(error = %Error::Delivery(viewer.id), "viewer fell behind, dropping");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(error = %Error::Delivery(viewer.id), "dropping viewer");
                false
            }
        });

        sent
    }

    pub fn disconnect(&self, id: ViewerId) -> bool {
        let mut viewers = self.viewers.lock();
        let before = viewers.len();
        viewers.retain(|viewer| viewer.id != id);
        let removed = viewers.len() != before;

        if removed {
            tracing::debug!(viewer = %id, "viewer disconnected");
        }
        removed
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.lock().len()
    }
}
