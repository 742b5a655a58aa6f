//! Drives line stores from filesystem events.
//!
//! One monitor task consumes every [`FileEvent`], so each [`LineStore`] has a
//! single writer. Removals are confirmed only after a grace delay, which lets a
//! rename-and-recreate (or delete-and-recreate) collapse into a plain refresh.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::events::{FileEvent, FileEventKind, MuxedEvents};
use crate::identity::MonitoredFile;
use crate::router::BroadcastRouter;
use crate::store::LineStore;

pub type SharedStore = Arc<RwLock<LineStore>>;

struct PendingRemoval {
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Debug)]
struct Expired {
    index: usize,
    generation: u64,
}

pub struct FileMonitor {
    events: MuxedEvents,
    router: Arc<BroadcastRouter>,
    files: Vec<MonitoredFile>,
    stores: Vec<SharedStore>,
    by_path: HashMap<PathBuf, Vec<usize>>,
    pending: HashMap<usize, PendingRemoval>,
    grace: Duration,
    next_generation: u64,
    expired_tx: mpsc::UnboundedSender<Expired>,
    expired_rx: mpsc::UnboundedReceiver<Expired>,
}

impl FileMonitor {
    /// `files` and `stores` must line up index for index.
    pub fn new(
        events: MuxedEvents,
        router: Arc<BroadcastRouter>,
        files: Vec<MonitoredFile>,
        stores: Vec<SharedStore>,
        grace: Duration,
    ) -> Self {
        debug_assert_eq!(files.len(), stores.len());
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();

        FileMonitor {
            events,
            router,
            files,
            stores,
            by_path: HashMap::new(),
            pending: HashMap::new(),
            grace,
            next_generation: 0,
            expired_tx,
            expired_rx,
        }
    }

    /// Starts watching the file at `index`. Watching it again is a no-op.
    pub fn watch(&mut self, index: usize) -> Result<PathBuf> {
        let path = self.events.add_file(self.files[index].path())?;

        let indices = self.by_path.entry(path.clone()).or_default();
        if !indices.contains(&index) {
            indices.push(index);
        }

        Ok(path)
    }

    /// Number of distinct paths being watched.
    pub fn watched(&self) -> usize {
        self.by_path.len()
    }

    /// Processes events until the watcher goes away.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.events.next_event() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                Some(expired) = self.expired_rx.recv() => self.handle_expired(expired),
            }
        }

        tracing::debug!("file monitor stopped");
    }

    fn handle_event(&mut self, event: FileEvent) {
        let Some(indices) = self.by_path.get(&event.path).cloned() else {
            return;
        };

        tracing::debug!(path = %event.path.display(), kind = ?event.kind, "file event");

        for index in indices {
            match event.kind {
                FileEventKind::Modified => self.on_modified(index),
                FileEventKind::Removed => self.on_removed(index),
            }
        }
    }

    fn on_modified(&mut self, index: usize) {
        // Only a file that is back under its name cancels a removal.
        if !self.files[index].path().exists() {
            self.on_removed(index);
            return;
        }
        self.cancel_removal(index);

        let file = &self.files[index];
        // Held across the broadcast so a connecting viewer sees either the
        // old state plus these lines live, or the new state as replay.
        let mut store = self.stores[index].write();

        match store.refresh(file.path()) {
            Ok(lines) => {
                let mut delivered = 0;
                for line in &lines {
                    if self.router.push_new(file, line) > 0 {
                        delivered += 1;
                    }
                }
                if !lines.is_empty() {
                    tracing::debug!(file = file.name(), new = lines.len(), delivered, "refreshed");
                }
            }
            Err(e) => tracing::warn!(file = file.name(), error = %e, "refresh failed"),
        }
    }

    fn on_removed(&mut self, index: usize) {
        if self.pending.contains_key(&index) {
            return;
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let tx = self.expired_tx.clone();
        let grace = self.grace;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx.send(Expired { index, generation });
        });

        self.pending.insert(index, PendingRemoval { generation, timer });
        self.stores[index].write().set_deletion_pending(true);
    }

    fn cancel_removal(&mut self, index: usize) {
        if let Some(pending) = self.pending.remove(&index) {
            pending.timer.abort();
            self.stores[index].write().set_deletion_pending(false);
            tracing::debug!(file = self.files[index].name(), "removal cancelled");
        }
    }

    fn handle_expired(&mut self, expired: Expired) {
        match self.pending.get(&expired.index) {
            Some(pending) if pending.generation == expired.generation => {
                self.pending.remove(&expired.index);
            }
            // Cancelled or superseded
            _ => return,
        }

        let file = &self.files[expired.index];
        let mut store = self.stores[expired.index].write();

        if file.path().exists() {
            store.set_deletion_pending(false);
            tracing::debug!(file = file.name(), "file reappeared within grace period");
        } else {
            store.mark_deleted();
            tracing::info!(file = file.name(), "file removed");
        }
    }
}

impl Drop for FileMonitor {
    fn drop(&mut self) {
        for pending in self.pending.values() {
            pending.timer.abort();
        }
    }
}
