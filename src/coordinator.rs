//! Startup wiring and the viewer entry point.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::censor::Censor;
use crate::config::Config;
use crate::error::Result;
use crate::events::MuxedEvents;
use crate::identity::{IdentityRegistry, MonitoredFile};
use crate::monitor::{FileMonitor, SharedStore};
use crate::router::{BroadcastRouter, Viewer, ViewerId};
use crate::severity::Classifier;
use crate::store::LineStore;

/// Owns the monitored files, their line stores and the router.
///
/// ```no_run
/// use livelog::{Config, Coordinator};
///
/// # async fn run() -> livelog::Result<()> {
/// let config = Config::load("livelog.json")?;
/// let coordinator = Coordinator::new(config)?;
/// let _monitor = coordinator.start()?;
///
/// let mut viewer = coordinator.connect();
/// while let Some(event) = viewer.recv().await {
///     println!("{}", event.to_json());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Coordinator {
    config: Config,
    identities: IdentityRegistry,
    files: Vec<MonitoredFile>,
    stores: Vec<SharedStore>,
    router: Arc<BroadcastRouter>,
}

/// The running monitor task. Dropping the handle does not stop it.
#[derive(Debug)]
pub struct MonitorHandle {
    task: JoinHandle<()>,
    watched: usize,
}

impl MonitorHandle {
    /// Number of distinct paths successfully watched.
    pub fn watched(&self) -> usize {
        self.watched
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Coordinator {
    /// Validates the configuration, compiles patterns and reads the current
    /// content of every file.
    ///
    /// Only configuration problems fail here. A file that cannot be read is
    /// logged and starts out empty; it is still watched once started.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let censor = Censor::new(config.censor_pattern.as_deref())?;
        let classifier = Classifier::new(&config.severity_patterns, config.enable_colors)?;
        let router = Arc::new(
            BroadcastRouter::new(censor, classifier, config.playback_buffer)
                .with_queue_capacity(config.viewer_queue),
        );

        let identities = IdentityRegistry::new();
        let mut files = Vec::with_capacity(config.files.len());
        let mut stores = Vec::with_capacity(config.files.len());

        for path in &config.files {
            let file = MonitoredFile::new(&identities, path);
            let mut store = LineStore::new().with_truncation_detection(config.detect_truncation);

            match store.initialize(file.path()) {
                Ok(()) => tracing::info!(
                    file = file.name(),
                    id = %file.id(),
                    lines = store.len().saturating_sub(1),
                    "loaded"
                ),
                Err(e) => tracing::warn!(file = file.name(), error = %e, "initial read failed"),
            }

            files.push(file);
            stores.push(Arc::new(RwLock::new(store)));
        }

        Ok(Coordinator {
            config,
            identities,
            files,
            stores,
            router,
        })
    }

    /// Registers a watch for every file and spawns the monitor task.
    ///
    /// Must be called from within a Tokio runtime. A file whose watch cannot
    /// be set up is logged and left unmonitored.
    pub fn start(&self) -> Result<MonitorHandle> {
        let events = MuxedEvents::new(self.config.watch_mode, self.config.poll_interval())?;
        let mut monitor = FileMonitor::new(
            events,
            Arc::clone(&self.router),
            self.files.clone(),
            self.stores.clone(),
            self.config.removal_grace(),
        );

        for (index, file) in self.files.iter().enumerate() {
            if let Err(e) = monitor.watch(index) {
                tracing::warn!(file = file.name(), error = %e, "not monitoring");
            }
        }

        let watched = monitor.watched();
        tracing::info!(
            watched,
            configured = self.files.len(),
            mode = ?self.config.watch_mode,
            "monitoring started"
        );

        Ok(MonitorHandle {
            task: tokio::spawn(monitor.run()),
            watched,
        })
    }

    /// Connects a new viewer: handshake, replay, then live lines.
    pub fn connect(&self) -> Viewer {
        // Every store is held for the whole connect so no refresh can slip
        // between the replay and the registration.
        let guards: Vec<_> = self.stores.iter().map(|store| store.read()).collect();
        let stores: Vec<&LineStore> = guards.iter().map(|guard| &**guard).collect();

        self.router.connect(&self.files, &stores)
    }

    pub fn disconnect(&self, id: ViewerId) -> bool {
        self.router.disconnect(id)
    }

    pub fn files(&self) -> &[MonitoredFile] {
        &self.files
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    pub fn router(&self) -> &Arc<BroadcastRouter> {
        &self.router
    }
}
