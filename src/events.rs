//! Everything related to watching monitored files for modifications,
//! deletions and renames.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{self, Debug, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task;
use std::time::Duration;

use futures_util::ready;
use futures_util::stream::{Stream as FuturesStream, StreamExt};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, Watcher};
use tokio::sync::mpsc;

use crate::config::WatchMode;
use crate::error::{Error, Result};

/// What happened to a monitored file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileEventKind {
    /// Created, appended to or otherwise modified.
    Modified,
    /// Deleted or renamed away. May be followed by a re-creation.
    Removed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileEvent {
    /// Absolutized path, as returned from [`MuxedEvents::add_file`].
    pub path: PathBuf,
    pub kind: FileEventKind,
}

/// Manages filesystem watches for a set of files, and can be polled to
/// receive classified events for them.
///
/// The parent directory of each file is watched rather than the file itself,
/// so that deletions, renames and re-creations stay observable. A file that
/// is a symlink also has the parent of its target watched, with events there
/// reported under the configured path. Events for any other entry in those
/// directories are dropped.
pub struct MuxedEvents {
    inner: Box<dyn Watcher + Send>,
    watched_directories: HashSet<PathBuf>,
    /// Observed path → configured (absolutized) paths it reports for.
    watched_files: HashMap<PathBuf, Vec<PathBuf>>,
    queued: VecDeque<FileEvent>,
    event_stream: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
}

impl Debug for MuxedEvents {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("MuxedEvents")
            .field("watched_directories", &self.watched_directories)
            .field("watched_files", &self.watched_files)
            .field("queued", &self.queued)
            .finish()
    }
}

impl MuxedEvents {
    /// Constructs a new `MuxedEvents` backed by the platform's native
    /// notification mechanism, or by polling every `poll_interval`.
    pub fn new(mode: WatchMode, poll_interval: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = move |res: notify::Result<notify::Event>| {
            // The only way `send` can fail is if the receiver is dropped,
            // and `MuxedEvents` controls both.
            let _ = tx.send(res);
        };

        let inner: Box<dyn Watcher + Send> = match mode {
            WatchMode::Native => Box::new(
                notify::RecommendedWatcher::new(handler, notify::Config::default())
                    .map_err(|e| Error::watch_setup("<watcher>", e))?,
            ),
            WatchMode::Poll => Box::new(
                notify::PollWatcher::new(
                    handler,
                    notify::Config::default()
                        .with_poll_interval(poll_interval)
                        .with_compare_contents(true),
                )
                .map_err(|e| Error::watch_setup("<watcher>", e))?,
            ),
        };

        Ok(MuxedEvents {
            inner,
            watched_directories: HashSet::new(),
            watched_files: HashMap::new(),
            queued: VecDeque::new(),
            event_stream: rx,
        })
    }

    fn add_directory(&mut self, path: &Path) -> Result<()> {
        if self.watched_directories.contains(path) {
            return Ok(());
        }

        self.inner
            .watch(path, notify::RecursiveMode::NonRecursive)
            .map_err(|e| Error::watch_setup(path, e))?;
        self.watched_directories.insert(path.to_path_buf());

        Ok(())
    }

    /// Adds a given file to the event watch. The file does not need to exist
    /// yet, but its parent directory does.
    ///
    /// Returns the absolutized version of the path originally supplied, to
    /// match against the one contained in each [`FileEvent`]. Registering an
    /// already watched path is a no-op.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let original = path.as_ref();
        let path = absolutify(original).map_err(|e| Error::watch_setup(original, e))?;

        if path.is_dir() {
            return Err(Error::watch_setup(path, "is a directory"));
        }

        if self.is_watched(&path) {
            return Ok(path);
        }

        self.observe(&path, &path)?;

        // Follow a symlink to where the writes actually land. The target is
        // resolved once, when the file is added.
        if let Ok(target) = fs::canonicalize(&path) {
            if target != path {
                match self.observe(&target, &path) {
                    Ok(()) => tracing::debug!(
                        path = %path.display(),
                        target = %target.display(),
                        "following symlink"
                    ),
                    Err(e) => tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "symlink target not watchable"
                    ),
                }
            }
        }

        tracing::debug!(path = %path.display(), "watching");

        Ok(path)
    }

    /// Watches the parent of `observed` and reports its events as `reported`.
    fn observe(&mut self, observed: &Path, reported: &Path) -> Result<()> {
        let parent = observed
            .parent()
            .ok_or_else(|| Error::watch_setup(observed, "no parent directory"))?
            .to_path_buf();
        self.add_directory(&parent)?;

        let reports = self.watched_files.entry(observed.to_path_buf()).or_default();
        if !reports.iter().any(|p| p == reported) {
            reports.push(reported.to_path_buf());
        }

        Ok(())
    }

    /// Whether `path` was registered through [`add_file`](Self::add_file).
    pub fn is_watched(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        self.watched_files
            .get(path)
            .map_or(false, |reports| reports.iter().any(|p| p == path))
    }

    fn handle_result(&mut self, res: notify::Result<notify::Event>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "filesystem watch error");
                return;
            }
        };

        for (path, kind) in classify(&event.kind, &event.paths) {
            if let Some(reports) = self.watched_files.get(&path) {
                for reported in reports {
                    self.queued.push_back(FileEvent {
                        path: reported.clone(),
                        kind,
                    });
                }
            }
        }
    }

    /// Waits for the next event on a watched file.
    pub async fn next_event(&mut self) -> Option<FileEvent> {
        self.next().await
    }
}

impl FuturesStream for MuxedEvents {
    type Item = FileEvent;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(event) = this.queued.pop_front() {
                return task::Poll::Ready(Some(event));
            }

            match ready!(this.event_stream.poll_recv(cx)) {
                Some(res) => this.handle_result(res),
                None => return task::Poll::Ready(None),
            }
        }
    }
}

/// Maps a raw notify event onto per-path [`FileEventKind`]s.
pub(crate) fn classify(kind: &EventKind, paths: &[PathBuf]) -> Vec<(PathBuf, FileEventKind)> {
    use FileEventKind::{Modified, Removed};

    let by_existence = |path: &PathBuf| {
        if path.exists() {
            (path.clone(), Modified)
        } else {
            (path.clone(), Removed)
        }
    };

    match kind {
        // A writer holding an unlinked file open keeps producing these under
        // the old name; they must not read as a re-creation.
        EventKind::Create(_) => paths.iter().map(by_existence).collect(),
        EventKind::Remove(_) => paths.iter().map(|p| (p.clone(), Removed)).collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => paths.iter().map(|p| (p.clone(), Removed)).collect(),
            RenameMode::To => paths.iter().map(|p| (p.clone(), Modified)).collect(),
            RenameMode::Both => paths
                .iter()
                .enumerate()
                .map(|(i, p)| (p.clone(), if i == 0 { Removed } else { Modified }))
                .collect(),
            RenameMode::Any | RenameMode::Other => paths.iter().map(by_existence).collect(),
        },
        EventKind::Modify(_) => paths.iter().map(by_existence).collect(),
        EventKind::Any => paths.iter().map(by_existence).collect(),
        EventKind::Access(_) | EventKind::Other => Vec::new(),
    }
}

/// Canonicalizes the parent directory of `path`, leaving the file name as is
/// since the file itself may not exist.
fn absolutify(path: &Path) -> io::Result<PathBuf> {
    let parent = match path.parent() {
        None => std::env::current_dir()?,
        Some(parent) if parent == Path::new("") => std::env::current_dir()?,
        Some(parent) => parent.to_path_buf(),
    };
    let filename = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Filename not found in path"))?;

    let parent = parent.canonicalize().unwrap_or(parent);

    Ok(parent.join(filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn watcher() -> MuxedEvents {
        MuxedEvents::new(WatchMode::Native, Duration::from_millis(50)).unwrap()
    }

    #[test]
    fn test_classify() {
        use FileEventKind::{Modified, Removed};
        let tmp_dir = TempDir::new().unwrap();
        let a = tmp_dir.path().join("a.txt");
        let b = tmp_dir.path().join("b.txt");
        fs::write(&a, "").unwrap();
        fs::write(&b, "").unwrap();

        assert_eq!(
            classify(&EventKind::Create(CreateKind::File), &[a.clone()]),
            vec![(a.clone(), Modified)]
        );
        assert_eq!(
            classify(
                &EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &[a.clone()]
            ),
            vec![(a.clone(), Modified)]
        );
        assert_eq!(
            classify(&EventKind::Remove(RemoveKind::File), &[a.clone()]),
            vec![(a.clone(), Removed)]
        );
        assert_eq!(
            classify(
                &EventKind::Modify(ModifyKind::Name(RenameMode::From)),
                &[a.clone()]
            ),
            vec![(a.clone(), Removed)]
        );
        assert_eq!(
            classify(
                &EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &[a.clone(), b.clone()]
            ),
            vec![(a.clone(), Removed), (b, Modified)]
        );
        assert!(classify(&EventKind::Access(AccessKind::Any), &[a.clone()]).is_empty());
    }

    #[test]
    fn test_classify_missing_path_as_removed() {
        use FileEventKind::Removed;
        let tmp_dir = TempDir::new().unwrap();
        let gone = tmp_dir.path().join("gone.txt");

        // Writes through a handle to an unlinked file
        assert_eq!(
            classify(
                &EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &[gone.clone()]
            ),
            vec![(gone.clone(), Removed)]
        );
        assert_eq!(
            classify(&EventKind::Create(CreateKind::File), &[gone.clone()]),
            vec![(gone.clone(), Removed)]
        );
        assert_eq!(
            classify(
                &EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
                &[gone.clone()]
            ),
            vec![(gone, Removed)]
        );
    }

    #[tokio::test]
    async fn test_add_directory() {
        let tmp_dir = TempDir::new().unwrap();
        let mut events = watcher();
        assert!(matches!(
            events.add_file(tmp_dir.path()),
            Err(Error::WatchSetup { .. })
        ));
    }

    #[tokio::test]
    async fn test_add_bad_filename() {
        let tmp_dir = TempDir::new().unwrap();
        let mut events = watcher();

        // This is not okay
        assert!(events.add_file(tmp_dir.path().join("..")).is_err());
    }

    #[tokio::test]
    async fn test_add_missing_parent() {
        let tmp_dir = TempDir::new().unwrap();
        let mut events = watcher();
        let path = tmp_dir.path().join("nope").join("a.txt");
        assert!(events.add_file(path).is_err());
    }

    #[tokio::test]
    async fn test_add_file_is_idempotent() {
        let tmp_dir = TempDir::new().unwrap();
        let path1 = tmp_dir.path().join("missing_file1.txt");
        let path2 = tmp_dir.path().join("missing_file2.txt");

        let mut events = watcher();
        let abs1 = events.add_file(&path1).unwrap();
        events.add_file(&path2).unwrap();

        // Registering the same path again should be fine
        assert_eq!(events.add_file(&path1).unwrap(), abs1);

        assert_eq!(events.watched_files.len(), 2);
        assert_eq!(events.watched_directories.len(), 1);
        assert!(events.is_watched(&abs1));
    }

    async fn expect_event(events: &mut MuxedEvents, path: &Path, kind: FileEventKind) {
        loop {
            let event = timeout(Duration::from_secs(2), events.next_event())
                .await
                .expect("timed out waiting for event")
                .expect("event stream ended");
            if event.path == path && event.kind == kind {
                return;
            }
        }
    }

    async fn modify_then_remove(mode: WatchMode) {
        let tmp_dir = TempDir::new().unwrap();
        let path = tmp_dir.path().join("a.txt");
        let other = tmp_dir.path().join("unwatched.txt");
        fs::write(&path, "L1\n").unwrap();

        let mut events = MuxedEvents::new(mode, Duration::from_millis(50)).unwrap();
        let abs = events.add_file(&path).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&other, "ignored\n").unwrap();
        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"L2\n").unwrap();
        f.sync_all().unwrap();
        drop(f);
        expect_event(&mut events, &abs, FileEventKind::Modified).await;

        fs::remove_file(&path).unwrap();
        expect_event(&mut events, &abs, FileEventKind::Removed).await;

        while let Ok(Some(event)) = timeout(Duration::from_millis(200), events.next_event()).await {
            assert_eq!(event.path, abs);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_file_reports_target_writes() {
        let tmp_dir = TempDir::new().unwrap();
        fs::create_dir(tmp_dir.path().join("real")).unwrap();
        fs::create_dir(tmp_dir.path().join("links")).unwrap();
        let target = tmp_dir.path().join("real").join("app.log");
        let link = tmp_dir.path().join("links").join("app.log");
        fs::write(&target, "L1\n").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let mut events = watcher();
        let abs = events.add_file(&link).unwrap();
        assert!(events.is_watched(&abs));
        assert!(!events.is_watched(fs::canonicalize(&target).unwrap()));
        assert_eq!(events.watched_directories.len(), 2);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut f = fs::OpenOptions::new().append(true).open(&target).unwrap();
        f.write_all(b"L2\n").unwrap();
        f.sync_all().unwrap();
        drop(f);

        expect_event(&mut events, &abs, FileEventKind::Modified).await;
    }

    #[tokio::test]
    async fn test_native_modify_and_remove() {
        modify_then_remove(WatchMode::Native).await;
    }

    #[tokio::test]
    async fn test_poll_modify_and_remove() {
        modify_then_remove(WatchMode::Poll).await;
    }
}
