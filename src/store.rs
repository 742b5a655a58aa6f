//! Per-file line storage and the delivery cursor.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// The lines read from one monitored file and how many have been delivered.
///
/// The stored sequence is the whole file split on `\n`, `\r\n` and `\r`. Its
/// final element is the unterminated remainder of the file (empty when the
/// file ends with a newline); that element is never delivered and the cursor
/// never moves past it. Every other element is a *settled* line.
///
/// The cursor is the index of the next settled line not yet delivered, or
/// `None` before the store has ever been read (or after the file was removed),
/// in which case every settled line is new. It only exceeds the number of
/// settled lines after the file shrank in place, and then nothing is new
/// until the file grows past it again.
#[derive(Clone, Debug, Default)]
pub struct LineStore {
    lines: Vec<String>,
    cursor: Option<usize>,
    deletion_pending: bool,
    detect_truncation: bool,
}

impl LineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat a file that shrank below the cursor as a brand new file.
    pub fn with_truncation_detection(mut self, enabled: bool) -> Self {
        self.detect_truncation = enabled;
        self
    }

    /// Reads the current content and marks all of it as already seen.
    pub fn initialize(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let lines = read_lines(path.as_ref())?;
        self.lines = lines;
        self.cursor = Some(self.settled_len());
        self.deletion_pending = false;
        Ok(())
    }

    /// Re-reads the file and returns the settled lines not yet delivered, in
    /// file order, advancing the cursor past them.
    ///
    /// On a read failure the store keeps its previous content and cursor.
    pub fn refresh(&mut self, path: impl AsRef<Path>) -> Result<Vec<String>> {
        let lines = read_lines(path.as_ref())?;
        let settled = lines.len().saturating_sub(1);

        // (first index to deliver, cursor afterwards)
        let (start, cursor) = match self.cursor {
            None => (0, settled),
            Some(cursor) if cursor > settled && self.detect_truncation => {
                tracing::debug!(
                    path = %path.as_ref().display(),
                    cursor,
                    settled,
                    "file shrank below cursor, treating as new"
                );
                (0, settled)
            }
            // Shrunk: nothing is new until the file grows past the cursor.
            Some(cursor) if cursor > settled => (settled, cursor),
            Some(cursor) => (cursor, settled),
        };

        let new_lines = lines[start..settled].to_vec();

        self.lines = lines;
        self.cursor = Some(cursor);
        self.deletion_pending = false;

        Ok(new_lines)
    }

    /// Up to the last `n` settled lines, oldest first.
    pub fn snapshot_tail(&self, n: usize) -> Vec<String> {
        let settled = &self.lines[..self.settled_len()];
        settled[settled.len().saturating_sub(n)..].to_vec()
    }

    pub fn mark_deleted(&mut self) {
        self.lines.clear();
        self.cursor = None;
        self.deletion_pending = false;
    }

    pub fn set_deletion_pending(&mut self, pending: bool) {
        self.deletion_pending = pending;
    }

    pub fn is_deletion_pending(&self) -> bool {
        self.deletion_pending
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Length of the stored sequence, including the unterminated remainder.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn settled_len(&self) -> usize {
        self.lines.len().saturating_sub(1)
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(path).map_err(|e| Error::read(path, e))?;
    Ok(split_lines(&String::from_utf8_lossy(&bytes)))
}

/// Splits on `\r\n`, `\r` or `\n`. Always yields at least one element.
pub(crate) fn split_lines(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                lines.push(std::mem::take(&mut current));
            }
            '\n' => lines.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    lines.push(current);

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::write(path, content).unwrap();
    }

    fn append(path: &Path, content: &str) {
        let mut f = fs::OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_split_lines() {
        assert_eq!(split_lines(""), vec![""]);
        assert_eq!(split_lines("a\nb\n"), vec!["a", "b", ""]);
        assert_eq!(split_lines("a\r\nb\rc"), vec!["a", "b", "c"]);
        assert_eq!(split_lines("a\n\nb"), vec!["a", "", "b"]);
        assert_eq!(split_lines("\r\n"), vec!["", ""]);
    }

    #[test]
    fn test_initialize_marks_existing_as_seen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        write(&path, "L1\nL2\n");

        let mut store = LineStore::new();
        store.initialize(&path).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.cursor(), Some(2));

        // Nothing changed, nothing new.
        assert!(store.refresh(&path).unwrap().is_empty());

        append(&path, "L3\n");
        assert_eq!(store.refresh(&path).unwrap(), vec!["L3"]);
        assert_eq!(store.cursor(), Some(3));

        append(&path, "L4\nL5\n");
        assert_eq!(store.refresh(&path).unwrap(), vec!["L4", "L5"]);
        assert!(store.refresh(&path).unwrap().is_empty());
    }

    #[test]
    fn test_initialize_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut store = LineStore::new();
        let err = store.initialize(dir.path().join("nope.txt")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
        assert_eq!(store.cursor(), None);
    }

    #[test]
    fn test_partial_line_delivered_once_terminated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        write(&path, "");

        let mut store = LineStore::new();
        store.initialize(&path).unwrap();

        append(&path, "foo");
        assert!(store.refresh(&path).unwrap().is_empty());
        append(&path, " bar\n");
        assert_eq!(store.refresh(&path).unwrap(), vec!["foo bar"]);
    }

    #[test]
    fn test_empty_lines_are_counted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        write(&path, "L1\n");

        let mut store = LineStore::new();
        store.initialize(&path).unwrap();

        append(&path, "\n\nL2\n");
        assert_eq!(store.refresh(&path).unwrap(), vec!["", "", "L2"]);
        append(&path, "L3\n");
        assert_eq!(store.refresh(&path).unwrap(), vec!["L3"]);
    }

    #[test]
    fn test_refresh_read_error_keeps_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        write(&path, "L1\nL2\n");

        let mut store = LineStore::new();
        store.initialize(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert!(store.refresh(&path).is_err());
        assert_eq!(store.cursor(), Some(2));
        assert_eq!(store.snapshot_tail(10), vec!["L1", "L2"]);
    }

    #[test]
    fn test_snapshot_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("b.txt");
        write(&path, "1\n2\n3\n4\n5\n");

        let mut store = LineStore::new();
        assert!(store.snapshot_tail(3).is_empty());
        store.initialize(&path).unwrap();

        assert_eq!(store.snapshot_tail(2), vec!["4", "5"]);
        assert_eq!(store.snapshot_tail(0), Vec::<String>::new());
        assert_eq!(store.snapshot_tail(50).len(), 5);
        // Pure read
        assert_eq!(store.cursor(), Some(5));

        // The unterminated remainder is not part of the replay.
        append(&path, "6");
        store.refresh(&path).unwrap();
        assert_eq!(store.snapshot_tail(2), vec!["4", "5"]);
    }

    #[test]
    fn test_mark_deleted_redelivers_recreated_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        write(&path, "old\n");

        let mut store = LineStore::new();
        store.initialize(&path).unwrap();
        store.set_deletion_pending(true);
        store.mark_deleted();
        assert!(store.is_empty());
        assert_eq!(store.cursor(), None);
        assert!(!store.is_deletion_pending());

        write(&path, "new1\nnew2\n");
        assert_eq!(store.refresh(&path).unwrap(), vec!["new1", "new2"]);
    }

    #[test]
    fn test_truncation_without_detection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        write(&path, "1\n2\n3\n4\n");

        let mut store = LineStore::new();
        store.initialize(&path).unwrap();

        write(&path, "x\n");
        assert!(store.refresh(&path).unwrap().is_empty());
        assert_eq!(store.cursor(), Some(4));
        assert_eq!(store.snapshot_tail(10), vec!["x"]);

        append(&path, "y\n");
        assert!(store.refresh(&path).unwrap().is_empty());

        // Only what lands past the old position is picked up.
        append(&path, "z\nw\nv\n");
        assert_eq!(store.refresh(&path).unwrap(), vec!["v"]);
        assert_eq!(store.cursor(), Some(5));
    }

    #[test]
    fn test_rewrite_with_same_content_is_not_redelivered() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        write(&path, "L1\nL2\n");

        let mut store = LineStore::new();
        store.initialize(&path).unwrap();

        // Observed half-way through a re-creation.
        write(&path, "");
        assert!(store.refresh(&path).unwrap().is_empty());
        write(&path, "L1\nL2\n");
        assert!(store.refresh(&path).unwrap().is_empty());
        append(&path, "L3\n");
        assert_eq!(store.refresh(&path).unwrap(), vec!["L3"]);
    }

    #[test]
    fn test_truncation_with_detection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        write(&path, "1\n2\n3\n4\n");

        let mut store = LineStore::new().with_truncation_detection(true);
        store.initialize(&path).unwrap();

        write(&path, "x\n");
        assert_eq!(store.refresh(&path).unwrap(), vec!["x"]);
    }
}
