//! Snapshot reconciliation: diffing the tracked file set against disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::queue::EventQueue;

/// Type of file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    /// File appeared since the previous pass (or was present at startup).
    Added,
    /// File's modification time moved past the tolerance window.
    Modified,
    /// File was present in the previous pass and is now gone.
    Deleted,
}

/// A file change detected by the watcher.
///
/// Immutable value; produced by the scan pass, consumed exactly once by the
/// scheduler through the [`EventQueue`].
#[derive(Debug, Clone)]
pub struct FileChangeEvent {
    /// Path to the changed file.
    pub path: PathBuf,
    /// Type of change.
    pub kind: FileChangeKind,
    /// When the change was observed.
    pub timestamp: SystemTime,
}

/// Last-seen state of one tracked file. Owned exclusively by the scan pass.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Modification time at the last sighting.
    pub modified: SystemTime,
    /// Size at the last sighting.
    pub size: u64,
    /// Cleared at the start of each pass, set when the file is listed.
    seen: bool,
}

/// The watcher's snapshot map plus the reconciliation pass.
///
/// Separate from the thread wrapper so the pass can be driven synchronously
/// by tests and one-shot builds.
pub struct ScanState {
    records: HashMap<PathBuf, FileRecord>,
}

impl ScanState {
    /// Empty snapshot. The first pass emits `Added` for every existing file,
    /// which seeds the pipeline instead of a separate initial-import step.
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Number of files currently tracked.
    pub fn tracked_count(&self) -> usize {
        self.records.len()
    }

    /// True if `path` is currently tracked.
    pub fn is_tracked(&self, path: &Path) -> bool {
        self.records.contains_key(path)
    }

    /// Run one full reconciliation pass over `roots`.
    ///
    /// Every tracked record is either refreshed (seen on disk) or removed
    /// with a `Deleted` event before the pass ends. Individual entries that
    /// fail to stat are skipped; a root that cannot be enumerated at all
    /// logs a warning and is retried on the next pass.
    pub fn poll_once(&mut self, roots: &[PathBuf], tolerance: Duration, queue: &EventQueue) {
        for record in self.records.values_mut() {
            record.seen = false;
        }

        let drops_before = queue.dropped_count();

        for root in roots {
            if let Err(e) = self.walk(root, tolerance, queue) {
                log::warn!("failed to enumerate watch root {:?}: {}", root, e);
            }
        }

        // Anything not re-marked by the walk no longer exists on disk.
        let now = SystemTime::now();
        let removed: Vec<PathBuf> = self
            .records
            .iter()
            .filter(|(_, r)| !r.seen)
            .map(|(p, _)| p.clone())
            .collect();

        for path in removed {
            self.records.remove(&path);
            queue.push(FileChangeEvent {
                path,
                kind: FileChangeKind::Deleted,
                timestamp: now,
            });
        }

        let dropped = queue.dropped_count() - drops_before;
        if dropped > 0 {
            log::warn!(
                "event queue overflow: dropped {} events this pass ({} total)",
                dropped,
                queue.dropped_count()
            );
        }
    }

    fn walk(&mut self, dir: &Path, tolerance: Duration, queue: &EventQueue) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            // A single unreadable entry must not abort the pass.
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::debug!("skipping unreadable entry under {:?}: {}", dir, e);
                    continue;
                }
            };

            let path = entry.path();
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    log::debug!("skipping {:?}: {}", path, e);
                    continue;
                }
            };

            if meta.is_dir() {
                // Directories can disappear mid-scan; skip and continue.
                if let Err(e) = self.walk(&path, tolerance, queue) {
                    log::debug!("skipping subdirectory {:?}: {}", path, e);
                }
                continue;
            }
            if !meta.is_file() {
                continue;
            }

            let modified = match meta.modified() {
                Ok(m) => m,
                Err(e) => {
                    log::debug!("no modification time for {:?}: {}", path, e);
                    continue;
                }
            };
            let size = meta.len();
            let now = SystemTime::now();

            match self.records.get_mut(&path) {
                None => {
                    self.records.insert(
                        path.clone(),
                        FileRecord {
                            modified,
                            size,
                            seen: true,
                        },
                    );
                    queue.push(FileChangeEvent {
                        path,
                        kind: FileChangeKind::Added,
                        timestamp: now,
                    });
                }
                Some(record) => {
                    record.seen = true;
                    // Tolerance absorbs filesystem timestamp quantization.
                    if time_delta(modified, record.modified) > tolerance {
                        record.modified = modified;
                        record.size = size;
                        queue.push(FileChangeEvent {
                            path,
                            kind: FileChangeKind::Modified,
                            timestamp: now,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for ScanState {
    fn default() -> Self {
        Self::new()
    }
}

/// Absolute difference between two timestamps.
fn time_delta(a: SystemTime, b: SystemTime) -> Duration {
    a.duration_since(b)
        .or_else(|_| b.duration_since(a))
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn drain(queue: &EventQueue) -> Vec<FileChangeEvent> {
        let mut events = Vec::new();
        while let Some(e) = queue.pop() {
            events.push(e);
        }
        events
    }

    #[test]
    fn test_initial_scan_emits_added_for_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("textures")).unwrap();
        fs::write(dir.path().join("textures/icon.png"), b"png").unwrap();
        fs::write(dir.path().join("hero.mesh"), b"mesh").unwrap();

        let queue = EventQueue::new(64);
        let mut scan = ScanState::new();
        scan.poll_once(
            &[dir.path().to_path_buf()],
            Duration::from_millis(4),
            &queue,
        );

        let events = drain(&queue);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == FileChangeKind::Added));
        assert_eq!(scan.tracked_count(), 2);
    }

    #[test]
    fn test_second_scan_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("icon.png"), b"png").unwrap();

        let queue = EventQueue::new(64);
        let mut scan = ScanState::new();
        let roots = vec![dir.path().to_path_buf()];
        let tolerance = Duration::from_millis(4);

        scan.poll_once(&roots, tolerance, &queue);
        assert_eq!(drain(&queue).len(), 1);

        scan.poll_once(&roots, tolerance, &queue);
        assert!(drain(&queue).is_empty());
    }

    #[test]
    fn test_modification_is_detected_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("icon.png");
        fs::write(&file, b"v1").unwrap();

        let queue = EventQueue::new(64);
        let mut scan = ScanState::new();
        let roots = vec![dir.path().to_path_buf()];
        let tolerance = Duration::from_millis(4);

        scan.poll_once(&roots, tolerance, &queue);
        drain(&queue);

        // Move the mtime well past the tolerance window.
        let new_time = SystemTime::now() + Duration::from_secs(60);
        let file_handle = fs::File::options().write(true).open(&file).unwrap();
        file_handle.set_modified(new_time).unwrap();
        drop(file_handle);

        scan.poll_once(&roots, tolerance, &queue);
        let events = drain(&queue);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, FileChangeKind::Modified);
        assert_eq!(events[0].path, file);

        // No residual event on the next pass.
        scan.poll_once(&roots, tolerance, &queue);
        assert!(drain(&queue).is_empty());
    }

    #[test]
    fn test_deletion_yields_one_event_and_clears_record() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("icon.png");
        fs::write(&file, b"png").unwrap();

        let queue = EventQueue::new(64);
        let mut scan = ScanState::new();
        let roots = vec![dir.path().to_path_buf()];
        let tolerance = Duration::from_millis(4);

        scan.poll_once(&roots, tolerance, &queue);
        drain(&queue);

        fs::remove_file(&file).unwrap();
        scan.poll_once(&roots, tolerance, &queue);

        let events = drain(&queue);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, FileChangeKind::Deleted);
        assert_eq!(events[0].path, file);
        assert!(!scan.is_tracked(&file));

        scan.poll_once(&roots, tolerance, &queue);
        assert!(drain(&queue).is_empty());
    }

    #[test]
    fn test_missing_root_does_not_abort_pass() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("icon.png"), b"png").unwrap();

        let queue = EventQueue::new(64);
        let mut scan = ScanState::new();
        let roots = vec![PathBuf::from("/nonexistent/kiln-root"), dir.path().to_path_buf()];

        scan.poll_once(&roots, Duration::from_millis(4), &queue);
        assert_eq!(drain(&queue).len(), 1);
    }
}
