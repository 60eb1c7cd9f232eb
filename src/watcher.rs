use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;

use notify::event::EventKind;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::filescanner::FileScanner;
use crate::fstools::{canonical_path, classify_file, file_size, DirEntryCategory};

/// Reports convertible files that appear in the watched directories.
///
/// Filesystem events only nominate candidates. A candidate is reported once
/// its size is unchanged between two polls, so files still being copied in
/// are left alone.
pub struct FolderWatcher {
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    scanner: FileScanner,
    interval: Duration,
    known: HashSet<PathBuf>,
    /// Candidates and the size seen at the last poll, if any.
    pending: HashMap<PathBuf, Option<u64>>,
}

impl FolderWatcher {
    pub fn new(dirs: &[PathBuf], scanner: FileScanner, interval: Duration) -> notify::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            NotifyConfig::default(),
        )?;
        for dir in dirs {
            watcher.watch(&canonical_path(dir), RecursiveMode::Recursive)?;
        }

        Ok(FolderWatcher {
            _watcher: watcher,
            events: rx,
            scanner,
            interval,
            known: HashSet::new(),
            pending: HashMap::new(),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Never report `path`, e.g. because it is already queued or is one of our outputs.
    pub fn ignore(&mut self, path: &Path) {
        let path = canonical_path(path);
        self.pending.remove(&path);
        self.known.insert(path);
    }

    /// Files that settled since the last call.
    pub fn poll(&mut self) -> Vec<PathBuf> {
        self.drain_events();

        let mut ready = vec![];
        let mut vanished = vec![];
        for (path, last_size) in self.pending.iter_mut() {
            match (file_size(path), *last_size) {
                (None, _) => vanished.push(path.clone()),
                (Some(size), Some(previous)) if size == previous => ready.push(path.clone()),
                (Some(size), _) => {
                    debug!("{:?} is new or still growing ({} bytes)", path, size);
                    *last_size = Some(size);
                },
            }
        }
        for path in vanished {
            self.pending.remove(&path);
        }
        for path in &ready {
            self.pending.remove(path);
            self.known.insert(path.clone());
        }
        ready.sort();
        ready
    }

    fn drain_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(Ok(event)) => {
                    if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        for path in event.paths {
                            self.nominate(&path);
                        }
                    }
                },
                Ok(Err(err)) => warn!("folder watch error: {}", err),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("folder watch stopped delivering events");
                    break;
                },
            }
        }
    }

    fn nominate(&mut self, path: &Path) {
        let candidates = match classify_file(path) {
            // a folder moved in at once only produces an event for itself
            DirEntryCategory::Directory => self.scanner.scan(path),
            DirEntryCategory::RegularFile if self.scanner.accepts(path) => vec![path.to_path_buf()],
            _ => vec![],
        };
        for candidate in candidates {
            let candidate = canonical_path(&candidate);
            if !self.known.contains(&candidate) {
                self.pending.entry(candidate).or_insert(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;
    use std::time::Instant;

    const EVENT_DEADLINE: Duration = Duration::from_secs(5);

    fn watcher(dir: &Path) -> FolderWatcher {
        FolderWatcher::new(
            &[dir.to_path_buf()],
            FileScanner::new(&[String::from("avi"), String::from("mp4")]),
            Duration::from_millis(50)).unwrap()
    }

    fn root(dir: &tempfile::TempDir) -> PathBuf {
        fs::canonicalize(dir.path()).unwrap()
    }

    fn poll_until_ready(w: &mut FolderWatcher) -> Vec<PathBuf> {
        let started = Instant::now();
        while started.elapsed() < EVENT_DEADLINE {
            let ready = w.poll();
            if !ready.is_empty() {
                return ready;
            }
            thread::sleep(w.interval());
        }
        vec![]
    }

    fn wait_for_pending(w: &mut FolderWatcher, path: &Path, size: u64) {
        let started = Instant::now();
        loop {
            assert!(w.poll().is_empty());
            if w.pending.get(path) == Some(&Some(size)) {
                return;
            }
            assert!(started.elapsed() < EVENT_DEADLINE, "{:?} never became a candidate", path);
            thread::sleep(w.interval());
        }
    }

    #[test]
    fn test_reports_settled_files_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = watcher(dir.path());
        assert!(w.poll().is_empty());

        let file = root(&dir).join("new.avi");
        fs::write(&file, b"1234").unwrap();
        assert_eq!(poll_until_ready(&mut w), vec![file.clone()]);

        fs::write(&file, b"12345678").unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(w.poll().is_empty());
        assert!(w.poll().is_empty());
    }

    #[test]
    fn test_growing_file_waits() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = watcher(dir.path());
        let file = root(&dir).join("copying.avi");
        fs::write(&file, b"12").unwrap();
        wait_for_pending(&mut w, &file, 2);

        fs::write(&file, b"1234").unwrap();
        assert!(w.poll().is_empty());
        assert_eq!(w.poll(), vec![file]);
    }

    #[test]
    fn test_new_subfolder() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = watcher(dir.path());
        let file = root(&dir).join("season1/e01.avi");
        fs::create_dir(root(&dir).join("season1")).unwrap();
        fs::write(&file, b"data").unwrap();
        assert_eq!(poll_until_ready(&mut w), vec![file]);
    }

    #[test]
    fn test_ignored_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = watcher(dir.path());
        let output = dir.path().join("clip.mp4");
        w.ignore(&output);
        fs::write(&output, b"data").unwrap();
        fs::write(dir.path().join("notes.txt"), b"data").unwrap();
        for _ in 0..10 {
            thread::sleep(w.interval());
            assert!(w.poll().is_empty());
        }
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = FolderWatcher::new(
            &[dir.path().join("missing")],
            FileScanner::new(&[String::from("avi")]),
            Duration::from_secs(1));
        assert!(result.is_err());
    }
}
