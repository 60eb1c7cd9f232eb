use std::collections::HashSet;
use std::path::{self, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::fstools::{canonical_path, classify_file, has_extension, DirEntryCategory};

pub struct FileScanner {
    extensions: Vec<String>,
}

impl FileScanner {
    pub fn new(extensions: &[String]) -> Self {
        FileScanner {
            extensions: extensions.to_vec(),
        }
    }

    pub fn accepts(&self, path: &Path) -> bool {
        has_extension(path, &self.extensions)
    }

    /// Every convertible file under `dirpath`, recursively, sorted.
    ///
    /// Symlinks are followed, but a file reachable through several links is
    /// listed once and links back up the tree are not descended into.
    pub fn scan(&self, dirpath: &Path) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut found = vec![];
        for entry in WalkDir::new(dirpath).follow_links(true).sort_by_file_name() {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file()
                        && self.accepts(entry.path())
                        && seen.insert(canonical_path(entry.path())) {
                        found.push(entry.into_path());
                    }
                },
                Err(err) if err.loop_ancestor().is_some() => {
                    debug!("not following symlink loop at {:?}", err.path());
                },
                Err(err) => warn!("unable to scan {:?}: {}", dirpath, err),
            }
        }
        found.sort();
        debug!("scanned {:?}: {} files found", dirpath, found.len());
        found
    }

    /// Expands command line inputs into absolute source paths, keeping
    /// argument order. Paths naming the same file are only kept once.
    pub fn collect(&self, inputs: &[PathBuf]) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut sources = vec![];
        for input in inputs {
            let candidates = match classify_file(input) {
                DirEntryCategory::RegularFile => {
                    if self.accepts(input) {
                        vec![input.clone()]
                    } else {
                        warn!("{:?} does not have a supported extension; skipping", input);
                        vec![]
                    }
                },
                DirEntryCategory::Directory => self.scan(input),
                DirEntryCategory::DoesNotExist => {
                    warn!("{:?} does not exist; skipping", input);
                    vec![]
                },
                DirEntryCategory::Unknown => {
                    warn!("unable to classify {:?}; skipping", input);
                    vec![]
                },
            };

            for candidate in candidates {
                if seen.insert(canonical_path(&candidate)) {
                    sources.push(path::absolute(&candidate).unwrap_or(candidate));
                }
            }
        }
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scanner() -> FileScanner {
        FileScanner::new(&[String::from("avi"), String::from("mkv"), String::from("mp4")])
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_scan_recursive() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.avi"));
        touch(&dir.path().join("a.MKV"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("season1/e01.mp4"));
        touch(&dir.path().join("season1/deep/e02.avi"));

        let found = scanner().scan(dir.path());
        assert_eq!(found, vec![
            dir.path().join("a.MKV"),
            dir.path().join("b.avi"),
            dir.path().join("season1/deep/e02.avi"),
            dir.path().join("season1/e01.mp4"),
        ]);
    }

    #[test]
    fn test_collect_dedupes_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.avi");
        let b = dir.path().join("sub/b.mkv");
        touch(&a);
        touch(&b);
        touch(&dir.path().join("readme.md"));

        let inputs = vec![
            b.clone(),
            dir.path().to_path_buf(),
            a.clone(),
            dir.path().join("missing.avi"),
            dir.path().join("readme.md"),
        ];
        assert_eq!(scanner().collect(&inputs), vec![b, a]);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_survives_symlink_loop() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.avi");
        touch(&a);
        std::os::unix::fs::symlink(".", dir.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(&a, dir.path().join("link.avi")).unwrap();

        assert_eq!(scanner().scan(dir.path()), vec![a.clone()]);
        let inputs = vec![dir.path().to_path_buf(), dir.path().join("loop/link.avi")];
        assert_eq!(scanner().collect(&inputs), vec![a]);
    }

    #[test]
    fn test_collect_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scanner().collect(&[dir.path().to_path_buf()]).is_empty());
    }
}
