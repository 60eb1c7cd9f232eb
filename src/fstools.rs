use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{self, Path, PathBuf};

#[derive(Debug, PartialEq)]
pub enum DirEntryCategory {
    DoesNotExist,
    RegularFile,
    Directory,
    Unknown,
}

/// Symlinks are followed.
pub fn classify_file(path: &Path) -> DirEntryCategory {
    match fs::metadata(path) {
        Ok(metadata) => {
            if metadata.is_file() {
                DirEntryCategory::RegularFile
            } else if metadata.is_dir() {
                DirEntryCategory::Directory
            } else {
                DirEntryCategory::Unknown
            }
        },
        Err(_) => DirEntryCategory::DoesNotExist,
    }
}

pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => {
            let ext = ext.to_lowercase();
            extensions.iter().any(|e| *e == ext)
        },
        None => false,
    }
}

/// `<stem>.mp4` beside the source, or under `output_dir`. Falls back to
/// `<stem>.h264.mp4` when the plain name would overwrite the source.
pub fn generate_output_filename(path: &Path, output_dir: Option<&Path>) -> PathBuf {
    let Some(file_stem) = path.file_stem() else {
        return path.with_extension("mp4");
    };

    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => path.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    let out = dir.join(with_suffix(file_stem, ".mp4"));
    if out == path {
        return dir.join(with_suffix(file_stem, ".h264.mp4"));
    }
    out
}

fn with_suffix(stem: &OsStr, suffix: &str) -> OsString {
    let mut name = stem.to_os_string();
    name.push(suffix);
    name
}

/// Resolves symlinks and `..` so that one file always maps to one key. A path
/// that doesn't exist yet is resolved through its parent directory.
pub fn canonical_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    let absolute = path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let resolved = match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent).ok().map(|p| p.join(name)),
        _ => None,
    };
    resolved.unwrap_or(absolute)
}

pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> {
        vec![String::from("avi"), String::from("mkv")]
    }

    #[test]
    fn test_generate_output_filename() {
        assert_eq!(generate_output_filename(Path::new("/foo/bar/baz.avi"), None), PathBuf::from("/foo/bar/baz.mp4"));
        assert_eq!(generate_output_filename(Path::new("bar/baz.mkv"), None), PathBuf::from("bar/baz.mp4"));
        assert_eq!(generate_output_filename(Path::new("baz.mkv"), None), PathBuf::from("baz.mp4"));
        assert_eq!(generate_output_filename(Path::new("/foo/baz.mp4"), None), PathBuf::from("/foo/baz.h264.mp4"));
        assert_eq!(generate_output_filename(Path::new("/foo/my.movie.mov"), None), PathBuf::from("/foo/my.movie.mp4"));
    }

    #[test]
    fn test_generate_output_filename_in_output_dir() {
        assert_eq!(
            generate_output_filename(Path::new("/foo/baz.mp4"), Some(Path::new("/out"))),
            PathBuf::from("/out/baz.mp4"));
        assert_eq!(
            generate_output_filename(Path::new("/foo/baz.avi"), Some(Path::new("/out"))),
            PathBuf::from("/out/baz.mp4"));
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension(Path::new("a.avi"), &exts()));
        assert!(has_extension(Path::new("/x/A.MKV"), &exts()));
        assert!(!has_extension(Path::new("a.txt"), &exts()));
        assert!(!has_extension(Path::new("avi"), &exts()));
    }

    #[test]
    fn test_classify_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.avi");
        fs::write(&file, b"").unwrap();
        assert_eq!(classify_file(dir.path()), DirEntryCategory::Directory);
        assert_eq!(classify_file(&file), DirEntryCategory::RegularFile);
        assert_eq!(classify_file(&dir.path().join("missing")), DirEntryCategory::DoesNotExist);
        assert_eq!(file_size(&file), Some(0));
    }

    #[test]
    fn test_canonical_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let file = root.join("a.avi");
        fs::write(&file, b"").unwrap();
        fs::create_dir(root.join("sub")).unwrap();

        assert_eq!(canonical_path(&root.join("sub/../a.avi")), file);
        assert_eq!(canonical_path(&root.join("sub/../later.mp4")), root.join("later.mp4"));
    }

    #[cfg(unix)]
    #[test]
    fn test_canonical_path_resolves_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let file = root.join("a.avi");
        fs::write(&file, b"").unwrap();
        std::os::unix::fs::symlink(&file, root.join("link.avi")).unwrap();
        std::os::unix::fs::symlink(&root, root.join("loop")).unwrap();

        assert_eq!(canonical_path(&root.join("link.avi")), file);
        assert_eq!(canonical_path(&root.join("loop/loop/a.avi")), file);
        assert_eq!(canonical_path(&root.join("loop/new.mp4")), root.join("new.mp4"));
    }
}
