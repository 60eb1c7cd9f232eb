use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

pub mod encoder;
pub mod parameter_factories;
pub mod probe;

/// Where the ffmpeg and ffprobe binaries live for this run.
#[derive(Clone, Debug, PartialEq)]
pub struct FFmpeg {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl FFmpeg {
    /// Explicit paths win, then binaries bundled next to the running
    /// executable, then bare names left to the OS search path.
    pub fn locate(ffmpeg: Option<&Path>, ffprobe: Option<&Path>) -> Self {
        let bundle_dir = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        FFmpeg {
            ffmpeg: resolve_binary(ffmpeg, bundle_dir.as_deref(), "ffmpeg"),
            ffprobe: resolve_binary(ffprobe, bundle_dir.as_deref(), "ffprobe"),
        }
    }

    pub fn is_installed(&self) -> bool {
        let cmd = Command::new(&self.ffmpeg)
            .arg("-version")
            .stdin(Stdio::null())
            .output();
        match cmd {
            Ok(output) => output.status.success(),
            Err(err) => {
                debug!("{:?} -version failed: {}", self.ffmpeg, err);
                false
            },
        }
    }
}

fn resolve_binary(explicit: Option<&Path>, bundle_dir: Option<&Path>, name: &str) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    let file_name = format!("{}{}", name, env::consts::EXE_SUFFIX);
    if let Some(dir) = bundle_dir {
        let bundled = dir.join(&file_name);
        if bundled.is_file() {
            debug!("using bundled {:?}", bundled);
            return bundled;
        }
    }

    PathBuf::from(file_name)
}
