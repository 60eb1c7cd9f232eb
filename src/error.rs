use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{binary:?} was not found. Install ffmpeg, place it next to this program, or pass --ffmpeg.")]
    EncoderNotFound { binary: PathBuf },

    #[error("Unable to start {binary:?}: {source}")]
    EncoderSpawn { binary: PathBuf, source: io::Error },

    #[error("Error converting {path:?}: ffmpeg exited with {}{}", describe_code(.code), describe_tail(.stderr_tail))]
    EncoderFailed { path: PathBuf, code: Option<i32>, stderr_tail: Vec<String> },

    #[error("Conversion of {path:?} was cancelled.")]
    Cancelled { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => String::from("no exit code (terminated by signal)"),
    }
}

fn describe_tail(tail: &[String]) -> String {
    match tail.last() {
        Some(line) => format!(" ({})", line),
        None => String::new(),
    }
}

/// Reasons the duration probe can fail. None of these stop a conversion.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("ffprobe could not be started: {0}")]
    Spawn(#[from] io::Error),

    #[error("ffprobe did not finish within {0:?}")]
    Timeout(Duration),

    #[error("ffprobe exited with {}", describe_code(.0))]
    Failed(Option<i32>),

    #[error("ffprobe output is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ffprobe reported no usable duration")]
    NoDuration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read config {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Invalid config {path:?}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}
