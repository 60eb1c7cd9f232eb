use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

/// One source file and the mp4 it becomes.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaJob {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub duration: Option<Duration>,
}

impl MediaJob {
    pub fn new(source: PathBuf, destination: PathBuf) -> Self {
        MediaJob {
            source,
            destination,
            duration: None,
        }
    }

    pub fn attach_duration(&mut self, duration: Duration) {
        self.duration = Some(duration);
    }
}

impl Display for MediaJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} → {}", self.source.display(), self.destination.display())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum JobOutcome {
    Converted,
    /// The destination exists and overwriting is disabled.
    Skipped,
    Failed(String),
    Cancelled,
}

impl JobOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, JobOutcome::Failed(_))
    }
}

impl Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobOutcome::Converted => write!(f, "Done"),
            JobOutcome::Skipped => write!(f, "Skipped"),
            JobOutcome::Failed(_) => write!(f, "Failed"),
            JobOutcome::Cancelled => write!(f, "Cancelled"),
        }
    }
}
