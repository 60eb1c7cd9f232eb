use std::fmt::Display;
use std::time::Duration;

use human_repr::HumanDuration;

/// Minimum change, in percentage points, before an exact estimate is shown again.
const PERCENT_STEP: f64 = 0.5;

/// Minimum change in encoded time before an approximate estimate is shown again.
const ELAPSED_STEP: Duration = Duration::from_secs(1);

/// Elapsed encoded time reported by the encoder for the current job.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct ProgressSample(pub Duration);

impl ProgressSample {
    #[cfg(test)]
    pub fn from_secs_f64(secs: f64) -> Option<Self> {
        Duration::try_from_secs_f64(secs).ok().map(ProgressSample)
    }

    pub fn elapsed(&self) -> Duration {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProgressEstimate {
    /// Percentage in `[0, 100]`.
    Exact(f64),
    /// The total duration is unknown; only the encoded time can be shown.
    Approximate { elapsed: Duration },
}

impl ProgressEstimate {
    pub fn percent(&self) -> Option<f64> {
        match self {
            ProgressEstimate::Exact(p) => Some(*p),
            ProgressEstimate::Approximate { .. } => None,
        }
    }
}

impl Display for ProgressEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressEstimate::Exact(p) => write!(f, "{:.1}%", p),
            ProgressEstimate::Approximate { elapsed } => write!(f, "{} encoded", elapsed.human_duration()),
        }
    }
}

/// Turns encoder time samples into display values for one job.
///
/// With a known total duration every sample maps to a clamped percentage.
/// Without one the estimator stays in approximate mode for the whole job.
#[derive(Debug)]
pub struct ProgressEstimator {
    total: Option<Duration>,
    last: Option<ProgressEstimate>,
}

impl ProgressEstimator {
    pub fn new(total: Option<Duration>) -> Self {
        ProgressEstimator {
            total: total.filter(|d| !d.is_zero()),
            last: None,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.total.is_some()
    }

    pub fn observe(&mut self, sample: ProgressSample) -> ProgressEstimate {
        let estimate = match self.total {
            Some(total) => {
                let ratio = sample.elapsed().as_secs_f64() / total.as_secs_f64();
                ProgressEstimate::Exact(f64::min(100.0, 100.0 * ratio))
            },
            None => ProgressEstimate::Approximate { elapsed: sample.elapsed() },
        };
        self.last = Some(estimate);
        estimate
    }

    /// Final value for the job. A successful job always ends at 100; a failed
    /// one keeps whatever was last reported.
    pub fn finish(&mut self, success: bool) -> Option<ProgressEstimate> {
        if success {
            self.last = Some(ProgressEstimate::Exact(100.0));
        }
        self.last
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<ProgressEstimate> {
        self.last
    }
}

/// Drops estimates that would not visibly change the display.
#[derive(Debug, Default)]
pub struct ProgressThrottle {
    last: Option<ProgressEstimate>,
}

impl ProgressThrottle {
    pub fn new() -> Self {
        ProgressThrottle { last: None }
    }

    pub fn admit(&mut self, estimate: ProgressEstimate) -> bool {
        let admit = match (self.last, estimate) {
            (None, _) => true,
            (Some(ProgressEstimate::Exact(prev)), ProgressEstimate::Exact(p)) => {
                p - prev >= PERCENT_STEP || (p >= 100.0 && prev < 100.0)
            },
            (Some(ProgressEstimate::Approximate { elapsed: prev }), ProgressEstimate::Approximate { elapsed }) => {
                elapsed.saturating_sub(prev) >= ELAPSED_STEP
            },
            // mode switched
            _ => true,
        };
        if admit {
            self.last = Some(estimate);
        }
        admit
    }
}
