use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::ConvertError;
use crate::ffmpeg::FFmpeg;
use crate::ffmpeg::encoder::Encoder;
use crate::ffmpeg::parameter_factories::EncoderSettings;
use crate::ffmpeg::probe::probe_duration;
use crate::fstools::generate_output_filename;
use crate::media_job::{JobOutcome, MediaJob};
use crate::progress::{ProgressEstimate, ProgressEstimator, ProgressThrottle};

#[derive(Clone, Debug)]
pub struct ConverterOptions {
    pub settings: EncoderSettings,
    pub probe_timeout: Duration,
    pub output_dir: Option<PathBuf>,
}

/// Runs single jobs: duration probe, then ffmpeg, with progress estimation.
pub struct Converter {
    ffmpeg: FFmpeg,
    options: ConverterOptions,
    encoder: Encoder,
}

impl Converter {
    pub fn new(ffmpeg: FFmpeg, options: ConverterOptions, stop: Arc<AtomicBool>) -> Self {
        let encoder = Encoder::new(&ffmpeg.ffmpeg, &options.settings, stop);
        Converter {
            ffmpeg,
            options,
            encoder,
        }
    }

    pub fn plan(&self, source: &Path) -> MediaJob {
        MediaJob::new(
            source.to_path_buf(),
            generate_output_filename(source, self.options.output_dir.as_deref()))
    }

    pub fn command_line(&self, job: &MediaJob) -> String {
        self.encoder.command_line(&job.source, &job.destination)
    }

    /// True when overwriting is off and the destination is already there.
    pub fn should_skip(&self, job: &MediaJob) -> bool {
        !self.options.settings.overwrite && job.destination.exists()
    }

    /// Attaches the probed duration to `job`. Failure only downgrades the
    /// job's progress to approximate.
    pub fn probe(&self, job: &mut MediaJob) -> bool {
        match probe_duration(&self.ffmpeg.ffprobe, &job.source, self.options.probe_timeout) {
            Ok(duration) => {
                job.attach_duration(duration);
                true
            },
            Err(err) => {
                warn!("could not read duration of {:?} ({}); progress will be approximate", job.source, err);
                false
            },
        }
    }

    pub fn convert<F>(&self, job: &MediaJob, mut on_progress: F) -> JobOutcome
    where
        F: FnMut(ProgressEstimate),
    {
        if self.should_skip(job) {
            info!("{:?} exists; skipping", job.destination);
            return JobOutcome::Skipped;
        }

        if let Some(dir) = job.destination.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                if let Err(err) = std::fs::create_dir_all(dir) {
                    return JobOutcome::Failed(ConvertError::Io(err).to_string());
                }
            }
        }

        let mut estimator = ProgressEstimator::new(job.duration);
        let mut throttle = ProgressThrottle::new();
        debug!("{:?}: {} progress", job.source, if estimator.is_exact() { "exact" } else { "approximate" });
        let result = self.encoder.encode(&job.source, &job.destination, |sample| {
            let estimate = estimator.observe(sample);
            if throttle.admit(estimate) {
                on_progress(estimate);
            }
        });

        match result {
            Ok(()) => {
                if let Some(estimate) = estimator.finish(true) {
                    on_progress(estimate);
                }
                JobOutcome::Converted
            },
            Err(ConvertError::Cancelled { .. }) => JobOutcome::Cancelled,
            Err(err) => {
                warn!("{}", err);
                JobOutcome::Failed(err.to_string())
            },
        }
    }
}
