use std::collections::{HashSet, VecDeque};
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::converter::Converter;
use crate::media_job::{JobOutcome, MediaJob};
use crate::progress::ProgressEstimate;
use crate::watcher::FolderWatcher;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, PartialEq)]
pub enum QueueStatus {
    Idle,
    Processing,
}

#[derive(Clone, Debug)]
pub enum QueueProcessorMessage {
    Idle,
    JobStart(MediaJob),
    /// Sent after the duration probe, successful or not.
    Probed(MediaJob),
    Progress(MediaJob, ProgressEstimate),
    JobEnd(MediaJob, JobOutcome),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Converted => self.converted += 1,
            JobOutcome::Skipped => self.skipped += 1,
            JobOutcome::Failed(_) => self.failed += 1,
            JobOutcome::Cancelled => self.cancelled += 1,
        }
    }

    /// Jobs that never started because the batch was stopped.
    pub fn not_run(&self) -> usize {
        self.total - (self.converted + self.skipped + self.failed + self.cancelled)
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0 && self.not_run() == 0
    }
}

impl Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Overall: {}/{}", self.converted, self.total)?;
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        if self.cancelled > 0 {
            write!(f, ", {} cancelled", self.cancelled)?;
        }
        if self.not_run() > 0 {
            write!(f, ", {} not started", self.not_run())?;
        }
        Ok(())
    }
}

/// Plans a job per source. Sources that are the output of another source in
/// the same batch are dropped so a rerun doesn't convert its own results.
pub fn plan_jobs(converter: &Converter, sources: &[PathBuf]) -> Vec<MediaJob> {
    let jobs: Vec<MediaJob> = sources.iter().map(|s| converter.plan(s)).collect();
    let destinations: HashSet<PathBuf> = jobs.iter().map(|j| j.destination.clone()).collect();
    jobs.into_iter()
        .filter(|j| {
            let is_output = destinations.contains(&j.source);
            if is_output {
                debug!("{:?} is an output of this batch; not converting it", j.source);
            }
            !is_output
        })
        .collect()
}

/// Runs queued jobs one at a time, in order. A failed job never halts the
/// batch; the stop flag does.
pub struct QueueProcessor {
    queue: VecDeque<MediaJob>,
    stop: Arc<AtomicBool>,
    subscribers: Vec<Sender<QueueProcessorMessage>>,
    converter: Converter,
    watcher: Option<FolderWatcher>,
    summary: BatchSummary,
    pub status: QueueStatus,
}

impl QueueProcessor {
    pub fn new(converter: Converter, stop: Arc<AtomicBool>) -> Self {
        QueueProcessor {
            queue: VecDeque::new(),
            stop,
            subscribers: vec![],
            converter,
            watcher: None,
            summary: BatchSummary::default(),
            status: QueueStatus::Idle,
        }
    }

    /// Keep waiting for new files from `watcher` once the queue drains.
    pub fn watch(&mut self, mut watcher: FolderWatcher) {
        for job in &self.queue {
            watcher.ignore(&job.source);
            watcher.ignore(&job.destination);
        }
        self.watcher = Some(watcher);
    }

    pub fn enqueue(&mut self, job: MediaJob) {
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.ignore(&job.source);
            watcher.ignore(&job.destination);
        }
        self.summary.total += 1;
        self.queue.push_back(job);
    }

    pub fn enqueue_sources(&mut self, sources: &[PathBuf]) {
        for job in plan_jobs(&self.converter, sources) {
            info!("Queued: {:?}", job.source);
            self.enqueue(job);
        }
    }

    #[cfg(test)]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn subscribe(&mut self) -> Receiver<QueueProcessorMessage> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&self, msg: QueueProcessorMessage) {
        for tx in &self.subscribers {
            let _ = tx.send(msg.clone());
        }
    }

    /// Processes the queue until it is empty, or with a watcher until stopped.
    pub fn run(&mut self) -> BatchSummary {
        while !self.should_stop() {
            match self.queue.pop_front() {
                Some(job) => {
                    self.status = QueueStatus::Processing;
                    self.process(job);
                    self.status = QueueStatus::Idle;
                },
                None => {
                    if self.watcher.is_none() {
                        break;
                    }
                    self.publish(QueueProcessorMessage::Idle);
                    self.wait_for_new_files();
                },
            }
        }

        if self.should_stop() && !self.queue.is_empty() {
            info!("stopped with {} jobs not started", self.queue.len());
        }
        self.summary.clone()
    }

    fn wait_for_new_files(&mut self) {
        let Some(interval) = self.watcher.as_ref().map(FolderWatcher::interval) else {
            return;
        };

        let started = Instant::now();
        while started.elapsed() < interval {
            if self.should_stop() {
                return;
            }
            thread::sleep(STOP_POLL_INTERVAL.min(interval));
        }

        let found = match self.watcher.as_mut() {
            Some(watcher) => watcher.poll(),
            None => vec![],
        };
        if !found.is_empty() {
            self.enqueue_sources(&found);
        }
    }

    fn process(&mut self, mut job: MediaJob) {
        self.publish(QueueProcessorMessage::JobStart(job.clone()));

        let outcome = if self.converter.should_skip(&job) {
            JobOutcome::Skipped
        } else {
            self.converter.probe(&mut job);
            self.publish(QueueProcessorMessage::Probed(job.clone()));
            self.converter.convert(&job, |estimate| {
                self.publish(QueueProcessorMessage::Progress(job.clone(), estimate));
            })
        };

        match &outcome {
            JobOutcome::Converted => info!("Finished: {}", job),
            JobOutcome::Skipped => info!("Skipped: {}", job),
            JobOutcome::Failed(reason) => info!("Failed: {:?}: {}", job.source, reason),
            JobOutcome::Cancelled => info!("Cancelled: {:?}", job.source),
        }
        self.summary.record(&outcome);
        self.publish(QueueProcessorMessage::JobEnd(job, outcome));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use crate::converter::ConverterOptions;
    use crate::ffmpeg::FFmpeg;
    use crate::ffmpeg::parameter_factories::EncoderSettings;

    fn converter(stop: &Arc<AtomicBool>) -> Converter {
        let ffmpeg = FFmpeg {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ffprobe: PathBuf::from("/nonexistent/ffprobe"),
        };
        let options = ConverterOptions {
            settings: EncoderSettings::default(),
            probe_timeout: Duration::from_secs(1),
            output_dir: None,
        };
        Converter::new(ffmpeg, options, Arc::clone(stop))
    }

    fn sources(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| {
            let p = dir.join(n);
            fs::write(&p, b"").unwrap();
            p
        }).collect()
    }

    #[test]
    fn test_plan_jobs_drops_own_outputs() {
        let stop = Arc::new(AtomicBool::new(false));
        let c = converter(&stop);
        let jobs = plan_jobs(&c, &[
            PathBuf::from("/v/a.avi"),
            PathBuf::from("/v/a.mp4"),
            PathBuf::from("/v/b.mp4"),
        ]);
        let planned: Vec<(PathBuf, PathBuf)> = jobs.into_iter().map(|j| (j.source, j.destination)).collect();
        assert_eq!(planned, vec![
            (PathBuf::from("/v/a.avi"), PathBuf::from("/v/a.mp4")),
            (PathBuf::from("/v/b.mp4"), PathBuf::from("/v/b.h264.mp4")),
        ]);
    }

    #[test]
    fn test_failure_does_not_halt_batch() {
        let dir = tempfile::tempdir().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let mut processor = QueueProcessor::new(converter(&stop), Arc::clone(&stop));
        let rx = processor.subscribe();
        processor.enqueue_sources(&sources(dir.path(), &["a.avi", "b.mkv"]));
        assert_eq!(processor.queued(), 2);

        let summary = processor.run();
        assert_eq!(summary, BatchSummary { total: 2, failed: 2, ..BatchSummary::default() });
        assert!(!summary.is_success());
        assert_eq!(processor.status, QueueStatus::Idle);

        drop(processor);
        let messages: Vec<QueueProcessorMessage> = rx.iter().collect();
        let ends = messages.iter().filter(|m| matches!(m, QueueProcessorMessage::JobEnd(_, JobOutcome::Failed(_)))).count();
        assert_eq!(ends, 2);
        let probed_without_duration = messages.iter()
            .filter(|m| matches!(m, QueueProcessorMessage::Probed(job) if job.duration.is_none()))
            .count();
        assert_eq!(probed_without_duration, 2);
        assert!(!messages.iter().any(|m| matches!(m, QueueProcessorMessage::Progress(..))));
    }

    #[test]
    fn test_stop_leaves_queue_unrun() {
        let dir = tempfile::tempdir().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let mut processor = QueueProcessor::new(converter(&stop), Arc::clone(&stop));
        processor.enqueue_sources(&sources(dir.path(), &["a.avi", "b.avi", "c.avi"]));
        processor.stop();

        let summary = processor.run();
        assert_eq!(summary.not_run(), 3);
        assert!(!summary.is_success());
        assert_eq!(format!("{}", summary), "Overall: 0/3, 3 not started");
    }

    #[test]
    fn test_skipped_jobs_are_not_probed() {
        let dir = tempfile::tempdir().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let ffmpeg = FFmpeg {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ffprobe: PathBuf::from("/nonexistent/ffprobe"),
        };
        let options = ConverterOptions {
            settings: EncoderSettings { overwrite: false, ..EncoderSettings::default() },
            probe_timeout: Duration::from_secs(1),
            output_dir: None,
        };
        let mut processor = QueueProcessor::new(Converter::new(ffmpeg, options, Arc::clone(&stop)), Arc::clone(&stop));
        let rx = processor.subscribe();
        let sources = sources(dir.path(), &["a.avi"]);
        fs::write(dir.path().join("a.mp4"), b"done earlier").unwrap();
        processor.enqueue_sources(&sources);

        let summary = processor.run();
        assert_eq!(summary, BatchSummary { total: 1, skipped: 1, ..BatchSummary::default() });
        assert!(summary.is_success());

        drop(processor);
        let messages: Vec<QueueProcessorMessage> = rx.iter().collect();
        assert!(!messages.iter().any(|m| matches!(m, QueueProcessorMessage::Probed(_))));
        assert!(matches!(messages.last(), Some(QueueProcessorMessage::JobEnd(_, JobOutcome::Skipped))));
    }

    #[test]
    fn test_summary_display() {
        let summary = BatchSummary { total: 4, converted: 2, skipped: 1, failed: 1, cancelled: 0 };
        assert_eq!(format!("{}", summary), "Overall: 2/4, 1 skipped, 1 failed");
        assert!(!summary.is_success());
        let summary = BatchSummary { total: 1, converted: 1, ..BatchSummary::default() };
        assert!(summary.is_success());
    }
}
