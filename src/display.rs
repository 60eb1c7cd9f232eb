use std::path::Path;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

use human_repr::HumanCount;
use kdam::{term, tqdm, Bar, BarExt};

use crate::fstools::file_size;
use crate::media_job::{JobOutcome, MediaJob};
use crate::progress::ProgressEstimate;
use crate::queue_processor::QueueProcessorMessage;

/// Renders queue events as kdam bars on stderr until every sender is gone.
pub fn spawn(rx: Receiver<QueueProcessorMessage>) -> JoinHandle<()> {
    thread::spawn(move || {
        term::init(false);
        let mut bar: Option<JobBar> = None;
        for msg in rx {
            match msg {
                QueueProcessorMessage::Idle => (),
                QueueProcessorMessage::JobStart(job) => {
                    eprintln!("Started: {}", job.source.display());
                },
                QueueProcessorMessage::Probed(job) => {
                    bar = Some(create_bar(&job));
                },
                QueueProcessorMessage::Progress(_, estimate) => {
                    if let Some(job_bar) = bar.as_mut() {
                        job_bar.render(estimate);
                    }
                },
                QueueProcessorMessage::JobEnd(job, outcome) => {
                    if let Some(mut job_bar) = bar.take() {
                        let _ = job_bar.pb.refresh();
                        eprintln!();
                    }
                    eprintln!("{}", describe_outcome(&job, &outcome));
                },
            }
        }
    })
}

/// A bar with total 100 for exact progress, or a counter of encoded seconds.
struct JobBar {
    pb: Bar,
    exact: bool,
}

impl JobBar {
    fn render(&mut self, estimate: ProgressEstimate) {
        match (self.exact, estimate) {
            (false, ProgressEstimate::Exact(_)) => self.pb.set_postfix(String::from("done")),
            _ => self.pb.set_postfix(estimate.to_string()),
        }
        match bar_position(self.exact, estimate) {
            Some(n) => {
                let _ = self.pb.update_to(n);
            },
            None => {
                let _ = self.pb.refresh();
            },
        }
    }
}

/// Where the bar's counter goes for `estimate`. A counter bar has no notion of
/// percent, so the final exact 100 of a successful job leaves it alone.
fn bar_position(exact: bool, estimate: ProgressEstimate) -> Option<usize> {
    match (exact, estimate) {
        (true, ProgressEstimate::Exact(percent)) => Some(percent.floor() as usize),
        (false, ProgressEstimate::Approximate { elapsed }) => Some(elapsed.as_secs() as usize),
        _ => None,
    }
}

fn create_bar(job: &MediaJob) -> JobBar {
    let desc = match job.source.file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => job.source.display().to_string(),
    };
    let exact = job.duration.is_some_and(|d| !d.is_zero());
    let pb = if exact {
        tqdm!(
            total = 100,
            desc = desc,
            unit = "%",
            position = 0,
            force_refresh = true
        )
    } else {
        // counter style: no total, the count is encoded seconds
        tqdm!(
            desc = desc,
            unit = "s",
            position = 0,
            force_refresh = true
        )
    };
    JobBar { pb, exact }
}

fn describe_outcome(job: &MediaJob, outcome: &JobOutcome) -> String {
    match outcome {
        JobOutcome::Converted => format!(
            "{}: {} ({} → {})",
            outcome,
            job,
            describe_size(&job.source),
            describe_size(&job.destination)),
        JobOutcome::Skipped => format!("{}: {} already exists", outcome, job.destination.display()),
        JobOutcome::Failed(reason) => format!("{}: {}: {}", outcome, job.source.display(), reason),
        JobOutcome::Cancelled => format!("{}: {}", outcome, job.source.display()),
    }
}

fn describe_size(path: &Path) -> String {
    match file_size(path) {
        Some(size) => size.human_count_bytes().to_string(),
        None => String::from("?"),
    }
}
