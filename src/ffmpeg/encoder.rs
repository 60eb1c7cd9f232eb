use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::error::ConvertError;
use crate::progress::ProgressSample;
use super::parameter_factories::{create_parameter_factory, EncoderSettings, ParameterFactory};

/// Number of stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 10;

#[derive(Debug, Default)]
struct EncodeProgress {
    pub out_time: Option<Duration>,
    /// Set once the current block carried `out_time_us`, which beats `out_time`.
    pub micros_in_block: bool,
    pub frame: usize,
    pub speed: Option<f64>,
    pub total_size: usize,
}

#[derive(Debug, PartialEq)]
enum FFmpegStdoutResult {
    Continue,
    Render,
}

pub struct Encoder {
    binary: PathBuf,
    parameters: Box<dyn ParameterFactory>,
    overwrite: bool,
    stop: Arc<AtomicBool>,
}

impl Encoder {
    pub fn new(binary: &Path, settings: &EncoderSettings, stop: Arc<AtomicBool>) -> Self {
        Encoder {
            binary: binary.to_path_buf(),
            parameters: create_parameter_factory(settings),
            overwrite: settings.overwrite,
            stop,
        }
    }

    /// ffmpeg always overwrites `destination`; `encode` points it at a fresh
    /// staging file and decides about the real destination itself.
    pub fn build_args(&self, source: &Path, destination: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-hide_banner", "-nostats",
            "-loglevel", "warning",
            "-progress", "pipe:1",
            "-i",
        ].iter().map(OsString::from).collect();
        args.push(source.as_os_str().to_os_string());
        args.extend(self.parameters.parameters());
        args.push(OsString::from("-y"));
        args.push(destination.as_os_str().to_os_string());
        args
    }

    /// Shell-like rendering of the command, for dry runs and logs.
    pub fn command_line(&self, source: &Path, destination: &Path) -> String {
        let mut parts = vec![quote(&self.binary.to_string_lossy())];
        parts.extend(self.build_args(source, destination).iter().map(|a| quote(&a.to_string_lossy())));
        parts.join(" ")
    }

    /// Runs ffmpeg to completion, handing every progress sample to `on_sample`.
    ///
    /// ffmpeg writes into a staging file beside `destination`, which replaces
    /// `destination` only once ffmpeg succeeded. A failed or cancelled run
    /// leaves `destination` untouched. Without overwrite an existing
    /// `destination` is never replaced.
    pub fn encode<F>(&self, source: &Path, destination: &Path, mut on_sample: F) -> Result<(), ConvertError>
    where
        F: FnMut(ProgressSample),
    {
        let staging = staging_file(destination)?;
        info!("{}", self.command_line(source, destination));
        debug!("staging output in {:?}", staging);

        let mut child = match Command::new(&self.binary)
            .args(self.build_args(source, &staging))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn() {
            Ok(child) => child,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ConvertError::EncoderNotFound { binary: self.binary.clone() });
            },
            Err(err) => {
                return Err(ConvertError::EncoderSpawn { binary: self.binary.clone(), source: err });
            },
        };

        let stderr_thread = child.stderr.take()
            .map(|stderr| thread::spawn(move || drain_stderr(stderr)));

        let mut cancelled = false;
        if let Some(stdout) = child.stdout.take() {
            cancelled = self.consume_stdout(stdout, &mut child, &mut on_sample);
        }

        let status = child.wait();
        let stderr_tail = stderr_thread
            .and_then(|t| t.join().ok())
            .unwrap_or_default();

        if cancelled || self.should_stop() {
            return Err(ConvertError::Cancelled { path: source.to_path_buf() });
        }

        let status = status?;
        if status.success() {
            self.publish(staging, destination)
        } else {
            Err(ConvertError::EncoderFailed {
                path: source.to_path_buf(),
                code: status.code(),
                stderr_tail,
            })
        }
    }

    fn publish(&self, staging: TempPath, destination: &Path) -> Result<(), ConvertError> {
        let persisted = if self.overwrite {
            staging.persist(destination)
        } else {
            staging.persist_noclobber(destination)
        };
        persisted.map_err(|err| ConvertError::Io(err.error))
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Returns true when the run was stopped before ffmpeg finished.
    fn consume_stdout<F>(&self, stdout: ChildStdout, child: &mut Child, on_sample: &mut F) -> bool
    where
        F: FnMut(ProgressSample),
    {
        let mut progress = EncodeProgress::default();
        let stdout_reader = BufReader::new(stdout);
        for line in stdout_reader.lines() {
            if let Ok(l) = line {
                if handle_ffmpeg_stdout_line(&l, &mut progress) == FFmpegStdoutResult::Render {
                    if let Some(out_time) = progress.out_time {
                        on_sample(ProgressSample(out_time));
                    }
                }
            }

            if self.should_stop() {
                warn!("Caught stop signal; killing ffmpeg ({})", child.id());
                if let Err(err) = child.kill() {
                    warn!("error killing ffmpeg process ({}) {err:?}", child.id());
                }
                return true;
            }
        }

        debug!("ffmpeg closed stdout after frame {} ({} bytes, speed {:?})",
            progress.frame, progress.total_size, progress.speed);
        false
    }
}

/// Handles one line of `-progress` output. A block of `key=value` lines ends
/// with `progress=continue` or `progress=end`; plain stats lines carrying
/// `time=HH:MM:SS.xx` are accepted as well.
fn handle_ffmpeg_stdout_line(line: &str, progress: &mut EncodeProgress) -> FFmpegStdoutResult {
    let line = line.trim();
    if let Some(t) = stats_time(line) {
        progress.out_time = Some(t);
        return FFmpegStdoutResult::Render;
    }

    let Some((key, value)) = line.split_once('=') else {
        return FFmpegStdoutResult::Continue;
    };
    let value = value.trim();
    match key.trim() {
        // out_time_ms is microseconds too
        "out_time_us" | "out_time_ms" => {
            if let Ok(us) = value.parse::<u64>() {
                progress.out_time = Some(Duration::from_micros(us));
                progress.micros_in_block = true;
            }
            FFmpegStdoutResult::Continue
        },
        "out_time" => {
            if !progress.micros_in_block {
                progress.out_time = parse_timestamp(value).or(progress.out_time);
            }
            FFmpegStdoutResult::Continue
        },
        "frame" => {
            progress.frame = value.parse().unwrap_or(progress.frame);
            FFmpegStdoutResult::Continue
        },
        "total_size" => {
            progress.total_size = value.parse().unwrap_or(progress.total_size);
            FFmpegStdoutResult::Continue
        },
        "speed" => {
            progress.speed = value.trim_end_matches('x').parse().ok().or(progress.speed);
            FFmpegStdoutResult::Continue
        },
        "progress" => {
            progress.micros_in_block = false;
            FFmpegStdoutResult::Render
        },
        _ => FFmpegStdoutResult::Continue,
    }
}

/// Pulls `time=HH:MM:SS.xx` out of a classic ffmpeg stats line.
fn stats_time(line: &str) -> Option<Duration> {
    let start = line.find(" time=").map(|i| i + 1)
        .or_else(|| line.starts_with("time=").then_some(0))?;
    let rest = &line[start + "time=".len()..];
    let value = rest.split_whitespace().next()?;
    parse_timestamp(value)
}

/// Parses `HH:MM:SS[.fraction]`. Negative and `N/A` values yield `None`.
pub fn parse_timestamp(value: &str) -> Option<Duration> {
    let mut parts = value.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    let whole = hours.checked_mul(3600)?.checked_add(minutes * 60)?;
    Duration::from_secs(whole).checked_add(Duration::try_from_secs_f64(seconds).ok()?)
}

fn drain_stderr<R: Read>(stderr: R) -> Vec<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let reader = BufReader::new(stderr);
    for chunk in reader.split(b'\n') {
        let Ok(bytes) = chunk else { break };
        let line = String::from_utf8_lossy(&bytes).trim().to_string();
        if line.is_empty() {
            continue;
        }
        debug!("ffmpeg: {}", line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect()
}

/// An empty file in the destination's directory, removed again when dropped.
/// It keeps the destination's extension so ffmpeg picks the same muxer.
fn staging_file(destination: &Path) -> io::Result<TempPath> {
    let dir = match destination.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let suffix = destination.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let file = tempfile::Builder::new()
        .prefix(".convert-mp4-")
        .suffix(&suffix)
        .tempfile_in(dir)?;
    Ok(file.into_temp_path())
}

fn quote(s: &str) -> String {
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:+=,".contains(c)) {
        String::from(s)
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}
