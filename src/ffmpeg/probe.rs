use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use crate::error::ProbeError;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Deserialize, Debug)]
struct FFProbeJsonOutput {
    format: Option<FFProbeJsonFormat>,
}

#[derive(Deserialize, Debug)]
struct FFProbeJsonFormat {
    duration: Option<String>,
}

/// Asks ffprobe for the container duration of `path`.
///
/// The child is killed if it has not exited within `timeout`.
pub fn probe_duration(ffprobe: &Path, path: &Path, timeout: Duration) -> Result<Duration, ProbeError> {
    let mut child = Command::new(ffprobe)
        .args(["-v", "error", "-show_entries", "format=duration", "-of", "json"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    // read on a helper thread so a chatty ffprobe can't fill the pipe while we poll
    let mut stdout = child.stdout.take();
    let reader = thread::spawn(move || {
        let mut buf = String::new();
        if let Some(out) = stdout.as_mut() {
            let _ = out.read_to_string(&mut buf);
        }
        buf
    });

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProbeError::Timeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    };

    let output = reader.join().unwrap_or_default();
    if !status.success() {
        return Err(ProbeError::Failed(status.code()));
    }

    let duration = parse_probe_output(&output)?;
    debug!("{:?} lasts {:?}", path, duration);
    Ok(duration)
}

fn parse_probe_output(json: &str) -> Result<Duration, ProbeError> {
    let deserialized = serde_json::from_str::<FFProbeJsonOutput>(json)?;
    let secs = deserialized.format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .ok_or(ProbeError::NoDuration)?;
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(ProbeError::NoDuration),
    }
}
