pub mod config;
pub mod converter;
pub mod display;
pub mod error;
pub mod ffmpeg;
pub mod filescanner;
pub mod fstools;
pub mod logging;
pub mod media_job;
pub mod progress;
pub mod queue_processor;
pub mod watcher;
#[cfg(all(test, unix))]
mod test_support;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use rustop::opts;
use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;
use tracing::{debug, error, info};

use config::Config;
use converter::{Converter, ConverterOptions};
use ffmpeg::FFmpeg;
use filescanner::FileScanner;
use fstools::{classify_file, DirEntryCategory};
use queue_processor::{plan_jobs, QueueProcessor};
use watcher::FolderWatcher;

fn main() -> ExitCode {
    let (args, _rest) = opts! {
        synopsis "Batch convert video files to H.264/AAC mp4 with ffmpeg.";
        opt config:Option<String>, desc:"Config file (default: ./convert-mp4.toml if present).";
        opt ffmpeg:Option<String>, desc:"Path to the ffmpeg binary.";
        opt ffprobe:Option<String>, desc:"Path to the ffprobe binary.";
        opt preset:Option<String>, desc:"x264 preset, e.g. veryfast, fast, slow.";
        opt crf:Option<u8>, desc:"Constant rate factor (0-51).";
        opt video_bitrate:Option<String>, desc:"Target video bitrate, e.g. 4M.";
        opt audio_bitrate:Option<String>, desc:"AAC bitrate, e.g. 128k.";
        opt output_dir:Option<String>, desc:"Write outputs here instead of beside each source.";
        opt no_overwrite:bool=false, desc:"Skip sources whose output already exists.";
        opt watch:bool=false, desc:"Keep watching input folders for new files until interrupted.";
        opt dry_run:bool=false, desc:"Print the ffmpeg commands, but don't convert anything.";
        opt verbose:bool=false, short:'v', desc:"Log debug output, including ffmpeg's stderr.";
        param inputs:Vec<String>, desc:"Input files and/or folders.";
    }.parse_or_exit();

    logging::init(args.verbose);

    let mut config = match Config::load(args.config.as_deref().map(Path::new)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        },
    };
    if let Some(p) = args.ffmpeg { config.ffmpeg = Some(PathBuf::from(p)); }
    if let Some(p) = args.ffprobe { config.ffprobe = Some(PathBuf::from(p)); }
    if let Some(p) = args.output_dir { config.output_dir = Some(PathBuf::from(p)); }
    if let Some(preset) = args.preset { config.encoder.preset = preset; }
    if args.crf.is_some() { config.encoder.crf = args.crf; }
    if args.video_bitrate.is_some() { config.encoder.video_bitrate = args.video_bitrate; }
    if args.audio_bitrate.is_some() { config.encoder.audio_bitrate = args.audio_bitrate; }
    if args.no_overwrite { config.encoder.overwrite = false; }
    debug!("{:?}", config);

    let f = FFmpeg::locate(config.ffmpeg.as_deref(), config.ffprobe.as_deref());
    let stop = Arc::new(AtomicBool::new(false));
    let converter = Converter::new(f.clone(), ConverterOptions {
        settings: config.encoder.clone(),
        probe_timeout: config.probe_timeout(),
        output_dir: config.output_dir.clone(),
    }, Arc::clone(&stop));

    let inputs: Vec<PathBuf> = args.inputs.iter().map(PathBuf::from).collect();
    let sources = FileScanner::new(&config.extensions).collect(&inputs);

    if args.dry_run {
        for job in plan_jobs(&converter, &sources) {
            println!("{}", converter.command_line(&job));
        }
        return ExitCode::SUCCESS;
    }

    if !f.is_installed() {
        debug!("{:?} -version did not succeed", f.ffmpeg);
        eprintln!("ffmpeg is not installed. Put it on PATH, next to this program, or pass --ffmpeg.");
        return ExitCode::FAILURE;
    }

    let watch_dirs: Vec<PathBuf> = inputs.iter()
        .filter(|p| classify_file(p) == DirEntryCategory::Directory)
        .cloned()
        .collect();
    let watching = args.watch && !watch_dirs.is_empty();

    if sources.is_empty() && !watching {
        eprintln!("Nothing to convert.");
        return ExitCode::SUCCESS;
    }

    for sig in TERM_SIGNALS {
        // a second signal while stopping exits immediately
        if let Err(err) = flag::register_conditional_shutdown(*sig, 1, Arc::clone(&stop))
            .and_then(|_| flag::register(*sig, Arc::clone(&stop))) {
            error!("unable to install handler for signal {}: {}", sig, err);
        }
    }

    let mut processor = QueueProcessor::new(converter, Arc::clone(&stop));
    if watching {
        info!("watching {:?}", watch_dirs);
        match FolderWatcher::new(&watch_dirs, FileScanner::new(&config.extensions), config.watch_interval()) {
            Ok(watcher) => processor.watch(watcher),
            Err(err) => {
                eprintln!("Unable to watch {:?}: {}", watch_dirs, err);
                return ExitCode::FAILURE;
            },
        }
    }
    let display = display::spawn(processor.subscribe());
    processor.enqueue_sources(&sources);

    let summary = processor.run();
    drop(processor);
    let _ = display.join();

    eprintln!("{}", summary);
    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
