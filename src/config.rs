use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::ffmpeg::parameter_factories::EncoderSettings;

pub const DEFAULT_CONFIG_FILE: &str = "convert-mp4.toml";

pub const DEFAULT_EXTENSIONS: [&str; 15] = [
    "avi", "mkv", "mov", "wmv", "flv", "mts", "mpg", "mpeg", "mp4", "m4v", "3gp", "3g2", "ts", "webm", "vob",
];

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub probe_timeout_secs: u64,
    pub watch_interval_secs: u64,
    pub extensions: Vec<String>,
    pub encoder: EncoderSettings,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ffmpeg: None,
            ffprobe: None,
            output_dir: None,
            probe_timeout_secs: 8,
            watch_interval_secs: 2,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| String::from(*e)).collect(),
            encoder: EncoderSettings::default(),
        }
    }
}

impl Config {
    /// Loads `path` if given, else `convert-mp4.toml` from the working
    /// directory when it exists, else the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Config::from_file(p),
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Config::from_file(&default_path)
                } else {
                    Ok(Config::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(text)?;
        config.extensions = config.extensions.iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        Ok(config)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs.max(1))
    }
}
