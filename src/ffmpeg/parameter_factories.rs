use std::ffi::OsString;

use serde::Deserialize;

pub mod h264;
pub mod template;

pub trait ParameterFactory {
    /// Encoding arguments placed between `-i <source>` and the destination.
    fn parameters(&self) -> Vec<OsString>;
}

/// User-editable encoder settings, read from the `[encoder]` config table.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderSettings {
    pub video_codec: String,
    pub preset: String,
    pub crf: Option<u8>,
    pub video_bitrate: Option<String>,
    pub audio_codec: String,
    pub audio_bitrate: Option<String>,
    pub faststart: bool,
    pub overwrite: bool,
    pub extra_args: Vec<String>,
    /// Replaces every generated encoding argument when set.
    pub template: Option<Vec<String>>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        EncoderSettings {
            video_codec: String::from("libx264"),
            preset: String::from("fast"),
            crf: None,
            video_bitrate: None,
            audio_codec: String::from("aac"),
            audio_bitrate: Some(String::from("128k")),
            faststart: true,
            overwrite: true,
            extra_args: vec![],
            template: None,
        }
    }
}

pub fn create_parameter_factory(settings: &EncoderSettings) -> Box<dyn ParameterFactory> {
    match &settings.template {
        Some(args) => Box::new(template::TemplateParameterFactory::new(args.clone())),
        None => Box::new(h264::H264ParameterFactory::new(settings)),
    }
}
