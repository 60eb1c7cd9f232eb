use std::ffi::OsString;

use super::{EncoderSettings, ParameterFactory};

pub struct H264ParameterFactory {
    settings: EncoderSettings,
}

impl H264ParameterFactory {
    pub fn new(settings: &EncoderSettings) -> Self {
        H264ParameterFactory {
            settings: settings.clone(),
        }
    }
}

impl ParameterFactory for H264ParameterFactory {
    fn parameters(&self) -> Vec<OsString> {
        let s = &self.settings;
        let mut params = vec![
            OsString::from("-c:v"), OsString::from(&s.video_codec),
            OsString::from("-preset"), OsString::from(&s.preset),
        ];

        if let Some(crf) = s.crf {
            params.push(OsString::from("-crf"));
            params.push(OsString::from(crf.to_string()));
        }

        if let Some(bitrate) = &s.video_bitrate {
            params.push(OsString::from("-b:v"));
            params.push(OsString::from(bitrate));
        }

        params.push(OsString::from("-c:a"));
        params.push(OsString::from(&s.audio_codec));

        if let Some(bitrate) = &s.audio_bitrate {
            params.push(OsString::from("-b:a"));
            params.push(OsString::from(bitrate));
        }

        // moov atom up front so the mp4 plays while still downloading
        if s.faststart {
            params.push(OsString::from("-movflags"));
            params.push(OsString::from("+faststart"));
        }

        params.extend(s.extra_args.iter().map(OsString::from));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(params: Vec<OsString>) -> Vec<String> {
        params.into_iter().map(|p| p.into_string().unwrap()).collect()
    }

    #[test]
    fn test_default_parameters() {
        let params = strings(H264ParameterFactory::new(&EncoderSettings::default()).parameters());
        assert_eq!(params, vec![
            "-c:v", "libx264", "-preset", "fast",
            "-c:a", "aac", "-b:a", "128k",
            "-movflags", "+faststart",
        ]);
    }

    #[test]
    fn test_quality_parameters() {
        let settings = EncoderSettings {
            preset: String::from("slow"),
            crf: Some(20),
            video_bitrate: Some(String::from("4M")),
            audio_bitrate: None,
            faststart: false,
            extra_args: vec![String::from("-pix_fmt"), String::from("yuv420p")],
            ..EncoderSettings::default()
        };
        let params = strings(H264ParameterFactory::new(&settings).parameters());
        assert_eq!(params, vec![
            "-c:v", "libx264", "-preset", "slow", "-crf", "20", "-b:v", "4M",
            "-c:a", "aac", "-pix_fmt", "yuv420p",
        ]);
    }
}
