pub mod capture;
pub mod ebd;
pub mod pipeline;
pub mod report;
pub mod utils;

use std::path::Path;

use capture::frame::{PixelFormat, DEFAULT_SAMPLE_LEN};
use serde::{Deserialize, Serialize};

pub use capture::{CaptureDevice, DeviceError, FrameSample};
pub use ebd::{decode, DecodeError, EmbeddedMetadataRecord};
pub use pipeline::{CancelToken, Pipeline, PipelineState, RunSummary};

/// System configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Device node; empty picks the first node offering a raw format.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub frame_count: u64,
    /// Leading bytes of each frame kept for decoding.
    pub sample_len: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `ebdcap=debug`.
    pub filter: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            width: 1920,
            height: 1080,
            format: PixelFormat::Uyvy,
            buffer_count: 1,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_count: 10,
            sample_len: DEFAULT_SAMPLE_LEN,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "ebdcap=info".into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            pipeline: PipelineConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Defaults, overlaid with the TOML file at `path` when one is given.
    /// Keys missing from the file keep their default.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_without_file_gives_defaults() {
        let cfg = Config::load(None).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(cfg.capture.device.is_empty());
    }

    #[test]
    fn file_overrides_selected_keys() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [capture]
            device = "/dev/video2"
            width = 640

            [pipeline]
            frame_count = 3
            "#
        )
        .unwrap();

        let cfg = Config::load(Some(file.path())).unwrap();
        assert_eq!(cfg.capture.device, "/dev/video2");
        assert_eq!(cfg.capture.width, 640);
        assert_eq!(cfg.capture.height, 1080);
        assert_eq!(cfg.capture.format, PixelFormat::Uyvy);
        assert_eq!(cfg.pipeline.frame_count, 3);
        assert_eq!(cfg.pipeline.sample_len, 600);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/ebdcap.toml"))).is_err());
    }
}
