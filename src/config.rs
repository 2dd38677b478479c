//! Recorder configuration, loaded from TOML and overridable from the command line.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::queue::DEFAULT_SOFT_CAPACITY;
use crate::traits::{FourCC, RecorderError, Result};
use crate::validation::{validate_codec, validate_fps, validate_template};

fn default_filename() -> String {
    "video%06d.avi".into()
}

fn default_codec() -> String {
    "MJPG".into()
}

const fn default_fps() -> f64 {
    30.0
}

fn default_base_dir() -> PathBuf {
    dirs::video_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("savevideo")
}

const fn default_soft_capacity() -> usize {
    DEFAULT_SOFT_CAPACITY
}

const fn default_report_interval() -> u64 {
    100
}

const fn default_drain_poll_ms() -> u64 {
    200
}

/// Encoder settings the writer snapshots when a session opens.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EncodeSettings {
    /// Output file template with one integer directive. Relative templates are
    /// resolved against `base_dir`.
    #[serde(default = "default_filename")]
    pub filename: String,
    /// Codec four-character code, e.g. `MJPG`, `MP4V`, `AVC1`.
    #[serde(default = "default_codec")]
    pub codec: String,
    /// Frames per second stored in the file.
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Directory relative templates are resolved against.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            filename: default_filename(),
            codec: default_codec(),
            fps: default_fps(),
            base_dir: default_base_dir(),
        }
    }
}

impl EncodeSettings {
    /// Parsed codec identifier.
    pub fn codec(&self) -> Result<FourCC> {
        self.codec.parse()
    }

    /// Check every field. An empty filename is left for the writer to reject.
    pub fn validate(&self) -> Result<()> {
        validate_codec(&self.codec)?;
        validate_fps(self.fps)?;
        if !self.filename.is_empty() {
            validate_template(&self.filename)?;
        }
        Ok(())
    }
}

/// Full recorder configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Encoder settings.
    #[serde(flatten)]
    pub encode: EncodeSettings,
    /// Queue size at which incoming frames are dropped.
    #[serde(default = "default_soft_capacity")]
    pub soft_capacity: usize,
    /// Report the frame count every this many frames.
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,
    /// How often `stop` logs progress while waiting for the writer.
    #[serde(default = "default_drain_poll_ms")]
    pub drain_poll_ms: u64,
    /// Number substituted into the first file name.
    pub first_file_number: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            encode: EncodeSettings::default(),
            soft_capacity: default_soft_capacity(),
            report_interval: default_report_interval(),
            drain_poll_ms: default_drain_poll_ms(),
            first_file_number: 0,
        }
    }
}

impl RecorderConfig {
    /// Load a TOML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| {
            RecorderError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        toml::from_str(&contents)
            .map_err(|err| RecorderError::Config(format!("{}: {err}", path.display())))
    }

    /// Poll interval used while `stop` waits for the writer.
    pub const fn drain_poll(&self) -> Duration {
        Duration::from_millis(self.drain_poll_ms)
    }

    /// Check the whole configuration.
    pub fn validate(&self) -> Result<()> {
        self.encode.validate()?;
        if self.soft_capacity == 0 {
            return Err(RecorderError::Config(
                "soft_capacity must be at least 1".to_owned(),
            ));
        }
        if self.report_interval == 0 {
            return Err(RecorderError::Config(
                "report_interval must be at least 1".to_owned(),
            ));
        }
        if self.drain_poll_ms == 0 {
            return Err(RecorderError::Config(
                "drain_poll_ms must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}
