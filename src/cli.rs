//! Command-line arguments for the `pi-cam-recorder` binary.

use std::path::PathBuf;

use clap::Parser;

use crate::config::RecorderConfig;
use crate::traits::{FourCC, Format, Result};

/// Record camera frames to video files, controlled by `start`/`stop` on stdin.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE_PATH")]
    pub config: Option<PathBuf>,

    /// V4L2 device index (/dev/videoN)
    #[arg(short, long, default_value_t = 0)]
    pub device: u32,

    /// Use a synthetic color-bar source instead of a camera
    #[arg(long)]
    pub mock: bool,

    /// Capture width in pixels
    #[arg(long, default_value_t = 640)]
    pub width: u32,

    /// Capture height in pixels
    #[arg(long, default_value_t = 480)]
    pub height: u32,

    /// Capture pixel format
    #[arg(long, default_value = "YUYV")]
    pub pixel_format: String,

    /// Output filename template, e.g. video%06d.avi
    #[arg(long)]
    pub filename: Option<String>,

    /// Codec four-character code, e.g. MJPG, MP4V, AVC1
    #[arg(long)]
    pub codec: Option<String>,

    /// Frames per second stored in the file
    #[arg(long)]
    pub fps: Option<f64>,

    /// Directory relative filenames are resolved against
    #[arg(long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// ffmpeg binary used for encoding
    #[arg(long, default_value = "ffmpeg", value_name = "PATH")]
    pub ffmpeg: PathBuf,

    /// Start recording right away instead of waiting for `start`
    #[arg(long)]
    pub autostart: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl CliArgs {
    /// Parse the process arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Load the configuration file, if any, and apply command-line overrides.
    pub fn load_config(&self) -> Result<RecorderConfig> {
        let mut config = match &self.config {
            Some(path) => RecorderConfig::from_file(path)?,
            None => RecorderConfig::default(),
        };
        if let Some(filename) = &self.filename {
            config.encode.filename.clone_from(filename);
        }
        if let Some(codec) = &self.codec {
            config.encode.codec.clone_from(codec);
        }
        if let Some(fps) = self.fps {
            config.encode.fps = fps;
        }
        if let Some(base_dir) = &self.base_dir {
            config.encode.base_dir.clone_from(base_dir);
        }
        config.validate()?;
        Ok(config)
    }

    /// Requested capture format.
    pub fn capture_format(&self) -> Result<Format> {
        let fourcc: FourCC = self.pixel_format.parse()?;
        Ok(Format::new(self.width, self.height, fourcc))
    }
}
