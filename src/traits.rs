//! Core traits and types shared by the acquisition and encoding paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Four-character code, used both for pixel formats (e.g., YUYV) and codecs (e.g., MJPG).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// UYVY pixel format (4:2:2 packed, chroma first).
    pub const UYVY: Self = Self::new(b"UYVY");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");
    /// BGR3 pixel format (24-bit BGR).
    pub const BGR3: Self = Self::new(b"BGR3");
    /// GREY pixel format (8-bit luminance).
    pub const GREY: Self = Self::new(b"GREY");
    /// Motion JPEG codec.
    pub const MJPG: Self = Self::new(b"MJPG");
    /// MPEG-4 part 2 codec.
    pub const MP4V: Self = Self::new(b"MP4V");

    /// The code as a string, if it is valid ASCII.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Bytes per pixel for packed pixel formats, `None` for unknown formats.
    pub const fn bytes_per_pixel(self) -> Option<u32> {
        match &self.0 {
            b"YUYV" | b"UYVY" => Some(2),
            b"RGB3" | b"BGR3" => Some(3),
            b"GREY" => Some(1),
            _ => None,
        }
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(code) => f.write_str(code),
            None => write!(f, "{:?}", self.0),
        }
    }
}

impl FromStr for FourCC {
    type Err = RecorderError;

    /// Parse exactly four ASCII alphanumeric characters (underscore allowed).
    fn from_str(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        let code: [u8; 4] = bytes
            .try_into()
            .map_err(|_| RecorderError::InvalidCodec(s.to_owned()))?;
        if code.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'_') {
            Ok(Self(code))
        } else {
            Err(RecorderError::InvalidCodec(s.to_owned()))
        }
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl Format {
    /// Create a new format specification, assuming a packed layout.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let bpp = match fourcc.bytes_per_pixel() {
            Some(bpp) => bpp,
            None => 2,
        };
        let stride = width * bpp;
        let size = stride * height;
        Self {
            width,
            height,
            fourcc,
            stride,
            size,
        }
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
}

/// A captured video frame, owned and immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw pixel data.
    pub data: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel layout of `data`.
    pub pixel_format: FourCC,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

impl Frame {
    /// Wrap raw pixel data captured in the given format.
    #[must_use]
    pub fn new(data: Vec<u8>, format: &Format, metadata: FrameMetadata) -> Self {
        Self {
            data,
            width: format.width,
            height: format.height,
            pixel_format: format.fourcc,
            metadata,
        }
    }

    /// Frame dimensions as `(width, height)`.
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Error type for recorder operations.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// Device with given index was not found.
    #[error("Device {0} not found")]
    DeviceNotFound(u32),
    /// Failed to open device.
    #[error("Failed to open device: {0}")]
    DeviceOpenFailed(String),
    /// Requested format is not supported.
    #[error("Format not supported: {0:?}")]
    FormatNotSupported(Format),
    /// Error during streaming operation.
    #[error("Stream error: {0}")]
    StreamError(String),
    /// The configured output filename is empty.
    #[error("Cannot save to an empty filename")]
    EmptyFilename,
    /// The filename template does not hold exactly one integer directive.
    #[error("Invalid filename template [{template}]: {reason}")]
    InvalidTemplate {
        /// Offending template.
        template: String,
        /// What is wrong with it.
        reason: String,
    },
    /// Codec identifier is not four alphanumeric characters.
    #[error("Invalid codec identifier [{0}], expected 4 alphanumeric characters")]
    InvalidCodec(String),
    /// Codec identifier is well formed but the encoder does not know it.
    #[error("Codec {0} is not supported by the encoder")]
    UnsupportedCodec(FourCC),
    /// Frames in this pixel format cannot be fed to the encoder.
    #[error("Pixel format {0} is not supported by the encoder")]
    UnsupportedPixelFormat(FourCC),
    /// Frame rate is not a positive finite number.
    #[error("Invalid frame rate {0}")]
    InvalidFrameRate(f64),
    /// The encoder could not be opened.
    #[error("Failed to open video encoder for file [{}]: {reason}", .path.display())]
    EncoderOpen {
        /// Output file the encoder was opened for.
        path: PathBuf,
        /// Backend-specific reason.
        reason: String,
    },
    /// Every file number from the counter upward is already taken.
    #[error("No free file name left, last candidate [{}] exists", .0.display())]
    FileNumbersExhausted(PathBuf),
    /// Writing a frame to the encoder failed.
    #[error("Failed to write frame: {0}")]
    EncoderWrite(String),
    /// Finalizing the output file failed.
    #[error("Failed to close video encoder: {0}")]
    EncoderClose(String),
    /// Unrecognized control command.
    #[error("Unsupported module command [{0}]")]
    UnsupportedCommand(String),
    /// The writer hit a fatal error earlier and cannot record anymore.
    #[error("Recorder is in a failed state: {0}")]
    Faulted(String),
    /// The recorder has already been shut down.
    #[error("Recorder is not running")]
    NotRunning,
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for recorder operations.
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Abstraction over camera device operations.
pub trait CameraDevice {
    /// The stream type returned by `create_stream`.
    type Stream<'a>: FrameSource
    where
        Self: 'a;

    /// Get device capabilities.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Get current format.
    fn format(&self) -> Result<Format>;

    /// Set capture format. Returns the actual format set by the driver.
    fn set_format(&mut self, format: &Format) -> Result<Format>;

    /// Create a capture stream with the specified number of buffers.
    fn create_stream(&mut self, buffer_count: u32) -> Result<Self::Stream<'_>>;
}

/// Yields one frame per acquisition cycle.
pub trait FrameSource {
    /// Capture the next frame from the stream.
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Parameters an encoder is opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderParams<'a> {
    /// Output container file.
    pub path: &'a Path,
    /// Codec identifier.
    pub codec: FourCC,
    /// Frames per second stored in the container.
    pub fps: f64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel layout of the frames that will be written.
    pub pixel_format: FourCC,
}

/// Video encoder / container writer with an open, write, close lifecycle.
pub trait VideoEncoder: Send {
    /// Open the output file. Fails if the codec or format cannot be used.
    fn open(&mut self, params: &EncoderParams<'_>) -> Result<()>;

    /// Encode one frame.
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Finalize the container and release the backend.
    fn close(&mut self) -> Result<()>;

    /// Whether `open` succeeded and `close` has not been called yet.
    fn is_open(&self) -> bool;
}

/// Creates a fresh encoder for every recording session.
pub trait EncoderFactory: Send + 'static {
    /// Encoder type produced.
    type Encoder: VideoEncoder;

    /// Build an unopened encoder.
    fn create(&self) -> Self::Encoder;
}

impl<F, E> EncoderFactory for F
where
    F: Fn() -> E + Send + 'static,
    E: VideoEncoder,
{
    type Encoder = E;

    fn create(&self) -> E {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_parse() {
        let codec: FourCC = "MP4V".parse().expect("valid codec");
        assert_eq!(codec, FourCC::MP4V);
        assert_eq!(codec.to_string(), "MP4V");
    }

    #[test]
    fn test_fourcc_parse_rejects_bad_codes() {
        assert!("MP4".parse::<FourCC>().is_err());
        assert!("MP4VX".parse::<FourCC>().is_err());
        assert!("MP-4".parse::<FourCC>().is_err());
        assert!("".parse::<FourCC>().is_err());
    }

    #[test]
    fn test_format_stride_follows_pixel_format() {
        assert_eq!(Format::new(640, 480, FourCC::YUYV).stride, 1280);
        assert_eq!(Format::new(640, 480, FourCC::RGB3).stride, 1920);
        assert_eq!(Format::new(640, 480, FourCC::GREY).size, 640 * 480);
    }

    #[test]
    fn test_frame_takes_format_dimensions() {
        let format = Format::new(320, 240, FourCC::YUYV);
        let frame = Frame::new(vec![0; 16], &format, FrameMetadata::default());
        assert_eq!(frame.dimensions(), (320, 240));
        assert_eq!(frame.pixel_format, FourCC::YUYV);
    }
}
