//! Mock collaborators for running without hardware or ffmpeg.
//!
//! `MockDevice` produces synthetic YUYV frames, `MockEncoder` records what it is
//! asked to encode and writes a small marker file per session, and `MemorySink`
//! keeps every status report.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::status::{Status, StatusSink};
use crate::traits::{
    CameraDevice, DeviceCapabilities, EncoderParams, FourCC, Format, Frame, FrameMetadata,
    FrameSource, RecorderError, Result, VideoEncoder,
};

/// Mock device for testing without hardware.
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    format: Format,
    frame_count: u32,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a new mock device with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            format: Format::new(640, 480, FourCC::YUYV),
            frame_count: 0,
        }
    }

    /// Set the format for this mock device.
    #[must_use]
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }
}

impl CameraDevice for MockDevice {
    type Stream<'a> = MockStream<'a>;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        Ok(self.format.clone())
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        if format.fourcc != FourCC::YUYV {
            return Err(RecorderError::FormatNotSupported(format.clone()));
        }
        self.format = Format::new(format.width, format.height, FourCC::YUYV);
        Ok(self.format.clone())
    }

    fn create_stream(&mut self, _buffer_count: u32) -> Result<Self::Stream<'_>> {
        Ok(MockStream {
            device: self,
            pattern: TestPattern::ColorBars,
            frame_interval: None,
        })
    }
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// Mock capture stream for testing.
pub struct MockStream<'a> {
    device: &'a mut MockDevice,
    pattern: TestPattern,
    frame_interval: Option<Duration>,
}

impl MockStream<'_> {
    /// Set the test pattern for frame generation.
    #[must_use]
    pub fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Sleep this long before every frame, like a camera running at a fixed rate.
    #[must_use]
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }
}

impl FrameSource for MockStream<'_> {
    fn next_frame(&mut self) -> Result<Frame> {
        if let Some(interval) = self.frame_interval {
            thread::sleep(interval);
        }

        let format = &self.device.format;
        let data = generate_test_frame(format, self.pattern);

        let seq = self.device.frame_count;
        self.device.frame_count = self.device.frame_count.wrapping_add(1);

        let metadata = FrameMetadata {
            sequence: seq,
            timestamp: Duration::from_millis(u64::from(seq) * 33), // ~30fps
            bytes_used: format.size,
        };
        Ok(Frame::new(data, format, metadata))
    }
}

/// Generate YUYV test frame data based on pattern.
fn generate_test_frame(format: &Format, pattern: TestPattern) -> Vec<u8> {
    let width = format.width as usize;
    let height = format.height as usize;
    let mut data = vec![0u8; width * height * 2];

    // Each 4-byte macropixel [Y0 U Y1 V] covers two horizontal pixels.
    let pairs_per_row = width / 2;
    for (idx, macropixel) in data.chunks_exact_mut(4).enumerate() {
        let x = (idx % pairs_per_row.max(1)) * 2;
        let (y_val, u_val, v_val) = match pattern {
            TestPattern::ColorBars => color_bar_at(x, width),
            TestPattern::Gradient => gradient_at(x, width),
            TestPattern::Solid(y, u, v) => (y, u, v),
        };
        macropixel.copy_from_slice(&[y_val, u_val, y_val, v_val]);
    }

    data
}

/// YUV value of the SMPTE bar covering column `x`.
fn color_bar_at(x: usize, width: usize) -> (u8, u8, u8) {
    // White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    const BARS: [(u8, u8, u8); 8] = [
        (235, 128, 128),
        (210, 16, 146),
        (170, 166, 16),
        (145, 54, 34),
        (106, 202, 222),
        (81, 90, 240),
        (41, 240, 110),
        (16, 128, 128),
    ];
    let bar_width = (width / 8).max(1);
    BARS.get((x / bar_width).min(7))
        .copied()
        .unwrap_or((16, 128, 128))
}

/// Dark-to-light luminance ramp with neutral chroma.
fn gradient_at(x: usize, width: usize) -> (u8, u8, u8) {
    let y_val = u8::try_from(x * 255 / width.max(1)).unwrap_or(u8::MAX);
    (y_val, 128, 128)
}

/// What a `MockEncoder` was asked to do during one session.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSession {
    /// Output file.
    pub path: PathBuf,
    /// Codec it was opened with.
    pub codec: FourCC,
    /// Frame rate it was opened with.
    pub fps: f64,
    /// Frame dimensions it was opened with.
    pub dimensions: (u32, u32),
    /// Sequence numbers of the written frames, in write order.
    pub frames: Vec<u32>,
    /// Whether `close` was called.
    pub closed: bool,
}

/// Shared record of every session opened by encoders from one factory.
#[derive(Debug, Clone, Default)]
pub struct EncoderLog(Arc<Mutex<Vec<RecordedSession>>>);

impl EncoderLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all sessions so far.
    pub fn sessions(&self) -> Vec<RecordedSession> {
        self.0.lock().clone()
    }
}

/// In-memory encoder that writes a marker file per session.
///
/// The file holds a header on open and a `frames=N` trailer on close, so a file
/// without the trailer was never finalized.
#[derive(Debug)]
pub struct MockEncoder {
    log: EncoderLog,
    fail_open: bool,
    write_delay: Option<Duration>,
    session: Option<(usize, File)>,
}

impl MockEncoder {
    /// Encoder recording into `log`.
    #[must_use]
    pub fn new(log: EncoderLog) -> Self {
        Self {
            log,
            fail_open: false,
            write_delay: None,
            session: None,
        }
    }

    /// Make every `open` fail, like an unknown codec.
    #[must_use]
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Sleep this long on every `write`, like a slow encoder.
    #[must_use]
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }
}

impl VideoEncoder for MockEncoder {
    fn open(&mut self, params: &EncoderParams<'_>) -> Result<()> {
        if self.fail_open {
            return Err(RecorderError::EncoderOpen {
                path: params.path.to_path_buf(),
                reason: format!("codec {} rejected by mock encoder", params.codec),
            });
        }

        let mut file = File::create_new(params.path)?;
        writeln!(
            file,
            "mock {} {}x{} @ {}",
            params.codec, params.width, params.height, params.fps
        )?;

        let mut sessions = self.log.0.lock();
        sessions.push(RecordedSession {
            path: params.path.to_path_buf(),
            codec: params.codec,
            fps: params.fps,
            dimensions: (params.width, params.height),
            frames: Vec::new(),
            closed: false,
        });
        self.session = Some((sessions.len() - 1, file));
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        let Some((idx, _)) = &self.session else {
            return Err(RecorderError::EncoderWrite("encoder is not open".to_owned()));
        };
        if let Some(delay) = self.write_delay {
            thread::sleep(delay);
        }
        if let Some(session) = self.log.0.lock().get_mut(*idx) {
            session.frames.push(frame.metadata.sequence);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some((idx, mut file)) = self.session.take() else {
            return Ok(());
        };
        let mut sessions = self.log.0.lock();
        let Some(session) = sessions.get_mut(idx) else {
            return Err(RecorderError::EncoderClose("session vanished".to_owned()));
        };
        writeln!(file, "frames={}", session.frames.len())
            .and_then(|()| file.sync_all())
            .map_err(|err| RecorderError::EncoderClose(err.to_string()))?;
        session.closed = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.session.is_some()
    }
}

/// Status sink that keeps every report in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<Status>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the reports received so far.
    pub fn reports(&self) -> Vec<Status> {
        self.reports.lock().clone()
    }
}

impl StatusSink for MemorySink {
    fn report(&self, status: &Status) {
        self.reports.lock().push(status.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    #[test]
    fn test_mock_device_creation() {
        let device = MockDevice::new();
        assert_eq!(device.capabilities().driver, "mock");
        assert!(device.capabilities().can_capture);
        assert!(device.capabilities().can_stream);
    }

    #[test]
    fn test_mock_device_format() {
        let mut device = MockDevice::new();
        let format = device.format().expect("format should succeed");
        assert_eq!(format.width, 640);
        assert_eq!(format.height, 480);

        let new_format = Format::new(1280, 720, FourCC::YUYV);
        let actual = device.set_format(&new_format).expect("set_format should succeed");
        assert_eq!(actual.width, 1280);
        assert_eq!(actual.height, 720);

        let rgb = Format::new(1280, 720, FourCC::RGB3);
        assert!(device.set_format(&rgb).is_err());
    }

    #[test]
    fn test_mock_stream_capture() {
        let mut device = MockDevice::new().with_format(Format::new(64, 48, FourCC::YUYV));
        let mut stream = device.create_stream(4).expect("create_stream should succeed");

        let frame1 = stream.next_frame().expect("next_frame should succeed");
        assert_eq!(frame1.metadata.sequence, 0);
        assert_eq!(frame1.dimensions(), (64, 48));
        assert_eq!(frame1.data.len(), 64 * 48 * 2);

        let frame2 = stream.next_frame().expect("next_frame should succeed");
        assert_eq!(frame2.metadata.sequence, 1);
    }

    #[test]
    fn test_color_bars_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::ColorBars);

        assert_eq!(data.len(), 640 * 480 * 2);
        // First bar is white, last bar is black
        assert_eq!(data.first().copied(), Some(235));
        assert_eq!(data.get(639 * 2).copied(), Some(16));
    }

    #[test]
    fn test_gradient_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::Gradient);

        assert!(data.first().copied().unwrap_or(255) < 10);
        let last_row_start = 479 * 640 * 2;
        let last_pixel_y = data.get(last_row_start + 638 * 2).copied().unwrap_or(0);
        assert!(last_pixel_y > 200);
    }

    #[test]
    fn test_solid_pattern() {
        let format = Format::new(64, 64, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::Solid(128, 64, 192));
        assert_eq!(data.get(..4), Some(&[128, 64, 128, 192][..]));
    }

    fn params(path: &Path) -> EncoderParams<'_> {
        EncoderParams {
            path,
            codec: FourCC::MJPG,
            fps: 30.0,
            width: 4,
            height: 2,
            pixel_format: FourCC::YUYV,
        }
    }

    #[test]
    fn test_mock_encoder_lifecycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.avi");
        let log = EncoderLog::new();
        let mut encoder = MockEncoder::new(log.clone());
        let mut device = MockDevice::new().with_format(Format::new(4, 2, FourCC::YUYV));
        let mut stream = device.create_stream(1).expect("create_stream should succeed");

        encoder.open(&params(&path)).expect("open should succeed");
        assert!(encoder.is_open());
        for _ in 0..3 {
            let frame = stream.next_frame().expect("next_frame should succeed");
            encoder.write(&frame).expect("write should succeed");
        }
        encoder.close().expect("close should succeed");
        assert!(!encoder.is_open());

        let sessions = log.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions.first().map(|s| s.frames.clone()), Some(vec![0, 1, 2]));
        assert!(sessions.first().is_some_and(|s| s.closed));

        let contents = fs::read_to_string(&path).expect("read output");
        assert!(contents.ends_with("frames=3\n"));
    }

    #[test]
    fn test_mock_encoder_refuses_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.avi");
        fs::write(&path, b"keep me").expect("write");

        let mut encoder = MockEncoder::new(EncoderLog::new());
        assert!(encoder.open(&params(&path)).is_err());
        assert_eq!(fs::read(&path).expect("read"), b"keep me");
    }

    #[test]
    fn test_mock_encoder_failing_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.avi");
        let mut encoder = MockEncoder::new(EncoderLog::new()).failing_open();

        assert!(matches!(
            encoder.open(&params(&path)),
            Err(RecorderError::EncoderOpen { .. })
        ));
        assert!(!path.exists());
    }
}
