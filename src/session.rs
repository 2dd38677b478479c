//! Video writer thread: one encoder per recording session.
//!
//! The writer pops items from the [`FrameQueue`]. The first frame after a
//! sentinel opens a new output file, following frames are written in arrival
//! order, and the next sentinel closes the file and advances the file number.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::EncodeSettings;
use crate::naming::{next_free_path, FilenameTemplate};
use crate::queue::{FrameQueue, QueueItem};
use crate::state::RecordingState;
use crate::status::{Status, StatusSink};
use crate::traits::{EncoderFactory, EncoderParams, Frame, RecorderError, Result, VideoEncoder};

/// Values the writer publishes for the control side to read.
///
/// Only the writer thread stores into these.
#[derive(Debug, Default)]
pub struct WriterStats {
    file_number: AtomicU32,
    last_output: Mutex<Option<PathBuf>>,
    fault: Mutex<Option<String>>,
    faulted: AtomicBool,
}

impl WriterStats {
    /// Stats starting at the given file number.
    #[must_use]
    pub fn new(first_file_number: u32) -> Self {
        Self {
            file_number: AtomicU32::new(first_file_number),
            ..Self::default()
        }
    }

    /// Number the next session's file will be probed from.
    pub fn file_number(&self) -> u32 {
        self.file_number.load(Ordering::Acquire)
    }

    /// Most recently opened output file.
    pub fn last_output(&self) -> Option<PathBuf> {
        self.last_output.lock().clone()
    }

    /// Fatal error that stopped the writer, if any.
    pub fn fault(&self) -> Option<String> {
        if self.faulted.load(Ordering::Acquire) {
            self.fault.lock().clone()
        } else {
            None
        }
    }

    fn set_fault(&self, reason: String) {
        *self.fault.lock() = Some(reason);
        self.faulted.store(true, Ordering::Release);
    }
}

/// An open output file and its encoder.
struct OpenSession<E> {
    encoder: E,
    path: PathBuf,
    frames: u64,
}

enum WriterState<E> {
    Idle,
    Open(OpenSession<E>),
    Faulted,
}

/// Owns the encoder and the file sequence counter; runs on its own thread.
pub struct SessionWorker<F: EncoderFactory> {
    queue: Arc<FrameQueue>,
    state: Arc<RecordingState>,
    settings: Arc<RwLock<EncodeSettings>>,
    stats: Arc<WriterStats>,
    sink: Arc<dyn StatusSink>,
    factory: F,
    report_interval: u64,
    file_number: u32,
    writer: WriterState<F::Encoder>,
}

impl<F: EncoderFactory> SessionWorker<F> {
    /// Build a worker; nothing happens until [`SessionWorker::run`].
    pub fn new(
        queue: Arc<FrameQueue>,
        state: Arc<RecordingState>,
        settings: Arc<RwLock<EncodeSettings>>,
        stats: Arc<WriterStats>,
        sink: Arc<dyn StatusSink>,
        factory: F,
        report_interval: u64,
    ) -> Self {
        let file_number = stats.file_number();
        Self {
            queue,
            state,
            settings,
            stats,
            sink,
            factory,
            report_interval: report_interval.max(1),
            file_number,
            writer: WriterState::Idle,
        }
    }

    /// Serve sessions until a sentinel arrives while the running flag is off.
    pub fn run(mut self) {
        debug!("Video writer thread started");
        let _guard = PanicGuard {
            queue: Arc::clone(&self.queue),
            stats: Arc::clone(&self.stats),
            sink: Arc::clone(&self.sink),
        };
        loop {
            let item = self.queue.pop();
            let last = match item {
                QueueItem::Frame(frame) => {
                    self.handle_frame(&frame);
                    false
                }
                QueueItem::EndOfSession => {
                    self.end_session();
                    !self.state.is_running()
                }
            };
            self.queue.task_done();
            if last {
                break;
            }
        }
        debug!("Video writer thread exiting");
    }

    fn handle_frame(&mut self, frame: &Frame) {
        if matches!(self.writer, WriterState::Idle) {
            match self.open_session(frame) {
                Ok(session) => self.writer = WriterState::Open(session),
                Err(err) => {
                    self.fail(&err);
                    return;
                }
            }
        }

        let WriterState::Open(session) = &mut self.writer else {
            // Faulted: the frame is discarded.
            return;
        };
        if let Err(err) = session.encoder.write(frame) {
            // Drop the half-written session without finalizing it.
            self.writer = WriterState::Idle;
            self.fail(&err);
            return;
        }
        session.frames += 1;
        if session.frames % self.report_interval == 0 {
            self.sink.report(&Status::SavedNum(session.frames));
        }
    }

    fn open_session(&mut self, frame: &Frame) -> Result<OpenSession<F::Encoder>> {
        let settings = self.settings.read().clone();
        if settings.filename.is_empty() {
            return Err(RecorderError::EmptyFilename);
        }
        let template = FilenameTemplate::parse(&settings.filename)?;
        let codec = settings.codec()?;

        let path = next_free_path(&template, &settings.base_dir, &mut self.file_number)?;
        self.stats
            .file_number
            .store(self.file_number, Ordering::Release);

        let mut encoder = self.factory.create();
        encoder.open(&EncoderParams {
            path: &path,
            codec,
            fps: settings.fps,
            width: frame.width,
            height: frame.height,
            pixel_format: frame.pixel_format,
        })?;

        info!(
            "Saving {}x{} video to {} ({codec} @ {} fps)",
            frame.width,
            frame.height,
            path.display(),
            settings.fps
        );
        *self.stats.last_output.lock() = Some(path.clone());
        self.sink.report(&Status::SaveTo(path.clone()));

        Ok(OpenSession {
            encoder,
            path,
            frames: 0,
        })
    }

    fn end_session(&mut self) {
        match std::mem::replace(&mut self.writer, WriterState::Idle) {
            WriterState::Idle => debug!("Session ended before any frame was recorded"),
            WriterState::Faulted => self.writer = WriterState::Faulted,
            WriterState::Open(mut session) => {
                if let Err(err) = session.encoder.close() {
                    error!("Error closing {}: {err}", session.path.display());
                }
                info!(
                    "Closed {} after {} frames",
                    session.path.display(),
                    session.frames
                );
                self.file_number = self.file_number.saturating_add(1);
                self.stats
                    .file_number
                    .store(self.file_number, Ordering::Release);
            }
        }
    }

    fn fail(&mut self, err: &RecorderError) {
        error!("Video writer failed: {err}");
        warn!("Discarding frames until the recorder is restarted");
        self.writer = WriterState::Faulted;
        self.stats.set_fault(err.to_string());
        self.sink.report(&Status::Error(err.to_string()));
    }
}

/// Releases the control side when the writer thread unwinds.
///
/// A panicking encoder never calls `task_done`, so without this `stop` would wait
/// for the drain forever.
struct PanicGuard {
    queue: Arc<FrameQueue>,
    stats: Arc<WriterStats>,
    sink: Arc<dyn StatusSink>,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }
        let reason = "video writer thread panicked".to_owned();
        error!("{reason}, abandoning queued frames");
        self.stats.set_fault(reason.clone());
        self.queue.abandon();
        self.sink.report(&Status::Error(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{EncoderLog, MemorySink, MockEncoder};
    use crate::traits::{FourCC, Format, FrameMetadata};
    use std::fs;
    use std::path::Path;

    struct Harness {
        queue: Arc<FrameQueue>,
        state: Arc<RecordingState>,
        settings: Arc<RwLock<EncodeSettings>>,
        stats: Arc<WriterStats>,
        sink: Arc<MemorySink>,
        log: EncoderLog,
        handle: Option<thread::JoinHandle<()>>,
    }

    impl Harness {
        fn start(base_dir: &Path, filename: &str, failing: bool) -> Self {
            let queue = Arc::new(FrameQueue::new(1000));
            let state = Arc::new(RecordingState::new());
            state.set_running(true);
            let settings = Arc::new(RwLock::new(EncodeSettings {
                filename: filename.to_owned(),
                codec: "MJPG".to_owned(),
                fps: 30.0,
                base_dir: base_dir.to_path_buf(),
            }));
            let stats = Arc::new(WriterStats::new(0));
            let sink = Arc::new(MemorySink::new());
            let log = EncoderLog::new();

            let factory = {
                let log = log.clone();
                move || {
                    let encoder = MockEncoder::new(log.clone());
                    if failing {
                        encoder.failing_open()
                    } else {
                        encoder
                    }
                }
            };
            let worker = SessionWorker::new(
                Arc::clone(&queue),
                Arc::clone(&state),
                Arc::clone(&settings),
                Arc::clone(&stats),
                Arc::clone(&sink) as Arc<dyn StatusSink>,
                factory,
                100,
            );
            let handle = Some(thread::spawn(move || worker.run()));

            Self {
                queue,
                state,
                settings,
                stats,
                sink,
                log,
                handle,
            }
        }

        fn push_frames(&self, range: std::ops::Range<u32>) {
            for seq in range {
                let frame = Frame::new(
                    vec![0; 8],
                    &Format::new(2, 2, FourCC::YUYV),
                    FrameMetadata {
                        sequence: seq,
                        ..FrameMetadata::default()
                    },
                );
                self.queue.push(QueueItem::Frame(frame));
            }
        }

        fn end_session(&self) {
            self.queue.push(QueueItem::EndOfSession);
            self.queue
                .wait_drained(std::time::Duration::from_millis(10), |_| {});
        }

        fn shutdown(&mut self) {
            self.state.set_running(false);
            self.queue.push(QueueItem::EndOfSession);
            if let Some(handle) = self.handle.take() {
                handle.join().expect("worker panicked");
            }
        }
    }

    #[test]
    fn test_session_writes_frames_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut harness = Harness::start(dir.path(), "video%06d.avi", false);

        harness.push_frames(0..250);
        harness.end_session();

        let sessions = harness.log.sessions();
        assert_eq!(sessions.len(), 1);
        let session = sessions.first().expect("one session");
        assert_eq!(session.frames, (0..250).collect::<Vec<_>>());
        assert!(session.closed);
        assert_eq!(session.path, dir.path().join("video000000.avi"));
        assert_eq!(session.dimensions, (2, 2));
        assert_eq!(harness.stats.file_number(), 1);

        assert_eq!(
            harness.sink.reports(),
            vec![
                Status::SaveTo(dir.path().join("video000000.avi")),
                Status::SavedNum(100),
                Status::SavedNum(200),
            ]
        );
        harness.shutdown();
    }

    #[test]
    fn test_empty_session_creates_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut harness = Harness::start(dir.path(), "video%06d.avi", false);

        harness.end_session();

        assert!(harness.log.sessions().is_empty());
        assert_eq!(harness.stats.file_number(), 0);
        assert!(harness.stats.last_output().is_none());
        harness.shutdown();
    }

    #[test]
    fn test_sessions_rotate_file_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("video000000.avi"), b"old").expect("write");
        let mut harness = Harness::start(dir.path(), "video%06d.avi", false);

        harness.push_frames(0..3);
        harness.end_session();
        harness.push_frames(3..6);
        harness.end_session();

        let paths: Vec<PathBuf> = harness.log.sessions().into_iter().map(|s| s.path).collect();
        assert_eq!(
            paths,
            vec![
                dir.path().join("video000001.avi"),
                dir.path().join("video000002.avi"),
            ]
        );
        assert_eq!(harness.stats.file_number(), 3);
        assert_eq!(
            harness.stats.last_output(),
            Some(dir.path().join("video000002.avi"))
        );
        harness.shutdown();
    }

    #[test]
    fn test_settings_change_between_sessions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut harness = Harness::start(dir.path(), "video%06d.avi", false);

        harness.push_frames(0..2);
        harness.end_session();

        {
            let mut settings = harness.settings.write();
            settings.filename = "clip%03d.mp4".to_owned();
            settings.codec = "MP4V".to_owned();
            settings.fps = 15.0;
        }
        harness.push_frames(2..4);
        harness.end_session();

        let sessions = harness.log.sessions();
        let second = sessions.get(1).expect("two sessions");
        assert_eq!(second.path, dir.path().join("clip001.mp4"));
        assert_eq!(second.codec, FourCC::MP4V);
        assert!((second.fps - 15.0).abs() < f64::EPSILON);
        harness.shutdown();
    }

    #[test]
    fn test_empty_filename_faults_writer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut harness = Harness::start(dir.path(), "", false);

        harness.push_frames(0..5);
        harness.end_session();

        assert!(harness.log.sessions().is_empty());
        assert!(harness.stats.fault().is_some());
        assert_eq!(harness.stats.file_number(), 0);
        assert!(matches!(
            harness.sink.reports().first(),
            Some(Status::Error(_))
        ));
        harness.shutdown();
    }

    #[test]
    fn test_open_failure_faults_writer_and_keeps_draining() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut harness = Harness::start(dir.path(), "video%06d.avi", true);

        harness.push_frames(0..50);
        harness.end_session();
        harness.push_frames(50..60);
        harness.end_session();

        assert_eq!(harness.queue.outstanding(), 0);
        assert!(harness.stats.fault().is_some());
        assert!(harness.log.sessions().is_empty());
        assert_eq!(harness.stats.file_number(), 0);
        // Reported once, not once per frame.
        let errors = harness
            .sink
            .reports()
            .into_iter()
            .filter(|r| matches!(r, Status::Error(_)))
            .count();
        assert_eq!(errors, 1);
        harness.shutdown();
    }

    #[test]
    fn test_unusable_directory_faults_at_encoder_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("blocker"), b"not a directory").expect("write");
        let mut harness = Harness::start(dir.path(), "blocker/clip%d.avi", false);

        harness.push_frames(0..3);
        harness.end_session();

        assert!(harness.log.sessions().is_empty());
        assert!(harness
            .stats
            .fault()
            .is_some_and(|reason| reason.starts_with("I/O error")));
        assert_eq!(harness.stats.file_number(), 0);
        assert_eq!(harness.queue.outstanding(), 0);
        harness.shutdown();
    }

    #[test]
    fn test_shutdown_drains_pending_frames() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut harness = Harness::start(dir.path(), "video%06d.avi", false);

        harness.push_frames(0..500);
        harness.shutdown();

        let sessions = harness.log.sessions();
        assert_eq!(sessions.len(), 1);
        assert!(sessions.first().is_some_and(|s| s.closed && s.frames.len() == 500));
        assert_eq!(harness.stats.file_number(), 1);
    }
}
