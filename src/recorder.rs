//! Recorder lifecycle: acquisition-side gate, start/stop commands and shutdown.
//!
//! A [`Recorder`] owns the frame queue and the `video-writer` thread. Frames are
//! offered with [`Recorder::process`] from whichever thread drives acquisition;
//! control commands arrive through [`Recorder::handle_command`] or the `start`,
//! `stop` and `shutdown` methods.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::command::{supported_commands, Command};
use crate::config::{EncodeSettings, RecorderConfig};
use crate::queue::{FrameQueue, Offer, QueueItem};
use crate::session::{SessionWorker, WriterStats};
use crate::state::RecordingState;
use crate::status::{Status, StatusSink};
use crate::traits::{EncoderFactory, Frame, RecorderError, Result};

/// Saves frames to video files on a background thread.
pub struct Recorder {
    queue: Arc<FrameQueue>,
    state: Arc<RecordingState>,
    settings: Arc<RwLock<EncodeSettings>>,
    stats: Arc<WriterStats>,
    sink: Arc<dyn StatusSink>,
    drain_poll: Duration,
    dropped: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Serializes control commands so a sentinel is never interleaved with a start.
    control: Mutex<()>,
}

impl Recorder {
    /// Validate `config` and start the writer thread.
    pub fn spawn<F: EncoderFactory>(
        config: &RecorderConfig,
        factory: F,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self> {
        config.validate()?;

        let queue = Arc::new(FrameQueue::new(config.soft_capacity));
        let state = Arc::new(RecordingState::new());
        let settings = Arc::new(RwLock::new(config.encode.clone()));
        let stats = Arc::new(WriterStats::new(config.first_file_number));

        let worker = SessionWorker::new(
            Arc::clone(&queue),
            Arc::clone(&state),
            Arc::clone(&settings),
            Arc::clone(&stats),
            Arc::clone(&sink),
            factory,
            config.report_interval,
        );

        state.set_running(true);
        let handle = thread::Builder::new()
            .name("video-writer".to_owned())
            .spawn(move || worker.run())
            .inspect_err(|_| state.set_running(false))?;
        info!(
            "Recorder ready, soft capacity {} frames",
            config.soft_capacity
        );

        Ok(Self {
            queue,
            state,
            settings,
            stats,
            sink,
            drain_poll: config.drain_poll(),
            dropped: AtomicU64::new(0),
            worker: Mutex::new(Some(handle)),
            control: Mutex::new(()),
        })
    }

    /// Hand one acquired frame to the recorder. Never waits for the writer.
    ///
    /// The frame is discarded when not recording, and dropped with a warning when
    /// the writer has fallen a full queue behind.
    pub fn process(&self, frame: Frame) -> Offer {
        let offer = self.queue.offer(frame, &self.state);
        if offer == Offer::Dropped {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Image queue too large, video writer cannot keep up - DROPPING FRAME");
        }
        offer
    }

    /// Begin saving frames. A new file is opened when the first frame arrives.
    pub fn start(&self) -> Result<()> {
        let _control = self.control.lock();
        self.ensure_running()?;
        if let Some(reason) = self.stats.fault() {
            return Err(RecorderError::Faulted(reason));
        }

        if self.state.set_recording(true) {
            info!("Already recording");
        } else {
            info!("Recording started");
        }
        self.sink.report(&Status::SaveStart);
        Ok(())
    }

    /// Stop saving and block until every queued frame is written and the file closed.
    ///
    /// Fails with [`RecorderError::Faulted`] if the writer thread died before the
    /// file could be finalized.
    pub fn stop(&self) -> Result<()> {
        let _control = self.control.lock();
        self.ensure_running()?;

        if !self.queue.end_session(&self.state) {
            debug!("Stop requested while not recording");
        }
        self.wait_for_writer()?;
        self.sink.report(&Status::SaveStop);
        Ok(())
    }

    /// Parse and run one control command.
    pub fn handle_command(&self, line: &str) -> Result<()> {
        match line.parse::<Command>()? {
            Command::Start => self.start(),
            Command::Stop => self.stop(),
        }
    }

    /// Human-readable description of the supported commands.
    pub fn supported_commands() -> String {
        supported_commands()
    }

    /// Replace the encoder settings used by the next session.
    pub fn update_settings(&self, settings: EncodeSettings) -> Result<()> {
        settings.validate()?;
        *self.settings.write() = settings;
        Ok(())
    }

    /// Current encoder settings.
    pub fn settings(&self) -> EncodeSettings {
        self.settings.read().clone()
    }

    /// Drain the queue, finalize any open file and stop the writer thread.
    ///
    /// Waits as long as it takes. Calling it again does nothing.
    pub fn shutdown(&self) {
        let _control = self.control.lock();
        let Some(handle) = self.worker.lock().take() else {
            return;
        };

        self.state.set_running(false);
        if !self.queue.end_session(&self.state) {
            // Wake the idle writer so it sees the running flag.
            self.queue.push(QueueItem::EndOfSession);
        }
        info!(
            "Waiting for writer thread to complete, {} frames to go...",
            self.queue.outstanding()
        );
        if handle.join().is_err() {
            error!("Video writer thread panicked -- IGNORED");
        }
        info!("Writer thread completed. Syncing disk...");
        sync_disk();
        if let Some(path) = self.stats.last_output() {
            info!("Video {} saved.", path.display());
        }
        info!("Recorder shut down");
    }

    /// Whether frames are currently being saved.
    pub fn is_recording(&self) -> bool {
        self.state.is_recording()
    }

    /// Number the next file name will be probed from.
    pub fn file_number(&self) -> u32 {
        self.stats.file_number()
    }

    /// Most recently opened output file.
    pub fn last_output(&self) -> Option<PathBuf> {
        self.stats.last_output()
    }

    /// Frames dropped because the writer could not keep up.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Frames waiting in the queue.
    pub fn queued_frames(&self) -> usize {
        self.queue.filled_size()
    }

    /// Fatal writer error, if one happened.
    pub fn fault(&self) -> Option<String> {
        self.stats.fault()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.state.is_running() {
            Ok(())
        } else {
            Err(RecorderError::NotRunning)
        }
    }

    fn wait_for_writer(&self) -> Result<()> {
        let drained = self.queue.wait_drained(self.drain_poll, |remaining| {
            info!("Waiting for writer thread to complete, {remaining} frames to go...");
        });
        if !drained {
            let reason = self.stats.fault().unwrap_or_default();
            error!("Video writer thread is gone, current file was not finalized");
            return Err(RecorderError::Faulted(reason));
        }
        info!("Writer thread completed. Syncing disk...");
        sync_disk();
        if let Some(path) = self.stats.last_output() {
            info!("Video {} saved.", path.display());
        }
        Ok(())
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Flush filesystem buffers so finished recordings survive a power cut.
fn sync_disk() {
    nix::unistd::sync();
}
