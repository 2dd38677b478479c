//! Recording and running flags shared between the control and acquisition paths.

use std::sync::atomic::{AtomicBool, Ordering};

/// On/off switches consulted on every acquired frame.
///
/// `recording` is flipped by the `start`/`stop` commands and read by the acquisition
/// path. `running` is true from startup until shutdown and tells the writer thread
/// whether to wait for another session after closing the current one.
#[derive(Debug, Default)]
pub struct RecordingState {
    recording: AtomicBool,
    running: AtomicBool,
}

impl RecordingState {
    /// Both flags start out false.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            recording: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    /// Whether frames should currently be saved.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Turn saving on or off. Returns the previous value.
    pub fn set_recording(&self, on: bool) -> bool {
        self.recording.swap(on, Ordering::AcqRel)
    }

    /// Whether the writer thread should keep serving sessions.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Set the running flag.
    pub fn set_running(&self, on: bool) {
        self.running.store(on, Ordering::Release);
    }
}
