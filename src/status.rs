//! Status reports sent to the external control channel.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use tracing::{info, warn};

/// A message for whoever is driving the recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Recording was switched on.
    SaveStart,
    /// Recording was switched off and the file finalized.
    SaveStop,
    /// A new session opened this output file.
    SaveTo(PathBuf),
    /// Cumulative number of frames written in the current session.
    SavedNum(u64),
    /// The writer hit a fatal error.
    Error(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SaveStart => f.write_str("SAVESTART"),
            Self::SaveStop => f.write_str("SAVESTOP"),
            Self::SaveTo(path) => write!(f, "SAVETO {}", path.display()),
            Self::SavedNum(count) => write!(f, "SAVEDNUM {count}"),
            Self::Error(msg) => write!(f, "ERR {msg}"),
        }
    }
}

/// Best-effort destination for status reports. Must not block for long.
pub trait StatusSink: Send + Sync {
    /// Deliver one report. Failures are the sink's own business.
    fn report(&self, status: &Status);
}

/// Sends reports to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn report(&self, status: &Status) {
        info!("{status}");
    }
}

/// Writes one report per line to stdout, like a serial console.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl StatusSink for StdoutSink {
    fn report(&self, status: &Status) {
        let mut out = std::io::stdout().lock();
        if let Err(err) = writeln!(out, "{status}").and_then(|()| out.flush()) {
            warn!("Failed to send status [{status}]: {err}");
        }
    }
}
