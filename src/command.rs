//! Textual control commands.

use std::str::FromStr;

use crate::traits::RecorderError;

/// A command received over the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Begin a new recording session.
    Start,
    /// End the current session and wait for the file to be finalized.
    Stop,
}

impl Command {
    /// Every supported command with a one-line description.
    pub const SUPPORTED: [(Self, &'static str); 2] = [
        (Self::Start, "start saving video"),
        (Self::Stop, "stop saving video and increment video file number"),
    ];

    /// Keyword accepted on the control channel.
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

impl FromStr for Command {
    type Err = RecorderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            other => Err(RecorderError::UnsupportedCommand(other.to_owned())),
        }
    }
}

/// Human-readable help for the supported commands, one per line.
pub fn supported_commands() -> String {
    Command::SUPPORTED
        .iter()
        .map(|(cmd, help)| format!("{} - {help}\n", cmd.keyword()))
        .collect()
}
