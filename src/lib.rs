//! Pi-Cam-Recorder: save camera frames to video files without stalling capture.
//!
//! Acquisition hands frames to a [`Recorder`], which queues them for a single
//! background writer thread. The writer opens one encoder per recording session,
//! names files so that existing recordings are never overwritten, and finalizes
//! each file before `stop` returns. When the writer falls behind, new frames are
//! dropped instead of blocking the camera.

pub mod cli;
pub mod command;
pub mod config;
pub mod device;
pub mod ffmpeg;
pub mod mock;
pub mod naming;
pub mod queue;
pub mod recorder;
pub mod session;
pub mod state;
pub mod status;
pub mod traits;
pub mod validation;

pub use config::{EncodeSettings, RecorderConfig};
pub use device::V4L2Device;
pub use queue::{FrameQueue, Offer, QueueItem};
pub use recorder::Recorder;
pub use status::{LogSink, Status, StatusSink, StdoutSink};
pub use traits::{
    CameraDevice, DeviceCapabilities, EncoderFactory, EncoderParams, Format, FourCC, Frame,
    FrameMetadata, FrameSource, RecorderError, Result, VideoEncoder,
};
