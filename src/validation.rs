//! Validation utilities for settings and recorded frame streams.

use crate::naming::FilenameTemplate;
use crate::traits::{FourCC, Frame, RecorderError, Result};

/// Validates a codec identifier: exactly four ASCII alphanumeric characters.
///
/// Whether the encoder actually supports the codec is only known when it opens.
pub fn validate_codec(codec: &str) -> Result<FourCC> {
    codec.parse()
}

/// Validates that the frame rate is a positive, finite number.
pub fn validate_fps(fps: f64) -> Result<()> {
    if fps.is_finite() && fps > 0.0 {
        Ok(())
    } else {
        Err(RecorderError::InvalidFrameRate(fps))
    }
}

/// Validates that a filename template holds exactly one integer directive.
pub fn validate_template(template: &str) -> Result<()> {
    FilenameTemplate::parse(template).map(|_| ())
}

/// Validates that a sequence of frames has incrementing sequence numbers.
///
/// This function checks that frame sequence numbers increment by 1 with no gaps,
/// which is how a recording that lost or reordered frames shows up.
///
/// # Errors
///
/// Returns `StreamError` if:
/// - The frames slice is empty
/// - Any sequence number doesn't increment by exactly 1 from the previous
pub fn validate_frame_sequence(frames: &[Frame]) -> Result<()> {
    if frames.is_empty() {
        return Err(RecorderError::StreamError(
            "Cannot validate empty frame sequence".to_owned(),
        ));
    }

    for (i, pair) in frames.windows(2).enumerate() {
        let [prev_frame, curr_frame] = pair else {
            continue;
        };
        let prev_seq = prev_frame.metadata.sequence;
        let curr_seq = curr_frame.metadata.sequence;

        if curr_seq != prev_seq.wrapping_add(1) {
            return Err(RecorderError::StreamError(format!(
                "Frame sequence gap at index {}: expected {}, got {curr_seq}",
                i + 1,
                prev_seq.wrapping_add(1)
            )));
        }
    }

    Ok(())
}
