//! Encoder backend that pipes raw frames into an `ffmpeg` subprocess.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::traits::{EncoderParams, FourCC, Frame, RecorderError, Result, VideoEncoder};

/// Map a codec four-character code to an ffmpeg encoder name and optional codec tag.
pub fn codec_for(fourcc: FourCC) -> Option<(&'static str, Option<&'static str>)> {
    let codec = match &fourcc.0 {
        b"MJPG" => ("mjpeg", None),
        b"MP4V" | b"FMP4" => ("mpeg4", None),
        b"XVID" => ("mpeg4", Some("xvid")),
        b"DIVX" | b"DX50" => ("mpeg4", Some("divx")),
        b"H264" | b"X264" => ("libx264", None),
        b"AVC1" | b"avc1" => ("libx264", Some("avc1")),
        b"HEVC" | b"H265" => ("libx265", None),
        b"HVC1" | b"hvc1" => ("libx265", Some("hvc1")),
        b"VP80" => ("libvpx", None),
        b"VP90" => ("libvpx-vp9", None),
        b"FFV1" => ("ffv1", None),
        _ => return None,
    };
    Some(codec)
}

/// Map a V4L2 pixel format to the ffmpeg rawvideo `pix_fmt`.
pub fn pix_fmt_for(fourcc: FourCC) -> Option<&'static str> {
    match &fourcc.0 {
        b"YUYV" => Some("yuyv422"),
        b"UYVY" => Some("uyvy422"),
        b"RGB3" => Some("rgb24"),
        b"BGR3" => Some("bgr24"),
        b"GREY" => Some("gray"),
        _ => None,
    }
}

/// Build the ffmpeg command line for one output file.
pub fn build_ffmpeg_command(ffmpeg_path: &Path, params: &EncoderParams<'_>) -> Result<Command> {
    let (codec, tag) =
        codec_for(params.codec).ok_or(RecorderError::UnsupportedCodec(params.codec))?;
    let pix_fmt = pix_fmt_for(params.pixel_format)
        .ok_or(RecorderError::UnsupportedPixelFormat(params.pixel_format))?;

    let mut cmd = Command::new(ffmpeg_path);
    cmd.args(["-hide_banner", "-loglevel", "warning"]);
    // Never overwrite: the caller already picked a fresh name.
    cmd.arg("-n");

    cmd.args(["-f", "rawvideo", "-pix_fmt", pix_fmt]);
    cmd.arg("-s")
        .arg(format!("{}x{}", params.width, params.height));
    cmd.arg("-r").arg(params.fps.to_string());
    cmd.args(["-i", "pipe:0"]);

    cmd.args(["-c:v", codec]);
    if let Some(tag) = tag {
        cmd.args(["-tag:v", tag]);
    }
    if codec == "mjpeg" {
        cmd.args(["-q:v", "3", "-pix_fmt", "yuvj422p"]);
    }
    cmd.arg(params.path);

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    Ok(cmd)
}

struct Running {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stderr_drain: Option<JoinHandle<()>>,
    path: PathBuf,
    frame_size: (u32, u32),
}

/// Encodes with an external `ffmpeg` binary.
pub struct FfmpegEncoder {
    ffmpeg_path: PathBuf,
    running: Option<Running>,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegEncoder {
    /// Encoder invoking the given ffmpeg binary.
    pub fn new<P: Into<PathBuf>>(ffmpeg_path: P) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            running: None,
        }
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn open(&mut self, params: &EncoderParams<'_>) -> Result<()> {
        let open_err = |reason: String| RecorderError::EncoderOpen {
            path: params.path.to_path_buf(),
            reason,
        };

        let mut cmd = build_ffmpeg_command(&self.ffmpeg_path, params)?;
        debug!("Spawning {cmd:?}");
        let mut child = cmd
            .spawn()
            .map_err(|err| open_err(format!("cannot run {}: {err}", self.ffmpeg_path.display())))?;

        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(open_err("ffmpeg stdin unavailable".to_owned()));
        };
        let stderr_drain = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    match line {
                        Ok(line) if !line.is_empty() => debug!("[ffmpeg] {line}"),
                        Ok(_) => {}
                        Err(err) => {
                            warn!("[ffmpeg] failed to read stderr: {err}");
                            break;
                        }
                    }
                }
            })
        });

        // ffmpeg rejects bad options right away; catch that before the first write.
        if let Ok(Some(status)) = child.try_wait() {
            return Err(open_err(format!("ffmpeg exited with {status}")));
        }

        self.running = Some(Running {
            child,
            stdin: BufWriter::new(stdin),
            stderr_drain,
            path: params.path.to_path_buf(),
            frame_size: (params.width, params.height),
        });
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        let running = self
            .running
            .as_mut()
            .ok_or_else(|| RecorderError::EncoderWrite("encoder is not open".to_owned()))?;
        if frame.dimensions() != running.frame_size {
            return Err(RecorderError::EncoderWrite(format!(
                "frame is {}x{}, file was opened for {}x{}",
                frame.width, frame.height, running.frame_size.0, running.frame_size.1
            )));
        }
        running
            .stdin
            .write_all(&frame.data)
            .map_err(|err| RecorderError::EncoderWrite(err.to_string()))
    }

    fn close(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        let Running {
            mut child,
            stdin,
            stderr_drain,
            path,
            ..
        } = running;

        // Closing stdin is ffmpeg's end-of-stream; it then writes the trailer.
        let flushed = stdin.into_inner().map(drop).map_err(|err| err.into_error());
        let status = child.wait()?;
        if let Some(drain) = stderr_drain {
            let _ = drain.join();
        }

        if let Err(err) = flushed {
            return Err(RecorderError::EncoderClose(format!(
                "{}: {err}",
                path.display()
            )));
        }
        if status.success() {
            Ok(())
        } else {
            Err(RecorderError::EncoderClose(format!(
                "ffmpeg exited with {status} for {}",
                path.display()
            )))
        }
    }

    fn is_open(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if let Some(mut running) = self.running.take() {
            warn!("Killing ffmpeg for unfinished {}", running.path.display());
            let _ = running.child.kill();
            let _ = running.child.wait();
        }
    }
}
