use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use candle_core::Tensor;
use tracing::debug;

use crate::tensor_to_frames;

/// Turns one video tensor into a playable file at `path`.
pub trait VideoEncoder: Send + Sync {
    fn encode(&self, video: &Tensor, path: &Path, fps: u32) -> Result<()>;
}

/// Encodes H.264 mp4 files by piping raw RGB frames into `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: String,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(&self, video: &Tensor, path: &Path, fps: u32) -> Result<()> {
        let frames = tensor_to_frames(video)?;
        let (width, height) = frames
            .first()
            .map(|frame| frame.dimensions())
            .context("video has no frames")?;

        debug!(
            path = %path.display(),
            frames = frames.len(),
            width,
            height,
            fps,
            "Encoding video"
        );

        let mut child = Command::new(&self.program)
            .args(["-y", "-loglevel", "error", "-nostats"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{width}x{height}")])
            .args(["-r", &fps.to_string()])
            .args(["-i", "-"])
            // yuv420p needs even dimensions
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start `{}`", self.program))?;

        {
            let mut stdin = child.stdin.take().context("ffmpeg stdin unavailable")?;
            for frame in &frames {
                stdin
                    .write_all(frame.as_raw())
                    .context("failed to stream frames to ffmpeg")?;
            }
        }

        let output = child.wait_with_output().context("ffmpeg did not exit")?;
        if !output.status.success() {
            anyhow::bail!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}
