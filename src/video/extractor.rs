use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::error::{Result, StoryboardError};
use crate::core::sampler::Timecode;

/// Produces exactly one still image at a requested timestamp by seeking and
/// decoding the source directly. Automatic capture goes through this rather
/// than scrubbing the live player, which is unreliable at batch speed.
pub trait FrameExtractor {
    fn extract_frame(&self, video: &Path, timestamp_ms: i64, out: &Path) -> Result<()>;
}

/// Extractor backed by the external `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    program: PathBuf,
}

impl FfmpegExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl FrameExtractor for FfmpegExtractor {
    fn extract_frame(&self, video: &Path, timestamp_ms: i64, out: &Path) -> Result<()> {
        let position = Timecode::from_millis(timestamp_ms).ffmpeg_position();
        log::debug!(
            "Extracting frame at {} from {} -> {}",
            position,
            video.display(),
            out.display()
        );

        let output = Command::new(&self.program)
            .arg("-hide_banner")
            .arg("-loglevel").arg("error")
            .arg("-ss").arg(&position)
            .arg("-i").arg(video)
            .arg("-frames:v").arg("1")
            .arg("-q:v").arg("2")
            .arg("-y")
            .arg(out)
            .output()?;

        if !output.status.success() {
            return Err(StoryboardError::ExternalTool {
                tool: "ffmpeg",
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if !out.exists() {
            return Err(StoryboardError::ExternalTool {
                tool: "ffmpeg",
                detail: format!("no frame written at {}", position),
            });
        }
        Ok(())
    }
}
