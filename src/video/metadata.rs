use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::error::{Result, StoryboardError};
use crate::core::sampler::Timecode;

/// Read-only media inspection: total duration and a short text report for
/// the storyboard's metadata panel.
pub trait MediaProbe {
    fn duration_ms(&self, video: &Path) -> Result<i64>;

    /// Human-readable report with the source path reduced to its basename.
    fn media_report(&self, video: &Path) -> Result<String>;
}

/// Probe implementation backed by the external `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: PathBuf,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn probe_json(&self, video: &Path) -> Result<serde_json::Value> {
        let output = Command::new(&self.program)
            .arg("-v").arg("quiet")
            .arg("-print_format").arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(video)
            .output()?;

        if !output.status.success() {
            return Err(StoryboardError::ExternalTool {
                tool: "ffprobe",
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| StoryboardError::ExternalTool {
            tool: "ffprobe",
            detail: format!("unparsable probe output: {}", e),
        })
    }
}

impl MediaProbe for FfprobeProbe {
    fn duration_ms(&self, video: &Path) -> Result<i64> {
        let info = self.probe_json(video)?;
        let seconds = info["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| StoryboardError::ExternalTool {
                tool: "ffprobe",
                detail: format!("no duration reported for {}", video.display()),
            })?;
        Ok((seconds * 1000.0).round() as i64)
    }

    fn media_report(&self, video: &Path) -> Result<String> {
        let info = self.probe_json(video)?;
        let basename = video
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| video.display().to_string());

        let mut lines = vec![format!("File      : {}", basename)];

        if let Some(container) = info["format"]["format_long_name"]
            .as_str()
            .or_else(|| info["format"]["format_name"].as_str())
        {
            lines.push(format!("Container : {}", container));
        }
        if let Some(seconds) = info["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
        {
            let token = Timecode::from_millis((seconds * 1000.0).round() as i64).token();
            lines.push(format!("Duration  : {}", token));
        }
        if let Some(size) = info["format"]["size"]
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
        {
            lines.push(format!("Size      : {:.1} MiB", size as f64 / (1024.0 * 1024.0)));
        }
        if let Some(bit_rate) = info["format"]["bit_rate"]
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
        {
            lines.push(format!("Bit rate  : {} kb/s", bit_rate / 1000));
        }

        let empty_vec = vec![];
        let streams = info["streams"].as_array().unwrap_or(&empty_vec);
        for stream in streams {
            match stream["codec_type"].as_str() {
                Some("video") => {
                    let codec = stream["codec_name"].as_str().unwrap_or("unknown");
                    let width = stream["width"].as_u64().unwrap_or(0);
                    let height = stream["height"].as_u64().unwrap_or(0);
                    let fps = stream["r_frame_rate"]
                        .as_str()
                        .map(parse_frame_rate)
                        .unwrap_or(0.0);
                    lines.push(format!(
                        "Video     : {}, {}x{}, {:.2} fps",
                        codec, width, height, fps
                    ));
                }
                Some("audio") => {
                    let codec = stream["codec_name"].as_str().unwrap_or("unknown");
                    let channels = stream["channels"].as_u64().unwrap_or(0);
                    let rate = stream["sample_rate"].as_str().unwrap_or("?");
                    lines.push(format!(
                        "Audio     : {}, {} ch, {} Hz",
                        codec, channels, rate
                    ));
                }
                _ => {}
            }
        }

        Ok(lines.join("\n"))
    }
}

/// Parse ffprobe frame rates of the form "30/1" or "29.97".
fn parse_frame_rate(raw: &str) -> f64 {
    if let Some((numerator, denominator)) = raw.split_once('/') {
        let numerator: f64 = numerator.parse().unwrap_or(0.0);
        let denominator: f64 = denominator.parse().unwrap_or(1.0);
        if denominator != 0.0 {
            numerator / denominator
        } else {
            0.0
        }
    } else {
        raw.parse().unwrap_or(0.0)
    }
}
