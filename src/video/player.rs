use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc;
use std::time::Instant;

use crate::core::error::{Result, StoryboardError};
use crate::core::sampler::Timecode;

/// Preview frames are rendered at a fixed size; display scaling is the
/// GUI's problem.
const PREVIEW_WIDTH: u32 = 854;
const PREVIEW_HEIGHT: u32 = 480;

/// Minimum position change before another preview frame is requested.
const PREVIEW_INTERVAL_MS: i64 = 250;

/// The narrow player surface the capture pipeline depends on. Rendering
/// fidelity, audio and format negotiation are outside this contract.
pub trait PlayerControl {
    /// `None` until a video has been loaded and playback started.
    fn current_position(&self) -> Option<i64>;
    fn duration(&self) -> Option<i64>;
    fn seek(&mut self, target_ms: i64, mode: SeekMode);
    fn toggle_pause(&mut self);
    /// Write one still image of the current position to `out`.
    fn capture_current_frame(&self, out: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    Absolute,
    Relative,
}

/// Raw RGBA preview frame handed to the GUI for texture upload.
#[derive(Debug)]
pub struct PreviewFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: i64,
}

#[derive(Debug)]
enum RenderRequest {
    Frame { video: PathBuf, timestamp_ms: i64 },
    Shutdown,
}

/// Embedded preview player. Position advances by wall clock while playing;
/// actual pixels come from a worker thread that decodes single frames with
/// ffmpeg, so the interactive thread never blocks on the decoder.
pub struct MediaPlayer {
    program: PathBuf,
    video: Option<PathBuf>,
    duration_ms: Option<i64>,
    position_ms: i64,
    playing: bool,
    play_started: Option<Instant>,
    play_origin_ms: i64,
    last_request_ms: Option<i64>,
    request_sender: mpsc::Sender<RenderRequest>,
    frame_receiver: mpsc::Receiver<PreviewFrame>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl MediaPlayer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let (request_sender, request_receiver) = mpsc::channel::<RenderRequest>();
        let (frame_sender, frame_receiver) = mpsc::channel::<PreviewFrame>();

        let worker_program = program.clone();
        let worker = std::thread::spawn(move || {
            'requests: while let Ok(first) = request_receiver.recv() {
                // Collapse queued requests so a scrub only renders the
                // newest position.
                let mut request = first;
                while let Ok(next) = request_receiver.try_recv() {
                    if matches!(next, RenderRequest::Shutdown) {
                        break 'requests;
                    }
                    request = next;
                }

                match request {
                    RenderRequest::Shutdown => break,
                    RenderRequest::Frame { video, timestamp_ms } => {
                        match render_preview(&worker_program, &video, timestamp_ms) {
                            Ok(frame) => {
                                let _ = frame_sender.send(frame);
                            }
                            Err(e) => {
                                log::warn!("Preview frame at {} ms failed: {}", timestamp_ms, e);
                            }
                        }
                    }
                }
            }
            log::debug!("Preview render thread exiting");
        });

        Self {
            program,
            video: None,
            duration_ms: None,
            position_ms: 0,
            playing: false,
            play_started: None,
            play_origin_ms: 0,
            last_request_ms: None,
            request_sender,
            frame_receiver,
            worker: Some(worker),
        }
    }

    /// Load a video and start playing from the beginning.
    pub fn load(&mut self, video: PathBuf, duration_ms: i64) {
        log::info!(
            "Player loading {} ({} ms)",
            video.display(),
            duration_ms
        );
        self.video = Some(video);
        self.duration_ms = Some(duration_ms);
        self.position_ms = 0;
        self.playing = true;
        self.play_started = Some(Instant::now());
        self.play_origin_ms = 0;
        self.last_request_ms = None;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Advance the clock, keep the preview fresh and return the newest
    /// rendered frame, if any. Called once per GUI update.
    pub fn poll(&mut self) -> Option<PreviewFrame> {
        if self.playing {
            if let (Some(started), Some(duration)) = (self.play_started, self.duration_ms) {
                let elapsed = started.elapsed().as_millis() as i64;
                self.position_ms = (self.play_origin_ms + elapsed).min(duration);
                if self.position_ms >= duration {
                    log::debug!("Playback reached end of video, pausing");
                    self.playing = false;
                    self.play_started = None;
                }
            }
        }

        if let Some(video) = &self.video {
            let stale = self
                .last_request_ms
                .map(|last| (self.position_ms - last).abs() >= PREVIEW_INTERVAL_MS)
                .unwrap_or(true);
            if stale {
                let _ = self.request_sender.send(RenderRequest::Frame {
                    video: video.clone(),
                    timestamp_ms: self.position_ms,
                });
                self.last_request_ms = Some(self.position_ms);
            }
        }

        let mut latest = None;
        while let Ok(frame) = self.frame_receiver.try_recv() {
            latest = Some(frame);
        }
        latest
    }
}

impl PlayerControl for MediaPlayer {
    fn current_position(&self) -> Option<i64> {
        self.video.as_ref().map(|_| self.position_ms)
    }

    fn duration(&self) -> Option<i64> {
        self.duration_ms
    }

    fn seek(&mut self, target_ms: i64, mode: SeekMode) {
        let Some(duration) = self.duration_ms else {
            return;
        };
        let target = match mode {
            SeekMode::Absolute => target_ms,
            SeekMode::Relative => self.position_ms + target_ms,
        };
        self.position_ms = target.clamp(0, duration);
        if self.playing {
            self.play_started = Some(Instant::now());
            self.play_origin_ms = self.position_ms;
        }
        if let Some(video) = &self.video {
            let _ = self.request_sender.send(RenderRequest::Frame {
                video: video.clone(),
                timestamp_ms: self.position_ms,
            });
            self.last_request_ms = Some(self.position_ms);
        }
    }

    fn toggle_pause(&mut self) {
        if self.video.is_none() {
            return;
        }
        if self.playing {
            self.playing = false;
            self.play_started = None;
            log::debug!("Paused at {} ms", self.position_ms);
        } else {
            self.playing = true;
            self.play_started = Some(Instant::now());
            self.play_origin_ms = self.position_ms;
            log::debug!("Resumed at {} ms", self.position_ms);
        }
    }

    fn capture_current_frame(&self, out: &Path) -> Result<()> {
        let video = self.video.as_ref().ok_or(StoryboardError::PlayerNotReady)?;
        let position = Timecode::from_millis(self.position_ms).ffmpeg_position();

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
        Ok(())
    }
}

impl Drop for MediaPlayer {
    fn drop(&mut self) {
        let _ = self.request_sender.send(RenderRequest::Shutdown);
        if let Some(handle) = self.worker.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
            // A render in progress finishes on its own once the channel
            // closes; don't stall app shutdown waiting for it.
        }
    }
}

/// Decode a single frame as raw RGB and repack it as RGBA.
fn render_preview(
    program: &Path,
    video: &Path,
    timestamp_ms: i64,
) -> std::result::Result<PreviewFrame, String> {
    let position = Timecode::from_millis(timestamp_ms).ffmpeg_position();

    let output = Command::new(program)
        .arg("-ss").arg(&position)
        .arg("-i").arg(video)
        .arg("-vframes").arg("1")
        .arg("-f").arg("rawvideo")
        .arg("-pix_fmt").arg("rgb24")
        .arg("-s").arg(format!("{}x{}", PREVIEW_WIDTH, PREVIEW_HEIGHT))
        .arg("-v").arg("quiet")
        .arg("-")
        .output()
        .map_err(|e| format!("ffmpeg execution failed: {}", e))?;

    if !output.status.success() {
        return Err(format!(
            "ffmpeg failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    let frame_data = output.stdout;
    let expected_size = (PREVIEW_WIDTH * PREVIEW_HEIGHT * 3) as usize;
    if frame_data.len() != expected_size {
        return Err(format!(
            "unexpected frame size: {} (expected {})",
            frame_data.len(),
            expected_size
        ));
    }

    let mut rgba = Vec::with_capacity((PREVIEW_WIDTH * PREVIEW_HEIGHT * 4) as usize);
    for chunk in frame_data.chunks(3) {
        if chunk.len() == 3 {
            rgba.push(chunk[0]); // R
            rgba.push(chunk[1]); // G
            rgba.push(chunk[2]); // B
            rgba.push(255);      // A
        }
    }

    Ok(PreviewFrame {
        rgba,
        width: PREVIEW_WIDTH,
        height: PREVIEW_HEIGHT,
        timestamp_ms,
    })
}
