use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::error::{Result, StoryboardError};
use crate::core::frame_store::CapturedFrame;
use crate::core::sampler::Timecode;
use crate::core::session::Session;
use crate::imaging::ImageOps;
use crate::video::extractor::FrameExtractor;
use crate::video::player::PlayerControl;

/// Drives one capture from trigger to Frame Store registration.
///
/// Every capture runs the same ordered protocol: resolve the target
/// timestamp, produce the file through the right collaborator, burn in the
/// timestamp overlay, back the file up and log its token, then register it.
/// Capture failures surface to the caller without mutating the store.
pub struct CaptureCoordinator;

impl CaptureCoordinator {
    /// Manual capture at the player's current position.
    pub fn capture_current(
        session: &mut Session,
        player: &dyn PlayerControl,
        imaging: &dyn ImageOps,
    ) -> Result<CapturedFrame> {
        let timestamp_ms = player
            .current_position()
            .ok_or(StoryboardError::PlayerNotReady)?;
        let out = session.screenshot_path(&Timecode::from_millis(timestamp_ms).token());
        log::info!("Manual capture at {} ms -> {}", timestamp_ms, out.display());

        player.capture_current_frame(&out)?;
        Self::finish_capture(session, imaging, timestamp_ms, out)
    }

    /// One step of an automatic batch: seek+decode through the extractor
    /// rather than scrubbing the live player.
    pub fn capture_at(
        session: &mut Session,
        extractor: &dyn FrameExtractor,
        imaging: &dyn ImageOps,
        target_ms: i64,
    ) -> Result<CapturedFrame> {
        let out = session.screenshot_path(&Timecode::from_millis(target_ms).token());
        log::info!("Automatic capture at {} ms -> {}", target_ms, out.display());

        extractor.extract_frame(&session.video_file, target_ms, &out)?;
        Self::finish_capture(session, imaging, target_ms, out)
    }

    /// Annotation, backup, keyframe log, registration. Annotation failure
    /// leaves a usable unannotated frame and is only reported; backup and
    /// log failures abort the capture before registration.
    fn finish_capture(
        session: &mut Session,
        imaging: &dyn ImageOps,
        timestamp_ms: i64,
        file_path: PathBuf,
    ) -> Result<CapturedFrame> {
        let token = Timecode::from_millis(timestamp_ms).token();

        if let Err(e) = imaging.annotate_timestamp(&file_path, &token) {
            log::warn!(
                "Timestamp overlay failed for {}, keeping unannotated frame: {}",
                file_path.display(),
                e
            );
        }

        let backup_dir = session.backup_dir();
        std::fs::create_dir_all(&backup_dir)?;
        let backup_path = backup_dir.join(
            file_path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("frame.jpg")),
        );
        std::fs::copy(&file_path, &backup_path)?;
        log::debug!("Backed up frame -> {}", backup_path.display());

        let mut keyframes = OpenOptions::new()
            .create(true)
            .append(true)
            .open(session.keyframes_log())?;
        writeln!(keyframes, "{}", token)?;

        session
            .frames
            .add(file_path, timestamp_ms, Some(backup_path))
            .map_err(|e| match e {
                StoryboardError::DuplicatePath(path) => StoryboardError::DuplicateCapture(path),
                other => other,
            })
    }

    /// Remove a frame from the store and delete its file. An already-absent
    /// file is fine; deletion is idempotent.
    pub fn delete_frame(session: &mut Session, path: &Path) -> bool {
        let removed = session.frames.remove(path);
        if removed {
            match std::fs::remove_file(path) {
                Ok(()) => log::info!("Deleted frame {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Could not delete frame {}: {}", path.display(), e),
            }
        }
        removed
    }
}
