use std::path::{Path, PathBuf};

use crate::core::error::{Result, StoryboardError};
use crate::core::frame_store::FrameStore;
use crate::core::sampler;

/// In-memory state tied to one open video. Opening another video replaces
/// the whole session; files the old session wrote stay on disk.
#[derive(Debug)]
pub struct Session {
    pub video_file: PathBuf,
    pub video_dir: PathBuf,
    pub frames: FrameStore,
}

impl Session {
    pub fn open(video_file: PathBuf) -> Result<Self> {
        let video_dir = video_file
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                StoryboardError::InvalidParameter(format!(
                    "video path has no parent directory: {}",
                    video_file.display()
                ))
            })?;
        log::info!(
            "Opened video {} (working directory {})",
            video_file.display(),
            video_dir.display()
        );
        Ok(Self {
            video_file,
            video_dir,
            frames: FrameStore::new(),
        })
    }

    /// Where a capture with the given timestamp token lands.
    pub fn screenshot_path(&self, token: &str) -> PathBuf {
        self.video_dir.join(sampler::screenshot_file_name(token))
    }

    /// Recovery copies of every captured frame live here.
    pub fn backup_dir(&self) -> PathBuf {
        self.video_dir.join("backup")
    }

    /// Append-only log of every annotated timestamp token.
    pub fn keyframes_log(&self) -> PathBuf {
        self.video_dir.join("keyframes.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_derives_working_directory() {
        let session = Session::open(PathBuf::from("/videos/show/episode.mkv")).unwrap();
        assert_eq!(session.video_dir, PathBuf::from("/videos/show"));
        assert!(session.frames.is_empty());
    }

    #[test]
    fn test_open_rejects_bare_file_name() {
        let result = Session::open(PathBuf::from("episode.mkv"));
        assert!(matches!(result, Err(StoryboardError::InvalidParameter(_))));
    }

    #[test]
    fn test_session_paths() {
        let session = Session::open(PathBuf::from("/videos/episode.mkv")).unwrap();
        assert_eq!(
            session.screenshot_path("00.01.05.500"),
            PathBuf::from("/videos/Screenshot=00.01.05.500=.jpg")
        );
        assert_eq!(session.backup_dir(), PathBuf::from("/videos/backup"));
        assert_eq!(session.keyframes_log(), PathBuf::from("/videos/keyframes.txt"));
    }
}
