use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy for the capture and composition pipeline.
///
/// Every variant is scoped to a single capture or a single composition job;
/// none of these is fatal to the process.
#[derive(Debug, Error)]
pub enum StoryboardError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("player has not produced a playback position yet")]
    PlayerNotReady,

    #[error("frame path already registered: {0}")]
    DuplicatePath(PathBuf),

    #[error("a frame for this timestamp was already captured: {0}")]
    DuplicateCapture(PathBuf),

    #[error("no captured frames to compose")]
    NoFrames,

    #[error("a composition job is already running")]
    CompositionBusy,

    #[error("composition cancelled")]
    Cancelled,

    #[error("{tool} failed: {detail}")]
    ExternalTool { tool: &'static str, detail: String },

    #[error("filesystem error: {0}")]
    FileSystem(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoryboardError>;
