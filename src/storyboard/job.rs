use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use crate::core::error::{Result, StoryboardError};
use crate::core::sampler;
use crate::core::session::Session;
use crate::imaging::{ImageOps, STORYBOARD_WIDTH};
use crate::video::metadata::MediaProbe;

/// Pipeline stage tags reported to observers. Free-text detail rides along
/// separately so observers never have to parse strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    MetadataPanel,
    Montage,
    PanelMerge,
    BackgroundTile,
    FinalComposite,
    Cleanup,
}

impl ProgressStage {
    pub fn describe(&self) -> &'static str {
        match self {
            ProgressStage::MetadataPanel => "Rendering metadata panel",
            ProgressStage::Montage => "Tiling captured frames",
            ProgressStage::PanelMerge => "Merging panel and montage",
            ProgressStage::BackgroundTile => "Tiling background",
            ProgressStage::FinalComposite => "Compositing storyboard",
            ProgressStage::Cleanup => "Cleaning up",
        }
    }
}

/// Everything one composition run needs, snapshotted at job start. The job
/// never re-reads the live session; frames captured while it runs belong to
/// the next job.
#[derive(Debug, Clone)]
pub struct CompositionJob {
    pub id: Uuid,
    pub video_file: PathBuf,
    pub video_dir: PathBuf,
    /// Frame paths in Frame Store order; this is the montage tiling order.
    pub frames: Vec<PathBuf>,
    pub pattern: Option<PathBuf>,
}

/// Intermediate artifacts, named up front so the exit path can release them
/// whether the job succeeded, failed or was cancelled.
struct Intermediates {
    report_text: PathBuf,
    panel: PathBuf,
    montage: PathBuf,
    merged_body: PathBuf,
    background: PathBuf,
}

impl CompositionJob {
    pub fn from_session(session: &Session, pattern: Option<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            video_file: session.video_file.clone(),
            video_dir: session.video_dir.clone(),
            frames: session
                .frames
                .snapshot()
                .into_iter()
                .map(|f| f.file_path)
                .collect(),
            pattern,
        }
    }

    /// `Storyboard-<video file name>.jpg`, written alongside the source.
    pub fn output_path(&self) -> PathBuf {
        let base = self
            .video_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        self.video_dir.join(format!("Storyboard-{}.jpg", base))
    }

    fn intermediates(&self) -> Intermediates {
        Intermediates {
            report_text: self.video_dir.join("storyboard-info.txt"),
            panel: self.video_dir.join("storyboard-info.png"),
            montage: self.video_dir.join("storyboard-montage.png"),
            merged_body: self.video_dir.join("storyboard-body.png"),
            background: self.video_dir.join("storyboard-tiles.jpg"),
        }
    }

    /// Run the whole pipeline, then release intermediates on every exit
    /// path. The terminal outcome is the return value; emitting it exactly
    /// once is the composer's job.
    pub(crate) fn run(
        &self,
        imaging: &dyn ImageOps,
        probe: &dyn MediaProbe,
        cancel: &AtomicBool,
        progress: &dyn Fn(ProgressStage, String),
    ) -> Result<PathBuf> {
        let result = self.produce(imaging, probe, cancel, progress);
        self.cleanup();
        if result.is_ok() {
            progress(ProgressStage::Cleanup, "removed intermediate files".to_string());
        }
        result
    }

    fn produce(
        &self,
        imaging: &dyn ImageOps,
        probe: &dyn MediaProbe,
        cancel: &AtomicBool,
        progress: &dyn Fn(ProgressStage, String),
    ) -> Result<PathBuf> {
        let paths = self.intermediates();

        // Step 1: metadata panel. Optional; the storyboard still composes
        // without it.
        self.checkpoint(cancel)?;
        let panel = match self.render_panel(imaging, probe, &paths) {
            Ok(panel) => {
                progress(ProgressStage::MetadataPanel, "panel rendered".to_string());
                Some(panel)
            }
            Err(e) => {
                log::warn!("Metadata panel unavailable, composing without it: {}", e);
                progress(ProgressStage::MetadataPanel, "skipped".to_string());
                None
            }
        };

        // Step 2: tile the frames in store order, then widen the canvas to
        // the storyboard width.
        self.checkpoint(cancel)?;
        imaging.montage(&self.frames, &paths.montage)?;
        imaging.extend_canvas(&paths.montage, STORYBOARD_WIDTH)?;
        progress(
            ProgressStage::Montage,
            format!("tiled {} frames", self.frames.len()),
        );

        // Step 3: the visual body is panel-over-montage, or the montage
        // alone.
        self.checkpoint(cancel)?;
        let body: &Path = match &panel {
            Some(panel) => {
                imaging.stack_panel(panel, &paths.montage, &paths.merged_body)?;
                &paths.merged_body
            }
            None => &paths.montage,
        };
        progress(
            ProgressStage::PanelMerge,
            if panel.is_some() {
                "panel stacked above montage".to_string()
            } else {
                "montage only".to_string()
            },
        );

        // Step 4: background matching the body's exact dimensions.
        self.checkpoint(cancel)?;
        let (width, height) = imaging.identify_dimensions(body)?;
        match &self.pattern {
            Some(pattern) => imaging.tile_pattern(pattern, width, height, &paths.background)?,
            None => imaging.flat_canvas("white", width, height, &paths.background)?,
        }
        progress(ProgressStage::BackgroundTile, format!("{}x{}", width, height));

        // Step 5: final composite next to the source video.
        self.checkpoint(cancel)?;
        let out = self.output_path();
        imaging.composite(body, &paths.background, &out)?;
        progress(ProgressStage::FinalComposite, out.display().to_string());

        Ok(out)
    }

    fn render_panel(
        &self,
        imaging: &dyn ImageOps,
        probe: &dyn MediaProbe,
        paths: &Intermediates,
    ) -> Result<PathBuf> {
        let report = probe.media_report(&self.video_file)?;
        std::fs::write(&paths.report_text, report)?;
        imaging.render_text_panel(&paths.report_text, &paths.panel)?;
        Ok(paths.panel.clone())
    }

    fn checkpoint(&self, cancel: &AtomicBool) -> Result<()> {
        if cancel.load(Ordering::SeqCst) {
            log::info!("Composition job {} observed cancellation", self.id);
            Err(StoryboardError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Best-effort removal of intermediates and the per-frame capture files
    /// (the `backup/` copies are the user's retained recovery trail).
    /// Already-absent files are fine; anything else is logged and ignored.
    fn cleanup(&self) {
        let paths = self.intermediates();
        let mut targets = vec![
            paths.report_text,
            paths.panel,
            paths.montage,
            paths.merged_body,
            paths.background,
        ];
        match std::fs::read_dir(&self.video_dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                        if sampler::is_screenshot_file(name) {
                            targets.push(path);
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!(
                    "Could not scan {} for capture files: {}",
                    self.video_dir.display(),
                    e
                );
            }
        }

        for target in targets {
            match std::fs::remove_file(&target) {
                Ok(()) => log::debug!("Removed intermediate {}", target.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Could not remove {}: {}", target.display(), e),
            }
        }
    }
}
