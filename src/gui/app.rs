use eframe::egui;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

use crate::capture::CaptureCoordinator;
use crate::core::sampler::{self, Timecode};
use crate::core::{AppConfig, PatternCatalog, Session, StoryboardError};
use crate::imaging::Magick;
use crate::storyboard::{ComposerEvent, ComposerState, CompositionJob, StoryboardComposer};
use crate::video::{
    FfmpegExtractor, FfprobeProbe, MediaPlayer, MediaProbe, PlayerControl, SeekMode,
};

/// UI intents collected during a frame and applied afterwards, so widget
/// closures never mutate session state mid-render.
#[derive(Default)]
struct Actions {
    open_video: bool,
    toggle_pause: bool,
    capture: bool,
    auto_capture: bool,
    generate: bool,
    delete_frame: Option<PathBuf>,
    select_pattern: Option<usize>,
    import_pattern: bool,
}

pub struct StoryboardApp {
    config: AppConfig,
    patterns: PatternCatalog,
    session: Option<Session>,
    player: MediaPlayer,
    extractor: FfmpegExtractor,
    imaging: Magick,
    probe: FfprobeProbe,
    composer: StoryboardComposer,
    composer_events: broadcast::Receiver<ComposerEvent>,
    steps_input: String,
    status_message: String,
    preview_texture: Option<egui::TextureHandle>,
    thumbnail_cache: LruCache<PathBuf, egui::TextureHandle>,
    pattern_preview: Option<(PathBuf, egui::TextureHandle)>,
}

impl StoryboardApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> anyhow::Result<Self> {
        // Set global text color to white
        let mut visuals = egui::Visuals::dark();
        visuals.override_text_color = Some(egui::Color32::WHITE);
        cc.egui_ctx.set_visuals(visuals);

        let config = AppConfig::load()?;
        let patterns = PatternCatalog::load(&config.pattern_directory);

        let player = MediaPlayer::new(config.ffmpeg());
        let extractor = FfmpegExtractor::new(config.ffmpeg());
        let imaging = Magick::new(config.magick());
        let probe = FfprobeProbe::new(config.ffprobe());
        let composer = StoryboardComposer::new();
        let composer_events = composer.subscribe();
        let steps_input = config.default_steps.to_string();

        Ok(Self {
            config,
            patterns,
            session: None,
            player,
            extractor,
            imaging,
            probe,
            composer,
            composer_events,
            steps_input,
            status_message: "Open a video to begin".to_string(),
            preview_texture: None,
            thumbnail_cache: LruCache::new(NonZeroUsize::new(64).unwrap()),
            pattern_preview: None,
        })
    }

    fn pump_player(&mut self, ctx: &egui::Context) {
        if let Some(frame) = self.player.poll() {
            log::debug!("Preview frame at {} ms", frame.timestamp_ms);
            let color = egui::ColorImage::from_rgba_unmultiplied(
                [frame.width as usize, frame.height as usize],
                &frame.rgba,
            );
            self.preview_texture =
                Some(ctx.load_texture("video_preview", color, egui::TextureOptions::LINEAR));
        }
    }

    fn pump_composer_events(&mut self) {
        loop {
            match self.composer_events.try_recv() {
                Ok(ComposerEvent::Progress { stage, detail, .. }) => {
                    self.status_message = format!("{} ({})", stage.describe(), detail);
                }
                Ok(ComposerEvent::Finished { outcome, .. }) => {
                    self.status_message = match outcome {
                        Ok(path) => format!("Storyboard written to {}", path.display()),
                        Err(reason) => format!("Composition failed: {}", reason),
                    };
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    log::warn!("Dropped {} composer events", n);
                }
                Err(_) => break,
            }
        }
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }
        let (space, capture, left, right, up, down) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::Space),
                i.key_pressed(egui::Key::S),
                i.key_pressed(egui::Key::ArrowLeft),
                i.key_pressed(egui::Key::ArrowRight),
                i.key_pressed(egui::Key::ArrowUp),
                i.key_pressed(egui::Key::ArrowDown),
            )
        });
        if space {
            self.player.toggle_pause();
        }
        if capture {
            self.capture_frame();
        }
        if left {
            self.player.seek(-5_000, SeekMode::Relative);
        }
        if right {
            self.player.seek(5_000, SeekMode::Relative);
        }
        if up {
            self.player.seek(-60_000, SeekMode::Relative);
        }
        if down {
            self.player.seek(60_000, SeekMode::Relative);
        }
    }

    fn ensure_pattern_preview(&mut self, ctx: &egui::Context) {
        let Some(path) = self.patterns.selected_path().map(Path::to_path_buf) else {
            self.pattern_preview = None;
            return;
        };
        if self
            .pattern_preview
            .as_ref()
            .map(|(cached, _)| cached == &path)
            .unwrap_or(false)
        {
            return;
        }
        self.pattern_preview = load_color_image(&path, 64).map(|color| {
            let texture = ctx.load_texture("pattern_preview", color, egui::TextureOptions::LINEAR);
            (path, texture)
        });
    }

    fn thumbnail_texture(
        &mut self,
        ctx: &egui::Context,
        path: &Path,
    ) -> Option<egui::TextureHandle> {
        if let Some(texture) = self.thumbnail_cache.get(path) {
            return Some(texture.clone());
        }
        let color = load_color_image(path, 240)?;
        let texture = ctx.load_texture(
            format!("thumb:{}", path.display()),
            color,
            egui::TextureOptions::LINEAR,
        );
        self.thumbnail_cache.put(path.to_path_buf(), texture.clone());
        Some(texture)
    }

    fn controls_ui(&mut self, ui: &mut egui::Ui, ctx: &egui::Context, actions: &mut Actions) {
        ui.heading("Storyboard Helper");
        ui.separator();

        ui.group(|ui| {
            ui.label("Automatic capture");
            ui.horizontal(|ui| {
                ui.label("Steps:");
                ui.text_edit_singleline(&mut self.steps_input);
            });
            ui.horizontal(|ui| {
                match &self.pattern_preview {
                    Some((_, texture)) => {
                        ui.add(
                            egui::Image::new(texture).fit_to_exact_size(egui::vec2(64.0, 64.0)),
                        );
                    }
                    None => {
                        ui.add_sized([64.0, 64.0], egui::Label::new("no\npattern"));
                    }
                }
                let selected_name = self
                    .patterns
                    .selected()
                    .and_then(|i| self.patterns.entries().get(i))
                    .map(|e| e.display_name.clone())
                    .unwrap_or_else(|| "none".to_string());
                egui::ComboBox::from_id_source("pattern_select")
                    .selected_text(selected_name)
                    .show_ui(ui, |ui| {
                        for (index, entry) in self.patterns.entries().iter().enumerate() {
                            let selected = self.patterns.selected() == Some(index);
                            if ui.selectable_label(selected, &entry.display_name).clicked() {
                                actions.select_pattern = Some(index);
                            }
                        }
                    });
            });
            if ui.button("Browse for pattern...").clicked() {
                actions.import_pattern = true;
            }
        });

        ui.separator();
        let frame_count = self.session.as_ref().map(|s| s.frames.len()).unwrap_or(0);
        ui.label(
            egui::RichText::new(format!("Captured frames: {}", frame_count)).strong(),
        );

        let frames = self
            .session
            .as_ref()
            .map(|s| s.frames.snapshot())
            .unwrap_or_default();
        egui::ScrollArea::vertical()
            .max_height((ui.available_height() - 170.0).max(60.0))
            .auto_shrink([false, true])
            .show(ui, |ui| {
                for frame in &frames {
                    ui.horizontal(|ui| {
                        if let Some(texture) = self.thumbnail_texture(ctx, &frame.file_path) {
                            ui.add(egui::Image::new(&texture).max_width(120.0));
                        }
                        ui.vertical(|ui| {
                            ui.label(format!(
                                "#{} {}",
                                frame.order + 1,
                                Timecode::from_millis(frame.timestamp_ms).token()
                            ));
                            if ui.button("Delete").clicked() {
                                actions.delete_frame = Some(frame.file_path.clone());
                            }
                        });
                    });
                }
            });

        ui.separator();
        if ui.button("Open video...").clicked() {
            actions.open_video = true;
        }
        let play_label = if self.player.is_playing() { "Pause" } else { "Play" };
        if ui.button(play_label).clicked() {
            actions.toggle_pause = true;
        }
        if ui.button("Capture frame").clicked() {
            actions.capture = true;
        }
        if ui.button("Capture automatically").clicked() {
            actions.auto_capture = true;
        }
        if ui.button("Generate storyboard").clicked() {
            actions.generate = true;
        }
    }

    fn video_ui(&mut self, ui: &mut egui::Ui) {
        let slider_height = 30.0;
        let preview_size = egui::vec2(
            ui.available_width(),
            (ui.available_height() - slider_height).max(0.0),
        );
        match &self.preview_texture {
            Some(texture) => {
                ui.add(egui::Image::new(texture).fit_to_exact_size(preview_size));
            }
            None => {
                ui.allocate_space(preview_size);
            }
        }
        if let Some(duration) = self.player.duration() {
            let mut position = self.player.current_position().unwrap_or(0);
            let full_width = ui.available_width();
            ui.spacing_mut().slider_width = full_width;
            let response =
                ui.add(egui::Slider::new(&mut position, 0..=duration).show_value(false));
            if response.changed() {
                self.player.seek(position, SeekMode::Absolute);
            }
        }
    }

    fn apply(&mut self, actions: Actions) {
        if let Some(index) = actions.select_pattern {
            self.patterns.select(index);
        }
        if actions.import_pattern {
            self.import_pattern();
        }
        if actions.open_video {
            self.open_video();
        }
        if actions.toggle_pause {
            self.player.toggle_pause();
        }
        if actions.capture {
            self.capture_frame();
        }
        if actions.auto_capture {
            self.auto_capture();
        }
        if actions.generate {
            self.generate_storyboard();
        }
        if let Some(path) = actions.delete_frame {
            self.delete_frame(&path);
        }
    }

    fn open_video(&mut self) {
        let mut dialog = rfd::FileDialog::new()
            .add_filter("Video files", &["mp4", "mkv", "avi", "mov", "ts"]);
        if let Some(dir) = &self.config.last_video_directory {
            dialog = dialog.set_directory(dir);
        }
        let Some(path) = dialog.pick_file() else {
            return;
        };

        let duration = match self.probe.duration_ms(&path) {
            Ok(duration) => duration,
            Err(e) => {
                log::error!("Could not probe {}: {}", path.display(), e);
                self.status_message = format!("Could not probe video: {}", e);
                return;
            }
        };
        match Session::open(path.clone()) {
            Ok(session) => {
                self.session = Some(session);
                self.player.load(path.clone(), duration);
                self.thumbnail_cache.clear();
                self.preview_texture = None;
                self.status_message = format!("Opened {}", path.display());
                self.config.last_video_directory = path.parent().map(Path::to_path_buf);
                if let Err(e) = self.config.save() {
                    log::warn!("Could not persist config: {}", e);
                }
            }
            Err(e) => {
                self.status_message = format!("Could not open video: {}", e);
            }
        }
    }

    fn capture_frame(&mut self) {
        let Some(session) = self.session.as_mut() else {
            self.status_message = "Open a video first".to_string();
            return;
        };
        let mid_composition = self.composer.is_running();
        match CaptureCoordinator::capture_current(session, &self.player, &self.imaging) {
            Ok(frame) => {
                let token = Timecode::from_millis(frame.timestamp_ms).token();
                self.status_message = if mid_composition {
                    // The running job already took its snapshot; this frame
                    // rides along in the next one.
                    format!("Captured {} (will appear in the next storyboard)", token)
                } else {
                    format!("Captured {}", token)
                };
            }
            Err(e) => {
                log::error!("Manual capture failed: {}", e);
                self.status_message = format!("Capture failed: {}", e);
            }
        }
    }

    fn auto_capture(&mut self) {
        let Some(duration) = self.player.duration() else {
            self.status_message = "Open a video first".to_string();
            return;
        };
        let steps = parse_steps(&self.steps_input, self.config.default_steps);
        let times = match sampler::sample(duration, steps) {
            Ok(times) => times,
            Err(e) => {
                self.status_message = format!("Cannot sample: {}", e);
                return;
            }
        };
        let Some(session) = self.session.as_mut() else {
            self.status_message = "Open a video first".to_string();
            return;
        };

        log::info!("Automatic capture of {} frames starting", times.len());
        let mut captured = 0;
        let mut skipped = 0;
        for (index, target_ms) in times.iter().enumerate() {
            match CaptureCoordinator::capture_at(session, &self.extractor, &self.imaging, *target_ms)
            {
                Ok(_) => captured += 1,
                Err(StoryboardError::DuplicateCapture(path)) => {
                    log::warn!("Skipping duplicate capture {}", path.display());
                    skipped += 1;
                }
                Err(e) => {
                    log::error!("Automatic capture stopped at step {}: {}", index + 1, e);
                    self.status_message =
                        format!("Automatic capture stopped at step {}: {}", index + 1, e);
                    return;
                }
            }
        }
        self.status_message = format!(
            "Automatic capture finished: {} captured, {} skipped",
            captured, skipped
        );
    }

    fn generate_storyboard(&mut self) {
        let Some(session) = self.session.as_ref() else {
            self.status_message = "Open a video first".to_string();
            return;
        };
        let pattern = self.patterns.selected_path().map(Path::to_path_buf);
        let job = CompositionJob::from_session(session, pattern);
        match self
            .composer
            .compose(job, self.imaging.clone(), self.probe.clone())
        {
            Ok(id) => {
                log::info!("Started composition job {}", id);
                self.status_message = "Composing storyboard in the background...".to_string();
            }
            Err(e) => {
                self.status_message = format!("Cannot compose: {}", e);
            }
        }
    }

    fn import_pattern(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &["jpg", "png"])
            .pick_file()
        {
            self.patterns.import(path);
        }
    }

    fn delete_frame(&mut self, path: &Path) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if CaptureCoordinator::delete_frame(session, path) {
            self.thumbnail_cache.pop(path);
            self.status_message = format!("Deleted {}", path.display());
        }
    }
}

impl eframe::App for StoryboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.pump_player(ctx);
        self.pump_composer_events();
        self.handle_shortcuts(ctx);
        self.ensure_pattern_preview(ctx);

        let mut actions = Actions::default();

        egui::SidePanel::left("controls")
            .min_width(300.0)
            .show(ctx, |ui| {
                self.controls_ui(ui, ctx, &mut actions);
            });
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if self.composer.state() == ComposerState::Running {
                    ui.spinner();
                    if ui.button("Cancel").clicked() {
                        self.composer.request_cancel();
                    }
                }
                ui.label(&self.status_message);
            });
        });
        egui::CentralPanel::default().show(ctx, |ui| {
            self.video_ui(ui);
        });

        self.apply(actions);

        // Keep the clock and preview moving even without input events.
        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }
}

fn parse_steps(input: &str, fallback: u32) -> u32 {
    input.trim().parse().unwrap_or(fallback)
}

fn load_color_image(path: &Path, max_edge: u32) -> Option<egui::ColorImage> {
    match image::open(path) {
        Ok(img) => {
            let img = img.thumbnail(max_edge, max_edge);
            let rgba = img.to_rgba8();
            let size = [rgba.width() as usize, rgba.height() as usize];
            Some(egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()))
        }
        Err(e) => {
            log::warn!("Could not load image {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::parse_steps;

    #[test]
    fn test_parse_steps_accepts_plain_numbers() {
        assert_eq!(parse_steps("12", 30), 12);
        assert_eq!(parse_steps("  7 ", 30), 7);
    }

    #[test]
    fn test_parse_steps_falls_back_on_garbage() {
        assert_eq!(parse_steps("", 30), 30);
        assert_eq!(parse_steps("many", 30), 30);
        assert_eq!(parse_steps("-3", 30), 30);
    }
}
