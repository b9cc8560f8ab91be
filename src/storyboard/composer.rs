use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::core::error::{Result, StoryboardError};
use crate::imaging::ImageOps;
use crate::storyboard::job::{CompositionJob, ProgressStage};
use crate::video::metadata::MediaProbe;

/// Composer lifecycle. One job at a time; terminal states stick around
/// until the next job replaces them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposerState {
    Idle,
    Running,
    Succeeded(PathBuf),
    Failed(String),
}

/// Messages delivered to subscribers on the interactive thread. The worker
/// never touches interactive-thread state directly.
#[derive(Debug, Clone)]
pub enum ComposerEvent {
    Progress {
        job: Uuid,
        stage: ProgressStage,
        detail: String,
    },
    /// Emitted exactly once per job.
    Finished {
        job: Uuid,
        outcome: std::result::Result<PathBuf, String>,
    },
}

/// Runs composition jobs on a dedicated worker thread.
///
/// The `running` token makes "one job per session" an explicit invariant:
/// a second request while a job runs is rejected with `CompositionBusy`
/// instead of racing a second worker over shared state.
pub struct StoryboardComposer {
    running: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    state: Arc<Mutex<ComposerState>>,
    events: broadcast::Sender<ComposerEvent>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl StoryboardComposer {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            running: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(ComposerState::Idle)),
            events,
            worker: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ComposerEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ComposerState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or(ComposerState::Idle)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the running job to stop at its next step boundary. Intermediates
    /// are cleaned up the same way as on normal completion.
    pub fn request_cancel(&self) {
        if self.is_running() {
            log::info!("Cancellation requested for running composition");
            self.cancel.store(true, Ordering::SeqCst);
        }
    }

    /// Start composing `job` in the background. Rejects an empty snapshot
    /// with `NoFrames` before any collaborator is touched, and a concurrent
    /// request with `CompositionBusy`.
    pub fn compose<I, P>(&mut self, job: CompositionJob, imaging: I, probe: P) -> Result<Uuid>
    where
        I: ImageOps + Send + 'static,
        P: MediaProbe + Send + 'static,
    {
        if job.frames.is_empty() {
            return Err(StoryboardError::NoFrames);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StoryboardError::CompositionBusy);
        }
        self.cancel.store(false, Ordering::SeqCst);
        if let Ok(mut state) = self.state.lock() {
            *state = ComposerState::Running;
        }

        // The previous worker, if any, has already finished (the running
        // token was free); reap it so handles don't pile up.
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }

        let id = job.id;
        let running = Arc::clone(&self.running);
        let cancel = Arc::clone(&self.cancel);
        let state = Arc::clone(&self.state);
        let events = self.events.clone();

        self.worker = Some(std::thread::spawn(move || {
            log::info!(
                "Composition job {} started with {} frame(s)",
                id,
                job.frames.len()
            );
            let progress_events = events.clone();
            let result = job.run(&imaging, &probe, &cancel, &move |stage, detail| {
                log::debug!("Job {}: {} ({})", id, stage.describe(), detail);
                let _ = progress_events.send(ComposerEvent::Progress { job: id, stage, detail });
            });

            let (terminal, outcome) = match result {
                Ok(path) => {
                    log::info!("Composition job {} finished: {}", id, path.display());
                    (ComposerState::Succeeded(path.clone()), Ok(path))
                }
                Err(e) => {
                    log::error!("Composition job {} failed: {}", id, e);
                    (ComposerState::Failed(e.to_string()), Err(e.to_string()))
                }
            };
            if let Ok(mut state) = state.lock() {
                *state = terminal;
            }
            let _ = events.send(ComposerEvent::Finished { job: id, outcome });
            running.store(false, Ordering::SeqCst);
        }));

        Ok(id)
    }
}

impl Default for StoryboardComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StoryboardComposer {
    fn drop(&mut self) {
        // The running job observes this at its next step boundary; the
        // process may exit first, which only skips cleanup of intermediates.
        self.cancel.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    /// Recording mock; an optional gate blocks inside `montage` until the
    /// test releases it, keeping a job in `Running` on demand.
    #[derive(Clone)]
    struct MockOps {
        calls: Arc<Mutex<Vec<&'static str>>>,
        montage_gate: Arc<Mutex<Option<mpsc::Receiver<()>>>>,
    }

    impl MockOps {
        fn new() -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                montage_gate: Arc::new(Mutex::new(None)),
            }
        }

        fn gated() -> (Self, mpsc::Sender<()>) {
            let (tx, rx) = mpsc::channel();
            let ops = Self::new();
            *ops.montage_gate.lock().unwrap() = Some(rx);
            (ops, tx)
        }

        fn record(&self, name: &'static str) {
            self.calls.lock().unwrap().push(name);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ImageOps for MockOps {
        fn annotate_timestamp(&self, _image: &Path, _token: &str) -> Result<()> {
            self.record("annotate_timestamp");
            Ok(())
        }

        fn render_text_panel(&self, _text_file: &Path, _out: &Path) -> Result<()> {
            self.record("render_text_panel");
            Ok(())
        }

        fn montage(&self, _frames: &[PathBuf], _out: &Path) -> Result<()> {
            self.record("montage");
            if let Some(gate) = self.montage_gate.lock().unwrap().as_ref() {
                let _ = gate.recv_timeout(Duration::from_secs(5));
            }
            Ok(())
        }

        fn extend_canvas(&self, _image: &Path, _width: u32) -> Result<()> {
            self.record("extend_canvas");
            Ok(())
        }

        fn stack_panel(&self, _panel: &Path, _body: &Path, _out: &Path) -> Result<()> {
            self.record("stack_panel");
            Ok(())
        }

        fn identify_dimensions(&self, _image: &Path) -> Result<(u32, u32)> {
            self.record("identify_dimensions");
            Ok((1920, 1080))
        }

        fn tile_pattern(
            &self,
            _pattern: &Path,
            _width: u32,
            _height: u32,
            _out: &Path,
        ) -> Result<()> {
            self.record("tile_pattern");
            Ok(())
        }

        fn flat_canvas(&self, _color: &str, _width: u32, _height: u32, _out: &Path) -> Result<()> {
            self.record("flat_canvas");
            Ok(())
        }

        fn composite(&self, _foreground: &Path, _background: &Path, _out: &Path) -> Result<()> {
            self.record("composite");
            Ok(())
        }
    }

    #[derive(Clone)]
    struct MockProbe {
        report: Option<&'static str>,
        calls: Arc<Mutex<usize>>,
    }

    impl MockProbe {
        fn unavailable() -> Self {
            Self {
                report: None,
                calls: Arc::new(Mutex::new(0)),
            }
        }

        fn with_report(report: &'static str) -> Self {
            Self {
                report: Some(report),
                calls: Arc::new(Mutex::new(0)),
            }
        }

        fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl MediaProbe for MockProbe {
        fn duration_ms(&self, _video: &Path) -> Result<i64> {
            Ok(60_000)
        }

        fn media_report(&self, _video: &Path) -> Result<String> {
            *self.calls.lock().unwrap() += 1;
            match self.report {
                Some(report) => Ok(report.to_string()),
                None => Err(StoryboardError::ExternalTool {
                    tool: "ffprobe",
                    detail: "probe unavailable".to_string(),
                }),
            }
        }
    }

    fn test_job(frame_count: usize, pattern: Option<PathBuf>) -> (CompositionJob, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "storyboard-helper-composer-{}",
            Uuid::new_v4()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let frames = (0..frame_count)
            .map(|i| dir.join(format!("Screenshot=00.00.0{}.000=.jpg", i)))
            .collect();
        let job = CompositionJob {
            id: Uuid::new_v4(),
            video_file: dir.join("episode.mkv"),
            video_dir: dir.clone(),
            frames,
            pattern,
        };
        (job, dir)
    }

    fn wait_until(composer: &StoryboardComposer, timeout: Duration) {
        let start = Instant::now();
        while composer.is_running() {
            assert!(start.elapsed() < timeout, "composition did not finish in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn drain(receiver: &mut broadcast::Receiver<ComposerEvent>) -> Vec<ComposerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_empty_store_fails_before_any_collaborator_call() {
        let (job, dir) = test_job(0, None);
        let ops = MockOps::new();
        let probe = MockProbe::unavailable();
        let mut composer = StoryboardComposer::new();

        let result = composer.compose(job, ops.clone(), probe.clone());
        assert!(matches!(result, Err(StoryboardError::NoFrames)));
        assert!(ops.calls().is_empty());
        assert_eq!(probe.call_count(), 0);
        assert_eq!(composer.state(), ComposerState::Idle);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_no_pattern_requests_flat_white_canvas() {
        let (job, dir) = test_job(5, None);
        let ops = MockOps::new();
        let mut composer = StoryboardComposer::new();

        composer
            .compose(job, ops.clone(), MockProbe::unavailable())
            .unwrap();
        wait_until(&composer, Duration::from_secs(5));

        let calls = ops.calls();
        assert_eq!(calls.iter().filter(|c| **c == "flat_canvas").count(), 1);
        assert_eq!(calls.iter().filter(|c| **c == "tile_pattern").count(), 0);
        assert!(matches!(composer.state(), ComposerState::Succeeded(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_step_order_without_panel() {
        let (job, dir) = test_job(3, Some(PathBuf::from("/patterns/dots.png")));
        let ops = MockOps::new();
        let mut composer = StoryboardComposer::new();

        composer
            .compose(job, ops.clone(), MockProbe::unavailable())
            .unwrap();
        wait_until(&composer, Duration::from_secs(5));

        // Probe failed, so no panel render and no panel merge; pattern
        // selected, so tiling instead of flat canvas.
        assert_eq!(
            ops.calls(),
            vec![
                "montage",
                "extend_canvas",
                "identify_dimensions",
                "tile_pattern",
                "composite",
            ]
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_panel_is_rendered_and_stacked_when_probe_succeeds() {
        let (job, dir) = test_job(2, None);
        let ops = MockOps::new();
        let mut composer = StoryboardComposer::new();

        composer
            .compose(job, ops.clone(), MockProbe::with_report("Duration : 00.01.00.000"))
            .unwrap();
        wait_until(&composer, Duration::from_secs(5));

        assert_eq!(
            ops.calls(),
            vec![
                "render_text_panel",
                "montage",
                "extend_canvas",
                "stack_panel",
                "identify_dimensions",
                "flat_canvas",
                "composite",
            ]
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_terminal_event_emitted_exactly_once() {
        let (job, dir) = test_job(2, None);
        let expected_output = job.output_path();
        let mut composer = StoryboardComposer::new();
        let mut events = composer.subscribe();

        composer
            .compose(job, MockOps::new(), MockProbe::unavailable())
            .unwrap();
        wait_until(&composer, Duration::from_secs(5));

        let events = drain(&mut events);
        let finished: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ComposerEvent::Finished { outcome, .. } => Some(outcome.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0], Ok(expected_output));
        // Progress was reported for every step that ran.
        let progress_count = events
            .iter()
            .filter(|e| matches!(e, ComposerEvent::Progress { .. }))
            .count();
        assert_eq!(progress_count, 6);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_second_compose_is_rejected_while_running() {
        let (job, dir) = test_job(2, None);
        let (ops, gate) = MockOps::gated();
        let mut composer = StoryboardComposer::new();
        let mut events = composer.subscribe();

        composer
            .compose(job, ops.clone(), MockProbe::unavailable())
            .unwrap();

        // Wait until the worker is inside the montage step.
        let start = Instant::now();
        while !ops.calls().contains(&"montage") {
            assert!(start.elapsed() < Duration::from_secs(5));
            std::thread::sleep(Duration::from_millis(5));
        }

        let (second, second_dir) = test_job(2, None);
        let result = composer.compose(second, MockOps::new(), MockProbe::unavailable());
        assert!(matches!(result, Err(StoryboardError::CompositionBusy)));
        assert_eq!(composer.state(), ComposerState::Running);

        gate.send(()).unwrap();
        wait_until(&composer, Duration::from_secs(5));

        // The first job ran to completion with its event stream intact.
        let events = drain(&mut events);
        let finished = events
            .iter()
            .filter(|e| matches!(e, ComposerEvent::Finished { .. }))
            .count();
        assert_eq!(finished, 1);
        assert!(matches!(composer.state(), ComposerState::Succeeded(_)));

        let _ = std::fs::remove_dir_all(&dir);
        let _ = std::fs::remove_dir_all(&second_dir);
    }

    #[test]
    fn test_cancellation_stops_at_next_step_boundary() {
        let (job, dir) = test_job(2, None);
        let (ops, gate) = MockOps::gated();
        let mut composer = StoryboardComposer::new();

        composer
            .compose(job, ops.clone(), MockProbe::unavailable())
            .unwrap();

        let start = Instant::now();
        while !ops.calls().contains(&"montage") {
            assert!(start.elapsed() < Duration::from_secs(5));
            std::thread::sleep(Duration::from_millis(5));
        }
        composer.request_cancel();
        gate.send(()).unwrap();
        wait_until(&composer, Duration::from_secs(5));

        // Step 2 finishes (extend follows montage), then the next
        // checkpoint stops the job before the panel merge.
        let calls = ops.calls();
        assert!(calls.contains(&"extend_canvas"));
        assert!(!calls.contains(&"identify_dimensions"));
        assert!(!calls.contains(&"composite"));
        assert_eq!(
            composer.state(),
            ComposerState::Failed(StoryboardError::Cancelled.to_string())
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_composer_is_reusable_after_terminal_state() {
        let (job, dir) = test_job(1, None);
        let mut composer = StoryboardComposer::new();
        composer
            .compose(job, MockOps::new(), MockProbe::unavailable())
            .unwrap();
        wait_until(&composer, Duration::from_secs(5));

        let (next, next_dir) = test_job(1, None);
        let ops = MockOps::new();
        composer
            .compose(next, ops.clone(), MockProbe::unavailable())
            .unwrap();
        wait_until(&composer, Duration::from_secs(5));
        assert!(matches!(composer.state(), ComposerState::Succeeded(_)));

        let _ = std::fs::remove_dir_all(&dir);
        let _ = std::fs::remove_dir_all(&next_dir);
    }
}
