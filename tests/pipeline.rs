//! End-to-end pipeline scenarios: a synthetic decoder and a recording
//! display sink stand in for the external collaborators.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{GrayImage, Luma};
use parking_lot::Mutex;

use panelflow::decode::{DecodeError, PanelDecoder};
use panelflow::{DisplaySink, Operation, PanelController, PipelineConfig, RenderedPanel};

const DEADLINE: Duration = Duration::from_secs(10);

/// Deterministic pixels per panel: enough structure that transforms
/// produce distinct, predictable output.
fn synthetic(index: usize, w: u32, h: u32) -> GrayImage {
    GrayImage::from_fn(w, h, |x, y| {
        Luma([((index * 31 + x as usize * 5 + y as usize) % 256) as u8])
    })
}

/// Panel paths are `panel-NNN.png`; decoders recover the index from the
/// file stem instead of touching the filesystem.
fn panel_paths(count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| PathBuf::from(format!("panel-{i:03}.png")))
        .collect()
}

fn panel_index(path: &Path) -> usize {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.rsplit('-').next())
        .and_then(|s| s.parse().ok())
        .expect("synthetic panel path")
}

struct SyntheticDecoder {
    delay: Duration,
    /// Scaled decode fails for these indices (exercises the fallback).
    scaled_fails_for: Vec<usize>,
    /// Plain decode fails too: the panel is unavailable.
    plain_fails_for: Vec<usize>,
}

impl SyntheticDecoder {
    fn instant() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            scaled_fails_for: Vec::new(),
            plain_fails_for: Vec::new(),
        }
    }
}

impl PanelDecoder for SyntheticDecoder {
    fn decode_scaled(
        &self,
        path: &Path,
        width: u32,
        height: u32,
    ) -> Result<GrayImage, DecodeError> {
        let index = panel_index(path);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.scaled_fails_for.contains(&index) {
            return Err(DecodeError::InvalidFormat(format!(
                "synthetic scaled failure for panel {index}"
            )));
        }
        Ok(synthetic(index, width, height))
    }

    fn decode_plain(&self, path: &Path) -> Result<GrayImage, DecodeError> {
        let index = panel_index(path);
        if self.plain_fails_for.contains(&index) {
            return Err(DecodeError::InvalidFormat(format!(
                "synthetic plain failure for panel {index}"
            )));
        }
        Ok(synthetic(index, 64, 64))
    }
}

#[derive(Default)]
struct SinkState {
    shown: Vec<(usize, usize, GrayImage)>,
    unavailable: Vec<usize>,
}

#[derive(Clone, Default)]
struct RecordingSink {
    state: Arc<Mutex<SinkState>>,
}

impl RecordingSink {
    fn shown_indices(&self) -> Vec<usize> {
        self.state.lock().shown.iter().map(|(i, _, _)| *i).collect()
    }

    fn last_shown(&self) -> Option<(usize, usize, GrayImage)> {
        self.state.lock().shown.last().cloned()
    }

    fn shown_count(&self) -> usize {
        self.state.lock().shown.len()
    }

    fn unavailable(&self) -> Vec<usize> {
        self.state.lock().unavailable.clone()
    }
}

impl DisplaySink for RecordingSink {
    fn display(&mut self, panel: &RenderedPanel, index: usize, total: usize) {
        self.state.lock().shown.push((index, total, panel.image.clone()));
    }

    fn display_unavailable(&mut self, index: usize, _message: &str) {
        self.state.lock().unavailable.push(index);
    }
}

fn pipeline(
    panels: usize,
    workers: usize,
    decoder: SyntheticDecoder,
) -> (PanelController, RecordingSink) {
    let _ = env_logger::builder().is_test(true).try_init();
    let sink = RecordingSink::default();
    let config = PipelineConfig {
        workers,
        ..PipelineConfig::default()
    };
    let controller = PanelController::new(
        panel_paths(panels),
        (32, 32),
        1.0,
        Arc::new(decoder),
        Box::new(sink.clone()),
        config,
    )
    .expect("pipeline should start");
    (controller, sink)
}

/// Pump worker events until `done` holds or the deadline passes.
///
/// `done` must not borrow the controller (probe the sink instead); tests
/// that need to watch controller state inline their own pump loop.
fn pump_until(controller: &mut PanelController, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < DEADLINE {
        if done() {
            return true;
        }
        controller.pump_events(Duration::from_millis(20));
    }
    done()
}

#[test]
fn cold_fetch_renders_then_cache_hits() {
    let (mut controller, sink) = pipeline(5, 2, SyntheticDecoder::instant());

    let hit = controller.fetch_page(0).unwrap();
    assert!(!hit, "nothing cached yet, must go through a worker");

    assert!(
        pump_until(&mut controller, || sink.shown_count() > 0),
        "foreground render never arrived"
    );
    let (index, total, image) = sink.last_shown().unwrap();
    assert_eq!(index, 0);
    assert_eq!(total, 5);
    assert_eq!(image, synthetic(0, 32, 32));

    // Second fetch of the same panel is served synchronously from cache
    let hit = controller.fetch_page(0).unwrap();
    assert!(hit);
    assert_eq!(sink.shown_count(), 2);

    controller.stop();
}

#[test]
fn prefetch_warms_the_full_window() {
    let (mut controller, _sink) = pipeline(30, 2, SyntheticDecoder::instant());

    controller.fetch_page(0).unwrap();
    // At the left edge the whole 16-panel window reallocates ahead
    let start = Instant::now();
    while !(1..=16).all(|i| controller.is_cached(i)) {
        assert!(
            start.elapsed() < DEADLINE,
            "prefetch window was not fully warmed"
        );
        controller.pump_events(Duration::from_millis(20));
    }
    assert!(
        !controller.is_cached(17),
        "panel 17 is outside the window and must not be warmed"
    );

    controller.stop();
}

#[test]
fn stale_foreground_result_is_cached_but_not_displayed() {
    let (mut controller, sink) =
        pipeline(20, 1, SyntheticDecoder::with_delay(Duration::from_millis(60)));

    controller.fetch_page(5).unwrap();
    // Navigate away before the worker can finish panel 5
    controller.fetch_page(9).unwrap();

    let start = Instant::now();
    while !(sink.shown_indices().contains(&9) && controller.is_cached(5)) {
        assert!(
            start.elapsed() < DEADLINE,
            "expected panel 9 displayed and panel 5 cached"
        );
        controller.pump_events(Duration::from_millis(20));
    }
    assert!(
        !sink.shown_indices().contains(&5),
        "superseded foreground result must not reach the display"
    );

    controller.stop();
}

#[test]
fn timeline_replay_renders_the_applied_prefix() {
    let (mut controller, sink) = pipeline(1, 1, SyntheticDecoder::instant());

    controller.fetch_page(0).unwrap();
    assert!(pump_until(&mut controller, || sink.shown_count() >= 1));

    // Build [Invert, Threshold(OTSU), MorphOpen(3)], waiting for each
    // foreground render so every prefix lands in the cache.
    let ops = [
        Operation::Invert,
        Operation::Threshold(0),
        Operation::MorphOpen(3),
    ];
    for (n, op) in ops.iter().enumerate() {
        controller.insert_operation(op.clone());
        assert!(
            pump_until(&mut controller, || sink.shown_count() >= n + 2),
            "render for operation {n} never arrived"
        );
    }

    let base = synthetic(0, 32, 32);
    let after_two = Operation::Threshold(0).apply(&Operation::Invert.apply(&base));
    let after_three = Operation::MorphOpen(3).apply(&after_two);
    assert_eq!(sink.last_shown().unwrap().2, after_three);

    // Cursor back to 2: Invert + Threshold only, MorphOpen skipped.
    // The prefix was rendered during the inserts, so this is a cache hit.
    assert!(controller.undo(), "undo should display synchronously");
    assert_eq!(sink.last_shown().unwrap().2, after_two);

    // Cursor forward to 3 applies MorphOpen again
    assert!(controller.redo(), "redo should display synchronously");
    assert_eq!(sink.last_shown().unwrap().2, after_three);

    controller.stop();
}

#[test]
fn scaled_decode_failure_falls_back_to_plain() {
    let decoder = SyntheticDecoder {
        scaled_fails_for: vec![0],
        ..SyntheticDecoder::instant()
    };
    let (mut controller, sink) = pipeline(3, 1, decoder);

    controller.fetch_page(0).unwrap();
    assert!(pump_until(&mut controller, || sink.shown_count() > 0));
    let (index, _, image) = sink.last_shown().unwrap();
    assert_eq!(index, 0);
    // The plain fallback ignores the target box
    assert_eq!(image.dimensions(), (64, 64));

    controller.stop();
}

#[test]
fn unavailable_panel_is_reported_and_pipeline_survives() {
    let decoder = SyntheticDecoder {
        scaled_fails_for: vec![0],
        plain_fails_for: vec![0],
        ..SyntheticDecoder::instant()
    };
    let (mut controller, sink) = pipeline(3, 1, decoder);

    controller.fetch_page(0).unwrap();
    assert!(
        pump_until(&mut controller, || !sink.unavailable().is_empty()),
        "terminal failure never reported"
    );
    assert_eq!(sink.unavailable(), vec![0]);
    assert!(sink.shown_indices().is_empty());

    // The failure was one job, not the pool: the next panel still renders
    controller.fetch_page(1).unwrap();
    assert!(pump_until(&mut controller, || {
        sink.shown_indices().contains(&1)
    }));

    controller.stop();
}

#[test]
fn stop_with_queued_work_joins_promptly() {
    let (mut controller, _sink) =
        pipeline(40, 2, SyntheticDecoder::with_delay(Duration::from_millis(10)));

    // Fill the queue with a focus fetch plus a full prefetch window
    controller.fetch_page(20).unwrap();
    let start = Instant::now();
    controller.stop();
    // Sentinels outrank queued jobs, so shutdown must not drain the
    // whole backlog first
    assert!(
        start.elapsed() < Duration::from_secs(5),
        "stop() took {:?}",
        start.elapsed()
    );
}
