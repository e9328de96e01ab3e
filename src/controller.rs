//! Controller — orchestrates scheduling, caching, prefetch and display.
//!
//! Runs on the interactive thread and never decodes or transforms
//! anything itself: it only enqueues jobs and reacts to worker events.
//! Workers may finish out of submission order, so a foreground result is
//! dispatched to the display only if its panel is still the focused one
//! and its timeline identity still matches — anything else is cached for
//! later but not shown.
//!
//! ## Pending-index bookkeeping
//!
//! `pending` tracks "enqueued but not yet resolved" panel indices so the
//! prefetch planner does not double-request work that is already in the
//! queue or on a worker. The cache alone is not enough: a finished render
//! sits in the event channel for a moment before it lands in the cache,
//! and a planner run in that gap would re-request the same panel. Every
//! worker event (rendered, failed, or skipped) clears its index.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, ensure};
use crossbeam_channel::{Receiver, unbounded};
use log::{debug, error, info, trace};

use crate::cache::{RenderCache, RenderKey};
use crate::config::PipelineConfig;
use crate::decode::PanelDecoder;
use crate::ops::Operation;
use crate::prefetch;
use crate::schedule::{JobQueue, Priority, RenderJob};
use crate::timeline::Timeline;
use crate::worker::{RenderEvent, RenderedPanel, WorkerContext, WorkerPool};

/// Display collaborator: receives finished foreground renders and the
/// page indicator. Implementations live in the host application.
pub trait DisplaySink: Send {
    fn display(&mut self, panel: &RenderedPanel, index: usize, total: usize);

    /// Both decode paths failed; the panel cannot be shown. Default:
    /// ignore (the failure is already logged).
    fn display_unavailable(&mut self, _index: usize, _message: &str) {}
}

pub struct PanelController {
    paths: Arc<[PathBuf]>,
    queue: Arc<JobQueue>,
    cache: RenderCache,
    pending: HashSet<usize>,
    timeline: Timeline,
    /// Shared with the workers for their staleness cutoff.
    focus: Arc<AtomicUsize>,
    logical_size: (u32, u32),
    device_pixel_ratio: f32,
    config: PipelineConfig,
    events: Receiver<RenderEvent>,
    pool: Option<WorkerPool>,
    display: Box<dyn DisplaySink>,
}

impl PanelController {
    /// Build the pipeline and start its worker pool.
    ///
    /// `logical_size` is the pre-scaling target resolution; workers decode
    /// at `logical_size × device_pixel_ratio` physical pixels.
    pub fn new(
        paths: Vec<PathBuf>,
        logical_size: (u32, u32),
        device_pixel_ratio: f32,
        decoder: Arc<dyn PanelDecoder>,
        display: Box<dyn DisplaySink>,
        config: PipelineConfig,
    ) -> Result<Self> {
        ensure!(!paths.is_empty(), "no panels to serve");
        ensure!(
            device_pixel_ratio > 0.0 && device_pixel_ratio.is_finite(),
            "device pixel ratio {device_pixel_ratio} out of range"
        );

        let paths: Arc<[PathBuf]> = paths.into();
        let queue = Arc::new(JobQueue::new());
        let focus = Arc::new(AtomicUsize::new(0));
        let (events_tx, events) = unbounded();

        let pool = WorkerPool::spawn(
            config.workers,
            WorkerContext {
                queue: queue.clone(),
                decoder,
                paths: paths.clone(),
                focus: focus.clone(),
                stale_radius: config.stale_radius(),
                device_pixel_ratio,
                events: events_tx,
            },
        );
        info!(
            "controller: {} panel(s), {} worker(s), cache capacity {}",
            paths.len(),
            pool.len(),
            config.cache_capacity
        );

        Ok(Self {
            cache: RenderCache::new(config.cache_capacity),
            pending: HashSet::new(),
            timeline: Timeline::new(),
            paths,
            queue,
            focus,
            logical_size,
            device_pixel_ratio,
            config,
            events,
            pool: Some(pool),
            display,
        })
    }

    pub fn panel_count(&self) -> usize {
        self.paths.len()
    }

    pub fn focus(&self) -> usize {
        self.focus.load(Ordering::Relaxed)
    }

    /// Read-only view of the edit history (cursor position, length).
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Whether a finished render for `panel` under its current identity
    /// is cached. Does not disturb eviction order.
    pub fn is_cached(&self, panel: usize) -> bool {
        self.cache.contains(&self.render_key(panel))
    }

    /// `filename | Cursor: applied/total`, for a host status bar.
    pub fn status(&self) -> String {
        let index = self.focus();
        let filename = self.paths[index]
            .file_name()
            .map_or_else(|| self.paths[index].display().to_string(), |n| n.to_string_lossy().into_owned());
        format!(
            "{} | Cursor: {}/{}",
            filename,
            self.timeline.cursor(),
            self.timeline.len()
        )
    }

    /// `Panel: current/total` (1-based), for a host page indicator.
    pub fn panel_info(&self) -> String {
        format!("Panel: {}/{}", self.focus() + 1, self.paths.len())
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Focus `index`: plan prefetch around it, then either dispatch the
    /// cached render synchronously or enqueue a foreground job.
    ///
    /// Navigating to a different panel resets the edit history (each
    /// panel starts from a clean timeline). Returns whether the request
    /// was satisfied synchronously from cache.
    pub fn fetch_page(&mut self, index: usize) -> Result<bool> {
        ensure!(
            index < self.paths.len(),
            "panel {index} out of range (have {})",
            self.paths.len()
        );
        let previous = self.focus.swap(index, Ordering::Relaxed);
        if previous != index {
            self.timeline.reset();
        }
        debug!("fetch_page: {previous} -> {index}");
        self.prefetch_renders();
        Ok(self.render_focus())
    }

    /// Warm the cache around the focus: enqueue a background job for
    /// every planned index not already cached or pending.
    pub fn prefetch_renders(&mut self) {
        let current = self.focus();
        let max_index = self.paths.len() - 1;
        let window = prefetch::plan_window(
            current,
            max_index,
            self.config.prefetch_behind,
            self.config.prefetch_ahead,
        );
        let (width, height) = self.physical_size();
        for panel in window {
            if self.pending.contains(&panel) {
                continue;
            }
            // Prefetched neighbors render without operations
            let key = RenderKey { panel, ident: 0, width, height };
            if self.cache.contains(&key) {
                continue;
            }
            self.submit(RenderJob {
                panel,
                logical_size: self.logical_size,
                priority: Priority::Background,
                timeline: None,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Timeline editing
    // -----------------------------------------------------------------------

    /// Apply `op` at the cursor and re-render the focused panel.
    pub fn insert_operation(&mut self, op: Operation) -> bool {
        self.timeline.insert(op);
        self.render_focus()
    }

    /// Remove the operation behind the cursor and re-render.
    pub fn delete_operation(&mut self) -> bool {
        self.timeline.delete();
        self.render_focus()
    }

    /// Step the cursor back (undo) and re-render.
    pub fn undo(&mut self) -> bool {
        self.timeline.descend();
        self.render_focus()
    }

    /// Step the cursor forward (redo) and re-render.
    pub fn redo(&mut self) -> bool {
        self.timeline.ascend();
        self.render_focus()
    }

    /// Clear the edit history and re-render the bare panel.
    pub fn reset_operations(&mut self) -> bool {
        self.timeline.reset();
        self.render_focus()
    }

    // -----------------------------------------------------------------------
    // Result processing
    // -----------------------------------------------------------------------

    /// Drain all queued worker events without blocking. Returns the
    /// number of events handled.
    pub fn poll_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for one worker event, then drain the rest.
    /// Returns the number of events handled.
    pub fn pump_events(&mut self, timeout: Duration) -> usize {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                1 + self.poll_events()
            }
            Err(_) => 0,
        }
    }

    fn handle_event(&mut self, event: RenderEvent) {
        match event {
            RenderEvent::Rendered { job, panel } => {
                self.pending.remove(&job.panel);
                let (width, height) = job.physical_size(self.device_pixel_ratio);
                let key = RenderKey {
                    panel: job.panel,
                    ident: job.ident(),
                    width,
                    height,
                };
                self.cache.put(key, panel.clone());

                let focus = self.focus();
                if job.priority == Priority::Foreground
                    && job.panel == focus
                    && job.ident() == self.timeline.ident()
                {
                    self.display.display(&panel, job.panel, self.paths.len());
                } else {
                    trace!(
                        "panel {} cached but not shown (priority {:?}, focus {focus})",
                        job.panel, job.priority
                    );
                }
            }
            RenderEvent::Failed { job, error } => {
                self.pending.remove(&job.panel);
                error!("panel {} unavailable: {error}", job.panel);
                if job.priority == Priority::Foreground && job.panel == self.focus() {
                    self.display
                        .display_unavailable(job.panel, &error.to_string());
                }
            }
            RenderEvent::Skipped { job } => {
                trace!("panel {} skipped", job.panel);
                self.pending.remove(&job.panel);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Stop the pool: one sentinel per worker, then join them all.
    /// Idempotent; also runs on drop.
    pub fn stop(&mut self) {
        let Some(pool) = self.pool.take() else {
            return;
        };
        info!("controller: stopping {} worker(s)", pool.len());
        for _ in 0..pool.len() {
            self.queue.enqueue_shutdown();
        }
        pool.join();
    }

    // -----------------------------------------------------------------------

    /// Dispatch the focused panel from cache, or enqueue a foreground
    /// job carrying the current edit history. Returns whether the panel
    /// was displayed synchronously.
    fn render_focus(&mut self) -> bool {
        let index = self.focus();
        if let Some(panel) = self.cache.get(&self.render_key(index)) {
            debug!("render_focus: cache hit for panel {index}");
            self.display.display(&panel, index, self.paths.len());
            return true;
        }
        let snapshot = (self.timeline.cursor() > 0).then(|| self.timeline.snapshot());
        self.submit(RenderJob {
            panel: index,
            logical_size: self.logical_size,
            priority: Priority::Foreground,
            timeline: snapshot,
        });
        false
    }

    fn submit(&mut self, job: RenderJob) {
        self.pending.insert(job.panel);
        self.queue.enqueue(job);
    }

    fn physical_size(&self) -> (u32, u32) {
        let (w, h) = self.logical_size;
        (
            (w as f32 * self.device_pixel_ratio).round().max(1.0) as u32,
            (h as f32 * self.device_pixel_ratio).round().max(1.0) as u32,
        )
    }

    /// Cache key for `panel`: the focused panel renders under the current
    /// timeline identity, everything else under the bare identity.
    fn render_key(&self, panel: usize) -> RenderKey {
        let ident = if panel == self.focus() {
            self.timeline.ident()
        } else {
            0
        };
        let (width, height) = self.physical_size();
        RenderKey { panel, ident, width, height }
    }
}

impl Drop for PanelController {
    fn drop(&mut self) {
        self.stop();
    }
}
