//! Worker pool — long-lived render threads draining the job queue.
//!
//! Each worker loops: dequeue → staleness cutoff → scaled decode (with
//! plain-decode fallback) → timeline replay → emit. Results flow to the
//! controller over a channel; workers never touch the display or the
//! live timeline. A decode failure is an event for that one job, never
//! the end of the worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use crossbeam_channel::Sender;
use image::GrayImage;
use log::{debug, error, trace, warn};

use crate::decode::{DecodeError, PanelDecoder};
use crate::schedule::{JobQueue, RenderJob};

/// A display-ready render: 8-bit grayscale pixels plus the device pixel
/// ratio they were produced at.
#[derive(Debug, Clone)]
pub struct RenderedPanel {
    pub image: GrayImage,
    pub device_pixel_ratio: f32,
}

/// What a worker reports back for one dequeued job.
#[derive(Debug)]
pub enum RenderEvent {
    Rendered {
        job: RenderJob,
        panel: Arc<RenderedPanel>,
    },
    /// Both decode paths failed; the panel is unavailable.
    Failed { job: RenderJob, error: DecodeError },
    /// Dropped before rendering (stale or out of range). Reported so the
    /// controller can clear its pending bookkeeping; nothing is shown.
    Skipped { job: RenderJob },
}

/// Shared state handed to every worker thread.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub queue: Arc<JobQueue>,
    pub decoder: Arc<dyn PanelDecoder>,
    pub paths: Arc<[PathBuf]>,
    /// Last-known focus index, updated by the controller on navigation.
    pub focus: Arc<AtomicUsize>,
    /// Jobs farther than this from the focus are dropped unrendered.
    pub stale_radius: usize,
    pub device_pixel_ratio: f32,
    pub events: Sender<RenderEvent>,
}

pub struct WorkerPool {
    handles: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers (at least one).
    pub(crate) fn spawn(count: usize, ctx: WorkerContext) -> Self {
        let count = count.max(1);
        let handles = (0..count)
            .map(|id| {
                let ctx = ctx.clone();
                thread::Builder::new()
                    .name(format!("render-{id}"))
                    .spawn(move || worker_loop(id, &ctx))
                    .expect("failed to spawn render worker")
            })
            .collect();
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit. Callers must have enqueued one
    /// shutdown sentinel per worker first, or this blocks forever.
    pub fn join(self) {
        for handle in self.handles {
            if handle.join().is_err() {
                error!("render worker panicked");
            }
        }
    }
}

fn worker_loop(id: usize, ctx: &WorkerContext) {
    debug!("worker {id}: started");
    while let Some(job) = ctx.queue.dequeue() {
        let focus = ctx.focus.load(Ordering::Relaxed);
        if job.panel.abs_diff(focus) > ctx.stale_radius {
            trace!(
                "worker {id}: dropping stale job for panel {} (focus {focus})",
                job.panel
            );
            let _ = ctx.events.send(RenderEvent::Skipped { job });
            continue;
        }
        let Some(path) = ctx.paths.get(job.panel).cloned() else {
            warn!("worker {id}: panel {} out of range, dropping", job.panel);
            let _ = ctx.events.send(RenderEvent::Skipped { job });
            continue;
        };

        let start = Instant::now();
        match render_caught(ctx, &job, &path) {
            Ok(image) => {
                debug!(
                    "worker {id}: panel {} rendered in {:.1}ms ({}x{})",
                    job.panel,
                    start.elapsed().as_secs_f64() * 1000.0,
                    image.width(),
                    image.height()
                );
                let panel = Arc::new(RenderedPanel {
                    image,
                    device_pixel_ratio: ctx.device_pixel_ratio,
                });
                let _ = ctx.events.send(RenderEvent::Rendered { job, panel });
            }
            Err(e) => {
                error!("worker {id}: panel {} failed: {e}", job.panel);
                let _ = ctx.events.send(RenderEvent::Failed { job, error: e });
            }
        }
    }
    debug!("worker {id}: shutdown");
}

/// Run [`render`] with panics contained: a panicking decoder or
/// transform fails the one job, not the worker loop.
fn render_caught(
    ctx: &WorkerContext,
    job: &RenderJob,
    path: &Path,
) -> Result<GrayImage, DecodeError> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| render(ctx, job, path)))
        .unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(DecodeError::Panicked(message))
        })
}

/// Decode the panel at physical resolution and replay the job's
/// operation snapshot onto it.
fn render(ctx: &WorkerContext, job: &RenderJob, path: &Path) -> Result<GrayImage, DecodeError> {
    let (phys_w, phys_h) = job.physical_size(ctx.device_pixel_ratio);
    let decoded = match ctx.decoder.decode_scaled(path, phys_w, phys_h) {
        Ok(img) => img,
        Err(e) => {
            warn!(
                "scaled decode of {} failed ({e}), falling back to plain decode",
                path.display()
            );
            ctx.decoder.decode_plain(path)?
        }
    };
    Ok(match &job.timeline {
        Some(snapshot) => snapshot.apply(&decoded),
        None => decoded,
    })
}
