//! Job scheduler — thread-safe priority queue feeding the worker pool.
//!
//! Ordering is priority first (foreground before background), then
//! insertion sequence (FIFO within a priority class, via a monotonic
//! counter attached at enqueue time). Shutdown is modeled in-band: a
//! sentinel entry ordered below every real priority, one per worker;
//! a worker that dequeues a sentinel exits its loop.
//!
//! `enqueue` never blocks. `dequeue` parks the calling worker on a
//! condvar until an entry is available.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::trace;
use parking_lot::{Condvar, Mutex};

use crate::timeline::TimelineSnapshot;

/// Foreground jobs render for immediate display; background jobs only
/// warm the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Foreground = 0,
    Background = 1,
}

/// One render request. Immutable once enqueued.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub panel: usize,
    /// Logical (pre device-pixel-ratio) target resolution.
    pub logical_size: (u32, u32),
    pub priority: Priority,
    /// Copy of the edit history to replay; `None` renders the bare panel.
    pub timeline: Option<TimelineSnapshot>,
}

impl RenderJob {
    /// Physical pixel box for this job at the given device pixel ratio.
    pub fn physical_size(&self, dpr: f32) -> (u32, u32) {
        let (w, h) = self.logical_size;
        (
            (w as f32 * dpr).round().max(1.0) as u32,
            (h as f32 * dpr).round().max(1.0) as u32,
        )
    }

    /// Timeline identity this job renders under; 0 without operations.
    pub fn ident(&self) -> u64 {
        self.timeline.as_ref().map_or(0, TimelineSnapshot::ident)
    }
}

enum QueueItem {
    Job(RenderJob),
    Shutdown,
}

impl QueueItem {
    /// Sentinels sort below every real priority.
    fn rank(&self) -> i8 {
        match self {
            QueueItem::Shutdown => -1,
            QueueItem::Job(job) => job.priority as i8,
        }
    }
}

struct Entry {
    item: QueueItem,
    seq: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the smallest
        // (rank, sequence) pair is served first.
        (other.item.rank(), other.seq).cmp(&(self.item.rank(), self.seq))
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

/// Thread-safe priority queue of render jobs.
pub struct JobQueue {
    inner: Mutex<Inner>,
    available: Condvar,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            available: Condvar::new(),
        }
    }

    /// Queue length including any pending sentinels.
    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }

    /// Add a job. Never blocks.
    pub fn enqueue(&self, job: RenderJob) {
        trace!(
            "queue: enqueue panel {} priority {:?}",
            job.panel, job.priority
        );
        self.push(QueueItem::Job(job));
    }

    /// Add one shutdown sentinel. Call once per active worker.
    pub fn enqueue_shutdown(&self) {
        self.push(QueueItem::Shutdown);
    }

    fn push(&self, item: QueueItem) {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(Entry { item, seq });
        drop(inner);
        self.available.notify_one();
    }

    /// Take the highest-priority entry, blocking until one is available.
    ///
    /// Returns `None` when a shutdown sentinel is dequeued; the caller
    /// must exit its loop and not call `dequeue` again.
    pub fn dequeue(&self) -> Option<RenderJob> {
        let mut inner = self.inner.lock();
        loop {
            match inner.heap.pop() {
                Some(Entry { item: QueueItem::Job(job), .. }) => return Some(job),
                Some(Entry { item: QueueItem::Shutdown, .. }) => return None,
                None => self.available.wait(&mut inner),
            }
        }
    }

}
