//! Operation timeline — bounded, cursor-addressed edit history.
//!
//! A classic linear undo/redo log over image operations. Nodes live in a
//! contiguous deque addressed by index (no linked nodes, no manual
//! eviction bookkeeping); the cursor counts how many operations are
//! currently applied. Retained history is hard-capped at 50 nodes on
//! either side of the cursor, so total memory never exceeds 100 nodes.
//!
//! Each node carries a chained identity hash — the hash of its
//! predecessor's identity combined with the operation's signature — so two
//! timeline states can be compared for "same edit history up to here"
//! without replaying any transforms. Render jobs carry an immutable
//! [`TimelineSnapshot`] of the applied prefix taken at enqueue time;
//! workers never observe the live timeline.

use std::collections::VecDeque;
use std::hash::{DefaultHasher, Hasher};
use std::sync::Arc;

use image::GrayImage;
use log::trace;

use crate::ops::Operation;

/// Maximum retained operations before the cursor.
pub const MAX_BEFORE: usize = 50;
/// Maximum retained operations after the cursor.
pub const MAX_AFTER: usize = 50;

#[derive(Debug, Clone)]
struct TimelineNode {
    op: Operation,
    /// Chained identity: `H(previous ident, op signature)`.
    ident: u64,
}

/// Hash an operation's signature onto a predecessor identity.
fn chain(prev: u64, op: &Operation) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write_u64(prev);
    hasher.write(op.signature().as_bytes());
    hasher.finish()
}

#[derive(Debug, Default)]
pub struct Timeline {
    nodes: VecDeque<TimelineNode>,
    /// Number of applied operations; 0 is the origin (nothing applied).
    cursor: usize,
}

/// Immutable copy of the applied prefix, taken at job-enqueue time.
///
/// The identity of the empty prefix is 0.
#[derive(Debug, Clone)]
pub struct TimelineSnapshot {
    ops: Arc<[Operation]>,
    ident: u64,
}

impl TimelineSnapshot {
    pub fn ident(&self) -> u64 {
        self.ident
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Replay the snapshot onto a copy of `original`.
    pub fn apply(&self, original: &GrayImage) -> GrayImage {
        let mut img = original.clone();
        for op in self.ops.iter() {
            img = op.apply(&img);
        }
        img
    }
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retained nodes (applied + redoable).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Cursor position: how many operations are currently applied.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Identity of the applied prefix; 0 at the origin.
    pub fn ident(&self) -> u64 {
        if self.cursor == 0 {
            0
        } else {
            self.nodes[self.cursor - 1].ident
        }
    }

    /// Insert `op` at the cursor and advance past it.
    ///
    /// Any redo nodes beyond the cursor are discarded first (linear undo
    /// semantics), then bounds are re-enforced.
    pub fn insert(&mut self, op: Operation) {
        self.nodes.truncate(self.cursor);
        let ident = chain(self.ident(), &op);
        trace!("timeline: insert {} at cursor {}", op.name(), self.cursor);
        self.nodes.push_back(TimelineNode { op, ident });
        self.cursor += 1;
        self.enforce_bounds();
    }

    /// Remove the operation immediately before the cursor and retreat.
    ///
    /// No-op at the origin. Note the asymmetry: this deletes *behind* the
    /// cursor, not the node the cursor points at.
    pub fn delete(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let removed = self.nodes.remove(self.cursor - 1);
        self.cursor -= 1;
        if let Some(node) = removed {
            trace!("timeline: delete {} at cursor {}", node.op.name(), self.cursor);
        }
        self.rehash_from(self.cursor);
        self.enforce_bounds();
    }

    /// Move the cursor forward one node (redo). No-op at the newest node.
    pub fn ascend(&mut self) {
        self.cursor = (self.cursor + 1).min(self.nodes.len());
    }

    /// Move the cursor backward one node (undo). No-op at the origin.
    pub fn descend(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// Drop all nodes and return to the origin.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.cursor = 0;
    }

    /// Copy the applied prefix for a render job.
    pub fn snapshot(&self) -> TimelineSnapshot {
        let ops: Vec<Operation> = self
            .nodes
            .iter()
            .take(self.cursor)
            .map(|n| n.op.clone())
            .collect();
        TimelineSnapshot {
            ops: ops.into(),
            ident: self.ident(),
        }
    }

    /// Stateless render: replay the applied prefix onto a copy of
    /// `original`. Never mutates its input.
    pub fn render(&self, original: &GrayImage) -> GrayImage {
        self.render_at(self.cursor, original)
    }

    /// Render at an arbitrary cursor position (comparison views).
    /// `target_cursor` beyond the retained history is clamped.
    pub fn render_at(&self, target_cursor: usize, original: &GrayImage) -> GrayImage {
        let upto = target_cursor.min(self.nodes.len());
        let mut img = original.clone();
        for node in self.nodes.iter().take(upto) {
            img = node.op.apply(&img);
        }
        img
    }

    /// Recompute chained identities from node index `from` to the end.
    ///
    /// Needed after a mid-chain removal; front eviction keeps identities
    /// intact because each node's ident already encodes the evicted
    /// prefix.
    fn rehash_from(&mut self, from: usize) {
        for i in from..self.nodes.len() {
            let prev = if i == 0 { 0 } else { self.nodes[i - 1].ident };
            self.nodes[i].ident = chain(prev, &self.nodes[i].op);
        }
    }

    /// Bounded-history rule: at most [`MAX_BEFORE`] nodes may precede the
    /// cursor and at most [`MAX_AFTER`] may follow it.
    fn enforce_bounds(&mut self) {
        if self.cursor > MAX_BEFORE {
            let excess = self.cursor - MAX_BEFORE;
            self.nodes.drain(..excess);
            self.cursor = MAX_BEFORE;
            trace!("timeline: evicted {excess} oldest node(s)");
        }
        let after = self.nodes.len() - self.cursor;
        if after > MAX_AFTER {
            self.nodes.truncate(self.cursor + MAX_AFTER);
            trace!("timeline: trimmed {} newest node(s)", after - MAX_AFTER);
        }
    }
}
