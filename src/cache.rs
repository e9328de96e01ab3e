//! Render cache — fixed-capacity LRU over finished panel renders.
//!
//! The LRU core is a plain single-threaded structure; [`RenderCache`]
//! wraps it in a mutex because results can be written back while the
//! interactive thread is probing for hits. Eviction is strict recency:
//! `get` and `put` promote, `contains` deliberately does not — membership
//! probes made while planning prefetch must not disturb eviction order.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;

use crate::worker::RenderedPanel;

/// Identity of one finished render: which panel, under which edit
/// history, at which physical resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderKey {
    pub panel: usize,
    /// Chained timeline identity; 0 for a render with no operations.
    pub ident: u64,
    pub width: u32,
    pub height: u32,
}

// ---------------------------------------------------------------------------
// LruCache — generic, single-threaded core
// ---------------------------------------------------------------------------

/// Least-recently-used map with a hard entry cap.
pub struct LruCache<K, V> {
    map: HashMap<K, V>,
    /// Keys ordered oldest-first; the back is most recently used.
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// `capacity` must be at least 1.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "LRU capacity must be at least 1");
        Self {
            map: HashMap::with_capacity(capacity + 1),
            order: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Membership test without promoting the key.
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Look up `key`, promoting it to most-recently-used on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.map.contains_key(key) {
            self.promote(key);
        }
        self.map.get(key)
    }

    /// Insert or overwrite `key`, promote it, and evict the least
    /// recently used entry if the cap is exceeded.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        if self.map.insert(key.clone(), value).is_some() {
            self.promote(&key);
            return None;
        }
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            self.order.pop_front().and_then(|old| self.map.remove(&old))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }

    /// Move `key` to the most-recently-used end. The recency list is tiny
    /// (cache capacity), so a linear scan is fine.
    fn promote(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key)
            && let Some(k) = self.order.remove(pos)
        {
            self.order.push_back(k);
        }
    }
}

// ---------------------------------------------------------------------------
// RenderCache — shared, mutex-protected render store
// ---------------------------------------------------------------------------

/// Thread-safe LRU of finished renders, keyed by [`RenderKey`].
///
/// Values are `Arc`-shared so a cache hit hands back the image without
/// copying pixel data.
pub struct RenderCache {
    inner: Mutex<LruCache<RenderKey, Arc<RenderedPanel>>>,
}

impl RenderCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Non-promoting membership probe.
    pub fn contains(&self, key: &RenderKey) -> bool {
        self.inner.lock().contains(key)
    }

    pub fn get(&self, key: &RenderKey) -> Option<Arc<RenderedPanel>> {
        self.inner.lock().get(key).cloned()
    }

    pub fn put(&self, key: RenderKey, panel: Arc<RenderedPanel>) {
        if self.inner.lock().put(key, panel).is_some() {
            trace!("cache: evicted LRU entry storing panel {}", key.panel);
        }
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
