//! Graph configuration and shared index state.
//!
//! [`GraphConfig`] carries the tuning parameters (connectivity, beam
//! widths, layer decay). [`ProximityGraph`] assembles the node slab and
//! vector arena with the atomics that make concurrent insertion and search
//! possible: a CAS-guarded size counter and a packed entry-point word.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::{IndexError, Result};
use crate::hnsw::distance::Metric;
use crate::hnsw::node::NodeStore;
use crate::hnsw::vector::VectorStore;

/// Sentinel id meaning "no entry point" (also the on-disk encoding).
pub const NO_ENTRY: u32 = u32::MAX;

/// Tuning parameters for the proximity graph.
///
/// Controls the trade-off between build speed, search speed, recall, and
/// memory usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Target out-degree per node at layers above 0.
    pub connectivity: usize,
    /// Degree cap at layer 0 (`2 * connectivity`).
    pub connectivity_base: usize,
    /// Candidate beam width during insertion.
    pub expansion_add: usize,
    /// Candidate beam width during search (raised to `k` per query).
    pub expansion_search: usize,
    /// Layer decay `1 / ln(connectivity)` for random layer assignment.
    pub level_lambda: f64,
    /// Construction-time seed for the per-worker layer RNGs.
    pub seed: u64,
}

impl GraphConfig {
    pub fn new(connectivity: usize, expansion_add: usize, expansion_search: usize, seed: u64) -> Self {
        Self {
            connectivity,
            connectivity_base: connectivity * 2,
            expansion_add,
            expansion_search,
            level_lambda: 1.0 / (connectivity as f64).ln(),
            seed,
        }
    }

    /// Degree cap for a layer.
    #[inline]
    pub fn max_degree(&self, layer: usize) -> usize {
        if layer == 0 {
            self.connectivity_base
        } else {
            self.connectivity
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::new(
            config::DEFAULT_CONNECTIVITY,
            config::DEFAULT_EXPANSION_ADD,
            config::DEFAULT_EXPANSION_SEARCH,
            config::DEFAULT_SEED,
        )
    }
}

/// The layered small-world graph: node slab, vector arena, and the shared
/// counters that concurrent insertion and search coordinate through.
///
/// `entry` packs the entry id (high 32 bits) and the current max level
/// (low 32 bits) into one word so readers always see a consistent pair.
#[derive(Debug)]
pub struct ProximityGraph {
    config: GraphConfig,
    metric: Metric,
    nodes: NodeStore,
    vectors: VectorStore,
    capacity: usize,
    size: AtomicU32,
    entry: AtomicU64,
    entry_guard: Mutex<()>,
}

#[inline]
fn pack_entry(id: u32, level: u32) -> u64 {
    (id as u64) << 32 | level as u64
}

impl ProximityGraph {
    /// Creates an empty graph with zero capacity; `reserve` before adding.
    pub fn new(metric: Metric, config: GraphConfig) -> Self {
        Self {
            config,
            metric,
            nodes: NodeStore::with_capacity(0),
            vectors: VectorStore::with_capacity(metric.dims_bytes(), 0),
            capacity: 0,
            size: AtomicU32::new(0),
            entry: AtomicU64::new(pack_entry(NO_ENTRY, 0)),
            entry_guard: Mutex::new(()),
        }
    }

    pub(crate) fn from_parts(
        config: GraphConfig,
        metric: Metric,
        nodes: NodeStore,
        vectors: VectorStore,
        capacity: usize,
        size: u32,
        entry: Option<(u32, u32)>,
    ) -> Self {
        let packed = match entry {
            Some((id, level)) => pack_entry(id, level),
            None => pack_entry(NO_ENTRY, 0),
        };
        Self {
            config,
            metric,
            nodes,
            vectors,
            capacity,
            size: AtomicU32::new(size),
            entry: AtomicU64::new(packed),
            entry_guard: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn metric(&self) -> &Metric {
        &self.metric
    }

    pub fn nodes(&self) -> &NodeStore {
        &self.nodes
    }

    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    /// Number of inserted nodes.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when the graph serves a read-only file mapping.
    pub fn is_mapped(&self) -> bool {
        self.nodes.is_mapped()
    }

    /// Consistent (entry id, max level) pair, or `None` when empty.
    pub fn entry_snapshot(&self) -> Option<(u32, u32)> {
        let packed = self.entry.load(Ordering::Acquire);
        let id = (packed >> 32) as u32;
        if id == NO_ENTRY {
            None
        } else {
            Some((id, packed as u32))
        }
    }

    pub fn entry_point(&self) -> Option<u32> {
        self.entry_snapshot().map(|(id, _)| id)
    }

    pub fn max_level(&self) -> u32 {
        self.entry_snapshot().map_or(0, |(_, level)| level)
    }

    pub(crate) fn publish_entry(&self, id: u32, level: u32) {
        self.entry.store(pack_entry(id, level), Ordering::Release);
    }

    /// Serializes the rare entry-point promotions.
    pub(crate) fn entry_guard(&self) -> &Mutex<()> {
        &self.entry_guard
    }

    /// Reserves the next internal id, or fails without consuming one.
    pub(crate) fn try_reserve_slot(&self) -> Result<u32> {
        loop {
            let current = self.size.load(Ordering::Relaxed);
            if current as usize >= self.capacity {
                return Err(IndexError::OutOfCapacity {
                    size: current as usize,
                    capacity: self.capacity,
                });
            }
            if self
                .size
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(current);
            }
        }
    }

    /// Draws a top layer from the exponential distribution
    /// `floor(-ln(r) * level_lambda)` with `r` uniform in (0, 1].
    pub fn random_level(&self, rng: &mut ChaCha8Rng) -> u32 {
        let r: f64 = 1.0 - rng.gen::<f64>();
        let level = (-r.ln() * self.config.level_lambda).floor() as usize;
        level.min(config::MAX_LAYERS - 1) as u32
    }

    /// Distance from coerced query bytes to a stored vector.
    #[inline]
    pub fn distance_to(&self, query: &[u8], id: u32) -> f32 {
        self.metric.distance(query, self.vectors.get(id))
    }

    /// Distance between two stored vectors.
    #[inline]
    pub fn distance_between(&self, a: u32, b: u32) -> f32 {
        self.metric.distance(self.vectors.get(a), self.vectors.get(b))
    }

    /// Grows node and vector storage to hold `n` elements. A no-op when
    /// `n <= capacity`. Requires exclusive access.
    pub fn reserve(&mut self, n: usize) -> Result<()> {
        if self.is_mapped() {
            return Err(IndexError::Immutable);
        }
        if n <= self.capacity {
            return Ok(());
        }
        self.nodes.grow(n);
        self.vectors.grow(n);
        self.capacity = n;
        Ok(())
    }

    /// Drops every element while preserving capacity. A mapped graph is
    /// rebuilt as an empty owned one of the same capacity.
    pub fn clear(&mut self) {
        if self.is_mapped() {
            self.nodes = NodeStore::with_capacity(self.capacity);
            self.vectors = VectorStore::with_capacity(self.metric.dims_bytes(), self.capacity);
        }
        self.size.store(0, Ordering::Release);
        self.entry.store(pack_entry(NO_ENTRY, 0), Ordering::Release);
    }

    /// Checks structural invariants: entry consistency, per-layer degree
    /// caps, id bounds, layer monotonicity, and the absence of self-loops
    /// and duplicate links. Requires a quiescent graph.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let size = self.len();
        if size > self.capacity {
            return Err(format!("size {size} exceeds capacity {}", self.capacity));
        }
        let snapshot = self.entry_snapshot();
        match snapshot {
            None => {
                if size > 0 {
                    return Err(format!("no entry point with {size} nodes"));
                }
            }
            Some((entry, max_level)) => {
                if size == 0 {
                    return Err("entry point set on an empty graph".into());
                }
                if entry as usize >= size {
                    return Err(format!("entry point {entry} out of bounds"));
                }
                if self.nodes.top_layer(entry) != max_level {
                    return Err(format!(
                        "entry point {entry} has top layer {} but max level is {max_level}",
                        self.nodes.top_layer(entry)
                    ));
                }
            }
        }
        for id in 0..size as u32 {
            let node = self.nodes.clone_node(id);
            if node.top_layer as usize >= config::MAX_LAYERS {
                return Err(format!("node {id} exceeds the layer ceiling"));
            }
            if let Some((_, max_level)) = snapshot {
                if node.top_layer > max_level {
                    return Err(format!("node {id} is above the max level"));
                }
            }
            if node.neighbors.len() != node.top_layer as usize + 1 {
                return Err(format!(
                    "node {id} has {} layer lists for top layer {}",
                    node.neighbors.len(),
                    node.top_layer
                ));
            }
            for (layer, list) in node.neighbors.iter().enumerate() {
                if list.len() > self.config.max_degree(layer) {
                    return Err(format!(
                        "node {id} layer {layer} holds {} links, cap is {}",
                        list.len(),
                        self.config.max_degree(layer)
                    ));
                }
                for (i, &m) in list.iter().enumerate() {
                    if m == id {
                        return Err(format!("node {id} links to itself at layer {layer}"));
                    }
                    if m as usize >= size {
                        return Err(format!("node {id} links to unborn node {m}"));
                    }
                    if list[..i].contains(&m) {
                        return Err(format!("node {id} repeats link {m} at layer {layer}"));
                    }
                    if (self.nodes.top_layer(m) as usize) < layer {
                        return Err(format!(
                            "node {id} links to {m} at layer {layer} above its top layer"
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
