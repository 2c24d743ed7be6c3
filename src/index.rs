//! The public index façade.
//!
//! [`Index`] binds the graph, the worker-keyed scratch pool, and the
//! persistence layer into the public operations: `reserve`, `add`,
//! `search`, `save`, `load`, `view`, and `clear`. A façade-level lock
//! gates traffic: adds and searches share it, exclusive operations take it
//! alone and fail fast with [`IndexError::Locked`] instead of blocking.

use std::path::Path;

use parking_lot::{Mutex, MutexGuard, RwLock};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::{IndexError, Result};
use crate::hnsw::distance::{CustomMetric, Metric, MetricKind};
use crate::hnsw::graph::{GraphConfig, ProximityGraph};
use crate::hnsw::insert::insert;
use crate::hnsw::search::knn_search;
use crate::hnsw::visited::SearchScratch;
use crate::scalar::{validate_sorted_set, ScalarKind, VectorData};
use crate::storage;

/// Construction-time settings. Only `dimensions` is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    /// Vector length. Required, in elements of `element_type`.
    pub dimensions: usize,
    /// Node slots reserved up front. More can be reserved later.
    pub capacity: usize,
    /// Stored element type.
    pub element_type: ScalarKind,
    /// Distance metric.
    pub metric: MetricKind,
    /// Target out-degree per node at layers above 0 (`M`).
    pub connectivity: usize,
    /// Candidate beam width during insertion (`ef_construction`).
    pub expansion_add: usize,
    /// Candidate beam width during search (`ef_search`).
    pub expansion_search: usize,
    /// Scratch slots for concurrent callers; 0 means hardware concurrency.
    pub workers: usize,
    /// Seed for the per-worker layer RNGs.
    pub seed: u64,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            dimensions: 0,
            capacity: 0,
            element_type: ScalarKind::F32,
            metric: MetricKind::Ip,
            connectivity: config::DEFAULT_CONNECTIVITY,
            expansion_add: config::DEFAULT_EXPANSION_ADD,
            expansion_search: config::DEFAULT_EXPANSION_SEARCH,
            workers: 0,
            seed: config::DEFAULT_SEED,
        }
    }
}

impl IndexOptions {
    /// Options for a `dimensions`-element index with every default.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            ..Self::default()
        }
    }
}

/// One search result: the caller's label and the distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub label: i64,
    pub distance: f32,
}

#[derive(Debug)]
struct State {
    graph: ProximityGraph,
    scratches: Vec<Mutex<SearchScratch>>,
}

impl State {
    fn scratch(&self, worker_id: usize) -> Result<MutexGuard<'_, SearchScratch>> {
        let slot = self.scratches.get(worker_id).ok_or_else(|| {
            IndexError::InvalidArgument(format!(
                "worker id {worker_id} out of range ({} workers)",
                self.scratches.len()
            ))
        })?;
        let mut guard = slot.lock();
        guard.visited.ensure_capacity(self.graph.capacity());
        Ok(guard)
    }

    fn coerce(&self, vector: VectorData<'_>, scratch: &mut SearchScratch) -> Result<()> {
        let metric = self.graph.metric();
        if metric.kind() == Some(MetricKind::Jaccard) {
            if let VectorData::U32(set) = vector {
                validate_sorted_set(set)?;
            }
        }
        vector.coerce_into(metric.scalar(), metric.dims(), &mut scratch.query)
    }

    fn search_with(&self, query: VectorData<'_>, k: usize, worker_id: usize) -> Result<Vec<Match>> {
        let mut scratch = self.scratch(worker_id)?;
        self.coerce(query, &mut scratch)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let bytes = std::mem::take(&mut scratch.query);
        let hits = knn_search(&self.graph, bytes.as_bytes(), k, &mut scratch);
        scratch.query = bytes;
        Ok(hits
            .into_iter()
            .map(|(label, distance)| Match { label, distance })
            .collect())
    }
}

/// A single-file, in-memory approximate nearest-neighbor index.
///
/// Adds and searches run concurrently from any number of threads as long
/// as each in-flight call passes a distinct `worker_id` below the
/// configured worker count. The exclusive operations (`reserve`, `save`,
/// `load`, `view`, `clear`) must be serialized by the caller and return
/// [`IndexError::Locked`] when traffic is in flight.
#[derive(Debug)]
pub struct Index {
    state: RwLock<State>,
}

impl Index {
    /// Creates an index with a built-in metric.
    pub fn new(options: IndexOptions) -> Result<Self> {
        let metric = Metric::builtin(options.metric, options.element_type, options.dimensions)?;
        Self::with_metric(options, metric)
    }

    /// Creates an index with a user-supplied distance callback. Files
    /// saved from it carry metric id 0 and only reopen through this
    /// constructor.
    pub fn with_custom_metric(options: IndexOptions, f: CustomMetric) -> Result<Self> {
        let metric = Metric::custom(f, options.element_type, options.dimensions);
        Self::with_metric(options, metric)
    }

    fn with_metric(options: IndexOptions, metric: Metric) -> Result<Self> {
        if options.dimensions == 0 {
            return Err(IndexError::InvalidArgument(
                "dimensions must be non-zero".into(),
            ));
        }
        if options.dimensions > config::MAX_DIMENSION {
            return Err(IndexError::InvalidArgument(format!(
                "dimensions {} exceed the supported maximum {}",
                options.dimensions,
                config::MAX_DIMENSION
            )));
        }
        if options.connectivity < 2 {
            return Err(IndexError::InvalidArgument(
                "connectivity must be at least 2".into(),
            ));
        }
        if options.expansion_add == 0 || options.expansion_search == 0 {
            return Err(IndexError::InvalidArgument(
                "expansion factors must be non-zero".into(),
            ));
        }

        let workers = if options.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            options.workers
        };
        let graph_config = GraphConfig::new(
            options.connectivity,
            options.expansion_add,
            options.expansion_search,
            options.seed,
        );
        let mut graph = ProximityGraph::new(metric, graph_config);
        if options.capacity > 0 {
            graph.reserve(options.capacity)?;
        }
        let scratches = (0..workers)
            .map(|worker| {
                Mutex::new(SearchScratch::new(
                    worker,
                    options.seed,
                    graph.capacity(),
                    graph.config().connectivity_base,
                ))
            })
            .collect();
        tracing::debug!(
            "created index: {} dims, metric {}, {workers} workers",
            options.dimensions,
            graph.metric().kind().map_or("custom", MetricKind::name),
        );
        Ok(Self {
            state: RwLock::new(State { graph, scratches }),
        })
    }

    /// Grows storage to hold `n` vectors. Idempotent when `n` is within
    /// the current capacity.
    pub fn reserve(&self, n: usize) -> Result<()> {
        let mut state = self.state.try_write().ok_or(IndexError::Locked)?;
        state.graph.reserve(n)
    }

    /// Inserts a vector under `label` and returns its internal id.
    ///
    /// Labels are opaque and may repeat. Fails with `OutOfCapacity` when
    /// the index is full; a failed add consumes nothing.
    pub fn add(&self, label: i64, vector: VectorData<'_>, worker_id: usize) -> Result<u32> {
        let state = self.state.try_read().ok_or(IndexError::Locked)?;
        if state.graph.is_mapped() {
            return Err(IndexError::Immutable);
        }
        let mut scratch = state.scratch(worker_id)?;
        state.coerce(vector, &mut scratch)?;
        let bytes = std::mem::take(&mut scratch.query);
        let result = insert(&state.graph, label, bytes.as_bytes(), &mut scratch);
        scratch.query = bytes;
        result
    }

    /// Finds up to `k` nearest neighbors, sorted ascending by distance
    /// (ties toward earlier insertion). An empty index yields no results.
    pub fn search(&self, query: VectorData<'_>, k: usize, worker_id: usize) -> Result<Vec<Match>> {
        let state = self.state.try_read().ok_or(IndexError::Locked)?;
        state.search_with(query, k, worker_id)
    }

    /// Runs one search per query across the worker pool.
    pub fn search_batch(&self, queries: &[VectorData<'_>], k: usize) -> Result<Vec<Vec<Match>>> {
        let state = self.state.try_read().ok_or(IndexError::Locked)?;
        let pool = rayon::current_num_threads();
        if pool > state.scratches.len() {
            return Err(IndexError::InvalidArgument(format!(
                "rayon pool runs {pool} threads but the index has {} workers",
                state.scratches.len()
            )));
        }
        queries
            .par_iter()
            .map(|q| state.search_with(*q, k, rayon::current_thread_index().unwrap_or(0)))
            .collect()
    }

    /// Writes the index to a single file, atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let state = self.state.try_write().ok_or(IndexError::Locked)?;
        storage::save(&state.graph, path.as_ref())
    }

    /// Replaces the contents with a fully loaded copy of the file. The
    /// file must match this index's dimension, element type, and metric.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut state = self.state.try_write().ok_or(IndexError::Locked)?;
        let metric = *state.graph.metric();
        let seed = state.graph.config().seed;
        state.graph = storage::load(path.as_ref(), metric, seed)?;
        Ok(())
    }

    /// Serves the file through a read-only memory mapping. Mutating
    /// operations fail with [`IndexError::Immutable`] until `clear`.
    pub fn view(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut state = self.state.try_write().ok_or(IndexError::Locked)?;
        let metric = *state.graph.metric();
        let seed = state.graph.config().seed;
        state.graph = storage::view(path.as_ref(), metric, seed)?;
        Ok(())
    }

    /// Drops every element, keeping the reserved capacity. Also releases
    /// a file mapping, returning the index to owned mode.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.try_write().ok_or(IndexError::Locked)?;
        state.graph.clear();
        tracing::debug!("cleared index");
        Ok(())
    }

    /// Number of inserted vectors.
    pub fn size(&self) -> usize {
        self.state.read().graph.len()
    }

    /// Same as [`size`](Self::size), under the conventional name.
    pub fn len(&self) -> usize {
        self.size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Reserved node slots.
    pub fn capacity(&self) -> usize {
        self.state.read().graph.capacity()
    }

    /// Vector length in elements.
    pub fn dimensions(&self) -> usize {
        self.state.read().graph.metric().dims()
    }

    /// The connectivity parameter `M`.
    pub fn connectivity(&self) -> usize {
        self.state.read().graph.config().connectivity
    }

    /// Current highest layer across all nodes.
    pub fn max_level(&self) -> u32 {
        self.state.read().graph.max_level()
    }

    /// True when serving a read-only file mapping.
    pub fn is_viewed(&self) -> bool {
        self.state.read().graph.is_mapped()
    }

    /// Checks structural graph invariants. Intended for tests and
    /// post-load diagnostics; requires a quiescent index.
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.state.read().graph.validate()
    }
}
