//! Per-worker scratch state: visited set, search heaps, and buffers.
//!
//! Scratch is keyed by a caller-supplied worker id rather than a true
//! thread-local, so the engine stays agnostic to the thread pool driving
//! it. One [`SearchScratch`] serves one in-flight operation at a time.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::hash::hash64;
use crate::hnsw::search::Candidate;
use crate::scalar::AlignedBuf;

/// Generation-stamped visited set. Replaces `HashSet<u32>` with O(1) array
/// indexing; `clear()` bumps a generation counter instead of zeroing, so a
/// full memset happens only when the u32 stamp wraps.
#[derive(Debug)]
pub struct VisitedSet {
    stamps: Vec<u32>,
    generation: u32,
}

impl VisitedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            stamps: vec![0; capacity],
            generation: 1,
        }
    }

    /// Reset the set. O(1) amortized; a full memset only on stamp wrap.
    pub fn clear(&mut self) {
        if self.generation == u32::MAX {
            self.stamps.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    /// Grows the backing array to cover at least `cap` ids.
    pub fn ensure_capacity(&mut self, cap: usize) {
        if cap > self.stamps.len() {
            self.stamps.resize(cap, 0);
        }
    }

    /// Marks `id` as visited. Returns `true` if it was not visited before.
    #[inline]
    pub fn insert(&mut self, id: u32) -> bool {
        let slot = &mut self.stamps[id as usize];
        if *slot == self.generation {
            false
        } else {
            *slot = self.generation;
            true
        }
    }

    #[cfg(test)]
    fn force_generation(&mut self, generation: u32) {
        self.generation = generation;
    }
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Reusable per-worker state for one traversal: visited set, candidate
/// min-heap, result max-heap, a neighbor copy buffer, the coerced query
/// bytes, and the layer-draw RNG.
#[derive(Debug)]
pub struct SearchScratch {
    pub visited: VisitedSet,
    pub candidates: BinaryHeap<Reverse<Candidate>>,
    pub results: BinaryHeap<Candidate>,
    pub neighbors: Vec<u32>,
    pub query: AlignedBuf,
    pub rng: ChaCha8Rng,
}

impl SearchScratch {
    /// Creates scratch for one worker. The RNG is seeded from the
    /// construction seed mixed with the worker id, so layer draws are
    /// reproducible per worker for a fixed seed.
    pub fn new(worker_id: usize, seed: u64, capacity: usize, max_degree_base: usize) -> Self {
        Self {
            visited: VisitedSet::new(capacity),
            candidates: BinaryHeap::new(),
            results: BinaryHeap::new(),
            neighbors: Vec::with_capacity(max_degree_base + 1),
            query: AlignedBuf::default(),
            rng: ChaCha8Rng::seed_from_u64(seed ^ hash64(worker_id as u64 + 1)),
        }
    }
}
