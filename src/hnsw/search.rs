//! Graph traversal: greedy descent and bounded best-first expansion.
//!
//! Upper layers are crossed with a plain greedy walk; layer 0 (and every
//! layer during insertion) runs the two-heap beam search with a visited
//! set. Distance ties order by lower internal id throughout, which keeps
//! results stable and reproducible.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;

use crate::hnsw::graph::ProximityGraph;
use crate::hnsw::visited::SearchScratch;

/// One traversal entry: distance first, id second, so the derived order
/// breaks distance ties toward the lower internal id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Candidate {
    pub distance: OrderedFloat<f32>,
    pub id: u32,
}

impl Candidate {
    #[inline]
    pub(crate) fn new(distance: f32, id: u32) -> Self {
        Self {
            distance: OrderedFloat(distance),
            id,
        }
    }
}

/// Greedy walk at one layer: hop to the closest neighbor until none is
/// strictly closer. Returns the final node.
pub(crate) fn greedy_search(
    graph: &ProximityGraph,
    query: &[u8],
    entry: u32,
    layer: usize,
    scratch: &mut SearchScratch,
) -> u32 {
    let mut cur = entry;
    let mut cur_dist = graph.distance_to(query, cur);
    loop {
        let mut improved = false;
        graph
            .nodes()
            .copy_neighbors(cur, layer, &mut scratch.neighbors);
        for i in 0..scratch.neighbors.len() {
            let n = scratch.neighbors[i];
            let d = graph.distance_to(query, n);
            if d < cur_dist {
                cur = n;
                cur_dist = d;
                improved = true;
            }
        }
        if !improved {
            return cur;
        }
    }
}

/// Bounded best-first search at one layer.
///
/// Expands the candidate min-heap while trimming the result max-heap to
/// `ef` entries; stops once the nearest open candidate is farther than the
/// worst kept result. Returns up to `ef` results sorted ascending.
pub(crate) fn search_layer(
    graph: &ProximityGraph,
    query: &[u8],
    entry: u32,
    ef: usize,
    layer: usize,
    scratch: &mut SearchScratch,
) -> Vec<Candidate> {
    scratch.visited.clear();
    scratch.candidates.clear();
    scratch.results.clear();

    let seed = Candidate::new(graph.distance_to(query, entry), entry);
    scratch.visited.insert(entry);
    scratch.candidates.push(Reverse(seed));
    scratch.results.push(seed);
    let mut worst = seed.distance.0;

    while let Some(Reverse(closest)) = scratch.candidates.pop() {
        if scratch.results.len() >= ef && closest.distance.0 > worst {
            break;
        }
        graph
            .nodes()
            .copy_neighbors(closest.id, layer, &mut scratch.neighbors);
        for i in 0..scratch.neighbors.len() {
            let n = scratch.neighbors[i];
            if !scratch.visited.insert(n) {
                continue;
            }
            let d = graph.distance_to(query, n);
            if scratch.results.len() < ef || d < worst {
                let c = Candidate::new(d, n);
                scratch.candidates.push(Reverse(c));
                scratch.results.push(c);
                if scratch.results.len() > ef {
                    scratch.results.pop();
                }
                worst = scratch
                    .results
                    .peek()
                    .map_or(f32::MAX, |c| c.distance.0);
            }
        }
    }

    let mut found: Vec<Candidate> = scratch.results.drain().collect();
    found.sort_unstable();
    found
}

/// Multi-layer nearest-neighbor query.
///
/// Descends greedily from the entry point to layer 1, then beam-searches
/// layer 0 with `ef = max(ef_search, k)`. Returns up to `k` label/distance
/// pairs sorted ascending by distance, ties by insertion order.
pub fn knn_search(
    graph: &ProximityGraph,
    query: &[u8],
    k: usize,
    scratch: &mut SearchScratch,
) -> Vec<(i64, f32)> {
    let Some((entry, max_level)) = graph.entry_snapshot() else {
        return Vec::new();
    };

    let mut cur = entry;
    for layer in (1..=max_level as usize).rev() {
        cur = greedy_search(graph, query, cur, layer, scratch);
    }

    let ef = graph.config().expansion_search.max(k);
    let found = search_layer(graph, query, cur, ef, 0, scratch);
    found
        .into_iter()
        .take(k)
        .map(|c| (graph.nodes().label(c.id), c.distance.0))
        .collect()
}
