//! Hierarchical navigable small-world proximity graph.
//!
//! Layer 0 holds every node; higher layers are exponentially sparser and
//! act as an express lane for the greedy descent that starts each query.
//! Insertion and search run concurrently: neighbor lists are guarded by
//! per-node locks that readers hold only long enough to copy a list into
//! worker-local scratch, node slots never move, and the entry point is a
//! single packed atomic word.

/// Distance metrics: ip, cos, l2sq, hamming, jaccard, and user callbacks.
pub mod distance;
/// Graph configuration and shared concurrent state.
pub mod graph;
/// Concurrent insertion with diversified neighbor selection.
pub mod insert;
/// Fixed-capacity node slab, owned or file-mapped.
pub mod node;
/// Greedy descent and bounded best-first search.
pub mod search;
/// Cache-line-strided vector arena, owned or file-mapped.
pub mod vector;
/// Generation-stamped visited set and per-worker scratch.
pub mod visited;

pub use distance::{CustomMetric, Metric, MetricKind};
pub use graph::{GraphConfig, ProximityGraph};
pub use search::knn_search;
pub use visited::{SearchScratch, VisitedSet};

#[cfg(test)]
mod tests {
    //! Cross-component tests of the graph layer: randomized structural
    //! sweeps and the concurrent build scenario.

    use super::insert::insert;
    use super::*;
    use crate::scalar::{AlignedBuf, ScalarKind, VectorData};

    fn coerce(v: &[f32], buf: &mut AlignedBuf) {
        VectorData::F32(v)
            .coerce_into(ScalarKind::F32, v.len(), buf)
            .expect("test vectors are well-formed");
    }

    fn pseudo_vector(i: usize, dims: usize) -> Vec<f32> {
        (0..dims)
            .map(|d| ((i * 2654435761 + d * 40503) % 65536) as f32 / 65536.0)
            .collect()
    }

    fn build_random(n: usize, dims: usize, config: GraphConfig) -> ProximityGraph {
        let metric = Metric::builtin(MetricKind::L2sq, ScalarKind::F32, dims)
            .expect("l2sq over f32 is valid");
        let mut graph = ProximityGraph::new(metric, config);
        graph.reserve(n).expect("owned graph reserves");
        let mut scratch = SearchScratch::new(0, graph.config().seed, n, graph.config().connectivity_base);
        let mut buf = AlignedBuf::default();
        for i in 0..n {
            coerce(&pseudo_vector(i, dims), &mut buf);
            insert(&graph, i as i64, buf.as_bytes(), &mut scratch).expect("capacity reserved");
        }
        graph
    }

    /// Every directed edge is either reciprocated or carries an eviction
    /// witness: the reverse list is at capacity, or some kept link
    /// dominates the source the way the pruning rule requires. A tiny
    /// tolerance absorbs eviction chains where the dominating link was
    /// itself pruned later.
    fn check_reciprocity(graph: &ProximityGraph) {
        let mut edges = 0usize;
        let mut violations = 0usize;
        for id in 0..graph.len() as u32 {
            let node = graph.nodes().clone_node(id);
            for (layer, list) in node.neighbors.iter().enumerate() {
                for &m in list {
                    edges += 1;
                    let other = graph.nodes().clone_node(m);
                    let back = &other.neighbors[layer];
                    if back.contains(&id) {
                        continue;
                    }
                    let cap = graph.config().max_degree(layer);
                    let d_to_m = graph.distance_between(id, m);
                    let dominated = back
                        .iter()
                        .any(|&kept| graph.distance_between(id, kept) <= d_to_m);
                    if back.len() < cap && !dominated {
                        violations += 1;
                    }
                }
            }
        }
        assert!(
            violations * 100 <= edges,
            "{violations} of {edges} edges lack reciprocity or an eviction witness"
        );
    }

    #[test]
    fn test_random_build_upholds_invariants() {
        let graph = build_random(500, 8, GraphConfig::default());
        assert_eq!(graph.len(), 500);
        graph.validate().expect("structural invariants");
        check_reciprocity(&graph);
    }

    #[test]
    fn test_random_build_low_connectivity() {
        let graph = build_random(300, 4, GraphConfig::new(4, 48, 24, 9));
        graph.validate().expect("structural invariants");
        check_reciprocity(&graph);
    }

    #[test]
    fn test_single_threaded_build_is_reproducible() {
        let a = build_random(200, 8, GraphConfig::default());
        let b = build_random(200, 8, GraphConfig::default());
        assert_eq!(a.entry_snapshot(), b.entry_snapshot());
        for id in 0..200u32 {
            let (na, nb) = (a.nodes().clone_node(id), b.nodes().clone_node(id));
            assert_eq!(na.top_layer, nb.top_layer);
            assert_eq!(na.neighbors, nb.neighbors);
        }
    }

    #[test]
    fn test_concurrent_adds_and_searches() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 2500;
        let dims = 8;
        let metric = Metric::builtin(MetricKind::L2sq, ScalarKind::F32, dims)
            .expect("l2sq over f32 is valid");
        let mut graph = ProximityGraph::new(metric, GraphConfig::new(8, 32, 16, 7));
        graph.reserve(THREADS * PER_THREAD).expect("owned graph reserves");
        let graph = &graph;

        std::thread::scope(|scope| {
            for t in 0..THREADS {
                scope.spawn(move || {
                    let mut scratch = SearchScratch::new(
                        t,
                        graph.config().seed,
                        graph.capacity(),
                        graph.config().connectivity_base,
                    );
                    let mut buf = AlignedBuf::default();
                    for i in 0..PER_THREAD {
                        let label = (t * PER_THREAD + i) as i64;
                        coerce(&pseudo_vector(label as usize, dims), &mut buf);
                        insert(graph, label, buf.as_bytes(), &mut scratch)
                            .expect("capacity reserved");
                    }
                });
            }
            for t in 0..THREADS {
                scope.spawn(move || {
                    let mut scratch = SearchScratch::new(
                        THREADS + t,
                        graph.config().seed,
                        graph.capacity(),
                        graph.config().connectivity_base,
                    );
                    let mut buf = AlignedBuf::default();
                    for i in 0..PER_THREAD {
                        coerce(&pseudo_vector(i * 7 + t, dims), &mut buf);
                        let hits = knn_search(graph, buf.as_bytes(), 5, &mut scratch);
                        // Hits against a moving index are unordered across
                        // time but each result batch must be sorted.
                        for pair in hits.windows(2) {
                            assert!(pair[0].1 <= pair[1].1);
                        }
                    }
                });
            }
        });

        assert_eq!(graph.len(), THREADS * PER_THREAD);
        graph.validate().expect("invariants hold after concurrent build");
        check_reciprocity(graph);
    }
}
