//! Concurrent insertion with diversified neighbor selection.
//!
//! An insertion reserves an id, writes the vector and an empty node, then
//! stitches links layer by layer. Neighbor lists are only ever mutated
//! under their node's write lock, one node at a time, so concurrent
//! inserters interleave safely and searches keep running against the lists
//! they copy out.

use ordered_float::OrderedFloat;

use crate::error::Result;
use crate::hnsw::graph::ProximityGraph;
use crate::hnsw::search::{greedy_search, search_layer, Candidate};
use crate::hnsw::visited::SearchScratch;

/// Inserts one vector (already coerced to stored bytes) under `label`.
/// Returns the assigned internal id.
pub fn insert(
    graph: &ProximityGraph,
    label: i64,
    vector: &[u8],
    scratch: &mut SearchScratch,
) -> Result<u32> {
    // Layer draw and capacity check precede the slot reservation, so a
    // failed add consumes no id.
    let top_layer = graph.random_level(&mut scratch.rng);
    let id = graph.try_reserve_slot()?;

    graph.vectors().write(id, vector);
    graph.nodes().init(id, label, top_layer);

    if graph.entry_snapshot().is_none() {
        let guard = graph.entry_guard().lock();
        if graph.entry_snapshot().is_none() {
            graph.publish_entry(id, top_layer);
            return Ok(id);
        }
        drop(guard);
    }

    let (entry, max_level) = graph
        .entry_snapshot()
        .expect("entry point exists after the first-insert path");

    let mut cur = entry;

    // Cross the layers above the node's own top layer greedily.
    for layer in (top_layer as usize + 1..=max_level as usize).rev() {
        cur = greedy_search(graph, vector, cur, layer, scratch);
    }

    let ef = graph.config().expansion_add;
    for layer in (0..=top_layer.min(max_level) as usize).rev() {
        let found = search_layer(graph, vector, cur, ef, layer, scratch);
        let cap = graph.config().max_degree(layer);
        let selected = select_diverse(graph, &found, cap);

        {
            // Merge rather than overwrite: concurrent inserters may have
            // back-linked into this layer between init and now.
            let mut node = graph.nodes().write_guard(id);
            let list = &mut node.neighbors[layer];
            for &chosen in &selected {
                if !list.contains(&chosen) {
                    list.push(chosen);
                }
            }
            if list.len() > cap {
                let members = std::mem::take(list);
                node.neighbors[layer] = prune_overflow(graph, id, members, cap);
            }
        }

        for &neighbor in &selected {
            let mut other = graph.nodes().write_guard(neighbor);
            let list = &mut other.neighbors[layer];
            // A concurrent insert of `neighbor` may already have merged
            // this id in from its own candidate set.
            if !list.contains(&id) {
                list.push(id);
            }
            if list.len() > cap {
                let members = std::mem::take(list);
                other.neighbors[layer] = prune_overflow(graph, neighbor, members, cap);
            }
        }

        // The best match of this layer seeds the next one down.
        if let Some(best) = found.first() {
            cur = best.id;
        }
    }

    // Rare promotion: this node outgrew the hierarchy.
    if top_layer > max_level {
        let _guard = graph.entry_guard().lock();
        if let Some((_, current_level)) = graph.entry_snapshot() {
            if top_layer > current_level {
                graph.publish_entry(id, top_layer);
            }
        }
    }

    Ok(id)
}

/// Re-ranks an overflowing neighbor list against its owning node and
/// shrinks it back under the degree cap.
fn prune_overflow(graph: &ProximityGraph, base: u32, members: Vec<u32>, cap: usize) -> Vec<u32> {
    let mut candidates: Vec<Candidate> = members
        .into_iter()
        .map(|m| Candidate {
            distance: OrderedFloat(graph.distance_between(base, m)),
            id: m,
        })
        .collect();
    candidates.sort_unstable();
    select_diverse(graph, &candidates, cap)
}

/// Diversified neighbor selection.
///
/// Scans candidates in ascending distance order and keeps one only when
/// the base is strictly closer to it than every already-kept neighbor.
/// Dominated candidates are discarded outright; selection stops once `cap`
/// survivors are kept. This avoids tight clusters of mutually redundant
/// links.
fn select_diverse(graph: &ProximityGraph, candidates: &[Candidate], cap: usize) -> Vec<u32> {
    let mut kept: Vec<Candidate> = Vec::with_capacity(cap.min(candidates.len()));
    for &candidate in candidates {
        if kept.len() >= cap {
            break;
        }
        let bytes = graph.vectors().get(candidate.id);
        let diverse = kept.iter().all(|held| {
            candidate.distance.0 < graph.metric().distance(bytes, graph.vectors().get(held.id))
        });
        if diverse {
            kept.push(candidate);
        }
    }
    kept.into_iter().map(|c| c.id).collect()
}
