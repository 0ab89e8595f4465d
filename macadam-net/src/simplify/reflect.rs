//! Reverse-edge reflection
//!
//! OSM draws most two-way streets once. Routing needs both directions, so
//! every edge whose opposite (target, source) pair is absent gets a mirror
//! with reversed geometry. Membership is checked against the edge set as it
//! stood before the pass, so two parallel one-way edges both gain a mirror
//! rather than the second one seeing the first one's reflection.

use petgraph::visit::EdgeRef;
use rustc_hash::FxHashSet;

use crate::graph::RoadGraph;

/// Add the missing (v, u) edge for every (u, v) edge. Returns how many
/// edges were added.
pub fn add_missing_reflected_edges(g: &mut RoadGraph) -> usize {
    let existing: FxHashSet<(u64, u64)> = g
        .graph
        .edge_references()
        .map(|e| (g.graph[e.source()].id, g.graph[e.target()].id))
        .collect();

    let additions: Vec<_> = g
        .graph
        .edge_references()
        .filter(|e| {
            let pair = (g.graph[e.target()].id, g.graph[e.source()].id);
            !existing.contains(&pair)
        })
        .map(|e| {
            let mut mirror = e.weight().clone();
            mirror.geom = mirror.geom.reversed();
            (e.target(), e.source(), mirror)
        })
        .collect();

    let added = additions.len();
    for (u, v, edge) in additions {
        g.graph.add_edge(u, v, edge);
    }
    added
}
