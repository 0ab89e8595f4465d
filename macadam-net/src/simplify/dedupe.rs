//! Duplicate parallel edge removal
//!
//! After reflection and collapse, dual carriageways and sloppy digitizing
//! leave several edges between the same directed node pair. Within each
//! group the shortest edge survives; any other edge no longer than
//! `max_ratio` times the shortest is considered the same road drawn twice
//! and dropped. Edges beyond the ratio are genuinely different routes and
//! stay.

use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;

use crate::graph::RoadGraph;

/// Drop near-duplicate parallel edges. Returns how many were removed.
pub fn remove_duplicate_edges(g: &mut RoadGraph, max_ratio: f64) -> usize {
    let mut groups: FxHashMap<(NodeIndex, NodeIndex), Vec<EdgeIndex>> = FxHashMap::default();
    for e in g.graph.edge_references() {
        groups.entry((e.source(), e.target())).or_default().push(e.id());
    }

    let mut doomed: Vec<EdgeIndex> = Vec::new();
    for edges in groups.into_values() {
        if edges.len() < 2 {
            continue;
        }
        let mut shortest = edges[0];
        for &e in &edges[1..] {
            if g.graph[e].length_m < g.graph[shortest].length_m {
                shortest = e;
            }
        }
        let min_len = g.graph[shortest].length_m;
        for &e in &edges {
            if e != shortest && g.graph[e].length_m <= max_ratio * min_len {
                doomed.push(e);
            }
        }
    }

    let removed = doomed.len();
    for e in doomed {
        g.graph.remove_edge(e);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geomath::line_length_m;
    use crate::graph::{EdgeGeometry, EdgeKind, RoadEdge};
    use geo::{Coord, LineString};

    fn edge(pts: &[(f64, f64)]) -> RoadEdge {
        let line = LineString::from(pts.to_vec());
        RoadEdge {
            osm_ids: vec![1],
            infra_type: "primary".to_string(),
            length_m: line_length_m(&line),
            time_s: None,
            mode: None,
            kind: EdgeKind::Legitimate,
            geom: EdgeGeometry::Line(line),
        }
    }

    #[test]
    fn test_similar_parallel_removed_shortest_kept() {
        let mut g = RoadGraph::new();
        let a = g.add_node_at(Coord { x: 0.0, y: 0.0 });
        let b = g.add_node_at(Coord { x: 0.01, y: 0.0 });
        g.graph.add_edge(a, b, edge(&[(0.0, 0.0), (0.01, 0.0)]));
        g.graph
            .add_edge(a, b, edge(&[(0.0, 0.0), (0.005, 0.001), (0.01, 0.0)]));

        assert_eq!(remove_duplicate_edges(&mut g, 1.5), 1);
        assert_eq!(g.edge_count(), 1);
        let kept = g.graph.edge_weights().next().unwrap();
        assert!(matches!(&kept.geom, EdgeGeometry::Line(l) if l.0.len() == 2));
    }

    #[test]
    fn test_long_alternative_kept() {
        let mut g = RoadGraph::new();
        let a = g.add_node_at(Coord { x: 0.0, y: 0.0 });
        let b = g.add_node_at(Coord { x: 0.01, y: 0.0 });
        g.graph.add_edge(a, b, edge(&[(0.0, 0.0), (0.01, 0.0)]));
        // A detour twice as long as the direct road.
        g.graph
            .add_edge(a, b, edge(&[(0.0, 0.0), (0.005, 0.0085), (0.01, 0.0)]));

        assert_eq!(remove_duplicate_edges(&mut g, 1.5), 0);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn test_opposite_directions_are_separate_groups() {
        let mut g = RoadGraph::new();
        let a = g.add_node_at(Coord { x: 0.0, y: 0.0 });
        let b = g.add_node_at(Coord { x: 0.01, y: 0.0 });
        g.graph.add_edge(a, b, edge(&[(0.0, 0.0), (0.01, 0.0)]));
        g.graph.add_edge(b, a, edge(&[(0.01, 0.0), (0.0, 0.0)]));

        assert_eq!(remove_duplicate_edges(&mut g, 1.5), 0);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn test_mixed_group() {
        let mut g = RoadGraph::new();
        let a = g.add_node_at(Coord { x: 0.0, y: 0.0 });
        let b = g.add_node_at(Coord { x: 0.01, y: 0.0 });
        g.graph.add_edge(a, b, edge(&[(0.0, 0.0), (0.01, 0.0)]));
        g.graph
            .add_edge(a, b, edge(&[(0.0, 0.0), (0.005, 0.002), (0.01, 0.0)]));
        g.graph
            .add_edge(a, b, edge(&[(0.0, 0.0), (0.005, 0.0085), (0.01, 0.0)]));

        assert_eq!(remove_duplicate_edges(&mut g, 1.5), 1);
        assert_eq!(g.edge_count(), 2);
    }
}
