//! Long-edge salting
//!
//! Accessibility measures degrade when an edge is much longer than the
//! analysis resolution: a settlement halfway along a 20 km road would snap
//! to one of its far ends. Salting splits every edge longer than the
//! threshold into equal sub-edges joined by new nodes placed on the
//! original geometry. Attributes carry over; lengths are remeasured per
//! piece and times split proportionally.

use geo::LineString;
use petgraph::stable_graph::{EdgeIndex, NodeIndex};

use crate::geomath::{cut_line, line_length_m};
use crate::graph::{EdgeGeometry, RoadEdge, RoadGraph};

#[derive(Debug, Default, Clone, Copy)]
pub struct SaltStats {
    pub edges_split: usize,
    pub nodes_added: usize,
    pub edges_added: usize,
    /// Multi-part geometry cannot be cut; such edges are left whole.
    pub multi_part_skipped: usize,
}

/// Split every edge longer than `thresh_m` into equal pieces.
pub fn salt_long_lines(g: &mut RoadGraph, thresh_m: f64) -> SaltStats {
    let mut stats = SaltStats::default();

    let long_edges: Vec<EdgeIndex> = g
        .graph
        .edge_indices()
        .filter(|&e| g.graph[e].length_m > thresh_m)
        .collect();

    for eix in long_edges {
        let Some((u, v)) = g.graph.edge_endpoints(eix) else {
            continue;
        };
        let Some(parent) = g.graph.remove_edge(eix) else {
            continue;
        };
        let EdgeGeometry::Line(line) = parent.geom.clone() else {
            stats.multi_part_skipped += 1;
            g.graph.add_edge(u, v, parent);
            continue;
        };

        let total_m = line_length_m(&line);
        let cuts = (parent.length_m / thresh_m).floor() as usize;
        let piece_m = total_m / (cuts + 1) as f64;

        let mut rest = line;
        let mut at = u;
        for _ in 0..cuts {
            let (piece, remainder) = cut_line(&rest, piece_m);
            let joint = piece.0[piece.0.len() - 1];
            let next = g.add_node_at(joint);
            stats.nodes_added += 1;
            add_piece(g, &parent, total_m, piece, at, next);
            at = next;
            rest = remainder;
        }
        add_piece(g, &parent, total_m, rest, at, v);

        stats.edges_split += 1;
        stats.edges_added += cuts;
    }

    stats
}

fn add_piece(
    g: &mut RoadGraph,
    parent: &RoadEdge,
    total_m: f64,
    piece: LineString<f64>,
    from: NodeIndex,
    to: NodeIndex,
) {
    let sub_m = line_length_m(&piece);
    let mut sub = parent.clone();
    sub.length_m = sub_m;
    sub.time_s = parent.time_s.map(|t| t * sub_m / total_m);
    sub.geom = EdgeGeometry::Line(piece);
    g.graph.add_edge(from, to, sub);
}
