//! Interstitial node collapse
//!
//! A node that merely continues a road (two distinct neighbors, total
//! degree 2 for a one-way or 4 for a two-way) carries no junction
//! information. Chains of edges running through such nodes are merged into
//! one edge per direction: lengths sum, way ids accumulate, and the chain's
//! geometry is kept as ordered parts for the unbundle pass. All chains are
//! discovered against the untouched graph, then applied in one step, since
//! the two directions of a street share their interior nodes.

use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rustc_hash::FxHashSet;

use crate::graph::{EdgeGeometry, RoadEdge, RoadGraph};

#[derive(Debug, Default, Clone, Copy)]
pub struct InterstitialStats {
    pub chains_merged: usize,
    pub nodes_removed: usize,
}

/// A node stays when the graph structure around it means anything more
/// than "the road continues".
fn is_endpoint(g: &RoadGraph, ix: NodeIndex) -> bool {
    let succs: FxHashSet<NodeIndex> = g.graph.neighbors_directed(ix, Direction::Outgoing).collect();
    let preds: FxHashSet<NodeIndex> = g.graph.neighbors_directed(ix, Direction::Incoming).collect();
    if succs.contains(&ix) || preds.contains(&ix) {
        return true;
    }
    let out_d = g.graph.edges_directed(ix, Direction::Outgoing).count();
    let in_d = g.graph.edges_directed(ix, Direction::Incoming).count();
    if out_d == 0 || in_d == 0 {
        return true;
    }
    let distinct = succs.union(&preds).count();
    let degree = out_d + in_d;
    !(distinct == 2 && (degree == 2 || degree == 4))
}

/// Follow successors from `start` through `first` until the next endpoint.
/// Returns None on shapes the walk cannot resolve, which leaves that part
/// of the graph untouched.
fn walk_chain(
    g: &RoadGraph,
    endpoints: &FxHashSet<NodeIndex>,
    start: NodeIndex,
    first: NodeIndex,
) -> Option<Vec<NodeIndex>> {
    let mut path = vec![start, first];
    let mut cur = first;
    while !endpoints.contains(&cur) {
        let nexts: FxHashSet<NodeIndex> = g
            .graph
            .neighbors_directed(cur, Direction::Outgoing)
            .filter(|n| !path.contains(n))
            .collect();
        match nexts.len() {
            1 => {
                let next = nexts.into_iter().next()?;
                path.push(next);
                cur = next;
            }
            0 => {
                // A loop closing back onto the endpoint it left from.
                let closes = g
                    .graph
                    .neighbors_directed(cur, Direction::Outgoing)
                    .any(|n| n == start);
                if closes {
                    path.push(start);
                    return Some(path);
                }
                return None;
            }
            _ => return None,
        }
    }
    Some(path)
}

/// Combine the chain's segments into one edge payload, reading the graph
/// before any mutation. Picks the shortest edge where parallels exist.
fn merge_chain(g: &RoadGraph, path: &[NodeIndex]) -> Option<RoadEdge> {
    let mut osm_ids: Vec<i64> = Vec::new();
    let mut length_m = 0.0;
    let mut times: Vec<Option<f64>> = Vec::new();
    let mut pieces = Vec::new();
    let mut head: Option<(String, Option<crate::graph::TravelMode>, crate::graph::EdgeKind)> = None;

    for w in path.windows(2) {
        let mut best: Option<&RoadEdge> = None;
        for cand in g.graph.edges_connecting(w[0], w[1]) {
            let better = match best {
                None => true,
                Some(b) => cand.weight().length_m < b.length_m,
            };
            if better {
                best = Some(cand.weight());
            }
        }
        let seg = best?;

        for id in &seg.osm_ids {
            if osm_ids.last() != Some(id) {
                osm_ids.push(*id);
            }
        }
        length_m += seg.length_m;
        times.push(seg.time_s);
        if head.is_none() {
            head = Some((seg.infra_type.clone(), seg.mode, seg.kind));
        }
        pieces.extend(seg.geom.clone().into_pieces());
    }

    let (infra_type, mode, kind) = head?;
    Some(RoadEdge {
        osm_ids,
        infra_type,
        length_m,
        time_s: times.into_iter().sum(),
        mode,
        kind,
        geom: EdgeGeometry::Pieces(pieces),
    })
}

/// Merge every chain of pass-through nodes into a single edge per
/// direction and drop the interior nodes.
pub fn collapse_interstitial(g: &mut RoadGraph) -> InterstitialStats {
    let endpoints: FxHashSet<NodeIndex> = g
        .graph
        .node_indices()
        .filter(|&ix| is_endpoint(g, ix))
        .collect();

    let mut starts: Vec<NodeIndex> = endpoints.iter().copied().collect();
    starts.sort_by_key(|ix| g.graph[*ix].id);

    let mut merged: Vec<(NodeIndex, NodeIndex, RoadEdge)> = Vec::new();
    let mut interior: FxHashSet<NodeIndex> = FxHashSet::default();

    for ep in starts {
        let mut succs: Vec<NodeIndex> = g
            .graph
            .neighbors_directed(ep, Direction::Outgoing)
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();
        succs.sort_by_key(|ix| g.graph[*ix].id);

        for s in succs {
            if endpoints.contains(&s) {
                continue;
            }
            let Some(path) = walk_chain(g, &endpoints, ep, s) else {
                continue;
            };
            let Some(edge) = merge_chain(g, &path) else {
                continue;
            };
            interior.extend(&path[1..path.len() - 1]);
            merged.push((path[0], path[path.len() - 1], edge));
        }
    }

    let stats = InterstitialStats {
        chains_merged: merged.len(),
        nodes_removed: interior.len(),
    };
    for (u, v, edge) in merged {
        g.graph.add_edge(u, v, edge);
    }
    for ix in interior {
        g.graph.remove_node(ix);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geomath::line_length_m;
    use crate::graph::EdgeKind;
    use geo::{Coord, LineString};

    fn edge(id: i64, pts: &[(f64, f64)]) -> RoadEdge {
        let line = LineString::from(pts.to_vec());
        RoadEdge {
            osm_ids: vec![id],
            infra_type: "tertiary".to_string(),
            length_m: line_length_m(&line),
            time_s: None,
            mode: None,
            kind: EdgeKind::Legitimate,
            geom: EdgeGeometry::Line(line),
        }
    }

    fn two_way(g: &mut RoadGraph, id: i64, u: NodeIndex, v: NodeIndex, pts: &[(f64, f64)]) {
        g.graph.add_edge(u, v, edge(id, pts));
        let mut rev = pts.to_vec();
        rev.reverse();
        g.graph.add_edge(v, u, edge(id, &rev));
    }

    #[test]
    fn test_two_way_chain_merges_both_directions() {
        let mut g = RoadGraph::new();
        let a = g.add_node_at(Coord { x: 0.0, y: 0.0 });
        let b = g.add_node_at(Coord { x: 0.001, y: 0.0 });
        let c = g.add_node_at(Coord { x: 0.002, y: 0.0 });
        let d = g.add_node_at(Coord { x: 0.003, y: 0.0 });
        two_way(&mut g, 1, a, b, &[(0.0, 0.0), (0.001, 0.0)]);
        two_way(&mut g, 2, b, c, &[(0.001, 0.0), (0.002, 0.0)]);
        two_way(&mut g, 3, c, d, &[(0.002, 0.0), (0.003, 0.0)]);

        // Segments lie on the equator, so the chain length is the length
        // of the straight span.
        let full = line_length_m(&LineString::from(vec![(0.0, 0.0), (0.003, 0.0)]));

        let stats = collapse_interstitial(&mut g);
        assert_eq!(stats.chains_merged, 2);
        assert_eq!(stats.nodes_removed, 2);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 2);

        let fwd = g
            .graph
            .edges_connecting(a, d)
            .next()
            .expect("merged forward edge");
        assert_eq!(fwd.weight().osm_ids, vec![1, 2, 3]);
        assert_eq!(fwd.weight().geom.piece_count(), 3);
        assert!((fwd.weight().length_m - full).abs() < 1e-6);
        assert!(fwd.weight().time_s.is_none());
        assert!(g.graph.edges_connecting(d, a).next().is_some());
    }

    #[test]
    fn test_junction_node_stays() {
        // Three arms into x; only the arm with a middle node collapses.
        let mut g = RoadGraph::new();
        let x = g.add_node_at(Coord { x: 0.0, y: 0.0 });
        let a = g.add_node_at(Coord { x: 0.002, y: 0.0 });
        let m = g.add_node_at(Coord { x: 0.001, y: 0.0 });
        let b = g.add_node_at(Coord { x: 0.0, y: 0.001 });
        let c = g.add_node_at(Coord { x: 0.0, y: -0.001 });
        two_way(&mut g, 1, a, m, &[(0.002, 0.0), (0.001, 0.0)]);
        two_way(&mut g, 2, m, x, &[(0.001, 0.0), (0.0, 0.0)]);
        two_way(&mut g, 3, x, b, &[(0.0, 0.0), (0.0, 0.001)]);
        two_way(&mut g, 4, x, c, &[(0.0, 0.0), (0.0, -0.001)]);

        let stats = collapse_interstitial(&mut g);
        assert_eq!(stats.nodes_removed, 1);
        assert_eq!(g.node_count(), 4);
        // Two arm edges per direction survive untouched, plus the merged pair.
        assert_eq!(g.edge_count(), 6);
        let fwd = g.graph.edges_connecting(a, x).next().unwrap();
        assert_eq!(fwd.weight().geom.piece_count(), 2);
    }

    #[test]
    fn test_one_way_chain() {
        let mut g = RoadGraph::new();
        let a = g.add_node_at(Coord { x: 0.0, y: 0.0 });
        let b = g.add_node_at(Coord { x: 0.001, y: 0.0 });
        let c = g.add_node_at(Coord { x: 0.002, y: 0.0 });
        g.graph.add_edge(a, b, edge(1, &[(0.0, 0.0), (0.001, 0.0)]));
        g.graph.add_edge(b, c, edge(2, &[(0.001, 0.0), (0.002, 0.0)]));

        let stats = collapse_interstitial(&mut g);
        assert_eq!(stats.chains_merged, 1);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);
        let e = g.graph.edges_connecting(a, c).next().unwrap();
        assert_eq!(e.weight().osm_ids, vec![1, 2]);
    }

    #[test]
    fn test_loop_closes_onto_its_endpoint() {
        // One-way ring leaving and re-entering e, plus a stub keeping e
        // an endpoint.
        let mut g = RoadGraph::new();
        let e = g.add_node_at(Coord { x: 0.0, y: 0.0 });
        let i1 = g.add_node_at(Coord { x: 0.001, y: 0.0 });
        let i2 = g.add_node_at(Coord { x: 0.001, y: 0.001 });
        let z = g.add_node_at(Coord { x: -0.001, y: 0.0 });
        g.graph.add_edge(e, i1, edge(1, &[(0.0, 0.0), (0.001, 0.0)]));
        g.graph
            .add_edge(i1, i2, edge(2, &[(0.001, 0.0), (0.001, 0.001)]));
        g.graph.add_edge(i2, e, edge(3, &[(0.001, 0.001), (0.0, 0.0)]));
        two_way(&mut g, 4, e, z, &[(0.0, 0.0), (-0.001, 0.0)]);

        let stats = collapse_interstitial(&mut g);
        assert_eq!(stats.chains_merged, 1);
        assert_eq!(stats.nodes_removed, 2);
        assert_eq!(g.node_count(), 2);
        // Self-loop at e plus the two stub edges.
        assert_eq!(g.edge_count(), 3);
        let lp = g.graph.edges_connecting(e, e).next().unwrap();
        assert_eq!(lp.weight().osm_ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_isolated_ring_left_alone() {
        // Every ring node is interstitial, so nothing can anchor a chain.
        let mut g = RoadGraph::new();
        let a = g.add_node_at(Coord { x: 0.0, y: 0.0 });
        let b = g.add_node_at(Coord { x: 0.001, y: 0.0 });
        let c = g.add_node_at(Coord { x: 0.001, y: 0.001 });
        g.graph.add_edge(a, b, edge(1, &[(0.0, 0.0), (0.001, 0.0)]));
        g.graph
            .add_edge(b, c, edge(2, &[(0.001, 0.0), (0.001, 0.001)]));
        g.graph.add_edge(c, a, edge(3, &[(0.001, 0.001), (0.0, 0.0)]));

        let stats = collapse_interstitial(&mut g);
        assert_eq!(stats.chains_merged, 0);
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 3);
    }
}
