//! Junction cluster merge
//!
//! Complex intersections come out of OSM as several nodes a few meters
//! apart. This pass projects node positions into the measure CRS, groups
//! nodes transitively closer than the cluster distance, and replaces each
//! group with one node at the group centroid. Edges between two members of
//! the same group vanish; edges leaving a group are re-anchored on the
//! centroid, their geometry endpoint snapped and length remeasured, and
//! tagged with which end moved.

use geo::Coord;
use macadam_common::{Error, Result};
use petgraph::stable_graph::NodeIndex;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use rustc_hash::FxHashMap;

use crate::geomath::{projected_centroid, Projection};
use crate::graph::{EdgeKind, RoadGraph};
use crate::simplify::CleanConfig;

/// What the merge did, for progress reporting.
#[derive(Debug, Default, Clone, Copy)]
pub struct JunctionStats {
    pub clusters: usize,
    pub nodes_merged: usize,
    pub edges_dropped: usize,
    pub edges_rewired: usize,
}

/// Disjoint sets with path halving, used for transitive clustering.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

/// Collapse node clusters within `cfg.junction_dist_m` into centroid nodes.
pub fn merge_junctions(g: &mut RoadGraph, cfg: &CleanConfig) -> Result<JunctionStats> {
    let proj = Projection::from_epsg(cfg.measure_epsg)?;
    if !proj.is_projected() {
        return Err(Error::InvalidInput(format!(
            "measure CRS epsg:{} is not projected; pick the UTM zone covering the area",
            cfg.measure_epsg
        )));
    }
    if Projection::from_epsg(cfg.geom_epsg)? != Projection::Geographic {
        return Err(Error::InvalidInput(format!(
            "stored geometry must be geographic, got epsg:{}",
            cfg.geom_epsg
        )));
    }

    let mut stats = JunctionStats::default();

    // Project every node once; sorted by id so cluster numbering and
    // centroid insertion order do not depend on hash order.
    let mut nodes: Vec<(NodeIndex, Coord<f64>)> = g
        .graph
        .node_indices()
        .map(|ix| {
            let n = &g.graph[ix];
            (ix, proj.project(n.coord()))
        })
        .collect();
    nodes.sort_by_key(|(ix, _)| g.graph[*ix].id);

    let tree: RTree<GeomWithData<[f64; 2], usize>> = RTree::bulk_load(
        nodes
            .iter()
            .enumerate()
            .map(|(i, (_, p))| GeomWithData::new([p.x, p.y], i))
            .collect(),
    );

    let dist_sq = cfg.junction_dist_m * cfg.junction_dist_m;
    let mut sets = UnionFind::new(nodes.len());
    for (i, (_, p)) in nodes.iter().enumerate() {
        for hit in tree.locate_within_distance([p.x, p.y], dist_sq) {
            sets.union(i, hit.data);
        }
    }

    // Group members per root, keeping only real clusters.
    let mut groups: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
    for i in 0..nodes.len() {
        groups.entry(sets.find(i)).or_default().push(i);
    }
    let mut clusters: Vec<Vec<usize>> = groups.into_values().filter(|m| m.len() >= 2).collect();
    clusters.sort_by_key(|m| m.iter().copied().min());

    if clusters.is_empty() {
        return Ok(stats);
    }

    // One centroid node per cluster, placed before any rewiring so edge
    // processing sees stable targets.
    let mut cluster_of: FxHashMap<NodeIndex, usize> = FxHashMap::default();
    let mut centroid_ix: Vec<NodeIndex> = Vec::with_capacity(clusters.len());
    let mut centroid_at: Vec<Coord<f64>> = Vec::with_capacity(clusters.len());
    for (cid, members) in clusters.iter().enumerate() {
        let coords: Vec<Coord<f64>> = members
            .iter()
            .map(|&i| g.graph[nodes[i].0].coord())
            .collect();
        let center = projected_centroid(&proj, &coords);
        centroid_at.push(center);
        centroid_ix.push(g.add_node_at(center));
        for &i in members {
            cluster_of.insert(nodes[i].0, cid);
        }
        stats.nodes_merged += members.len();
    }
    stats.clusters = clusters.len();

    let edge_ids: Vec<_> = g.graph.edge_indices().collect();
    for eix in edge_ids {
        let Some((u, v)) = g.graph.edge_endpoints(eix) else {
            continue;
        };
        let u_cl = cluster_of.get(&u).copied();
        let v_cl = cluster_of.get(&v).copied();
        match (u_cl, v_cl) {
            (None, None) => {}
            (Some(a), Some(b)) if a == b => {
                g.graph.remove_edge(eix);
                stats.edges_dropped += 1;
            }
            _ => {
                let Some(mut edge) = g.graph.remove_edge(eix) else {
                    continue;
                };
                let new_u = u_cl.map_or(u, |c| centroid_ix[c]);
                let new_v = v_cl.map_or(v, |c| centroid_ix[c]);
                if let Some(c) = u_cl {
                    edge.geom.set_first_coord(centroid_at[c]);
                }
                if let Some(c) = v_cl {
                    edge.geom.set_last_coord(centroid_at[c]);
                }
                edge.kind = match (u_cl, v_cl) {
                    (Some(_), Some(_)) => EdgeKind::DualDestruction,
                    (Some(_), None) => EdgeKind::OriginDestruction,
                    (None, Some(_)) => EdgeKind::DestinationDestruction,
                    (None, None) => edge.kind,
                };
                edge.length_m = edge.geom.length_m();
                g.graph.add_edge(new_u, new_v, edge);
                stats.edges_rewired += 1;
            }
        }
    }

    // Members are isolated now; drop them.
    for ix in cluster_of.keys() {
        g.graph.remove_node(*ix);
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geomath::line_length_m;
    use crate::graph::{EdgeGeometry, RoadEdge};
    use geo::LineString;
    use petgraph::visit::EdgeRef;

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

    // Zone 31N covers lon 3; ~0.0001 deg is ~11 m at the equator.
    fn cfg() -> CleanConfig {
        CleanConfig::new(32631)
    }

    #[test]
    fn test_cluster_collapses_to_centroid() {
        let mut g = RoadGraph::new();
        let far = g.add_node_at(Coord { x: 3.01, y: 0.0 });
        let a = g.add_node_at(Coord { x: 3.0, y: 0.0 });
        let b = g.add_node_at(Coord { x: 3.0001, y: 0.0 });
        g.graph.add_edge(far, a, edge(&[(3.01, 0.0), (3.0, 0.0)]));
        g.graph.add_edge(a, b, edge(&[(3.0, 0.0), (3.0001, 0.0)]));
        g.graph.add_edge(b, far, edge(&[(3.0001, 0.0), (3.01, 0.0)]));

        let stats = merge_junctions(&mut g, &cfg()).unwrap();
        assert_eq!(stats.clusters, 1);
        assert_eq!(stats.nodes_merged, 2);
        assert_eq!(stats.edges_dropped, 1);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 2);

        for e in g.graph.edge_references() {
            let w = e.weight();
            assert_ne!(w.kind, EdgeKind::Legitimate);
            // Geometry end on the merged side sits on the centroid, and the
            // stored length matches the snapped geometry.
            assert!((w.length_m - w.geom.length_m()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_edge_between_clusters_is_dual_marked() {
        let mut g = RoadGraph::new();
        let a = g.add_node_at(Coord { x: 3.0, y: 0.0 });
        let b = g.add_node_at(Coord { x: 3.0001, y: 0.0 });
        let c = g.add_node_at(Coord { x: 3.01, y: 0.0 });
        let d = g.add_node_at(Coord { x: 3.0101, y: 0.0 });
        g.graph.add_edge(a, b, edge(&[(3.0, 0.0), (3.0001, 0.0)]));
        g.graph.add_edge(c, d, edge(&[(3.01, 0.0), (3.0101, 0.0)]));
        g.graph.add_edge(a, c, edge(&[(3.0, 0.0), (3.01, 0.0)]));

        let stats = merge_junctions(&mut g, &cfg()).unwrap();
        assert_eq!(stats.clusters, 2);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);
        let e = g.graph.edge_references().next().unwrap();
        assert_eq!(e.weight().kind, EdgeKind::DualDestruction);
        let first = e.weight().geom.first_coord().unwrap();
        let last = e.weight().geom.last_coord().unwrap();
        assert_eq!(first, g.graph[e.source()].coord());
        assert_eq!(last, g.graph[e.target()].coord());
    }

    #[test]
    fn test_chain_clusters_transitively() {
        // a-b and b-c are each ~44 m apart, a-c is ~88 m: one cluster.
        let mut g = RoadGraph::new();
        let a = g.add_node_at(Coord { x: 3.0, y: 0.0 });
        let b = g.add_node_at(Coord { x: 3.0004, y: 0.0 });
        let c = g.add_node_at(Coord { x: 3.0008, y: 0.0 });
        g.graph.add_edge(a, b, edge(&[(3.0, 0.0), (3.0004, 0.0)]));
        g.graph.add_edge(b, c, edge(&[(3.0004, 0.0), (3.0008, 0.0)]));

        let stats = merge_junctions(&mut g, &cfg()).unwrap();
        assert_eq!(stats.clusters, 1);
        assert_eq!(stats.nodes_merged, 3);
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn test_far_nodes_untouched() {
        let mut g = RoadGraph::new();
        let a = g.add_node_at(Coord { x: 3.0, y: 0.0 });
        let b = g.add_node_at(Coord { x: 3.01, y: 0.0 });
        g.graph.add_edge(a, b, edge(&[(3.0, 0.0), (3.01, 0.0)]));
        g.graph.add_edge(a, a, edge(&[(3.0, 0.0), (3.0, 0.0)]));

        let stats = merge_junctions(&mut g, &cfg()).unwrap();
        assert_eq!(stats.clusters, 0);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn test_geographic_measure_crs_rejected() {
        let mut g = RoadGraph::new();
        g.add_node_at(Coord { x: 3.0, y: 0.0 });
        let mut c = cfg();
        c.measure_epsg = 4326;
        assert!(merge_junctions(&mut g, &c).is_err());
    }
}
