//! Directed road multigraph
//!
//! Wraps a petgraph `StableDiGraph` so structural passes can remove nodes
//! and edges without invalidating indices. Parallel edges and self-loops
//! are allowed; every edge carries its geometry and haversine length.
//! Node ids are dense u64s independent of petgraph indices, so persisted
//! artifacts survive rebuilds.

use std::fmt;
use std::str::FromStr;

use geo::{Coord, LineString};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::geomath;
use crate::roads::RoadTable;

/// Graph node: a junction or endpoint with its lon/lat position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadNode {
    pub id: u64,
    pub lon: f64,
    pub lat: f64,
}

impl RoadNode {
    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }
}

/// Travel mode an edge's time was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TravelMode {
    Drive,
    Walk,
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TravelMode::Drive => write!(f, "drive"),
            TravelMode::Walk => write!(f, "walk"),
        }
    }
}

impl FromStr for TravelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drive" => Ok(TravelMode::Drive),
            "walk" => Ok(TravelMode::Walk),
            other => Err(format!("unknown travel mode '{other}'")),
        }
    }
}

/// Provenance mark written by the junction-merge pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Neither endpoint was merged.
    #[default]
    Legitimate,
    /// The edge's origin was replaced by a cluster centroid.
    OriginDestruction,
    /// The edge's destination was replaced by a cluster centroid.
    DestinationDestruction,
    /// Both endpoints were replaced by (different) cluster centroids.
    DualDestruction,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeKind::Legitimate => "legitimate",
            EdgeKind::OriginDestruction => "origin_destruction",
            EdgeKind::DestinationDestruction => "destination_destruction",
            EdgeKind::DualDestruction => "dual_destruction",
        };
        write!(f, "{s}")
    }
}

impl FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legitimate" => Ok(EdgeKind::Legitimate),
            "origin_destruction" => Ok(EdgeKind::OriginDestruction),
            "destination_destruction" => Ok(EdgeKind::DestinationDestruction),
            "dual_destruction" => Ok(EdgeKind::DualDestruction),
            other => Err(format!("unknown edge kind '{other}'")),
        }
    }
}

/// Edge geometry: a single line, or the ordered parts accumulated by the
/// interstitial collapse until the unbundle pass chains them back together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EdgeGeometry {
    Line(LineString<f64>),
    Pieces(Vec<LineString<f64>>),
}

impl EdgeGeometry {
    pub fn first_coord(&self) -> Option<Coord<f64>> {
        match self {
            EdgeGeometry::Line(l) => l.0.first().copied(),
            EdgeGeometry::Pieces(p) => p.first().and_then(|l| l.0.first().copied()),
        }
    }

    pub fn last_coord(&self) -> Option<Coord<f64>> {
        match self {
            EdgeGeometry::Line(l) => l.0.last().copied(),
            EdgeGeometry::Pieces(p) => p.last().and_then(|l| l.0.last().copied()),
        }
    }

    pub fn as_line(&self) -> Option<&LineString<f64>> {
        match self {
            EdgeGeometry::Line(l) => Some(l),
            EdgeGeometry::Pieces(_) => None,
        }
    }

    pub fn piece_count(&self) -> usize {
        match self {
            EdgeGeometry::Line(_) => 1,
            EdgeGeometry::Pieces(p) => p.len(),
        }
    }

    pub fn into_pieces(self) -> Vec<LineString<f64>> {
        match self {
            EdgeGeometry::Line(l) => vec![l],
            EdgeGeometry::Pieces(p) => p,
        }
    }

    /// Haversine length in meters over all pieces.
    pub fn length_m(&self) -> f64 {
        match self {
            EdgeGeometry::Line(l) => geomath::line_length_m(l),
            EdgeGeometry::Pieces(p) => p.iter().map(geomath::line_length_m).sum(),
        }
    }

    /// Replace the very first coordinate, e.g. when the origin node moved.
    pub fn set_first_coord(&mut self, c: Coord<f64>) {
        match self {
            EdgeGeometry::Line(l) => {
                if let Some(first) = l.0.first_mut() {
                    *first = c;
                }
            }
            EdgeGeometry::Pieces(p) => {
                if let Some(first) = p.first_mut().and_then(|l| l.0.first_mut()) {
                    *first = c;
                }
            }
        }
    }

    /// Replace the very last coordinate, e.g. when the destination node moved.
    pub fn set_last_coord(&mut self, c: Coord<f64>) {
        match self {
            EdgeGeometry::Line(l) => {
                if let Some(last) = l.0.last_mut() {
                    *last = c;
                }
            }
            EdgeGeometry::Pieces(p) => {
                if let Some(last) = p.last_mut().and_then(|l| l.0.last_mut()) {
                    *last = c;
                }
            }
        }
    }

    /// Geometry with coordinate order flipped end to end.
    pub fn reversed(&self) -> EdgeGeometry {
        match self {
            EdgeGeometry::Line(l) => {
                let mut coords = l.0.clone();
                coords.reverse();
                EdgeGeometry::Line(LineString::from(coords))
            }
            EdgeGeometry::Pieces(pieces) => EdgeGeometry::Pieces(
                pieces
                    .iter()
                    .rev()
                    .map(|l| {
                        let mut coords = l.0.clone();
                        coords.reverse();
                        LineString::from(coords)
                    })
                    .collect(),
            ),
        }
    }
}

/// Graph edge: one directed stretch of road.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadEdge {
    /// Parent OSM way ids; collapse passes accumulate these.
    pub osm_ids: Vec<i64>,
    pub infra_type: String,
    pub length_m: f64,
    pub time_s: Option<f64>,
    pub mode: Option<TravelMode>,
    pub kind: EdgeKind,
    pub geom: EdgeGeometry,
}

/// The directed road multigraph.
#[derive(Debug, Default)]
pub struct RoadGraph {
    pub graph: StableDiGraph<RoadNode, RoadEdge>,
    next_id: u64,
}

impl RoadGraph {
    pub fn new() -> Self {
        RoadGraph {
            graph: StableDiGraph::default(),
            next_id: 0,
        }
    }

    /// Rebuild the wrapper around a deserialized graph, continuing the id
    /// sequence after the highest id present.
    pub fn from_parts(graph: StableDiGraph<RoadNode, RoadEdge>) -> Self {
        let next_id = graph
            .node_weights()
            .map(|n| n.id + 1)
            .max()
            .unwrap_or(0);
        RoadGraph { graph, next_id }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Add a node with a fresh dense id at `coord`.
    pub fn add_node_at(&mut self, coord: Coord<f64>) -> NodeIndex {
        let id = self.next_id;
        self.next_id += 1;
        self.graph.add_node(RoadNode {
            id,
            lon: coord.x,
            lat: coord.y,
        })
    }

    /// Node lookup table from dense id to petgraph index.
    pub fn id_index(&self) -> FxHashMap<u64, NodeIndex> {
        self.graph
            .node_indices()
            .map(|ix| (self.graph[ix].id, ix))
            .collect()
    }

    /// Reassign dense ids 0..n following the current id order, so exports
    /// stay compact after structural passes removed nodes.
    pub fn renumber(&mut self) {
        let mut indices: Vec<NodeIndex> = self.graph.node_indices().collect();
        indices.sort_by_key(|ix| self.graph[*ix].id);
        for (new_id, ix) in indices.into_iter().enumerate() {
            self.graph[ix].id = new_id as u64;
        }
        self.next_id = self.graph.node_count() as u64;
    }

    /// Number of strongly-connected components.
    pub fn component_count(&self) -> usize {
        petgraph::algo::kosaraju_scc(&self.graph).len()
    }

    /// Keep only the largest strongly-connected component (by node count).
    /// Returns (nodes removed, edges removed).
    pub fn retain_largest_component(&mut self) -> (usize, usize) {
        let components = petgraph::algo::kosaraju_scc(&self.graph);
        let Some(largest) = components.iter().max_by_key(|c| c.len()) else {
            return (0, 0);
        };
        let keep: std::collections::HashSet<NodeIndex> = largest.iter().copied().collect();
        let nodes_before = self.graph.node_count();
        let edges_before = self.graph.edge_count();
        self.graph.retain_nodes(|_, ix| keep.contains(&ix));
        (
            nodes_before - self.graph.node_count(),
            edges_before - self.graph.edge_count(),
        )
    }

    /// Total length and edge count per road class, longest classes first.
    pub fn class_lengths(&self) -> Vec<(String, f64, usize)> {
        let mut acc: FxHashMap<&str, (f64, usize)> = FxHashMap::default();
        for edge in self.graph.edge_weights() {
            let entry = acc.entry(edge.infra_type.as_str()).or_insert((0.0, 0));
            entry.0 += edge.length_m;
            entry.1 += 1;
        }
        let mut out: Vec<(String, f64, usize)> = acc
            .into_iter()
            .map(|(class, (len, n))| (class.to_string(), len, n))
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1));
        out
    }

    /// First `n` edges in id order, as (from id, to id, edge).
    pub fn sample_edges(&self, n: usize) -> Vec<(u64, u64, &RoadEdge)> {
        let mut refs: Vec<_> = self.graph.edge_references().collect();
        refs.sort_by_key(|e| (self.graph[e.source()].id, self.graph[e.target()].id));
        refs.into_iter()
            .take(n)
            .map(|e| {
                (
                    self.graph[e.source()].id,
                    self.graph[e.target()].id,
                    e.weight(),
                )
            })
            .collect()
    }

    /// First `n` nodes in id order.
    pub fn sample_nodes(&self, n: usize) -> Vec<&RoadNode> {
        let mut nodes: Vec<&RoadNode> = self.graph.node_weights().collect();
        nodes.sort_by_key(|w| w.id);
        nodes.into_iter().take(n).collect()
    }
}

/// Build the directed multigraph from a (segmented, clipped) road table.
///
/// Nodes are keyed by rounded endpoint coordinate, so segments meeting at a
/// junction share one node no matter which way contributed it. Each row
/// becomes exactly one edge in drawn order; reverse edges are the clean
/// pipeline's business.
pub fn build_graph(table: &RoadTable) -> RoadGraph {
    let mut g = RoadGraph::new();
    let mut by_coord: FxHashMap<(i64, i64), NodeIndex> = FxHashMap::default();

    for row in &table.rows {
        let coords = &row.geom.0;
        if coords.len() < 2 {
            continue;
        }
        let first = coords[0];
        let last = coords[coords.len() - 1];

        let u = *by_coord
            .entry(geomath::coord_key(first))
            .or_insert_with(|| g.add_node_at(first));
        let v = *by_coord
            .entry(geomath::coord_key(last))
            .or_insert_with(|| g.add_node_at(last));

        let edge = RoadEdge {
            osm_ids: vec![row.osm_id],
            infra_type: row.infra_type.clone(),
            length_m: row.length_m(),
            time_s: None,
            mode: None,
            kind: EdgeKind::Legitimate,
            geom: EdgeGeometry::Line(row.geom.clone()),
        };
        g.graph.add_edge(u, v, edge);
    }

    g
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roads::RoadRow;

    fn row(osm_id: i64, pts: &[(f64, f64)]) -> RoadRow {
        RoadRow {
            osm_id,
            infra_type: "primary".to_string(),
            refs: Vec::new(),
            geom: LineString::from(pts.to_vec()),
        }
    }

    #[test]
    fn test_build_graph_dedupes_nodes_by_coordinate() {
        let table = RoadTable {
            rows: vec![
                row(1, &[(0.0, 0.0), (0.001, 0.0)]),
                row(2, &[(0.001, 0.0), (0.002, 0.0)]),
            ],
        };
        let g = build_graph(&table);
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn test_build_graph_keeps_parallel_edges() {
        let table = RoadTable {
            rows: vec![
                row(1, &[(0.0, 0.0), (0.001, 0.0)]),
                row(2, &[(0.0, 0.0), (0.0005, 0.0002), (0.001, 0.0)]),
            ],
        };
        let g = build_graph(&table);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn test_build_graph_direction_is_drawn_order() {
        let table = RoadTable {
            rows: vec![row(1, &[(0.0, 0.0), (0.001, 0.0)])],
        };
        let g = build_graph(&table);
        let edge = g.graph.edge_references().next().unwrap();
        assert_eq!(g.graph[edge.source()].lon, 0.0);
        assert_eq!(g.graph[edge.target()].lon, 0.001);
    }

    #[test]
    fn test_retain_largest_component() {
        // A bidirectional pair (SCC of 2) plus an isolated one-way edge.
        let mut g = RoadGraph::new();
        let a = g.add_node_at(Coord { x: 0.0, y: 0.0 });
        let b = g.add_node_at(Coord { x: 0.001, y: 0.0 });
        let c = g.add_node_at(Coord { x: 1.0, y: 0.0 });
        let d = g.add_node_at(Coord { x: 1.001, y: 0.0 });
        let e = |x1: f64, x2: f64| RoadEdge {
            osm_ids: vec![1],
            infra_type: "primary".to_string(),
            length_m: geomath::haversine_m(
                Coord { x: x1, y: 0.0 },
                Coord { x: x2, y: 0.0 },
            ),
            time_s: None,
            mode: None,
            kind: EdgeKind::Legitimate,
            geom: EdgeGeometry::Line(LineString::from(vec![(x1, 0.0), (x2, 0.0)])),
        };
        g.graph.add_edge(a, b, e(0.0, 0.001));
        g.graph.add_edge(b, a, e(0.001, 0.0));
        g.graph.add_edge(c, d, e(1.0, 1.001));

        let (nodes_removed, edges_removed) = g.retain_largest_component();
        assert_eq!(nodes_removed, 2);
        assert_eq!(edges_removed, 1);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn test_renumber_is_dense_and_ordered() {
        let mut g = RoadGraph::new();
        let a = g.add_node_at(Coord { x: 0.0, y: 0.0 });
        let _b = g.add_node_at(Coord { x: 0.001, y: 0.0 });
        let _c = g.add_node_at(Coord { x: 0.002, y: 0.0 });
        g.graph.remove_node(a);
        g.renumber();
        let mut ids: Vec<u64> = g.graph.node_weights().map(|n| n.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_edge_kind_roundtrip() {
        for kind in [
            EdgeKind::Legitimate,
            EdgeKind::OriginDestruction,
            EdgeKind::DestinationDestruction,
            EdgeKind::DualDestruction,
        ] {
            assert_eq!(kind.to_string().parse::<EdgeKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_geometry_reversed() {
        let geom = EdgeGeometry::Pieces(vec![
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]),
            LineString::from(vec![(1.0, 0.0), (2.0, 0.0)]),
        ]);
        let rev = geom.reversed();
        assert_eq!(rev.first_coord(), Some(Coord { x: 2.0, y: 0.0 }));
        assert_eq!(rev.last_coord(), Some(Coord { x: 0.0, y: 0.0 }));
    }
}
