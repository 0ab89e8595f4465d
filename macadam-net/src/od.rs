//! Origin-destination cost matrices
//!
//! One Dijkstra run per origin fills a row of the matrix; unreachable
//! destinations get the caller's fail value so downstream statistics can
//! filter them. When there are more origins than destinations the search
//! runs per destination over the reversed graph instead, which fills the
//! same matrix with fewer runs.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use petgraph::algo::dijkstra;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::{EdgeRef, Reversed};

use crate::graph::{RoadEdge, RoadGraph};

/// Which edge attribute the matrix measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostField {
    Time,
    Length,
}

impl fmt::Display for CostField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostField::Time => write!(f, "time"),
            CostField::Length => write!(f, "length"),
        }
    }
}

impl FromStr for CostField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time" => Ok(CostField::Time),
            "length" => Ok(CostField::Length),
            other => Err(format!("unknown cost field '{other}', expected time or length")),
        }
    }
}

fn cost_of(edge: &RoadEdge, field: CostField) -> f64 {
    match field {
        CostField::Time => edge.time_s.unwrap_or(f64::INFINITY),
        CostField::Length => edge.length_m,
    }
}

/// Row-major origin-destination cost matrix.
#[derive(Debug)]
pub struct OdMatrix {
    pub origins: Vec<u64>,
    pub destinations: Vec<u64>,
    pub fail_value: f64,
    costs: Vec<f64>,
}

impl OdMatrix {
    fn filled(origins: &[u64], destinations: &[u64], fail_value: f64) -> Self {
        OdMatrix {
            origins: origins.to_vec(),
            destinations: destinations.to_vec(),
            fail_value,
            costs: vec![fail_value; origins.len() * destinations.len()],
        }
    }

    pub fn get(&self, origin_ix: usize, dest_ix: usize) -> f64 {
        self.costs[origin_ix * self.destinations.len() + dest_ix]
    }

    fn set(&mut self, origin_ix: usize, dest_ix: usize, value: f64) {
        self.costs[origin_ix * self.destinations.len() + dest_ix] = value;
    }
}

/// Shortest-path costs between every origin and destination node id.
pub fn calculate_od(
    g: &RoadGraph,
    origins: &[u64],
    destinations: &[u64],
    fail_value: f64,
    field: CostField,
) -> Result<OdMatrix> {
    if origins.is_empty() || destinations.is_empty() {
        bail!("Need at least one origin and one destination");
    }
    if field == CostField::Time {
        let untimed = g.graph.edge_weights().filter(|e| e.time_s.is_none()).count();
        if untimed > 0 {
            bail!("{untimed} edges have no travel time; run to-time first");
        }
    }

    let index = g.id_index();
    let resolve = |ids: &[u64], role: &str| -> Result<Vec<NodeIndex>> {
        ids.iter()
            .map(|id| {
                index
                    .get(id)
                    .copied()
                    .with_context(|| format!("{role} node {id} is not in the network"))
            })
            .collect()
    };
    let origin_ix = resolve(origins, "Origin")?;
    let dest_ix = resolve(destinations, "Destination")?;

    let mut matrix = OdMatrix::filled(origins, destinations, fail_value);

    if origins.len() <= destinations.len() {
        for (i, &o) in origin_ix.iter().enumerate() {
            let dist = dijkstra(&g.graph, o, None, |e| cost_of(e.weight(), field));
            for (j, d) in dest_ix.iter().enumerate() {
                if let Some(&cost) = dist.get(d) {
                    matrix.set(i, j, cost);
                }
            }
        }
    } else {
        // More origins than destinations: search backwards from each
        // destination instead.
        let reversed = Reversed(&g.graph);
        for (j, &d) in dest_ix.iter().enumerate() {
            let dist = dijkstra(reversed, d, None, |e| cost_of(e.weight(), field));
            for (i, o) in origin_ix.iter().enumerate() {
                if let Some(&cost) = dist.get(o) {
                    matrix.set(i, j, cost);
                }
            }
        }
    }

    Ok(matrix)
}

/// Write the matrix as CSV, one row per origin.
pub fn write_matrix_csv(matrix: &OdMatrix, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut header = vec!["origin".to_string()];
    header.extend(matrix.destinations.iter().map(|d| d.to_string()));
    writer.write_record(&header)?;

    for (i, o) in matrix.origins.iter().enumerate() {
        let mut row = vec![o.to_string()];
        for j in 0..matrix.destinations.len() {
            row.push(matrix.get(i, j).to_string());
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeGeometry, EdgeKind, TravelMode};
    use geo::{Coord, LineString};

    fn edge(length_m: f64, time_s: Option<f64>) -> RoadEdge {
        RoadEdge {
            osm_ids: vec![1],
            infra_type: "primary".to_string(),
            length_m,
            time_s,
            mode: time_s.map(|_| TravelMode::Drive),
            kind: EdgeKind::Legitimate,
            geom: EdgeGeometry::Line(LineString::from(vec![(0.0, 0.0), (0.001, 0.0)])),
        }
    }

    /// a -> b -> c, one way, lengths 100 and 200.
    fn line_graph() -> RoadGraph {
        let mut g = RoadGraph::new();
        let a = g.add_node_at(Coord { x: 0.0, y: 0.0 });
        let b = g.add_node_at(Coord { x: 0.001, y: 0.0 });
        let c = g.add_node_at(Coord { x: 0.002, y: 0.0 });
        g.graph.add_edge(a, b, edge(100.0, Some(9.0)));
        g.graph.add_edge(b, c, edge(200.0, Some(18.0)));
        g
    }

    #[test]
    fn test_length_costs_sum_along_path() {
        let g = line_graph();
        let m = calculate_od(&g, &[0], &[1, 2], -1.0, CostField::Length).unwrap();
        assert_eq!(m.get(0, 0), 100.0);
        assert_eq!(m.get(0, 1), 300.0);
    }

    #[test]
    fn test_unreachable_gets_fail_value() {
        let g = line_graph();
        let m = calculate_od(&g, &[2], &[0], -1.0, CostField::Length).unwrap();
        assert_eq!(m.get(0, 0), -1.0);
    }

    #[test]
    fn test_reversed_search_matches_forward() {
        let g = line_graph();
        // Two origins against one destination takes the reversed path.
        let m = calculate_od(&g, &[0, 1], &[2], -1.0, CostField::Length).unwrap();
        assert_eq!(m.get(0, 0), 300.0);
        assert_eq!(m.get(1, 0), 200.0);
    }

    #[test]
    fn test_time_field_requires_times() {
        let mut g = line_graph();
        for e in g.graph.edge_weights_mut() {
            e.time_s = None;
        }
        assert!(calculate_od(&g, &[0], &[2], -1.0, CostField::Time).is_err());
    }

    #[test]
    fn test_time_costs() {
        let g = line_graph();
        let m = calculate_od(&g, &[0], &[2], -1.0, CostField::Time).unwrap();
        assert_eq!(m.get(0, 0), 27.0);
    }

    #[test]
    fn test_unknown_node_rejected() {
        let g = line_graph();
        assert!(calculate_od(&g, &[99], &[0], -1.0, CostField::Length).is_err());
    }

    #[test]
    fn test_matrix_csv_layout() {
        let g = line_graph();
        let m = calculate_od(&g, &[0], &[1, 2], -1.0, CostField::Length).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("od.csv");
        write_matrix_csv(&m, &path).unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.starts_with("origin,1,2\n"));
        assert!(body.contains("0,100,300"));
    }
}
