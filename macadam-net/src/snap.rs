//! Point-to-network snapping
//!
//! Facility and population points rarely sit exactly on a road. Snapping
//! finds the nearest network node for each point with an R-tree over node
//! positions. Neighbor search runs in degree space, the same space the
//! nodes are stored in; the reported distance to the match is haversine
//! meters.

use std::path::Path;

use anyhow::{bail, Context, Result};
use geo::Coord;
use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::geomath::haversine_m;
use crate::graph::RoadGraph;

/// One input point to snap, with the label carried through to output.
#[derive(Debug, Clone)]
pub struct PointRecord {
    pub label: String,
    pub lon: f64,
    pub lat: f64,
}

/// Nearest-node match for one point.
#[derive(Debug, Clone, Copy)]
pub struct Snapped {
    pub node_id: u64,
    pub node_lon: f64,
    pub node_lat: f64,
    pub dist_m: f64,
}

/// R-tree over network node positions.
pub struct SnapIndex {
    tree: RTree<GeomWithData<[f64; 2], u64>>,
}

impl SnapIndex {
    pub fn build(g: &RoadGraph) -> Self {
        let points: Vec<GeomWithData<[f64; 2], u64>> = g
            .graph
            .node_weights()
            .map(|n| GeomWithData::new([n.lon, n.lat], n.id))
            .collect();
        SnapIndex {
            tree: RTree::bulk_load(points),
        }
    }

    pub fn nearest(&self, lon: f64, lat: f64) -> Option<Snapped> {
        let hit = self.tree.nearest_neighbor(&[lon, lat])?;
        let [node_lon, node_lat] = *hit.geom();
        Some(Snapped {
            node_id: hit.data,
            node_lon,
            node_lat,
            dist_m: haversine_m(
                Coord { x: lon, y: lat },
                Coord {
                    x: node_lon,
                    y: node_lat,
                },
            ),
        })
    }
}

/// Snap each point to its nearest network node.
pub fn snap_points(g: &RoadGraph, points: &[PointRecord]) -> Result<Vec<Snapped>> {
    if g.node_count() == 0 {
        bail!("Cannot snap to an empty network");
    }
    let index = SnapIndex::build(g);
    let mut out = Vec::with_capacity(points.len());
    for p in points {
        match index.nearest(p.lon, p.lat) {
            Some(s) => out.push(s),
            None => bail!("Nearest-neighbor lookup failed for point '{}'", p.label),
        }
    }
    Ok(out)
}

/// Read points from a CSV with x/y (or lon/lat) columns; an id column is
/// used as the label when present, the row number otherwise.
pub fn read_points_csv(path: &Path) -> Result<Vec<PointRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open points file {}", path.display()))?;

    let headers = reader.headers().context("Points file has no header row")?;
    let lower: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    let col = |names: &[&str]| lower.iter().position(|h| names.contains(&h.as_str()));

    let Some(x_col) = col(&["x", "lon", "longitude"]) else {
        bail!("Points file needs an x, lon, or longitude column");
    };
    let Some(y_col) = col(&["y", "lat", "latitude"]) else {
        bail!("Points file needs a y, lat, or latitude column");
    };
    let id_col = col(&["id", "name", "label"]);

    let mut points = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Bad CSV record at row {}", i + 2))?;
        let parse = |c: usize| -> Result<f64> {
            record
                .get(c)
                .unwrap_or("")
                .trim()
                .parse::<f64>()
                .with_context(|| format!("Bad coordinate at row {}", i + 2))
        };
        let label = match id_col.and_then(|c| record.get(c)) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => (i + 1).to_string(),
        };
        points.push(PointRecord {
            label,
            lon: parse(x_col)?,
            lat: parse(y_col)?,
        });
    }
    Ok(points)
}

/// Write points with their matches, one row per input point.
pub fn write_snapped_csv(path: &Path, points: &[PointRecord], snaps: &[Snapped]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(["id", "x", "y", "nn", "nn_dist"])?;
    for (p, s) in points.iter().zip(snaps) {
        writer.write_record([
            p.label.clone(),
            p.lon.to_string(),
            p.lat.to_string(),
            s.node_id.to_string(),
            format!("{:.2}", s.dist_m),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_graph() -> RoadGraph {
        let mut g = RoadGraph::new();
        g.add_node_at(Coord { x: 0.0, y: 0.0 });
        g.add_node_at(Coord { x: 0.01, y: 0.0 });
        g.add_node_at(Coord { x: 0.0, y: 0.01 });
        g
    }

    #[test]
    fn test_nearest_picks_closest_node() {
        let g = small_graph();
        let index = SnapIndex::build(&g);
        let s = index.nearest(0.009, 0.001).unwrap();
        assert_eq!(s.node_id, 1);
        let expect = haversine_m(
            Coord { x: 0.009, y: 0.001 },
            Coord { x: 0.01, y: 0.0 },
        );
        assert!((s.dist_m - expect).abs() < 1e-9);
    }

    #[test]
    fn test_empty_network_rejected() {
        let g = RoadGraph::new();
        let pts = vec![PointRecord {
            label: "a".to_string(),
            lon: 0.0,
            lat: 0.0,
        }];
        assert!(snap_points(&g, &pts).is_err());
    }

    #[test]
    fn test_read_points_csv_header_variants() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pts.csv");
        std::fs::write(&path, "name,Longitude,Latitude\nclinic,1.5,2.5\n,3.0,4.0\n").unwrap();
        let pts = read_points_csv(&path).unwrap();
        assert_eq!(pts.len(), 2);
        assert_eq!(pts[0].label, "clinic");
        assert_eq!(pts[0].lon, 1.5);
        assert_eq!(pts[0].lat, 2.5);
        // Empty id falls back to the row number.
        assert_eq!(pts[1].label, "2");
    }

    #[test]
    fn test_snap_csv_roundtrip() {
        let g = small_graph();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapped.csv");
        let pts = vec![PointRecord {
            label: "p".to_string(),
            lon: 0.001,
            lat: 0.009,
        }];
        let snaps = snap_points(&g, &pts).unwrap();
        assert_eq!(snaps[0].node_id, 2);
        write_snapped_csv(&path, &pts, &snaps).unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.starts_with("id,x,y,nn,nn_dist\n"));
        assert!(body.contains("p,0.001,0.009,2,"));
    }
}
