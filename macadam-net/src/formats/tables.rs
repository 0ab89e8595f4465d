//! Nodes and edges CSV tables
//!
//! `{name}_nodes.csv`: `node_id,x,y,geometry` (x is longitude).
//! `{name}_edges.csv`: `stnode,endnode,osm_ids,infra_type,length_m,time_s,
//! mode,kind,geometry`. Geometry columns are WKT. Rows are sorted by id so
//! repeated runs produce identical files.
//!
//! The loader is lenient about optional edge columns: `osm_ids`, `time_s`,
//! `mode` and `kind` may be absent or empty, and `length_m` is recomputed
//! from the geometry when missing.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;

use crate::formats::{wkt, FormatError};
use crate::geomath;
use crate::graph::{EdgeGeometry, EdgeKind, RoadEdge, RoadGraph, RoadNode, TravelMode};

pub fn write_nodes_csv(graph: &RoadGraph, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(["node_id", "x", "y", "geometry"])?;

    let mut nodes: Vec<&RoadNode> = graph.graph.node_weights().collect();
    nodes.sort_by_key(|n| n.id);
    for node in nodes {
        writer.write_record([
            node.id.to_string(),
            node.lon.to_string(),
            node.lat.to_string(),
            wkt::format_point(node.coord()),
        ])?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn write_edges_csv(graph: &RoadGraph, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record([
        "stnode", "endnode", "osm_ids", "infra_type", "length_m", "time_s", "mode", "kind",
        "geometry",
    ])?;

    let mut edges: Vec<(u64, u64, &RoadEdge)> = graph
        .graph
        .edge_references()
        .map(|e| {
            (
                graph.graph[e.source()].id,
                graph.graph[e.target()].id,
                e.weight(),
            )
        })
        .collect();
    edges.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    for (from, to, edge) in edges {
        let osm_ids = edge
            .osm_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<String>>()
            .join(";");
        writer.write_record([
            from.to_string(),
            to.to_string(),
            osm_ids,
            edge.infra_type.clone(),
            edge.length_m.to_string(),
            edge.time_s.map(|t| t.to_string()).unwrap_or_default(),
            edge.mode.map(|m| m.to_string()).unwrap_or_default(),
            edge.kind.to_string(),
            wkt::format_geometry(&edge.geom),
        ])?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Load a graph from a nodes+edges CSV pair written by `write_*_csv` (or a
/// compatible table from elsewhere, see the module docs for what may be
/// omitted).
pub fn load_csv_pair(nodes_path: &Path, edges_path: &Path) -> Result<RoadGraph> {
    let mut g: StableDiGraph<RoadNode, RoadEdge> = StableDiGraph::default();
    let mut index_of: FxHashMap<u64, NodeIndex> = FxHashMap::default();

    let mut reader = csv::Reader::from_path(nodes_path)
        .with_context(|| format!("Failed to open {}", nodes_path.display()))?;
    let headers = header_map(&mut reader)?;
    for record in reader.records() {
        let record = record.with_context(|| format!("Bad row in {}", nodes_path.display()))?;
        let get = |col: &str| field(&headers, &record, col);
        let id: u64 = parse_num(get("node_id"), "node_id")?;
        let lon: f64 = parse_num(get("x"), "x")?;
        let lat: f64 = parse_num(get("y"), "y")?;
        let ix = g.add_node(RoadNode { id, lon, lat });
        index_of.insert(id, ix);
    }

    let mut reader = csv::Reader::from_path(edges_path)
        .with_context(|| format!("Failed to open {}", edges_path.display()))?;
    let headers = header_map(&mut reader)?;
    for record in reader.records() {
        let record = record.with_context(|| format!("Bad row in {}", edges_path.display()))?;
        let get = |col: &str| field(&headers, &record, col);

        let from: u64 = parse_num(get("stnode"), "stnode")?;
        let to: u64 = parse_num(get("endnode"), "endnode")?;
        let (Some(&u), Some(&v)) = (index_of.get(&from), index_of.get(&to)) else {
            return Err(FormatError::Field {
                field: "stnode/endnode".to_string(),
                detail: format!("edge {from}->{to} references a missing node"),
            }
            .into());
        };

        let geom_text = get("geometry").ok_or_else(|| FormatError::Field {
            field: "geometry".to_string(),
            detail: "column missing".to_string(),
        })?;
        let geom = wkt::parse_geometry(geom_text)?;

        let length_m = match get("length_m").filter(|s| !s.is_empty()) {
            Some(text) => parse_num(Some(text), "length_m")?,
            None => geometry_length_m(&geom),
        };
        let osm_ids = match get("osm_ids").filter(|s| !s.is_empty()) {
            Some(text) => {
                let mut ids = Vec::new();
                for part in text.split(';') {
                    ids.push(parse_num::<i64>(Some(part), "osm_ids")?);
                }
                ids
            }
            None => Vec::new(),
        };
        let time_s = match get("time_s").filter(|s| !s.is_empty()) {
            Some(text) => Some(parse_num(Some(text), "time_s")?),
            None => None,
        };
        let mode = match get("mode").filter(|s| !s.is_empty()) {
            Some(text) => Some(TravelMode::from_str(text).map_err(|detail| {
                FormatError::Field {
                    field: "mode".to_string(),
                    detail,
                }
            })?),
            None => None,
        };
        let kind = match get("kind").filter(|s| !s.is_empty()) {
            Some(text) => EdgeKind::from_str(text).map_err(|detail| FormatError::Field {
                field: "kind".to_string(),
                detail,
            })?,
            None => EdgeKind::Legitimate,
        };
        let infra_type = get("infra_type")
            .filter(|s| !s.is_empty())
            .unwrap_or("unclassified")
            .to_string();

        g.add_edge(
            u,
            v,
            RoadEdge {
                osm_ids,
                infra_type,
                length_m,
                time_s,
                mode,
                kind,
                geom,
            },
        );
    }

    Ok(RoadGraph::from_parts(g))
}

fn geometry_length_m(geom: &EdgeGeometry) -> f64 {
    match geom {
        EdgeGeometry::Line(line) => geomath::line_length_m(line),
        EdgeGeometry::Pieces(pieces) => pieces.iter().map(geomath::line_length_m).sum(),
    }
}

fn header_map(reader: &mut csv::Reader<std::fs::File>) -> Result<FxHashMap<String, usize>> {
    let headers = reader.headers().context("Failed to read CSV header")?;
    Ok(headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
        .collect())
}

fn field<'r>(
    headers: &FxHashMap<String, usize>,
    record: &'r csv::StringRecord,
    col: &str,
) -> Option<&'r str> {
    headers.get(col).and_then(|&i| record.get(i)).map(str::trim)
}

fn parse_num<T: FromStr>(value: Option<&str>, field: &str) -> Result<T, FormatError> {
    let text = value.ok_or_else(|| FormatError::Field {
        field: field.to_string(),
        detail: "column missing".to_string(),
    })?;
    text.trim().parse::<T>().map_err(|_| FormatError::Field {
        field: field.to_string(),
        detail: format!("cannot parse '{text}'"),
    })
}
