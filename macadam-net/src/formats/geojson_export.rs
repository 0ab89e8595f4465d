//! GeoJSON edge export
//!
//! A FeatureCollection of edge geometries with the edge attributes as
//! properties, for dropping onto any map viewer. Not part of the loadable
//! artifact set; the CSV tables and the snapshot are the round-trip formats.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue};
use petgraph::visit::EdgeRef;

use crate::graph::{EdgeGeometry, RoadEdge, RoadGraph};

pub fn write_edges_geojson(graph: &RoadGraph, path: &Path) -> Result<()> {
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

    let features: Vec<Feature> = edges
        .into_iter()
        .map(|(from, to, edge)| edge_feature(from, to, edge))
        .collect();

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };

    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), &collection)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn edge_feature(from: u64, to: u64, edge: &RoadEdge) -> Feature {
    let value = match &edge.geom {
        EdgeGeometry::Line(line) => geojson::Value::from(line),
        EdgeGeometry::Pieces(pieces) => {
            geojson::Value::from(&geo::MultiLineString(pieces.clone()))
        }
    };

    let mut properties = JsonObject::new();
    properties.insert("stnode".to_string(), JsonValue::from(from));
    properties.insert("endnode".to_string(), JsonValue::from(to));
    properties.insert(
        "osm_ids".to_string(),
        JsonValue::from(
            edge.osm_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<String>>()
                .join(";"),
        ),
    );
    properties.insert(
        "infra_type".to_string(),
        JsonValue::from(edge.infra_type.clone()),
    );
    properties.insert("length_m".to_string(), JsonValue::from(edge.length_m));
    if let Some(t) = edge.time_s {
        properties.insert("time_s".to_string(), JsonValue::from(t));
    }
    if let Some(m) = edge.mode {
        properties.insert("mode".to_string(), JsonValue::from(m.to_string()));
    }
    properties.insert("kind".to_string(), JsonValue::from(edge.kind.to_string()));

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}
