//! Area-of-interest clipping
//!
//! The AOI is a polygon or multipolygon read from GeoJSON. Clipping runs on
//! the segmented road table, before graph construction: rows fully inside
//! pass through with their node refs intact, rows crossing the boundary are
//! replaced by their inside pieces (new endpoints exactly on the boundary),
//! rows outside are dropped.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use geo::{BooleanOps, Intersects, MultiLineString, MultiPolygon};
use geojson::GeoJson;

use crate::geomath;
use crate::roads::{RoadRow, RoadTable};

/// Pieces shorter than this are boundary-touch artifacts, not roads.
const MIN_PIECE_M: f64 = 0.01;

/// Read the AOI polygon from a GeoJSON file.
///
/// Accepts a FeatureCollection (first polygonal feature wins), a bare
/// Feature, or a bare Geometry document. Anything without a polygonal
/// geometry is an error.
pub fn load_aoi(path: &Path) -> Result<MultiPolygon<f64>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read AOI {}", path.display()))?;
    let geojson: GeoJson = text
        .parse()
        .with_context(|| format!("Invalid GeoJSON in {}", path.display()))?;

    let geometries: Vec<geojson::Geometry> = match geojson {
        GeoJson::FeatureCollection(fc) => {
            fc.features.into_iter().filter_map(|f| f.geometry).collect()
        }
        GeoJson::Feature(f) => f.geometry.into_iter().collect(),
        GeoJson::Geometry(g) => vec![g],
    };

    for geometry in geometries {
        match geo::Geometry::<f64>::try_from(geometry) {
            Ok(geo::Geometry::Polygon(p)) => return Ok(MultiPolygon(vec![p])),
            Ok(geo::Geometry::MultiPolygon(mp)) => return Ok(mp),
            _ => continue,
        }
    }
    bail!(
        "No polygon or multipolygon found in AOI {}",
        path.display()
    );
}

/// Counts from one clip run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClipStats {
    pub kept_whole: usize,
    pub split: usize,
    pub pieces_added: usize,
    pub dropped: usize,
}

/// Clip the table to the AOI.
pub fn clip_table(table: &RoadTable, aoi: &MultiPolygon<f64>) -> (RoadTable, ClipStats) {
    let mut rows = Vec::with_capacity(table.rows.len());
    let mut stats = ClipStats::default();

    for row in &table.rows {
        if !aoi.intersects(&row.geom) {
            stats.dropped += 1;
            continue;
        }

        let clipped = aoi.clip(&MultiLineString(vec![row.geom.clone()]), false);
        let pieces: Vec<geo::LineString<f64>> = clipped
            .0
            .into_iter()
            .filter(|l| l.0.len() >= 2 && geomath::line_length_m(l) > MIN_PIECE_M)
            .collect();

        if pieces.is_empty() {
            // Touches the boundary without entering: clip leaves nothing.
            stats.dropped += 1;
            continue;
        }

        let original_len = row.length_m();
        let clipped_len: f64 = pieces.iter().map(geomath::line_length_m).sum();
        let whole = pieces.len() == 1 && (original_len - clipped_len).abs() < 1e-6;

        if whole {
            stats.kept_whole += 1;
            rows.push(row.clone());
        } else {
            stats.split += 1;
            stats.pieces_added += pieces.len();
            for piece in pieces {
                rows.push(RoadRow {
                    osm_id: row.osm_id,
                    infra_type: row.infra_type.clone(),
                    refs: Vec::new(),
                    geom: piece,
                });
            }
        }
    }

    (RoadTable { rows }, stats)
}
