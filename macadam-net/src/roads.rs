//! Raw road table
//!
//! The intermediate form between PBF parsing and graph construction: one row
//! per highway-tagged way (later, per way segment). Rows keep the original
//! node refs alongside the assembled geometry so junction splitting can work
//! on topology instead of coordinate matching.

use geo::LineString;
use rustc_hash::FxHashMap;

use crate::geomath;

/// One highway-tagged way, or one junction-to-junction segment of it.
#[derive(Debug, Clone)]
pub struct RoadRow {
    pub osm_id: i64,
    pub infra_type: String,
    /// Node refs aligned 1:1 with the geometry coordinates. Empty for rows
    /// synthesized by clipping, which are keyed by coordinate instead.
    pub refs: Vec<i64>,
    pub geom: LineString<f64>,
}

impl RoadRow {
    pub fn length_m(&self) -> f64 {
        geomath::line_length_m(&self.geom)
    }
}

/// Table of road rows plus the counts accumulated while producing it.
#[derive(Debug, Default)]
pub struct RoadTable {
    pub rows: Vec<RoadRow>,
}

impl RoadTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_length_m(&self) -> f64 {
        self.rows.iter().map(RoadRow::length_m).sum()
    }

    /// Keep only rows whose class is in `accepted` (already normalized to
    /// lowercase). Returns the number of rows dropped.
    pub fn filter_classes(&mut self, accepted: &[String]) -> usize {
        let before = self.rows.len();
        self.rows
            .retain(|row| accepted.iter().any(|c| c == &row.infra_type));
        before - self.rows.len()
    }

    /// Total length and row count per road class, longest classes first.
    pub fn class_lengths(&self) -> Vec<(String, f64, usize)> {
        let mut acc: FxHashMap<&str, (f64, usize)> = FxHashMap::default();
        for row in &self.rows {
            let entry = acc.entry(row.infra_type.as_str()).or_insert((0.0, 0));
            entry.0 += row.length_m();
            entry.1 += 1;
        }
        let mut out: Vec<(String, f64, usize)> = acc
            .into_iter()
            .map(|(class, (len, n))| (class.to_string(), len, n))
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1));
        out
    }

    /// Split every row at junction nodes.
    ///
    /// A junction is any node used more than once across the whole table
    /// (shared between ways, or revisited by one way), plus every row's
    /// first and last node. Each junction-to-junction run becomes its own
    /// row carrying the parent way's id and class. Rows without refs pass
    /// through unchanged.
    pub fn segmentize(&self) -> RoadTable {
        let mut use_count: FxHashMap<i64, u32> = FxHashMap::default();
        for row in &self.rows {
            for r in &row.refs {
                *use_count.entry(*r).or_insert(0) += 1;
            }
        }

        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            if row.refs.len() < 2 {
                rows.push(row.clone());
                continue;
            }
            let last = row.refs.len() - 1;
            let mut start = 0usize;
            for i in 1..=last {
                let is_junction = i == last || use_count[&row.refs[i]] > 1;
                if !is_junction {
                    continue;
                }
                rows.push(RoadRow {
                    osm_id: row.osm_id,
                    infra_type: row.infra_type.clone(),
                    refs: row.refs[start..=i].to_vec(),
                    geom: LineString::from(row.geom.0[start..=i].to_vec()),
                });
                start = i;
            }
        }
        RoadTable { rows }
    }
}
