//! Travel-time conversion
//!
//! Stamps every edge with a traversal time from its length and a per-class
//! speed table. Driving uses the table with a flat fallback for classes it
//! does not know; walking uses one speed everywhere. The length factor
//! rescales stored lengths first, for networks whose lengths were saved in
//! other units, and the rescaled length is written back.

use rustc_hash::FxHashMap;

use crate::graph::{RoadGraph, TravelMode};

/// Flat speed for road classes missing from the table, km/h.
pub const FALLBACK_DRIVE_KMH: f64 = 20.0;

/// Walking speed, km/h.
pub const WALK_KMH: f64 = 4.5;

/// Driving speeds in km/h by road class.
pub fn default_speeds() -> FxHashMap<&'static str, f64> {
    FxHashMap::from_iter([
        ("residential", 20.0),
        ("primary", 40.0),
        ("primary_link", 35.0),
        ("motorway", 50.0),
        ("motorway_link", 45.0),
        ("trunk", 40.0),
        ("trunk_link", 35.0),
        ("secondary", 30.0),
        ("secondary_link", 25.0),
        ("tertiary", 30.0),
        ("tertiary_link", 25.0),
        ("unclassified", 20.0),
    ])
}

/// What the conversion touched.
#[derive(Debug, Default)]
pub struct TimeStats {
    pub edges_converted: usize,
    /// Road classes that fell back to the flat speed, sorted, deduplicated.
    pub unknown_classes: Vec<String>,
}

/// Set `time_s` on every edge for the given mode.
pub fn convert_network_to_time(
    g: &mut RoadGraph,
    mode: TravelMode,
    factor: f64,
    speeds: &FxHashMap<&'static str, f64>,
) -> TimeStats {
    let mut stats = TimeStats::default();
    let mut unknown: Vec<String> = Vec::new();

    for edge in g.graph.edge_weights_mut() {
        let kmh = match mode {
            TravelMode::Walk => WALK_KMH,
            TravelMode::Drive => match speeds.get(edge.infra_type.as_str()) {
                Some(&s) => s,
                None => {
                    unknown.push(edge.infra_type.clone());
                    FALLBACK_DRIVE_KMH
                }
            },
        };
        let length_m = edge.length_m * factor;
        edge.length_m = length_m;
        edge.time_s = Some((length_m / 1000.0) / kmh * 3600.0);
        edge.mode = Some(mode);
        stats.edges_converted += 1;
    }

    unknown.sort_unstable();
    unknown.dedup();
    stats.unknown_classes = unknown;
    stats
}
