//! OSM extract reading
//!
//! One streaming pass over a `.osm.pbf` file: node coordinates (plain and
//! dense) land in an id map, highway-tagged ways are collected raw, and the
//! road table is assembled afterwards so ways can be dropped cleanly when
//! the extract is truncated. Ways are sorted by id before assembly, so the
//! table order is independent of block layout in the input file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use geo::LineString;
use osmpbf::{Element, ElementReader};
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};

use crate::roads::{RoadRow, RoadTable};

/// Counts accumulated while reading an extract.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParseCounts {
    pub nodes: u64,
    pub highway_ways: u64,
    /// Ways dropped because a node ref was absent from the extract.
    pub ways_missing_nodes: u64,
    /// Ways dropped because fewer than two distinct points remained.
    pub ways_too_short: u64,
}

/// Read an extract into a raw road table.
pub fn read_osm(path: &Path) -> Result<(RoadTable, ParseCounts)> {
    let reader = ElementReader::from_path(path)
        .with_context(|| format!("Failed to open PBF file {}", path.display()))?;

    let mut coords: FxHashMap<i64, (f64, f64)> = FxHashMap::default();
    let mut raw_ways: Vec<(i64, String, Vec<i64>)> = Vec::new();
    let mut counts = ParseCounts::default();

    reader
        .for_each(|element| match element {
            Element::Node(node) => {
                coords.insert(node.id(), (node.lon(), node.lat()));
                counts.nodes += 1;
            }
            Element::DenseNode(node) => {
                coords.insert(node.id(), (node.lon(), node.lat()));
                counts.nodes += 1;
            }
            Element::Way(way) => {
                if let Some(highway) = way.tags().find(|t| t.0 == "highway") {
                    raw_ways.push((
                        way.id(),
                        highway.1.to_ascii_lowercase(),
                        way.refs().collect(),
                    ));
                }
            }
            Element::Relation(_) => {}
        })
        .with_context(|| format!("Failed to parse PBF file {}", path.display()))?;

    if raw_ways.is_empty() {
        bail!(
            "No highway-tagged ways in {} (is this an OSM extract?)",
            path.display()
        );
    }
    counts.highway_ways = raw_ways.len() as u64;

    raw_ways.sort_by_key(|w| w.0);
    let rows = assemble_rows(&coords, raw_ways, &mut counts);
    Ok((RoadTable { rows }, counts))
}

/// Resolve way refs against the coordinate map, dropping ways the extract
/// cannot fully resolve and collapsing consecutive duplicate refs.
fn assemble_rows(
    coords: &FxHashMap<i64, (f64, f64)>,
    raw_ways: Vec<(i64, String, Vec<i64>)>,
    counts: &mut ParseCounts,
) -> Vec<RoadRow> {
    let mut rows = Vec::with_capacity(raw_ways.len());

    'ways: for (osm_id, infra_type, refs) in raw_ways {
        let mut kept_refs: Vec<i64> = Vec::with_capacity(refs.len());
        let mut pts: Vec<(f64, f64)> = Vec::with_capacity(refs.len());

        for r in refs {
            if kept_refs.last() == Some(&r) {
                continue;
            }
            let Some(&pt) = coords.get(&r) else {
                counts.ways_missing_nodes += 1;
                log::warn!("way {osm_id} references missing node {r}, dropping way");
                continue 'ways;
            };
            kept_refs.push(r);
            pts.push(pt);
        }

        if kept_refs.len() < 2 {
            counts.ways_too_short += 1;
            continue;
        }

        rows.push(RoadRow {
            osm_id,
            infra_type,
            refs: kept_refs,
            geom: LineString::from(pts),
        });
    }

    rows
}

/// SHA-256 of a file, streamed, for the run manifest.
pub fn compute_file_sha256(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} for hashing", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1 << 20];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
