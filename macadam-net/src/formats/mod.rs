//! Persisted network artifacts
//!
//! `save_network` writes the full artifact set for a named network:
//! `{name}_nodes.csv` and `{name}_edges.csv` (WKT geometry columns),
//! `{name}.graph` (binary snapshot with a CRC-64 footer), and optionally
//! `{name}.geojson` for visual inspection. Loaders exist for the snapshot
//! and for a nodes+edges CSV pair.

pub mod geojson_export;
pub mod snapshot;
pub mod tables;
pub mod wkt;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::graph::RoadGraph;

/// Decode-level failures callers may want to match on.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("bad magic {found:#010x}, expected {expected:#010x}")]
    BadMagic { found: u32, expected: u32 },

    #[error("unsupported snapshot version {0}")]
    BadVersion(u16),

    #[error("file truncated: need {needed} bytes, have {available}")]
    Truncated { needed: u64, available: u64 },

    #[error("checksum mismatch: stored {stored:#018x}, computed {computed:#018x}")]
    ChecksumMismatch { stored: u64, computed: u64 },

    #[error("snapshot body decode failed: {0}")]
    Body(String),

    #[error("malformed WKT: {0}")]
    Wkt(String),

    #[error("malformed field '{field}': {detail}")]
    Field { field: String, detail: String },
}

/// What `save_network` should write beyond the always-on artifact set.
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveOptions {
    pub geojson: bool,
}

/// Paths written by `save_network`.
#[derive(Debug)]
pub struct SavedArtifacts {
    pub nodes_csv: PathBuf,
    pub edges_csv: PathBuf,
    pub snapshot: PathBuf,
    pub geojson: Option<PathBuf>,
}

/// Write the artifact set for `name` under `dir`, creating `dir` if needed.
pub fn save_network(
    graph: &RoadGraph,
    name: &str,
    dir: &Path,
    opts: &SaveOptions,
) -> Result<SavedArtifacts> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let nodes_csv = dir.join(format!("{name}_nodes.csv"));
    let edges_csv = dir.join(format!("{name}_edges.csv"));
    let snapshot_path = dir.join(format!("{name}.graph"));

    tables::write_nodes_csv(graph, &nodes_csv)?;
    tables::write_edges_csv(graph, &edges_csv)?;
    snapshot::save(graph, &snapshot_path)?;

    let geojson = if opts.geojson {
        let path = dir.join(format!("{name}.geojson"));
        geojson_export::write_edges_geojson(graph, &path)?;
        Some(path)
    } else {
        None
    };

    Ok(SavedArtifacts {
        nodes_csv,
        edges_csv,
        snapshot: snapshot_path,
        geojson,
    })
}
