//! Binary graph snapshot
//!
//! Layout, all little-endian:
//!
//! ```text
//! [magic u32][version u16][reserved u16]
//! [node_count u64][edge_count u64][body_len u64]
//! [body: bincode SerializableNetwork]
//! [file_crc u64 over header + body]
//! ```
//!
//! Edges reference nodes by their dense ids, not graph indices, so a
//! snapshot stays valid across rebuilds of the in-memory graph.

use std::fs;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use crc::{Crc, CRC_64_GO_ISO};
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::formats::FormatError;
use crate::graph::{RoadEdge, RoadGraph, RoadNode};

pub const MAGIC: u32 = u32::from_le_bytes(*b"MDRG");
pub const VERSION: u16 = 1;

const HEADER_LEN: usize = 32;
const FOOTER_LEN: usize = 8;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

#[derive(Serialize, Deserialize)]
struct SerializableNetwork {
    nodes: Vec<RoadNode>,
    edges: Vec<(u64, u64, RoadEdge)>,
}

/// Counts read from a snapshot header after checksum verification.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotInfo {
    pub version: u16,
    pub node_count: u64,
    pub edge_count: u64,
    pub body_len: u64,
}

pub fn save(graph: &RoadGraph, path: &Path) -> Result<()> {
    let mut nodes: Vec<RoadNode> = graph.graph.node_weights().cloned().collect();
    nodes.sort_by_key(|n| n.id);

    let mut edges: Vec<(u64, u64, RoadEdge)> = graph
        .graph
        .edge_references()
        .map(|e| {
            (
                graph.graph[e.source()].id,
                graph.graph[e.target()].id,
                e.weight().clone(),
            )
        })
        .collect();
    edges.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    let net = SerializableNetwork { nodes, edges };
    let body = bincode::serialize(&net).context("Failed to serialize network body")?;

    let file = File::create(path)
        .with_context(|| format!("Failed to create snapshot {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut digest = CRC64.digest();

    fn write_bytes(
        writer: &mut BufWriter<File>,
        digest: &mut crc::Digest<'_, u64>,
        bytes: &[u8],
    ) -> std::io::Result<()> {
        writer.write_all(bytes)?;
        digest.update(bytes);
        Ok(())
    }

    write_bytes(&mut writer, &mut digest, &MAGIC.to_le_bytes())?;
    write_bytes(&mut writer, &mut digest, &VERSION.to_le_bytes())?;
    write_bytes(&mut writer, &mut digest, &0u16.to_le_bytes())?;
    write_bytes(
        &mut writer,
        &mut digest,
        &(net.nodes.len() as u64).to_le_bytes(),
    )?;
    write_bytes(
        &mut writer,
        &mut digest,
        &(net.edges.len() as u64).to_le_bytes(),
    )?;
    write_bytes(&mut writer, &mut digest, &(body.len() as u64).to_le_bytes())?;
    write_bytes(&mut writer, &mut digest, &body)?;

    let file_crc = digest.finalize();
    writer.write_all(&file_crc.to_le_bytes())?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush snapshot {}", path.display()))?;
    Ok(())
}

pub fn load(path: &Path) -> Result<RoadGraph> {
    let data = fs::read(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let net = decode(&data)
        .with_context(|| format!("Invalid snapshot {}", path.display()))?;

    let mut g: StableDiGraph<RoadNode, RoadEdge> = StableDiGraph::default();
    let mut index_of: FxHashMap<u64, petgraph::stable_graph::NodeIndex> = FxHashMap::default();
    for node in net.nodes {
        let id = node.id;
        let ix = g.add_node(node);
        index_of.insert(id, ix);
    }
    for (from, to, edge) in net.edges {
        let (Some(&u), Some(&v)) = (index_of.get(&from), index_of.get(&to)) else {
            return Err(FormatError::Field {
                field: "edge".to_string(),
                detail: format!("references missing node {from} or {to}"),
            }
            .into());
        };
        g.add_edge(u, v, edge);
    }
    Ok(RoadGraph::from_parts(g))
}

/// Check header and checksum without decoding the body.
pub fn verify(path: &Path) -> Result<SnapshotInfo> {
    let data = fs::read(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let info = check_envelope(&data)
        .with_context(|| format!("Invalid snapshot {}", path.display()))?;
    Ok(info)
}

fn decode(data: &[u8]) -> Result<SerializableNetwork, FormatError> {
    let info = check_envelope(data)?;
    let body = &data[HEADER_LEN..HEADER_LEN + info.body_len as usize];
    bincode::deserialize(body).map_err(|e| FormatError::Body(e.to_string()))
}

fn check_envelope(data: &[u8]) -> Result<SnapshotInfo, FormatError> {
    if data.len() < HEADER_LEN + FOOTER_LEN {
        return Err(FormatError::Truncated {
            needed: (HEADER_LEN + FOOTER_LEN) as u64,
            available: data.len() as u64,
        });
    }

    let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if magic != MAGIC {
        return Err(FormatError::BadMagic {
            found: magic,
            expected: MAGIC,
        });
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != VERSION {
        return Err(FormatError::BadVersion(version));
    }

    let node_count = u64::from_le_bytes(data[8..16].try_into().unwrap_or([0; 8]));
    let edge_count = u64::from_le_bytes(data[16..24].try_into().unwrap_or([0; 8]));
    let body_len = u64::from_le_bytes(data[24..32].try_into().unwrap_or([0; 8]));

    let expected_len = HEADER_LEN as u64 + body_len + FOOTER_LEN as u64;
    if data.len() as u64 != expected_len {
        return Err(FormatError::Truncated {
            needed: expected_len,
            available: data.len() as u64,
        });
    }

    let crc_offset = data.len() - FOOTER_LEN;
    let stored = u64::from_le_bytes(data[crc_offset..].try_into().unwrap_or([0; 8]));
    let computed = CRC64.checksum(&data[..crc_offset]);
    if stored != computed {
        return Err(FormatError::ChecksumMismatch { stored, computed });
    }

    Ok(SnapshotInfo {
        version,
        node_count,
        edge_count,
        body_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_graph, EdgeKind};
    use crate::roads::{RoadRow, RoadTable};
    use geo::LineString;
    use tempfile::NamedTempFile;

    fn sample_graph() -> RoadGraph {
        let rows = vec![
            RoadRow {
                osm_id: 100,
                infra_type: "primary".to_string(),
                refs: Vec::new(),
                geom: LineString::from(vec![(0.0, 0.0), (0.001, 0.0)]),
            },
            RoadRow {
                osm_id: 101,
                infra_type: "secondary".to_string(),
                refs: Vec::new(),
                geom: LineString::from(vec![(0.001, 0.0), (0.001, 0.001)]),
            },
        ];
        build_graph(&RoadTable { rows })
    }

    #[test]
    fn test_save_load_roundtrip() {
        let g = sample_graph();
        let tmp = NamedTempFile::new().unwrap();
        save(&g, tmp.path()).unwrap();

        let loaded = load(tmp.path()).unwrap();
        assert_eq!(loaded.node_count(), g.node_count());
        assert_eq!(loaded.edge_count(), g.edge_count());

        let edges = loaded.sample_edges(10);
        assert_eq!(edges[0].2.osm_ids, vec![100]);
        assert_eq!(edges[0].2.kind, EdgeKind::Legitimate);
        assert!(edges[0].2.length_m > 0.0);
    }

    #[test]
    fn test_verify_reports_counts() {
        let g = sample_graph();
        let tmp = NamedTempFile::new().unwrap();
        save(&g, tmp.path()).unwrap();

        let info = verify(tmp.path()).unwrap();
        assert_eq!(info.version, VERSION);
        assert_eq!(info.node_count, 3);
        assert_eq!(info.edge_count, 2);
    }

    #[test]
    fn test_corruption_is_detected() {
        let g = sample_graph();
        let tmp = NamedTempFile::new().unwrap();
        save(&g, tmp.path()).unwrap();

        let mut bytes = std::fs::read(tmp.path()).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        std::fs::write(tmp.path(), &bytes).unwrap();

        let err = verify(tmp.path()).unwrap_err();
        let format_err = err.downcast_ref::<FormatError>().unwrap();
        assert!(matches!(format_err, FormatError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_wrong_magic_is_rejected() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), vec![0u8; 64]).unwrap();
        let err = verify(tmp.path()).unwrap_err();
        let format_err = err.downcast_ref::<FormatError>().unwrap();
        assert!(matches!(format_err, FormatError::BadMagic { .. }));
    }
}
