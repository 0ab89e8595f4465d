//! Geometry unbundling
//!
//! The interstitial collapse leaves merged edges with their geometry as an
//! ordered list of parts. Here each list is chained back into one line by
//! matching part endpoints, dropping the duplicated joint coordinate. A
//! part may arrive flipped (clipping can do that), so a part whose far end
//! meets the chain is walked backwards. Lists that do not connect stay
//! multi-part rather than fabricating a joining segment.

use geo::{Coord, LineString};

use crate::graph::{EdgeGeometry, RoadGraph};

/// Joint match tolerance in degrees, well under coordinate precision.
const JOINT_TOL: f64 = 1e-9;

#[derive(Debug, Default, Clone, Copy)]
pub struct UnbundleStats {
    pub flattened: usize,
    pub left_multi: usize,
}

fn joins(a: Coord<f64>, b: Coord<f64>) -> bool {
    (a.x - b.x).abs() <= JOINT_TOL && (a.y - b.y).abs() <= JOINT_TOL
}

fn chain_pieces(pieces: &[LineString<f64>]) -> Option<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = Vec::new();
    for piece in pieces {
        let pts = &piece.0;
        if pts.len() < 2 {
            continue;
        }
        if coords.is_empty() {
            coords.extend_from_slice(pts);
            continue;
        }
        let end = *coords.last()?;
        if joins(end, pts[0]) {
            coords.extend_from_slice(&pts[1..]);
        } else if joins(end, *pts.last()?) {
            coords.extend(pts[..pts.len() - 1].iter().rev().copied());
        } else {
            return None;
        }
    }
    if coords.len() < 2 {
        return None;
    }
    Some(LineString::from(coords))
}

/// Flatten multi-part edge geometry into single lines where the parts
/// connect end to end.
pub fn unbundle_geometry(g: &mut RoadGraph) -> UnbundleStats {
    let mut stats = UnbundleStats::default();
    for edge in g.graph.edge_weights_mut() {
        let EdgeGeometry::Pieces(pieces) = &edge.geom else {
            continue;
        };
        match chain_pieces(pieces) {
            Some(line) => {
                edge.geom = EdgeGeometry::Line(line);
                stats.flattened += 1;
            }
            None => stats.left_multi += 1,
        }
    }
    stats
}
