//! WKT geometry columns
//!
//! The CSV tables carry geometry as WKT text. Only the three productions
//! the toolkit writes are supported: POINT for nodes, LINESTRING for edge
//! lines, and MULTILINESTRING for not-yet-unbundled piece lists. Numbers
//! are written with Rust's shortest round-trip float formatting.

use geo::{Coord, LineString};

use crate::formats::FormatError;
use crate::graph::EdgeGeometry;

pub fn format_point(c: Coord<f64>) -> String {
    format!("POINT ({} {})", c.x, c.y)
}

pub fn format_linestring(line: &LineString<f64>) -> String {
    format!("LINESTRING ({})", coord_list(line))
}

/// WKT for an edge geometry: LINESTRING for a single line, MULTILINESTRING
/// for pieces.
pub fn format_geometry(geom: &EdgeGeometry) -> String {
    match geom {
        EdgeGeometry::Line(line) => format_linestring(line),
        EdgeGeometry::Pieces(pieces) => {
            let parts: Vec<String> = pieces
                .iter()
                .map(|l| format!("({})", coord_list(l)))
                .collect();
            format!("MULTILINESTRING ({})", parts.join(", "))
        }
    }
}

fn coord_list(line: &LineString<f64>) -> String {
    line.0
        .iter()
        .map(|c| format!("{} {}", c.x, c.y))
        .collect::<Vec<String>>()
        .join(", ")
}

pub fn parse_point(text: &str) -> Result<Coord<f64>, FormatError> {
    let inner = strip_tag(text, "POINT")?;
    parse_coord(inner.trim())
}

pub fn parse_linestring(text: &str) -> Result<LineString<f64>, FormatError> {
    let inner = strip_tag(text, "LINESTRING")?;
    parse_coord_list(inner)
}

/// Parse either LINESTRING or MULTILINESTRING into an edge geometry.
pub fn parse_geometry(text: &str) -> Result<EdgeGeometry, FormatError> {
    let trimmed = text.trim();
    let upper = trimmed.to_ascii_uppercase();
    if upper.starts_with("MULTILINESTRING") {
        let inner = strip_tag(trimmed, "MULTILINESTRING")?;
        let mut pieces = Vec::new();
        for group in split_groups(inner)? {
            pieces.push(parse_coord_list(&group)?);
        }
        if pieces.is_empty() {
            return Err(FormatError::Wkt(format!(
                "MULTILINESTRING without members: '{trimmed}'"
            )));
        }
        Ok(EdgeGeometry::Pieces(pieces))
    } else {
        Ok(EdgeGeometry::Line(parse_linestring(trimmed)?))
    }
}

/// Strip `TAG ( ... )`, returning the inner text.
fn strip_tag<'a>(text: &'a str, tag: &str) -> Result<&'a str, FormatError> {
    let trimmed = text.trim();
    let upper = trimmed.to_ascii_uppercase();
    if !upper.starts_with(tag) {
        return Err(FormatError::Wkt(format!(
            "expected {tag}, got '{trimmed}'"
        )));
    }
    let rest = trimmed[tag.len()..].trim_start();
    if !rest.starts_with('(') || !rest.ends_with(')') {
        return Err(FormatError::Wkt(format!(
            "missing parentheses in '{trimmed}'"
        )));
    }
    Ok(&rest[1..rest.len() - 1])
}

/// Split `(a), (b), ...` members of a MULTILINESTRING body.
fn split_groups(inner: &str) -> Result<Vec<String>, FormatError> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in inner.chars() {
        match ch {
            '(' => {
                depth += 1;
                if depth > 1 {
                    current.push(ch);
                }
            }
            ')' => {
                if depth == 0 {
                    return Err(FormatError::Wkt(format!(
                        "unbalanced parentheses in '{inner}'"
                    )));
                }
                depth -= 1;
                if depth == 0 {
                    groups.push(std::mem::take(&mut current));
                } else {
                    current.push(ch);
                }
            }
            _ => {
                if depth > 0 {
                    current.push(ch);
                }
            }
        }
    }
    if depth != 0 {
        return Err(FormatError::Wkt(format!(
            "unbalanced parentheses in '{inner}'"
        )));
    }
    Ok(groups)
}

fn parse_coord_list(inner: &str) -> Result<LineString<f64>, FormatError> {
    let mut coords = Vec::new();
    for part in inner.split(',') {
        coords.push(parse_coord(part.trim())?);
    }
    if coords.len() < 2 {
        return Err(FormatError::Wkt(format!(
            "line needs at least 2 coordinates, got {}",
            coords.len()
        )));
    }
    Ok(LineString::from(coords))
}

fn parse_coord(text: &str) -> Result<Coord<f64>, FormatError> {
    let mut nums = text.split_whitespace();
    let x = nums
        .next()
        .and_then(|t| t.parse::<f64>().ok())
        .ok_or_else(|| FormatError::Wkt(format!("bad coordinate '{text}'")))?;
    let y = nums
        .next()
        .and_then(|t| t.parse::<f64>().ok())
        .ok_or_else(|| FormatError::Wkt(format!("bad coordinate '{text}'")))?;
    // A trailing Z/M dimension would be silently lost; reject it instead.
    if nums.next().is_some() {
        return Err(FormatError::Wkt(format!(
            "only 2D coordinates supported, got '{text}'"
        )));
    }
    Ok(Coord { x, y })
}
