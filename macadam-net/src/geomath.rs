//! Distance and projection math
//!
//! Stored geometry is always lon/lat WGS84. Distances along geometry use
//! haversine on the mean Earth radius; the simplification passes that need
//! planar coordinates (clustering, centroids) go through [`Projection`],
//! a small built-in set sufficient for measuring: identity geographic,
//! spherical web-Mercator, and spherical transverse Mercator for UTM zones
//! with the central meridian derived from the zone number.

use geo::{Coord, HaversineDistance, HaversineLength, LineString, Point};
use macadam_common::{Error, Result};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// WGS84 semi-major axis, the sphere radius of web-Mercator.
const WEB_MERCATOR_RADIUS_M: f64 = 6_378_137.0;

/// UTM scale factor at the central meridian.
const UTM_K0: f64 = 0.9996;

const UTM_FALSE_EASTING_M: f64 = 500_000.0;
const UTM_FALSE_NORTHING_M: f64 = 10_000_000.0;

/// Haversine distance in meters between two lon/lat coordinates.
pub fn haversine_m(a: Coord<f64>, b: Coord<f64>) -> f64 {
    Point::from(a).haversine_distance(&Point::from(b))
}

/// Haversine length in meters of a lon/lat line.
pub fn line_length_m(line: &LineString<f64>) -> f64 {
    line.haversine_length()
}

/// Hashable key for a coordinate rounded to 10 decimal places.
///
/// Ten decimals of a degree is ~10 micrometers on the ground, far below
/// OSM precision, so distinct junctions never collide while float noise
/// from clipping and reversal does.
pub fn coord_key(c: Coord<f64>) -> (i64, i64) {
    ((c.x * 1e10).round() as i64, (c.y * 1e10).round() as i64)
}

/// Point at `dist_m` along the line, measured by haversine.
///
/// Clamps to the endpoints when `dist_m` falls outside the line.
pub fn interpolate_along(line: &LineString<f64>, dist_m: f64) -> Coord<f64> {
    let coords = &line.0;
    if coords.is_empty() {
        return Coord { x: 0.0, y: 0.0 };
    }
    if dist_m <= 0.0 {
        return coords[0];
    }
    let mut remaining = dist_m;
    for pair in coords.windows(2) {
        let seg = haversine_m(pair[0], pair[1]);
        if seg > 0.0 && remaining <= seg {
            let t = remaining / seg;
            return Coord {
                x: pair[0].x + (pair[1].x - pair[0].x) * t,
                y: pair[0].y + (pair[1].y - pair[0].y) * t,
            };
        }
        remaining -= seg;
    }
    coords[coords.len() - 1]
}

/// Cut a line at `dist_m`, returning the part before and the part after.
///
/// Both parts share the interpolated cut point. A cut at or beyond either
/// end returns the whole line on that side and a degenerate stub on the
/// other, so callers should bound `dist_m` first.
pub fn cut_line(line: &LineString<f64>, dist_m: f64) -> (LineString<f64>, LineString<f64>) {
    let coords = &line.0;
    let mut before: Vec<Coord<f64>> = Vec::new();
    let mut after: Vec<Coord<f64>> = Vec::new();
    let mut remaining = dist_m;
    let mut cut_done = false;

    for (i, pair) in coords.windows(2).enumerate() {
        if i == 0 {
            before.push(pair[0]);
        }
        if cut_done {
            after.push(pair[1]);
            continue;
        }
        let seg = haversine_m(pair[0], pair[1]);
        if seg > 0.0 && remaining <= seg {
            let t = remaining / seg;
            let cut = Coord {
                x: pair[0].x + (pair[1].x - pair[0].x) * t,
                y: pair[0].y + (pair[1].y - pair[0].y) * t,
            };
            before.push(cut);
            after.push(cut);
            after.push(pair[1]);
            cut_done = true;
        } else {
            remaining -= seg;
            before.push(pair[1]);
        }
    }

    if !cut_done {
        // Cut beyond the end: everything lands in `before`.
        let last = coords[coords.len() - 1];
        after.push(last);
        after.push(last);
    }

    (LineString::from(before), LineString::from(after))
}

/// Planar projection selected by EPSG code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// epsg:4326, degrees passed through untouched.
    Geographic,
    /// epsg:3857, spherical web-Mercator in meters.
    Mercator,
    /// epsg:326xx/327xx, spherical transverse Mercator for one UTM zone.
    TransverseMercator {
        central_meridian_rad: f64,
        south: bool,
    },
}

impl Projection {
    pub fn from_epsg(code: u32) -> Result<Self> {
        match code {
            4326 => Ok(Projection::Geographic),
            3857 => Ok(Projection::Mercator),
            32601..=32660 | 32701..=32760 => {
                let south = code >= 32701;
                let zone = if south { code - 32700 } else { code - 32600 };
                let central_meridian_deg = f64::from(zone) * 6.0 - 183.0;
                Ok(Projection::TransverseMercator {
                    central_meridian_rad: central_meridian_deg.to_radians(),
                    south,
                })
            }
            other => Err(Error::UnsupportedCrs(other)),
        }
    }

    /// Whether coordinates in this projection are meters.
    pub fn is_projected(&self) -> bool {
        !matches!(self, Projection::Geographic)
    }

    /// lon/lat degrees to projection coordinates.
    pub fn project(&self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Projection::Geographic => c,
            Projection::Mercator => {
                let lon = c.x.to_radians();
                let lat = c.y.to_radians();
                Coord {
                    x: WEB_MERCATOR_RADIUS_M * lon,
                    y: WEB_MERCATOR_RADIUS_M * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
                }
            }
            Projection::TransverseMercator {
                central_meridian_rad,
                south,
            } => {
                let lon = c.x.to_radians();
                let lat = c.y.to_radians();
                let b = lat.cos() * (lon - central_meridian_rad).sin();
                let x = UTM_K0 * EARTH_RADIUS_M * b.atanh() + UTM_FALSE_EASTING_M;
                let mut y = UTM_K0 * EARTH_RADIUS_M * (lat.tan() / (lon - central_meridian_rad).cos()).atan();
                if *south {
                    y += UTM_FALSE_NORTHING_M;
                }
                Coord { x, y }
            }
        }
    }

    /// Projection coordinates back to lon/lat degrees.
    pub fn unproject(&self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Projection::Geographic => c,
            Projection::Mercator => {
                let lon = c.x / WEB_MERCATOR_RADIUS_M;
                let lat = 2.0 * (c.y / WEB_MERCATOR_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2;
                Coord {
                    x: lon.to_degrees(),
                    y: lat.to_degrees(),
                }
            }
            Projection::TransverseMercator {
                central_meridian_rad,
                south,
            } => {
                let x = (c.x - UTM_FALSE_EASTING_M) / (UTM_K0 * EARTH_RADIUS_M);
                let mut y = c.y;
                if *south {
                    y -= UTM_FALSE_NORTHING_M;
                }
                let d = y / (UTM_K0 * EARTH_RADIUS_M);
                let lat = (d.sin() / x.cosh()).asin();
                let lon = central_meridian_rad + (x.sinh() / d.cos()).atan();
                Coord {
                    x: lon.to_degrees(),
                    y: lat.to_degrees(),
                }
            }
        }
    }

    /// Planar distance between two already-projected coordinates.
    pub fn planar_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
        (a.x - b.x).hypot(a.y - b.y)
    }
}

/// Centroid of a coordinate set in projected space, returned in lon/lat.
pub fn projected_centroid(proj: &Projection, coords: &[Coord<f64>]) -> Coord<f64> {
    let n = coords.len() as f64;
    let mut sx = 0.0;
    let mut sy = 0.0;
    for c in coords {
        let p = proj.project(*c);
        sx += p.x;
        sy += p.y;
    }
    proj.unproject(Coord { x: sx / n, y: sy / n })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude at the equator.
        let d = haversine_m(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 1.0 });
        assert!(close(d, 111_195.0, 100.0), "got {d}");
    }

    #[test]
    fn test_line_length_sums_segments() {
        let line = LineString::from(vec![(0.0, 0.0), (0.001, 0.0), (0.001, 0.001)]);
        let parts = haversine_m(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.001, y: 0.0 })
            + haversine_m(Coord { x: 0.001, y: 0.0 }, Coord { x: 0.001, y: 0.001 });
        assert!(close(line_length_m(&line), parts, 1e-6));
    }

    #[test]
    fn test_coord_key_rounds_noise() {
        let a = Coord { x: 10.123456789012, y: -5.5 };
        let b = Coord { x: 10.123456789049, y: -5.5 };
        assert_eq!(coord_key(a), coord_key(b));
        let c = Coord { x: 10.1234567895, y: -5.5 };
        assert_ne!(coord_key(a), coord_key(c));
    }

    #[test]
    fn test_interpolate_midpoint() {
        let line = LineString::from(vec![(0.0, 0.0), (0.002, 0.0)]);
        let total = line_length_m(&line);
        let mid = interpolate_along(&line, total / 2.0);
        assert!(close(mid.x, 0.001, 1e-9));
        assert!(close(mid.y, 0.0, 1e-12));
    }

    #[test]
    fn test_cut_line_preserves_length() {
        let line = LineString::from(vec![(0.0, 0.0), (0.001, 0.0), (0.003, 0.0)]);
        let total = line_length_m(&line);
        let (a, b) = cut_line(&line, total * 0.4);
        assert!(close(line_length_m(&a), total * 0.4, 0.01));
        assert!(close(line_length_m(&b), total * 0.6, 0.01));
        assert_eq!(a.0.last(), b.0.first());
    }

    #[test]
    fn test_utm_roundtrip_and_scale() {
        // Zone 29N covers Liberia.
        let proj = Projection::from_epsg(32629).unwrap();
        let monrovia = Coord { x: -10.8, y: 6.3 };
        let p = proj.project(monrovia);
        let back = proj.unproject(p);
        assert!(close(back.x, monrovia.x, 1e-9));
        assert!(close(back.y, monrovia.y, 1e-9));

        // A ~1 km offset measures ~1 km in the plane.
        let east = Coord { x: -10.791, y: 6.3 };
        let planar = Projection::planar_distance(p, proj.project(east));
        let sphere = haversine_m(monrovia, east);
        assert!(
            (planar - sphere).abs() / sphere < 0.005,
            "planar {planar} vs sphere {sphere}"
        );
    }

    #[test]
    fn test_southern_zone_has_false_northing() {
        let proj = Projection::from_epsg(32735).unwrap();
        let p = proj.project(Coord { x: 27.0, y: -26.0 });
        assert!(p.y > 0.0);
        let back = proj.unproject(p);
        assert!(close(back.y, -26.0, 1e-9));
    }

    #[test]
    fn test_mercator_roundtrip() {
        let proj = Projection::from_epsg(3857).unwrap();
        let c = Coord { x: 12.5, y: 41.9 };
        let back = proj.unproject(proj.project(c));
        assert!(close(back.x, c.x, 1e-9));
        assert!(close(back.y, c.y, 1e-9));
    }

    #[test]
    fn test_unsupported_epsg() {
        assert!(Projection::from_epsg(2154).is_err());
        assert!(Projection::from_epsg(32661).is_err());
    }

    #[test]
    fn test_projected_centroid_midpoint() {
        let proj = Projection::from_epsg(32629).unwrap();
        let c = projected_centroid(
            &proj,
            &[Coord { x: -10.80, y: 6.30 }, Coord { x: -10.79, y: 6.30 }],
        );
        assert!(close(c.x, -10.795, 1e-6));
        assert!(close(c.y, 6.30, 1e-6));
    }
}
