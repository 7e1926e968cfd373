use geo::{Coord, Intersects, Point, Rect};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoringError};

/// Mean Earth radius used by every distance in the engine.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometres spanned by one degree of latitude on the reference sphere.
pub const KM_PER_DEGREE: f64 = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;

/// A validated WGS84 position.
///
/// Accepts either `{"lat": .., "lng": ..}` or `[lat, lng]` on the wire and
/// always serializes as the object form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CoordinateRepr")]
pub struct Coordinate {
    lat: f64,
    #[serde(rename = "lng")]
    lon: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CoordinateRepr {
    Object {
        lat: f64,
        #[serde(alias = "lon")]
        lng: f64,
    },
    Pair([f64; 2]),
}

impl TryFrom<CoordinateRepr> for Coordinate {
    type Error = ScoringError;

    fn try_from(repr: CoordinateRepr) -> Result<Self> {
        match repr {
            CoordinateRepr::Object { lat, lng } => Coordinate::new(lat, lng),
            CoordinateRepr::Pair([lat, lng]) => Coordinate::new(lat, lng),
        }
    }
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        let lat_ok = lat.is_finite() && (-90.0..=90.0).contains(&lat);
        let lon_ok = lon.is_finite() && (-180.0..=180.0).contains(&lon);
        if lat_ok && lon_ok {
            Ok(Self { lat, lon })
        } else {
            Err(ScoringError::InvalidCoordinate { lat, lon })
        }
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// GeoJSON / geo ordering: x = longitude, y = latitude.
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    pub(crate) fn to_xy(self) -> [f64; 2] {
        [self.lon, self.lat]
    }

    /// Inclusive containment test against a lon/lat rectangle.
    pub fn within(&self, bounds: &Rect<f64>) -> bool {
        bounds.intersects(&Coord { x: self.lon, y: self.lat })
    }
}

/// Great-circle distance in kilometres (haversine).
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Smallest lon/lat rectangle guaranteed to hold every position within
/// `margin_km` of any of `points`.
///
/// Returns `None` when the points are empty or the box would reach a pole or
/// wrap the antimeridian; callers then fall back to an unbounded query.
pub fn bounding_box(points: &[Coordinate], margin_km: f64) -> Option<Rect<f64>> {
    if points.is_empty() || !margin_km.is_finite() || margin_km < 0.0 {
        return None;
    }

    let (mut min_lat, mut max_lat) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_lon, mut max_lon) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in points {
        min_lat = min_lat.min(p.lat);
        max_lat = max_lat.max(p.lat);
        min_lon = min_lon.min(p.lon);
        max_lon = max_lon.max(p.lon);
    }

    // haversine distance is never shorter than the meridian arc, so the
    // latitude margin is exact; the longitude margin is doubled to stay
    // conservative after the cos(lat) shrink.
    let d_lat = margin_km / KM_PER_DEGREE * (1.0 + 1e-9) + 1e-12;
    let extreme_lat = min_lat.abs().max(max_lat.abs()) + d_lat;
    if extreme_lat >= 89.0 {
        return None;
    }
    let shrink = extreme_lat.to_radians().cos();
    let d_lon = 2.0 * d_lat / shrink;
    if d_lon > 90.0 || min_lon - d_lon < -180.0 || max_lon + d_lon > 180.0 {
        return None;
    }

    Some(Rect::new(
        Coord { x: min_lon - d_lon, y: min_lat - d_lat },
        Coord { x: max_lon + d_lon, y: max_lat + d_lat },
    ))
}
