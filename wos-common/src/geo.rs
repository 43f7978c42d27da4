//! WGS84 geographic point
//!
//! Points are persisted as EWKT text (`SRID=4326;POINT(<lon> <lat>)`), longitude
//! first. Coordinates are formatted with Rust's shortest round-trip float
//! representation, so `parse_ewkt(to_ewkt(p)) == p` for every finite point.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Spatial reference system identifier for WGS84
pub const SRID_WGS84: i32 = 4326;

/// Mean earth radius in meters (IUGG)
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Geographic point (latitude/longitude in degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

/// Axis-aligned lat/lon box, used to prefilter proximity queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    /// `None` when the box touches a pole and longitude cannot be bounded
    pub lon_range: Option<(f64, f64)>,
}

impl Location {
    /// Create a validated point
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(Error::Validation(format!("latitude out of range: {}", lat)));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(Error::Validation(format!("longitude out of range: {}", lon)));
        }
        Ok(Self { lat, lon })
    }

    /// Construct from `(longitude, latitude)`, the geometry axis order
    pub fn from_lon_lat(lon: f64, lat: f64) -> Result<Self> {
        Self::new(lat, lon)
    }

    /// Encode as EWKT
    pub fn to_ewkt(&self) -> String {
        format!("SRID={};POINT({} {})", SRID_WGS84, self.lon, self.lat)
    }

    /// Decode EWKT produced by [`Location::to_ewkt`]
    ///
    /// Plain WKT (`POINT(lon lat)`) is accepted and assumed to be WGS84.
    pub fn parse_ewkt(text: &str) -> Result<Self> {
        let text = text.trim();
        let wkt = match text.split_once(';') {
            Some((srid, rest)) => {
                let srid = srid
                    .trim()
                    .strip_prefix("SRID=")
                    .and_then(|s| s.parse::<i32>().ok())
                    .ok_or_else(|| Error::Validation(format!("invalid SRID in '{}'", text)))?;
                if srid != SRID_WGS84 {
                    return Err(Error::Validation(format!(
                        "unsupported SRID {} (expected {})",
                        srid, SRID_WGS84
                    )));
                }
                rest.trim()
            }
            None => text,
        };

        let coords = wkt
            .strip_prefix("POINT")
            .map(str::trim)
            .and_then(|s| s.strip_prefix('('))
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| Error::Validation(format!("not a POINT: '{}'", text)))?;

        let mut parts = coords.split_whitespace();
        let (lon, lat) = match (parts.next(), parts.next(), parts.next()) {
            (Some(lon), Some(lat), None) => (lon, lat),
            _ => return Err(Error::Validation(format!("POINT needs two coordinates: '{}'", text))),
        };
        let lon = lon
            .parse::<f64>()
            .map_err(|e| Error::Validation(format!("invalid longitude '{}': {}", lon, e)))?;
        let lat = lat
            .parse::<f64>()
            .map_err(|e| Error::Validation(format!("invalid latitude '{}': {}", lat, e)))?;

        Self::from_lon_lat(lon, lat)
    }

    /// Great-circle (haversine) distance in meters
    pub fn distance_meters(&self, other: &Location) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
    }

    /// True when `other` lies within `radius_meters` of this point
    pub fn within(&self, other: &Location, radius_meters: f64) -> bool {
        self.distance_meters(other) <= radius_meters
    }

    /// Conservative bounding box containing every point within `radius_meters`
    pub fn bounding_box(&self, radius_meters: f64) -> BoundingBox {
        // 10% slack keeps the box a superset of the spherical disc
        let dlat = radius_meters / METERS_PER_DEGREE_LAT * 1.1;
        let min_lat = (self.lat - dlat).max(-90.0);
        let max_lat = (self.lat + dlat).min(90.0);

        let cos_lat = min_lat.to_radians().cos().min(max_lat.to_radians().cos());
        let lon_range = if cos_lat < 1e-6 {
            None
        } else {
            let dlon = dlat / cos_lat;
            if dlon >= 180.0 || self.lon - dlon < -180.0 || self.lon + dlon > 180.0 {
                // Antimeridian crossing: fall back to the latitude band only
                None
            } else {
                Some((self.lon - dlon, self.lon + dlon))
            }
        };

        BoundingBox {
            min_lat,
            max_lat,
            lon_range,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ewkt())
    }
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_ewkt(s)
    }
}
