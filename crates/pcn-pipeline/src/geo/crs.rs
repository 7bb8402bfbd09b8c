//! Coordinate reference systems and reprojection to WGS84.
//!
//! Only the systems Kenyan boundary exports actually arrive in are supported:
//! geographic WGS84, Web Mercator and the WGS84 UTM zones. Anything else is
//! rejected rather than guessed.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::f64::consts::PI;
use std::fmt;

/// WGS84 semi-major axis in metres.
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// UTM central meridian scale factor.
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A supported coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Crs {
    /// Longitude/latitude on WGS84 (EPSG:4326, OGC CRS84)
    Wgs84,
    /// Spherical Web Mercator (EPSG:3857)
    WebMercator,
    /// WGS84 / UTM zone (EPSG:326NN north, EPSG:327NN south)
    Utm { zone: u8, north: bool },
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Wgs84 => write!(f, "EPSG:4326"),
            Crs::WebMercator => write!(f, "EPSG:3857"),
            Crs::Utm { zone, north: true } => write!(f, "EPSG:{}", 32600 + *zone as u32),
            Crs::Utm { zone, north: false } => write!(f, "EPSG:{}", 32700 + *zone as u32),
        }
    }
}

impl Crs {
    /// Parse a CRS identifier such as `EPSG:3857`,
    /// `urn:ogc:def:crs:EPSG::32737` or `urn:ogc:def:crs:OGC:1.3:CRS84`.
    pub fn parse(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        let upper = trimmed.to_uppercase();
        if upper.ends_with("CRS84") || upper == "WGS84" {
            return Ok(Crs::Wgs84);
        }

        let code = upper
            .rsplit(':')
            .next()
            .and_then(|c| c.trim().parse::<u32>().ok())
            .ok_or_else(|| PipelineError::UnsupportedCrs(trimmed.to_string()))?;

        Self::from_epsg(code).ok_or_else(|| PipelineError::UnsupportedCrs(trimmed.to_string()))
    }

    /// Map an EPSG code to a supported CRS.
    pub fn from_epsg(code: u32) -> Option<Self> {
        match code {
            4326 => Some(Crs::Wgs84),
            3857 | 3785 | 900913 | 102100 | 102113 => Some(Crs::WebMercator),
            32601..=32660 => Some(Crs::Utm {
                zone: (code - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Some(Crs::Utm {
                zone: (code - 32700) as u8,
                north: false,
            }),
            _ => None,
        }
    }

    /// Read the `crs` member of a GeoJSON document. Absent means WGS84.
    pub fn from_geojson(doc: &Value) -> Result<Self> {
        let Some(crs) = doc.get("crs").filter(|c| !c.is_null()) else {
            return Ok(Crs::Wgs84);
        };

        let properties = crs.get("properties");
        if let Some(name) = properties.and_then(|p| p.get("name")).and_then(Value::as_str) {
            return Self::parse(name);
        }
        if let Some(code) = properties.and_then(|p| p.get("code")).and_then(Value::as_u64) {
            return Self::from_epsg(code as u32)
                .ok_or_else(|| PipelineError::UnsupportedCrs(format!("EPSG:{}", code)));
        }

        Err(PipelineError::UnsupportedCrs(crs.to_string()))
    }

    pub fn is_wgs84(&self) -> bool {
        matches!(self, Crs::Wgs84)
    }

    /// Convert one coordinate pair to `(longitude, latitude)` in degrees.
    pub fn to_wgs84(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Crs::Wgs84 => (x, y),
            Crs::WebMercator => web_mercator_to_wgs84(x, y),
            Crs::Utm { zone, north } => utm_to_wgs84(x, y, zone, north),
        }
    }

    /// Reproject every position of a GeoJSON geometry in place.
    ///
    /// `feature` is only used for error reporting. A null geometry is left alone.
    pub fn reproject_geometry(&self, geometry: &mut Value, feature: usize) -> Result<()> {
        if geometry.is_null() {
            return Ok(());
        }

        let invalid = |reason: String| PipelineError::InvalidGeometry { feature, reason };

        let kind = geometry
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("geometry has no type".to_string()))?
            .to_string();

        if kind == "GeometryCollection" {
            let members = geometry
                .get_mut("geometries")
                .and_then(Value::as_array_mut)
                .ok_or_else(|| invalid("GeometryCollection without geometries".to_string()))?;
            for member in members {
                self.reproject_geometry(member, feature)?;
            }
            return Ok(());
        }

        let coordinates = geometry
            .get_mut("coordinates")
            .ok_or_else(|| invalid(format!("{} without coordinates", kind)))?;
        self.reproject_positions(coordinates).map_err(invalid)
    }

    fn reproject_positions(&self, value: &mut Value) -> std::result::Result<(), String> {
        if !value.is_array() {
            return Err(format!("expected coordinate array, found {}", value));
        }
        let Some(items) = value.as_array_mut() else {
            return Ok(());
        };

        // A position is an array of numbers; anything else nests further.
        if items.first().is_some_and(Value::is_number) {
            if items.len() < 2 {
                return Err("position with fewer than two ordinates".to_string());
            }
            let x = items[0].as_f64().ok_or("non-numeric ordinate")?;
            let y = items[1].as_f64().ok_or("non-numeric ordinate")?;
            if self.is_wgs84() {
                return Ok(());
            }
            let (lon, lat) = self.to_wgs84(x, y);
            if !lon.is_finite() || !lat.is_finite() {
                return Err(format!("position ({}, {}) does not reproject", x, y));
            }
            items[0] = Value::from(lon);
            items[1] = Value::from(lat);
            return Ok(());
        }

        for item in items.iter_mut() {
            self.reproject_positions(item)?;
        }
        Ok(())
    }
}

fn web_mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / WGS84_A).to_degrees();
    let lat = (2.0 * (y / WGS84_A).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// Inverse transverse Mercator on the WGS84 ellipsoid (Snyder, series form).
fn utm_to_wgs84(easting: f64, northing: f64, zone: u8, north: bool) -> (f64, f64) {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let ep2 = e2 / (1.0 - e2);
    let sqrt_1_e2 = (1.0 - e2).sqrt();
    let e1 = (1.0 - sqrt_1_e2) / (1.0 + sqrt_1_e2);

    let x = easting - UTM_FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - UTM_FALSE_NORTHING_SOUTH
    };

    let m = y / UTM_K0;
    let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0));

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let n1 = WGS84_A / (1.0 - e2 * sin_phi1.powi(2)).sqrt();
    let t1 = tan_phi1.powi(2);
    let c1 = ep2 * cos_phi1.powi(2);
    let r1 = WGS84_A * (1.0 - e2) / (1.0 - e2 * sin_phi1.powi(2)).powf(1.5);
    let d = x / (n1 * UTM_K0);

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d.powi(2) / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1.powi(2) - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1.powi(2) - 252.0 * ep2
                    - 3.0 * c1.powi(2))
                    * d.powi(6)
                    / 720.0);

    let lon0 = (zone as f64) * 6.0 - 183.0;
    let lon = lon0
        + ((d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1.powi(2) + 8.0 * ep2 + 24.0 * t1.powi(2))
                * d.powi(5)
                / 120.0)
            / cos_phi1)
            .to_degrees();

    (lon, lat.to_degrees())
}
