//! Geodetic <-> projected-plane coordinate conversion
//!
//! The engine only needs a bidirectional converter between longitude/latitude
//! degrees (EPSG:4326) and a metric plane. The plane used by the operator map
//! is spherical Web Mercator (EPSG:3857).

use crate::error::{MeasureError, MeasureResult};
use crate::geometry::{GeoPoint, Point2D};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::fmt;
use std::str::FromStr;

/// Sphere radius used by EPSG:3857, in metres
pub const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Bidirectional geodetic/projected converter
///
/// Implementations are stateless; both directions are mutual inverses up to
/// the precision of the projection.
pub trait CoordinateConverter: Send + Sync {
    /// Project a geodetic point onto the plane
    fn to_projected(&self, geo: GeoPoint) -> MeasureResult<Point2D>;

    /// Inverse-project a planar point back to geodetic degrees
    fn to_geo(&self, point: Point2D) -> MeasureResult<GeoPoint>;
}

/// Named coordinate reference systems understood by [`transform`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Crs {
    /// WGS 84 longitude/latitude in degrees
    Wgs84,
    /// Spherical Web Mercator in metres
    WebMercator,
}

impl Crs {
    /// EPSG code string for this CRS
    pub fn code(&self) -> &'static str {
        match self {
            Crs::Wgs84 => "EPSG:4326",
            Crs::WebMercator => "EPSG:3857",
        }
    }

    /// Whether coordinates are longitude/latitude degrees rather than metres
    pub fn is_geodetic(&self) -> bool {
        matches!(self, Crs::Wgs84)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Crs {
    type Err = MeasureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EPSG:4326" | "WGS84" => Ok(Crs::Wgs84),
            // The local image plane shares the Web Mercator definition.
            "EPSG:3857" | "EPSG:3857:LOCAL" | "EPSG:900913" => Ok(Crs::WebMercator),
            other => Err(MeasureError::InvalidInput(format!("unknown CRS: {other}"))),
        }
    }
}

/// Spherical Web Mercator projection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WebMercator {
    radius: f64,
}

impl Default for WebMercator {
    fn default() -> Self {
        Self { radius: WEB_MERCATOR_RADIUS }
    }
}

impl WebMercator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Half the width of the projected world, in metres
    pub fn half_world_width(&self) -> f64 {
        PI * self.radius
    }
}

impl CoordinateConverter for WebMercator {
    fn to_projected(&self, geo: GeoPoint) -> MeasureResult<Point2D> {
        if !geo.lon.is_finite() || !geo.lat.is_finite() {
            return Err(MeasureError::InvalidCoordinate(format!(
                "non-finite geodetic coordinate ({}, {})",
                geo.lon, geo.lat
            )));
        }
        if geo.lon.abs() > 180.0 {
            return Err(MeasureError::InvalidCoordinate(format!(
                "longitude {} outside [-180, 180]",
                geo.lon
            )));
        }
        // The poles project to infinity on a Mercator plane.
        if geo.lat.abs() >= 90.0 {
            return Err(MeasureError::InvalidCoordinate(format!(
                "latitude {} outside (-90, 90)",
                geo.lat
            )));
        }

        let x = self.radius * geo.lon.to_radians();
        let y = self.radius * (FRAC_PI_4 + geo.lat.to_radians() / 2.0).tan().ln();
        Ok(Point2D::new(x, y))
    }

    fn to_geo(&self, point: Point2D) -> MeasureResult<GeoPoint> {
        if !point.is_finite() {
            return Err(MeasureError::InvalidCoordinate(format!(
                "non-finite projected coordinate ({}, {})",
                point.x, point.y
            )));
        }
        if point.x.abs() > self.half_world_width() {
            return Err(MeasureError::InvalidCoordinate(format!(
                "easting {} outside the projected world",
                point.x
            )));
        }

        let lon = (point.x / self.radius).to_degrees();
        let lat = (2.0 * (point.y / self.radius).exp().atan() - FRAC_PI_2).to_degrees();
        Ok(GeoPoint::new(lon, lat))
    }
}

/// Convert raw coordinates between two named CRSs
///
/// Geodetic input is `[lon, lat]`; projected input is `[x, y]`.
pub fn transform(from: Crs, to: Crs, coords: [f64; 2]) -> MeasureResult<[f64; 2]> {
    if from == to {
        return Ok(coords);
    }

    let projection = WebMercator::default();
    if from.is_geodetic() {
        let p = projection.to_projected(GeoPoint::new(coords[0], coords[1]))?;
        Ok([p.x, p.y])
    } else {
        let g = projection.to_geo(Point2D::from(coords))?;
        Ok([g.lon, g.lat])
    }
}
