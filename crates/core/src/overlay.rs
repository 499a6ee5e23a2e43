//! Placement of a raw photo on the map
//!
//! The photo is laid on the projected plane centred on the origin at one
//! metre per pixel, so that clicked map positions project straight back into
//! photo-relative coordinates.

use crate::error::{MeasureError, MeasureResult};
use crate::geometry::{GeoPoint, Point2D};
use crate::projection::CoordinateConverter;

/// Geodetic bounding box of a placed photo
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct GeoBounds {
    pub south_west: GeoPoint,
    pub north_east: GeoPoint,
}

impl GeoBounds {
    pub fn contains(&self, p: GeoPoint) -> bool {
        (self.south_west.lon..=self.north_east.lon).contains(&p.lon)
            && (self.south_west.lat..=self.north_east.lat).contains(&p.lat)
    }
}

/// Geodetic bounds of a `width_px` × `height_px` photo centred on the origin
pub fn image_bounds<C>(width_px: u32, height_px: u32, converter: &C) -> MeasureResult<GeoBounds>
where
    C: CoordinateConverter + ?Sized,
{
    if width_px == 0 || height_px == 0 {
        return Err(MeasureError::InvalidInput(format!(
            "image size {width_px}x{height_px} has no area"
        )));
    }

    let corner = Point2D::new(f64::from(width_px) / 2.0, f64::from(height_px) / 2.0);
    let GeoPoint { lon, lat } = converter.to_geo(corner)?;

    Ok(GeoBounds {
        south_west: GeoPoint::new(-lon, -lat),
        north_east: GeoPoint::new(lon, lat),
    })
}
