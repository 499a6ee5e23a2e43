//! Geomeasure Core Library
//!
//! Calibration and measurement engine for photographs placed on a map:
//! affine calibration from three point pairs, geodetic/projected conversion,
//! and a two-click line annotation protocol that produces scale factors.

pub mod affine;
pub mod annotation;
pub mod calibration;
pub mod csv_export;
pub mod error;
pub mod geometry;
pub mod measurement;
pub mod overlay;
pub mod projection;
pub mod session;

pub use affine::{apply_transform, solve_affine, AffineTransform, DEGENERATE_AREA_EPSILON};
pub use annotation::{
    measure_line, AnnotationEffect, AnnotationEvent, AnnotationState, CursorHint, LineAnnotator,
};
pub use calibration::{
    run_calibration, CalibrationConfig, CalibrationReport, MeasuredSegment, QuerySegment,
};
pub use csv_export::{export_records_csv, CsvExportConfig, CsvExportError, CsvExportResult};
pub use error::{MeasureError, MeasureResult};
pub use geometry::{GeoPoint, Point2D};
pub use measurement::{
    LineEndpoints, MeasurementRecord, MeasurementStore, RealLength, RecordId, RecordPatch,
};
pub use overlay::{image_bounds, GeoBounds};
pub use projection::{transform, CoordinateConverter, Crs, WebMercator, WEB_MERCATOR_RADIUS};
pub use session::{CalibrationSession, SessionEvent, SessionOutcome};
