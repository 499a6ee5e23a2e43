//! Calibration runs from configured triangle pairs
//!
//! A calibration maps the photo's pixel space onto a reference frame through
//! a triangle of corresponding points, then measures query segments in the
//! reference frame.

use crate::affine::{solve_affine, AffineTransform};
use crate::error::{MeasureError, MeasureResult};
use crate::geometry::Point2D;
use std::fs;
use std::path::Path;

const CONFIG_SCHEMA_VERSION: u32 = 1;

/// A segment to measure after calibration, in source coordinates
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuerySegment {
    pub start: Point2D,
    pub end: Point2D,
}

/// Triangle pair plus the segments to measure with it
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Triangle in the source (pixel) plane
    pub source: [Point2D; 3],
    /// Matching triangle in the destination plane
    pub target: [Point2D; 3],
    #[serde(default)]
    pub queries: Vec<QuerySegment>,
}

fn default_version() -> u32 {
    CONFIG_SCHEMA_VERSION
}

impl Default for CalibrationConfig {
    /// Developer calibration of the sample survey photo
    fn default() -> Self {
        Self {
            version: CONFIG_SCHEMA_VERSION,
            source: [
                Point2D::new(-455.54589157625054, -778.5529345849235),
                Point2D::new(-536.9429997078923, -994.8756962745964),
                Point2D::new(-88.11157587464409, -977.6773630877243),
            ],
            target: [
                Point2D::new(0.0, 1000.0),
                Point2D::new(0.0, 0.0),
                Point2D::new(1000.0, 0.0),
            ],
            queries: vec![QuerySegment {
                start: Point2D::new(-455.5814575224878, -777.9856280590587),
                end: Point2D::new(-94.37630060672315, -766.9978066102224),
            }],
        }
    }
}

impl CalibrationConfig {
    pub fn from_json_str(json: &str) -> MeasureResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| MeasureError::Config(format!("invalid calibration config: {err}")))?;
        if config.version != CONFIG_SCHEMA_VERSION {
            return Err(MeasureError::Config(format!(
                "unsupported calibration config version {}",
                config.version
            )));
        }
        Ok(config)
    }

    /// Load a config file; a missing file yields the default calibration
    pub fn load(path: &Path) -> MeasureResult<Self> {
        if !path.exists() {
            log::warn!("{} not found, using default calibration", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .map_err(|err| MeasureError::Config(format!("{}: {err}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> MeasureResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| MeasureError::Config(format!("cannot serialize config: {err}")))
    }
}

/// One measured query segment
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct MeasuredSegment {
    pub start: Point2D,
    pub end: Point2D,
    pub distance: f64,
}

/// Result of [`run_calibration`]
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CalibrationReport {
    pub transform: AffineTransform,
    /// Largest distance between a mapped source vertex and its target
    pub max_residual: f64,
    pub segments: Vec<MeasuredSegment>,
}

/// Solve the configured transform and measure every query segment
pub fn run_calibration(config: &CalibrationConfig) -> MeasureResult<CalibrationReport> {
    let transform = solve_affine(&config.source, &config.target)?;

    let max_residual = config
        .source
        .iter()
        .zip(&config.target)
        .map(|(s, t)| transform.apply(*s).distance_to(t))
        .fold(0.0, f64::max);

    let segments = config
        .queries
        .iter()
        .map(|q| {
            let start = transform.apply(q.start);
            let end = transform.apply(q.end);
            MeasuredSegment { start, end, distance: start.distance_to(&end) }
        })
        .collect();

    Ok(CalibrationReport { transform, max_residual, segments })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_config() -> CalibrationConfig {
        CalibrationConfig {
            version: 1,
            source: [Point2D::new(0.0, 0.0), Point2D::new(10.0, 0.0), Point2D::new(0.0, 10.0)],
            target: [
                Point2D::new(100.0, 100.0),
                Point2D::new(200.0, 100.0),
                Point2D::new(100.0, 200.0),
            ],
            queries: vec![QuerySegment { start: Point2D::new(5.0, 5.0), end: Point2D::new(8.0, 9.0) }],
        }
    }

    #[test]
    fn test_run_square_calibration() {
        let report = run_calibration(&square_config()).unwrap();
        let segment = report.segments[0];
        assert!((segment.start.x - 150.0).abs() < 1e-9);
        assert!((segment.start.y - 150.0).abs() < 1e-9);
        assert!((segment.distance - 50.0).abs() < 1e-9);
        assert!(report.max_residual < 1e-9);
    }

    #[test]
    fn test_default_calibration_runs() {
        let report = run_calibration(&CalibrationConfig::default()).unwrap();
        assert_eq!(report.segments.len(), 1);
        assert!(report.segments[0].distance > 0.0);
        assert!(report.max_residual < 1e-6);
    }

    #[test]
    fn test_degenerate_config_rejected() {
        let mut config = square_config();
        config.target[2] = Point2D::new(300.0, 100.0);
        assert!(matches!(run_calibration(&config), Err(MeasureError::DegenerateTriangle(_))));
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = square_config();
        let json = config.to_json_string().unwrap();
        assert_eq!(CalibrationConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_config_version_checked() {
        let mut config = square_config();
        config.version = 9;
        let json = config.to_json_string().unwrap();
        assert!(matches!(CalibrationConfig::from_json_str(&json), Err(MeasureError::Config(_))));
    }

    #[test]
    fn test_load_missing_file_uses_default() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let config = CalibrationConfig::load(&temp.path().join("absent.json")).unwrap();
        assert_eq!(config, CalibrationConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("calibration.json");
        fs::write(&path, square_config().to_json_string().unwrap()).unwrap();

        assert_eq!(CalibrationConfig::load(&path).unwrap(), square_config());
    }
}
