//! Measurement records and the ordered record store
//!
//! Each record holds one measured line: its endpoints on the projected plane
//! and in geodetic degrees, the projected length, and the length the operator
//! says it has on the ground. The ratio of the two is the scale factor.

use crate::error::{MeasureError, MeasureResult};
use crate::geometry::{GeoPoint, Point2D};
use std::fmt;

/// Relative tolerance when checking a supplied length against its endpoints
const LENGTH_TOLERANCE: f64 = 1e-9;

/// Stable identifier for a record
///
/// Survives removals that shift positional indices.
pub type RecordId = uuid::Uuid;

/// Both endpoints of a measured line, in both coordinate systems
///
/// Endpoints are stored together so a record is either fully placed or not
/// placed at all.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LineEndpoints {
    /// Endpoints on the projected plane (metres)
    pub projected: [Point2D; 2],
    /// Endpoints in geodetic degrees
    pub geo: [GeoPoint; 2],
}

impl LineEndpoints {
    /// Euclidean length on the projected plane
    pub fn projected_length(&self) -> f64 {
        self.projected[0].distance_to(&self.projected[1])
    }
}

/// Operator-entered ground-truth length, kept as typed until parsed
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RealLength(String);

impl RealLength {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse as a finite, strictly positive number
    pub fn parse(&self) -> MeasureResult<f64> {
        let trimmed = self.0.trim();
        let value: f64 = trimmed.parse().map_err(|_| {
            MeasureError::InvalidInput(format!("real length {trimmed:?} is not a number"))
        })?;
        if !value.is_finite() || value <= 0.0 {
            return Err(MeasureError::InvalidInput(format!(
                "real length {trimmed:?} must be a positive number"
            )));
        }
        Ok(value)
    }
}

impl From<&str> for RealLength {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RealLength {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<f64> for RealLength {
    fn from(value: f64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RealLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A calibration/measurement entry
///
/// `length` always equals the projected distance between the endpoints, or 0
/// when the record has none. Deserialization enforces the same rule.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RecordFields")]
pub struct MeasurementRecord {
    id: RecordId,
    endpoints: Option<LineEndpoints>,
    /// Projected-plane length; 0 until endpoints are placed
    length: f64,
    real_length: RealLength,
}

#[derive(serde::Deserialize)]
struct RecordFields {
    id: RecordId,
    endpoints: Option<LineEndpoints>,
    length: f64,
    real_length: RealLength,
}

impl TryFrom<RecordFields> for MeasurementRecord {
    type Error = MeasureError;

    fn try_from(fields: RecordFields) -> MeasureResult<Self> {
        let length = checked_length(fields.endpoints.as_ref(), Some(fields.length))?;
        Ok(Self {
            id: fields.id,
            endpoints: fields.endpoints,
            length,
            real_length: fields.real_length,
        })
    }
}

/// Length implied by `endpoints`, checked against a supplied one
fn checked_length(endpoints: Option<&LineEndpoints>, supplied: Option<f64>) -> MeasureResult<f64> {
    let expected = endpoints.map_or(0.0, LineEndpoints::projected_length);
    if !expected.is_finite() {
        return Err(MeasureError::InvalidInput(format!(
            "endpoint distance {expected} is not finite"
        )));
    }

    match supplied {
        None => Ok(expected),
        Some(length) if (length - expected).abs() <= LENGTH_TOLERANCE * expected.max(1.0) => {
            Ok(expected)
        }
        Some(length) if endpoints.is_none() => Err(MeasureError::InvalidInput(format!(
            "length {length} cannot be set on a record without endpoints"
        ))),
        Some(length) => Err(MeasureError::InvalidInput(format!(
            "length {length} does not match endpoint distance {expected}"
        ))),
    }
}

impl Default for MeasurementRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementRecord {
    /// Create an empty record with a fresh id
    pub fn new() -> Self {
        Self {
            id: RecordId::new_v4(),
            endpoints: None,
            length: 0.0,
            real_length: RealLength::new("0"),
        }
    }

    /// Create a record from endpoints, deriving its length
    pub fn with_endpoints(endpoints: LineEndpoints) -> Self {
        Self {
            length: endpoints.projected_length(),
            endpoints: Some(endpoints),
            ..Self::new()
        }
    }

    pub fn with_real_length(mut self, real_length: impl Into<RealLength>) -> Self {
        self.real_length = real_length.into();
        self
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn endpoints(&self) -> Option<&LineEndpoints> {
        self.endpoints.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.endpoints.is_some()
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn real_length(&self) -> &RealLength {
        &self.real_length
    }

    pub fn x1(&self) -> Option<f64> {
        self.endpoints.map(|e| e.projected[0].x)
    }

    pub fn y1(&self) -> Option<f64> {
        self.endpoints.map(|e| e.projected[0].y)
    }

    pub fn x2(&self) -> Option<f64> {
        self.endpoints.map(|e| e.projected[1].x)
    }

    pub fn y2(&self) -> Option<f64> {
        self.endpoints.map(|e| e.projected[1].y)
    }

    pub fn lon1(&self) -> Option<f64> {
        self.endpoints.map(|e| e.geo[0].lon)
    }

    pub fn lat1(&self) -> Option<f64> {
        self.endpoints.map(|e| e.geo[0].lat)
    }

    pub fn lon2(&self) -> Option<f64> {
        self.endpoints.map(|e| e.geo[1].lon)
    }

    pub fn lat2(&self) -> Option<f64> {
        self.endpoints.map(|e| e.geo[1].lat)
    }

    /// Ratio of real length to projected length
    ///
    /// `position` is only used to label the error.
    fn scale_factor(&self, position: usize) -> MeasureResult<f64> {
        if self.length == 0.0 {
            return Err(MeasureError::DivisionByZero(position));
        }
        Ok(self.real_length.parse()? / self.length)
    }
}

/// Partial update merged into a record by [`MeasurementStore::update_at`]
///
/// The merged length is always recomputed from the merged endpoints; an
/// explicit `length` is only accepted if it agrees with them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub endpoints: Option<LineEndpoints>,
    pub length: Option<f64>,
    pub real_length: Option<RealLength>,
}

impl RecordPatch {
    /// Patch that places a line and sets its length
    pub fn line(endpoints: LineEndpoints, length: f64) -> Self {
        Self { endpoints: Some(endpoints), length: Some(length), real_length: None }
    }

    /// Patch that only sets the operator's real length
    pub fn real_length(value: impl Into<RealLength>) -> Self {
        Self { real_length: Some(value.into()), ..Self::default() }
    }

    fn merge_into(self, record: &mut MeasurementRecord) -> MeasureResult<()> {
        let endpoints = self.endpoints.or(record.endpoints);
        let length = checked_length(endpoints.as_ref(), self.length)?;

        record.endpoints = endpoints;
        record.length = length;
        if let Some(real_length) = self.real_length {
            record.real_length = real_length;
        }
        Ok(())
    }
}

/// Ordered collection of measurement records
///
/// Positions shift down on removal; callers holding positions across a
/// removal must re-resolve them (or hold a [`RecordId`] instead).
#[derive(Debug, Clone, Default)]
pub struct MeasurementStore {
    records: Vec<MeasurementRecord>,
}

impl MeasurementStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, returning its position
    pub fn append(&mut self, record: MeasurementRecord) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    /// Append an empty record
    pub fn push_blank(&mut self) -> usize {
        self.append(MeasurementRecord::new())
    }

    /// Merge a patch into the record at `index`
    ///
    /// The record is left untouched if the patch is rejected.
    pub fn update_at(&mut self, index: usize, patch: RecordPatch) -> MeasureResult<()> {
        let len = self.records.len();
        let record = self
            .records
            .get_mut(index)
            .ok_or(MeasureError::IndexOutOfRange { index, len })?;

        let mut updated = record.clone();
        patch.merge_into(&mut updated)?;
        *record = updated;
        Ok(())
    }

    /// Merge a patch into the record with the given id
    pub fn update_by_id(&mut self, id: RecordId, patch: RecordPatch) -> MeasureResult<usize> {
        let index = self.position_of(id).ok_or(MeasureError::RecordNotFound(id))?;
        self.update_at(index, patch)?;
        Ok(index)
    }

    /// Remove the record at `index`, shifting later records down
    pub fn remove_at(&mut self, index: usize) -> MeasureResult<MeasurementRecord> {
        if index >= self.records.len() {
            return Err(MeasureError::IndexOutOfRange { index, len: self.records.len() });
        }
        Ok(self.records.remove(index))
    }

    /// Scale factor (`real_length / length`) of the record at `index`
    pub fn compute_scale_factor(&self, index: usize) -> MeasureResult<f64> {
        self.get(index)
            .ok_or(MeasureError::IndexOutOfRange { index, len: self.records.len() })?
            .scale_factor(index)
    }

    /// Scale factor of every record, one result per record
    pub fn scale_factors(&self) -> Vec<MeasureResult<f64>> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| record.scale_factor(index))
            .collect()
    }

    pub fn get(&self, index: usize) -> Option<&MeasurementRecord> {
        self.records.get(index)
    }

    pub fn get_by_id(&self, id: RecordId) -> Option<&MeasurementRecord> {
        self.records.iter().find(|r| r.id() == id)
    }

    /// Current position of a record id
    pub fn position_of(&self, id: RecordId) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }

    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Geodetic segments of all placed lines, in store order
    pub fn line_segments(&self) -> Vec<[GeoPoint; 2]> {
        self.records
            .iter()
            .filter_map(|r| r.endpoints().map(|e| e.geo))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(length: f64) -> LineEndpoints {
        LineEndpoints {
            projected: [Point2D::new(0.0, 0.0), Point2D::new(length, 0.0)],
            geo: [GeoPoint::new(0.0, 0.0), GeoPoint::new(0.001, 0.0)],
        }
    }

    #[test]
    fn test_new_record_is_blank() {
        let record = MeasurementRecord::new();
        assert!(!record.is_complete());
        assert_eq!(record.length(), 0.0);
        assert_eq!(record.x1(), None);
        assert_eq!(record.lat2(), None);
    }

    #[test]
    fn test_append_returns_previous_length() {
        let mut store = MeasurementStore::new();
        assert_eq!(store.append(MeasurementRecord::new()), 0);
        assert_eq!(store.append(MeasurementRecord::new()), 1);
        assert_eq!(store.push_blank(), 2);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_update_sets_all_endpoint_fields() {
        let mut store = MeasurementStore::new();
        store.push_blank();
        store.update_at(0, RecordPatch::line(endpoints(50.0), 50.0)).unwrap();

        let record = store.get(0).unwrap();
        assert_eq!(record.x1(), Some(0.0));
        assert_eq!(record.x2(), Some(50.0));
        assert_eq!(record.y2(), Some(0.0));
        assert_eq!(record.lon2(), Some(0.001));
        assert_eq!(record.length(), 50.0);
    }

    #[test]
    fn test_update_out_of_range() {
        let mut store = MeasurementStore::new();
        store.push_blank();
        assert_eq!(
            store.update_at(3, RecordPatch::real_length("1")),
            Err(MeasureError::IndexOutOfRange { index: 3, len: 1 })
        );
    }

    #[test]
    fn test_rejected_patch_leaves_record_unchanged() {
        let mut store = MeasurementStore::new();
        store.push_blank();
        let before = store.get(0).unwrap().clone();

        let patch = RecordPatch { length: Some(12.0), ..RecordPatch::default() };
        assert!(matches!(store.update_at(0, patch), Err(MeasureError::InvalidInput(_))));
        assert_eq!(store.get(0).unwrap(), &before);
    }

    #[test]
    fn test_endpoints_only_patch_derives_length() {
        let mut store = MeasurementStore::new();
        store.push_blank();
        let line = LineEndpoints {
            projected: [Point2D::new(0.0, 0.0), Point2D::new(30.0, 40.0)],
            geo: [GeoPoint::new(0.0, 0.0), GeoPoint::new(0.001, 0.001)],
        };

        let patch = RecordPatch { endpoints: Some(line), ..RecordPatch::default() };
        store.update_at(0, patch).unwrap();
        assert_eq!(store.get(0).unwrap().length(), 50.0);
    }

    #[test]
    fn test_length_patch_must_match_endpoints() {
        let mut store = MeasurementStore::new();
        store.append(MeasurementRecord::with_endpoints(endpoints(50.0)));
        let before = store.get(0).unwrap().clone();

        let patch = RecordPatch { length: Some(999.0), ..RecordPatch::default() };
        assert!(matches!(store.update_at(0, patch), Err(MeasureError::InvalidInput(_))));
        assert_eq!(store.get(0).unwrap(), &before);

        let mismatched = RecordPatch::line(endpoints(50.0), 49.0);
        assert!(store.update_at(0, mismatched).is_err());
        assert_eq!(store.get(0).unwrap().length(), 50.0);
    }

    #[test]
    fn test_deserialize_rejects_inconsistent_length() {
        let id = RecordId::new_v4();
        let blank = format!(
            r#"{{"id":"{id}","endpoints":null,"length":5.0,"real_length":"0"}}"#
        );
        assert!(serde_json::from_str::<MeasurementRecord>(&blank).is_err());

        let line = r#"{"projected":[{"x":0,"y":0},{"x":30,"y":40}],"geo":[{"lon":0,"lat":0},{"lon":0,"lat":0}]}"#;
        let wrong = format!(r#"{{"id":"{id}","endpoints":{line},"length":7.0,"real_length":"0"}}"#);
        assert!(serde_json::from_str::<MeasurementRecord>(&wrong).is_err());

        let good = format!(r#"{{"id":"{id}","endpoints":{line},"length":50.0,"real_length":"10"}}"#);
        let record: MeasurementRecord = serde_json::from_str(&good).unwrap();
        assert_eq!(record.id(), id);
        assert_eq!(record.length(), 50.0);
    }

    #[test]
    fn test_remove_shifts_indices() {
        let mut store = MeasurementStore::new();
        let first = MeasurementRecord::new();
        let second = MeasurementRecord::new();
        let second_id = second.id();
        store.append(first);
        store.append(second);

        store.remove_at(0).unwrap();
        store.update_at(0, RecordPatch::real_length("7")).unwrap();

        let record = store.get(0).unwrap();
        assert_eq!(record.id(), second_id);
        assert_eq!(record.real_length().as_str(), "7");
        assert!(store.remove_at(1).is_err());
    }

    #[test]
    fn test_scale_factor() {
        let mut store = MeasurementStore::new();
        store.append(MeasurementRecord::with_endpoints(endpoints(50.0)).with_real_length("10"));
        assert!((store.compute_scale_factor(0).unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_scale_factor_zero_length() {
        let mut store = MeasurementStore::new();
        store.append(MeasurementRecord::new().with_real_length("10"));
        assert_eq!(store.compute_scale_factor(0), Err(MeasureError::DivisionByZero(0)));
    }

    #[test]
    fn test_scale_factor_unparseable_real_length() {
        let mut store = MeasurementStore::new();
        for raw in ["", "abc", "-3", "0", "inf"] {
            store.append(MeasurementRecord::with_endpoints(endpoints(50.0)).with_real_length(raw));
        }
        for result in store.scale_factors() {
            assert!(matches!(result, Err(MeasureError::InvalidInput(_))));
        }
    }

    #[test]
    fn test_scale_factors_are_per_record() {
        let mut store = MeasurementStore::new();
        store.append(MeasurementRecord::new());
        store.append(MeasurementRecord::with_endpoints(endpoints(40.0)).with_real_length(" 8 "));

        let factors = store.scale_factors();
        assert_eq!(factors.len(), 2);
        assert!(factors[0].is_err());
        assert!((factors[1].as_ref().unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_update_by_id_follows_shift() {
        let mut store = MeasurementStore::new();
        store.push_blank();
        let target = MeasurementRecord::new();
        let target_id = target.id();
        store.append(target);

        store.remove_at(0).unwrap();
        let index = store.update_by_id(target_id, RecordPatch::real_length("3")).unwrap();
        assert_eq!(index, 0);

        store.remove_at(0).unwrap();
        assert_eq!(
            store.update_by_id(target_id, RecordPatch::real_length("4")),
            Err(MeasureError::RecordNotFound(target_id))
        );
    }

    #[test]
    fn test_line_segments_skip_blank_records() {
        let mut store = MeasurementStore::new();
        store.push_blank();
        store.append(MeasurementRecord::with_endpoints(endpoints(5.0)));
        let segments = store.line_segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0][1], GeoPoint::new(0.001, 0.0));
    }
}
