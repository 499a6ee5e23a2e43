//! Calibration session: the event-driven boundary of the engine
//!
//! The display surface and form controls never touch the store or the
//! annotation state directly. They send [`SessionEvent`]s, which the session
//! processes one at a time. Each event either applies fully or is rejected
//! with nothing changed.

use crate::annotation::{AnnotationState, CursorHint, LineAnnotator};
use crate::error::{MeasureError, MeasureResult};
use crate::geometry::GeoPoint;
use crate::measurement::{MeasurementRecord, MeasurementStore, RecordPatch};
use crate::projection::{CoordinateConverter, WebMercator};
use std::collections::VecDeque;

/// Input from external collaborators
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The operator clicked a point on the map
    PointSelected { lon: f64, lat: f64 },
    /// Arm line annotation on a record
    ArmAnnotation { index: usize },
    /// Arm a record, or cancel if it is already armed
    ToggleAnnotation { index: usize },
    CancelAnnotation,
    /// The operator typed a real-world length for a record
    RealLengthEntered { index: usize, value: String },
    AddRecord,
    RemoveRecord { index: usize },
}

impl SessionEvent {
    pub fn point(geo: GeoPoint) -> Self {
        SessionEvent::PointSelected { lon: geo.lon, lat: geo.lat }
    }
}

/// What an accepted event did
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Annotation armed on a record
    Armed { index: usize },
    /// Annotation cancelled (or already inert)
    Cancelled,
    /// First endpoint captured
    FirstPointCaptured { index: usize },
    /// Line completed on a record
    LineCompleted { index: usize },
    /// Click arrived while annotation was not armed
    ClickIgnored,
    RecordUpdated { index: usize },
    RecordAdded { index: usize },
    RecordRemoved { index: usize },
}

/// Owns the record store, the annotation protocol and the converter
#[derive(Debug)]
pub struct CalibrationSession<C = WebMercator> {
    store: MeasurementStore,
    annotator: LineAnnotator,
    converter: C,
    queue: VecDeque<SessionEvent>,
}

impl Default for CalibrationSession<WebMercator> {
    fn default() -> Self {
        Self::new(WebMercator::default())
    }
}

impl<C: CoordinateConverter> CalibrationSession<C> {
    /// Create a session holding one blank record
    pub fn new(converter: C) -> Self {
        let mut store = MeasurementStore::new();
        store.push_blank();
        Self::with_store(store, converter)
    }

    pub fn with_store(store: MeasurementStore, converter: C) -> Self {
        Self { store, annotator: LineAnnotator::new(), converter, queue: VecDeque::new() }
    }

    /// Process a single event
    pub fn dispatch(&mut self, event: SessionEvent) -> MeasureResult<SessionOutcome> {
        log::debug!("dispatch {event:?}");

        match event {
            SessionEvent::PointSelected { lon, lat } => self.on_point_selected(GeoPoint::new(lon, lat)),
            SessionEvent::ArmAnnotation { index } => {
                self.annotator.arm(&self.store, index)?;
                Ok(SessionOutcome::Armed { index })
            }
            SessionEvent::ToggleAnnotation { index } => {
                if self.annotator.toggle(&self.store, index)? {
                    Ok(SessionOutcome::Armed { index })
                } else {
                    Ok(SessionOutcome::Cancelled)
                }
            }
            SessionEvent::CancelAnnotation => {
                self.annotator.cancel();
                Ok(SessionOutcome::Cancelled)
            }
            SessionEvent::RealLengthEntered { index, value } => {
                self.store.update_at(index, RecordPatch::real_length(value))?;
                Ok(SessionOutcome::RecordUpdated { index })
            }
            SessionEvent::AddRecord => {
                let index = self.store.append(MeasurementRecord::new());
                Ok(SessionOutcome::RecordAdded { index })
            }
            SessionEvent::RemoveRecord { index } => {
                let removed = self.store.remove_at(index)?;
                self.annotator.forget(removed.id());
                Ok(SessionOutcome::RecordRemoved { index })
            }
        }
    }

    fn on_point_selected(&mut self, point: GeoPoint) -> MeasureResult<SessionOutcome> {
        let completed = self.annotator.click(&mut self.store, &self.converter, point)?;

        if let Some(index) = completed {
            return Ok(SessionOutcome::LineCompleted { index });
        }
        match self.annotator.state() {
            AnnotationState::AwaitingSecondPoint { target, .. } => {
                let index = self
                    .store
                    .position_of(target)
                    .ok_or(MeasureError::RecordNotFound(target))?;
                Ok(SessionOutcome::FirstPointCaptured { index })
            }
            _ => Ok(SessionOutcome::ClickIgnored),
        }
    }

    /// Queue an event for [`drain`](Self::drain)
    pub fn enqueue(&mut self, event: SessionEvent) {
        self.queue.push_back(event);
    }

    /// Process all queued events in order
    ///
    /// A failed event is reported in its slot and does not stop the rest.
    pub fn drain(&mut self) -> Vec<MeasureResult<SessionOutcome>> {
        let mut results = Vec::with_capacity(self.queue.len());
        while let Some(event) = self.queue.pop_front() {
            let result = self.dispatch(event);
            if let Err(err) = &result {
                log::warn!("event rejected: {err}");
            }
            results.push(result);
        }
        results
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn store(&self) -> &MeasurementStore {
        &self.store
    }

    pub fn records(&self) -> &[MeasurementRecord] {
        self.store.records()
    }

    pub fn annotation_state(&self) -> AnnotationState {
        self.annotator.state()
    }

    /// Position of the armed record, if any
    pub fn armed_index(&self) -> Option<usize> {
        self.annotator.target_index(&self.store)
    }

    pub fn cursor_hint(&self) -> CursorHint {
        self.annotator.state().cursor_hint()
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    pub fn scale_factor(&self, index: usize) -> MeasureResult<f64> {
        self.store.compute_scale_factor(index)
    }

    pub fn scale_factors(&self) -> Vec<MeasureResult<f64>> {
        self.store.scale_factors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click(lon: f64, lat: f64) -> SessionEvent {
        SessionEvent::PointSelected { lon, lat }
    }

    #[test]
    fn test_starts_with_one_blank_record() {
        let session = CalibrationSession::default();
        assert_eq!(session.records().len(), 1);
        assert_eq!(session.cursor_hint(), CursorHint::Default);
        assert_eq!(session.armed_index(), None);
    }

    #[test]
    fn test_full_measurement_flow() {
        let mut session = CalibrationSession::default();

        assert_eq!(
            session.dispatch(SessionEvent::ArmAnnotation { index: 0 }).unwrap(),
            SessionOutcome::Armed { index: 0 }
        );
        assert_eq!(session.cursor_hint(), CursorHint::Crosshair);
        assert_eq!(
            session.dispatch(click(0.0, 0.0)).unwrap(),
            SessionOutcome::FirstPointCaptured { index: 0 }
        );
        assert_eq!(
            session.dispatch(click(0.0, 0.001)).unwrap(),
            SessionOutcome::LineCompleted { index: 0 }
        );
        assert_eq!(session.annotation_state(), AnnotationState::Inert);

        session
            .dispatch(SessionEvent::RealLengthEntered { index: 0, value: "100".to_string() })
            .unwrap();
        let length = session.records()[0].length();
        let factor = session.scale_factor(0).unwrap();
        assert!((factor - 100.0 / length).abs() < 1e-12);
    }

    #[test]
    fn test_click_without_arming_is_ignored() {
        let mut session = CalibrationSession::default();
        assert_eq!(session.dispatch(click(1.0, 1.0)).unwrap(), SessionOutcome::ClickIgnored);
        assert!(!session.records()[0].is_complete());
    }

    #[test]
    fn test_removing_armed_record_cancels() {
        let mut session = CalibrationSession::default();
        session.dispatch(SessionEvent::AddRecord).unwrap();
        session.dispatch(SessionEvent::ArmAnnotation { index: 1 }).unwrap();
        session.dispatch(click(0.0, 0.0)).unwrap();

        session.dispatch(SessionEvent::RemoveRecord { index: 1 }).unwrap();
        assert_eq!(session.annotation_state(), AnnotationState::Inert);
        assert_eq!(session.dispatch(click(0.0, 0.1)).unwrap(), SessionOutcome::ClickIgnored);
        assert!(!session.records()[0].is_complete());
    }

    #[test]
    fn test_removing_other_record_keeps_target() {
        let mut session = CalibrationSession::default();
        session.dispatch(SessionEvent::AddRecord).unwrap();
        session.dispatch(SessionEvent::ArmAnnotation { index: 1 }).unwrap();
        session.dispatch(SessionEvent::RemoveRecord { index: 0 }).unwrap();

        assert_eq!(session.armed_index(), Some(0));
        session.dispatch(click(0.0, 0.0)).unwrap();
        assert_eq!(
            session.dispatch(click(0.0, 0.1)).unwrap(),
            SessionOutcome::LineCompleted { index: 0 }
        );
    }

    #[test]
    fn test_first_point_reports_shifted_target_index() {
        let mut session = CalibrationSession::default();
        session.dispatch(SessionEvent::AddRecord).unwrap();
        session.dispatch(SessionEvent::AddRecord).unwrap();
        session.dispatch(SessionEvent::ArmAnnotation { index: 2 }).unwrap();
        session.dispatch(SessionEvent::RemoveRecord { index: 0 }).unwrap();

        assert_eq!(
            session.dispatch(click(0.0, 0.0)).unwrap(),
            SessionOutcome::FirstPointCaptured { index: 1 }
        );
    }

    #[test]
    fn test_rejected_first_point_stays_armed() {
        let mut session = CalibrationSession::default();
        session.dispatch(SessionEvent::ArmAnnotation { index: 0 }).unwrap();

        assert!(matches!(
            session.dispatch(click(0.0, 95.0)),
            Err(MeasureError::InvalidCoordinate(_))
        ));
        assert_eq!(session.armed_index(), Some(0));
        assert_eq!(session.cursor_hint(), CursorHint::Crosshair);
        assert_eq!(
            session.dispatch(click(0.0, 0.0)).unwrap(),
            SessionOutcome::FirstPointCaptured { index: 0 }
        );
    }

    #[test]
    fn test_drain_reports_each_event() {
        let mut session = CalibrationSession::default();
        session.enqueue(SessionEvent::ToggleAnnotation { index: 0 });
        session.enqueue(click(0.0, 0.0));
        session.enqueue(click(0.0, 100.0));
        session.enqueue(SessionEvent::RealLengthEntered { index: 7, value: "1".to_string() });
        session.enqueue(SessionEvent::AddRecord);
        assert_eq!(session.pending_events(), 5);

        let results = session.drain();
        assert_eq!(results.len(), 5);
        assert!(matches!(results[2], Err(MeasureError::InvalidCoordinate(_))));
        assert!(matches!(results[3], Err(MeasureError::IndexOutOfRange { index: 7, len: 1 })));
        assert_eq!(results[4], Ok(SessionOutcome::RecordAdded { index: 1 }));
        assert_eq!(session.pending_events(), 0);
        assert_eq!(session.annotation_state(), AnnotationState::Inert);
    }

    #[test]
    fn test_events_deserialize_from_json() {
        let json = r#"[
            {"type": "arm_annotation", "index": 0},
            {"type": "point_selected", "lon": 0.0, "lat": 0.0},
            {"type": "cancel_annotation"},
            {"type": "real_length_entered", "index": 0, "value": "12.5"}
        ]"#;
        let events: Vec<SessionEvent> = serde_json::from_str(json).unwrap();
        assert_eq!(events[0], SessionEvent::ArmAnnotation { index: 0 });
        assert_eq!(events[2], SessionEvent::CancelAnnotation);
    }
}
