//! Two-click line annotation protocol
//!
//! The operator arms a record, clicks the first endpoint, then the second.
//! The second click completes the line: both points are projected, the
//! projected distance is measured, and the record is updated in one step.
//!
//! State transitions are a pure function ([`AnnotationState::transition`]);
//! the store mutation is returned as an [`AnnotationEffect`] and applied by
//! [`LineAnnotator`].

use crate::error::{MeasureError, MeasureResult};
use crate::geometry::GeoPoint;
use crate::measurement::{LineEndpoints, MeasurementStore, RecordId, RecordPatch};
use crate::projection::CoordinateConverter;

/// Annotation mode, one per session
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AnnotationState {
    /// Not armed
    #[default]
    Inert,
    /// Armed on a record, waiting for the first endpoint
    AwaitingFirstPoint { target: RecordId },
    /// First endpoint captured, waiting for the second
    AwaitingSecondPoint { target: RecordId, first: GeoPoint },
}

/// Input to the annotation protocol
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnnotationEvent {
    Arm(RecordId),
    Click(GeoPoint),
    Cancel,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnnotationEffect {
    /// Both endpoints are known; the target record should be filled in
    CompleteLine { target: RecordId, first: GeoPoint, second: GeoPoint },
}

/// Cursor the display surface should show
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorHint {
    Default,
    Crosshair,
}

impl AnnotationState {
    /// Compute the next state and any effect for an event
    pub fn transition(self, event: AnnotationEvent) -> (AnnotationState, Option<AnnotationEffect>) {
        use AnnotationState::*;

        match (self, event) {
            (_, AnnotationEvent::Cancel) => (Inert, None),
            // Re-arming always starts a fresh capture.
            (_, AnnotationEvent::Arm(target)) => (AwaitingFirstPoint { target }, None),
            (Inert, AnnotationEvent::Click(_)) => (Inert, None),
            (AwaitingFirstPoint { target }, AnnotationEvent::Click(first)) => {
                (AwaitingSecondPoint { target, first }, None)
            }
            (AwaitingSecondPoint { target, first }, AnnotationEvent::Click(second)) => {
                (Inert, Some(AnnotationEffect::CompleteLine { target, first, second }))
            }
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, AnnotationState::Inert)
    }

    /// Record the state is armed on
    pub fn target(&self) -> Option<RecordId> {
        match self {
            AnnotationState::Inert => None,
            AnnotationState::AwaitingFirstPoint { target }
            | AnnotationState::AwaitingSecondPoint { target, .. } => Some(*target),
        }
    }

    /// First endpoint captured, if any
    pub fn first_point(&self) -> Option<GeoPoint> {
        match self {
            AnnotationState::AwaitingSecondPoint { first, .. } => Some(*first),
            _ => None,
        }
    }

    pub fn cursor_hint(&self) -> CursorHint {
        if self.is_active() {
            CursorHint::Crosshair
        } else {
            CursorHint::Default
        }
    }
}

/// Project both endpoints and measure the line between them
pub fn measure_line<C>(
    converter: &C,
    first: GeoPoint,
    second: GeoPoint,
) -> MeasureResult<(LineEndpoints, f64)>
where
    C: CoordinateConverter + ?Sized,
{
    let p1 = converter.to_projected(first)?;
    let p2 = converter.to_projected(second)?;
    let endpoints = LineEndpoints { projected: [p1, p2], geo: [first, second] };
    Ok((endpoints, p1.distance_to(&p2)))
}

/// Drives [`AnnotationState`] and applies its effects to a store
#[derive(Debug, Clone, Default)]
pub struct LineAnnotator {
    state: AnnotationState,
}

impl LineAnnotator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AnnotationState {
        self.state
    }

    /// Current position of the armed record, if it still exists
    pub fn target_index(&self, store: &MeasurementStore) -> Option<usize> {
        self.state.target().and_then(|id| store.position_of(id))
    }

    /// Arm annotation on the record at `index`
    ///
    /// Any pending capture on another record is discarded.
    pub fn arm(&mut self, store: &MeasurementStore, index: usize) -> MeasureResult<RecordId> {
        let record = store
            .get(index)
            .ok_or(MeasureError::IndexOutOfRange { index, len: store.len() })?;
        let target = record.id();

        if self.state.is_active() && self.state.target() != Some(target) {
            log::debug!("re-arming on record {index}, discarding pending capture");
        }
        self.apply_event(AnnotationEvent::Arm(target));
        Ok(target)
    }

    /// Arm the record at `index`, or cancel if it is already armed
    ///
    /// Returns whether annotation is armed afterwards.
    pub fn toggle(&mut self, store: &MeasurementStore, index: usize) -> MeasureResult<bool> {
        let record = store
            .get(index)
            .ok_or(MeasureError::IndexOutOfRange { index, len: store.len() })?;

        if self.state.target() == Some(record.id()) {
            self.cancel();
            Ok(false)
        } else {
            self.arm(store, index)?;
            Ok(true)
        }
    }

    pub fn cancel(&mut self) {
        self.apply_event(AnnotationEvent::Cancel);
    }

    /// Cancel if the armed record is `id`
    pub fn forget(&mut self, id: RecordId) {
        if self.state.target() == Some(id) {
            log::debug!("armed record {id} removed, cancelling annotation");
            self.cancel();
        }
    }

    /// Feed a point click
    ///
    /// Returns the position of the record that was completed, if this click
    /// completed one. The store is never changed on error. A first point the
    /// converter cannot project is rejected and annotation stays armed; any
    /// other error leaves the state `Inert`.
    pub fn click<C>(
        &mut self,
        store: &mut MeasurementStore,
        converter: &C,
        point: GeoPoint,
    ) -> MeasureResult<Option<usize>>
    where
        C: CoordinateConverter + ?Sized,
    {
        if let AnnotationState::AwaitingFirstPoint { target } = self.state {
            if store.position_of(target).is_none() {
                self.cancel();
                return Err(MeasureError::RecordNotFound(target));
            }
            converter.to_projected(point).inspect_err(|err| {
                log::warn!("first point on record {target} rejected: {err}");
            })?;
        }

        let Some(effect) = self.apply_event(AnnotationEvent::Click(point)) else {
            return Ok(None);
        };

        let AnnotationEffect::CompleteLine { target, first, second } = effect;
        let (endpoints, length) = measure_line(converter, first, second).inspect_err(|err| {
            log::warn!("line on record {target} rejected: {err}");
        })?;
        let index = store.update_by_id(target, RecordPatch::line(endpoints, length))?;

        log::debug!("record {index} measured at {length:.3}");
        Ok(Some(index))
    }

    fn apply_event(&mut self, event: AnnotationEvent) -> Option<AnnotationEffect> {
        let (next, effect) = self.state.transition(event);
        if self.state == AnnotationState::Inert && matches!(event, AnnotationEvent::Click(_)) {
            log::debug!("ignoring click while annotation is inert");
        }
        self.state = next;
        effect
    }
}
