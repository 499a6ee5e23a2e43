//! Error taxonomy for the calibration and measurement engine

use crate::measurement::RecordId;

/// Errors raised by the converter, solver, record store and annotation protocol
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeasureError {
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("degenerate triangle: {0}")]
    DegenerateTriangle(String),

    #[error("index {index} out of range for {len} records")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("division by zero: record {0} has zero length")]
    DivisionByZero(usize),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type MeasureResult<T> = Result<T, MeasureError>;
