//! CSV export for measurement records
//!
//! Produces one row per record for use in spreadsheets and external
//! calibration tooling.

use crate::measurement::{MeasurementRecord, MeasurementStore};
use std::io::Write;

/// Error types for CSV export
#[derive(Debug, thiserror::Error)]
pub enum CsvExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),
}

pub type CsvExportResult<T> = Result<T, CsvExportError>;

/// Configuration for CSV export
#[derive(Debug, Clone)]
pub struct CsvExportConfig {
    /// Include column headers in the output
    pub include_headers: bool,

    /// CSV delimiter character
    pub delimiter: u8,

    /// Skip records whose line has not been placed yet
    pub completed_only: bool,
}

impl Default for CsvExportConfig {
    fn default() -> Self {
        Self {
            include_headers: true,
            delimiter: b',',
            completed_only: false,
        }
    }
}

/// Export measurement records to CSV format
///
/// CSV columns:
/// - Index: Position in the store (0-based)
/// - ID: Stable record identifier
/// - X1, Y1, X2, Y2: Projected endpoints in metres (empty when unset)
/// - Lon1, Lat1, Lon2, Lat2: Geodetic endpoints in degrees (empty when unset)
/// - Length: Projected length
/// - Real Length: Operator-entered length, as typed
/// - Scale Factor: Real length / length (empty when it cannot be computed)
pub fn export_records_csv<W: Write>(
    writer: W,
    store: &MeasurementStore,
    config: &CsvExportConfig,
) -> CsvExportResult<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(config.include_headers)
        .from_writer(writer);

    if config.include_headers {
        csv_writer.write_record([
            "Index",
            "ID",
            "X1",
            "Y1",
            "X2",
            "Y2",
            "Lon1",
            "Lat1",
            "Lon2",
            "Lat2",
            "Length",
            "Real Length",
            "Scale Factor",
        ])?;
    }

    let factors = store.scale_factors();
    for ((index, record), factor) in store.records().iter().enumerate().zip(factors) {
        if config.completed_only && !record.is_complete() {
            continue;
        }

        let mut row = vec![index.to_string(), record.id().to_string()];
        row.extend(endpoint_fields(record).iter().map(|v| format_optional(*v)));
        row.push(record.length().to_string());
        row.push(record.real_length().to_string());
        row.push(factor.map(|f| f.to_string()).unwrap_or_default());

        csv_writer.write_record(&row)?;
    }

    csv_writer.flush()?;
    Ok(())
}

fn endpoint_fields(record: &MeasurementRecord) -> [Option<f64>; 8] {
    [
        record.x1(),
        record.y1(),
        record.x2(),
        record.y2(),
        record.lon1(),
        record.lat1(),
        record.lon2(),
        record.lat2(),
    ]
}

fn format_optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
