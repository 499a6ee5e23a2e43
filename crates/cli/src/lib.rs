use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use geomeasure_core::{
    export_records_csv, image_bounds, run_calibration, CalibrationConfig, CalibrationSession,
    CoordinateConverter, CsvExportConfig, CursorHint, GeoPoint, MeasurementRecord, Point2D,
    SessionEvent, SessionOutcome, WebMercator,
};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "geomeasure")]
#[command(about = "Photo calibration and measurement CLI")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Solve a three-point calibration and measure its query segments.
    Solve {
        /// Calibration config (JSON); the built-in calibration is used when omitted.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Project longitude/latitude onto the Web Mercator plane.
    Project {
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
    },
    /// Convert Web Mercator metres back to longitude/latitude.
    Unproject {
        #[arg(long, allow_negative_numbers = true)]
        x: f64,
        #[arg(long, allow_negative_numbers = true)]
        y: f64,
    },
    /// Print the map bounds of a photo placed at the origin.
    Bounds {
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
    },
    /// Replay a JSON array of session events and print the resulting records.
    Replay {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Debug, Serialize)]
struct EventOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<SessionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct RecordOutput {
    index: usize,
    x1: Option<f64>,
    y1: Option<f64>,
    x2: Option<f64>,
    y2: Option<f64>,
    lon1: Option<f64>,
    lat1: Option<f64>,
    lon2: Option<f64>,
    lat2: Option<f64>,
    length: f64,
    real_length: String,
    scale_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scale_error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    cursor: CursorHint,
    armed_index: Option<usize>,
    events: Vec<EventOutput>,
    records: Vec<RecordOutput>,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Solve { config } => run_solve(config.as_deref()),
        Commands::Project { lon, lat } => {
            let point = WebMercator::new().to_projected(GeoPoint::new(lon, lat))?;
            print_json(&point)
        }
        Commands::Unproject { x, y } => {
            let geo = WebMercator::new().to_geo(Point2D::new(x, y))?;
            print_json(&geo)
        }
        Commands::Bounds { width, height } => {
            let bounds = image_bounds(width, height, &WebMercator::new())?;
            print_json(&bounds)
        }
        Commands::Replay { file, format } => run_replay(&file, format),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_solve(config: Option<&Path>) -> Result<()> {
    let config = match config {
        Some(path) => {
            ensure_file_exists(path)?;
            CalibrationConfig::load(path).context("failed to load calibration config")?
        }
        None => CalibrationConfig::default(),
    };

    let report = run_calibration(&config).context("calibration failed")?;
    print_json(&report)
}

fn run_replay(file: &Path, format: OutputFormat) -> Result<()> {
    ensure_file_exists(file)?;

    let text = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let events: Vec<SessionEvent> =
        serde_json::from_str(&text).context("failed to parse session events")?;

    log::info!("replaying {} events from {}", events.len(), file.display());
    let mut session = CalibrationSession::default();
    for event in events {
        session.enqueue(event);
    }
    let results = session.drain();

    match format {
        OutputFormat::Csv => {
            export_records_csv(io::stdout().lock(), session.store(), &CsvExportConfig::default())
                .context("failed to write CSV")?;
            Ok(())
        }
        OutputFormat::Json => {
            let events = results
                .into_iter()
                .map(|result| match result {
                    Ok(outcome) => EventOutput { outcome: Some(outcome), error: None },
                    Err(err) => EventOutput { outcome: None, error: Some(err.to_string()) },
                })
                .collect();

            let records = session
                .records()
                .iter()
                .zip(session.scale_factors())
                .enumerate()
                .map(|(index, (record, factor))| record_output(index, record, factor))
                .collect();

            print_json(&ReplayOutput {
                cursor: session.cursor_hint(),
                armed_index: session.armed_index(),
                events,
                records,
            })
        }
    }
}

fn record_output(
    index: usize,
    record: &MeasurementRecord,
    factor: geomeasure_core::MeasureResult<f64>,
) -> RecordOutput {
    let (scale_factor, scale_error) = match factor {
        Ok(value) => (Some(value), None),
        Err(err) => (None, Some(err.to_string())),
    };

    RecordOutput {
        index,
        x1: record.x1(),
        y1: record.y1(),
        x2: record.x2(),
        y2: record.y2(),
        lon1: record.lon1(),
        lat1: record.lat1(),
        lon2: record.lon2(),
        lat2: record.lat2(),
        length: record.length(),
        real_length: record.real_length().to_string(),
        scale_factor,
        scale_error,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
