//! Recorded attention-state captures.
//!
//! A capture is a CSV file with a header row and one sample per line:
//!
//! ```text
//! timestamp_s,state
//! 0.000,focused
//! 1.002,1
//! 2.001,0.35
//! ```
//!
//! `state` accepts anything the daemon accepts on stdin. Lines starting
//! with `#` are comments.

use std::io::Read;
use std::time::Duration;

use focus_alarm::source::parse_sample_line;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: {message}")]
    BadRow { row: usize, message: String },

    #[error("row {row}: timestamp {timestamp} goes backwards")]
    NonMonotonic { row: usize, timestamp: f64 },

    #[error("capture contains no samples")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct Row {
    timestamp_s: f64,
    state: String,
}

/// One sample, timed relative to the first sample of the capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedSample {
    pub offset: Duration,
    pub value: f64,
}

/// Load a capture. Rows whose state carries no sample (keep-alives,
/// empty classifier events) are skipped.
pub fn load<R: Read>(reader: R) -> Result<Vec<TimedSample>, CaptureError> {
    let mut csv = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut samples = Vec::new();
    let mut start: Option<f64> = None;
    let mut last = f64::NEG_INFINITY;

    for (index, record) in csv.deserialize::<Row>().enumerate() {
        let row = index + 1;
        let record = record?;

        if !record.timestamp_s.is_finite() {
            return Err(CaptureError::BadRow {
                row,
                message: format!("timestamp {} is not finite", record.timestamp_s),
            });
        }
        if record.timestamp_s < last {
            return Err(CaptureError::NonMonotonic {
                row,
                timestamp: record.timestamp_s,
            });
        }
        last = record.timestamp_s;

        let value = parse_sample_line(&record.state).map_err(|e| CaptureError::BadRow {
            row,
            message: e.to_string(),
        })?;
        let Some(value) = value else {
            continue;
        };

        let start = *start.get_or_insert(record.timestamp_s);
        let offset = Duration::try_from_secs_f64(record.timestamp_s - start).map_err(|e| {
            CaptureError::BadRow {
                row,
                message: format!("timestamp {} out of range: {e}", record.timestamp_s),
            }
        })?;
        samples.push(TimedSample { offset, value });
    }

    if samples.is_empty() {
        return Err(CaptureError::Empty);
    }
    Ok(samples)
}

/// Samples spaced evenly by `interval`, for sequences typed on the
/// command line.
pub fn evenly_spaced(values: &[f64], interval: Duration) -> Result<Vec<TimedSample>, CaptureError> {
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let offset = u32::try_from(i)
                .ok()
                .and_then(|i| interval.checked_mul(i))
                .ok_or_else(|| CaptureError::BadRow {
                    row: i + 1,
                    message: format!("offset of sample {i} at {interval:?} spacing out of range"),
                })?;
            Ok(TimedSample { offset, value })
        })
        .collect()
}
