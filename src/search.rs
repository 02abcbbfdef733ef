//! Types and helpers shared by the audio and frame correlators.

use serde::Serialize;

use crate::{Error, Result};

/// Best alignment found by a correlator.
///
/// For audio, `offset` is a sample index into the full signal. For frames, it is
/// the start index of the best window into the sampled full-frame sequence.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct CorrelationResult {
    pub offset: usize,
    pub score: f64,
}

/// A `(start, end)` pair in seconds.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct TimeInterval {
    pub start: f64,
    pub end: f64,
}

impl TimeInterval {
    /// Builds an interval, rejecting negative or reversed bounds.
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !(start >= 0.0 && end >= start) {
            return Err(Error::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Result of locating a clip: where it is and how confident the correlator was.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Localization {
    pub interval: TimeInterval,
    pub result: CorrelationResult,
}

/// Returns the index and value of the largest element.
///
/// Ties go to the lowest index. NaN never wins. An empty slice yields `None`.
pub fn argmax(values: &[f64]) -> Option<(usize, f64)> {
    argmax_with_tolerance(values, 0.0)
}

/// Like [argmax], but any value within `tolerance` of the maximum counts as a tie.
///
/// This is used for FFT output, where mathematically equal values differ by
/// rounding noise.
pub fn argmax_with_tolerance(values: &[f64], tolerance: f64) -> Option<(usize, f64)> {
    let max = values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(None, |acc: Option<f64>, v| match acc {
            Some(m) if m >= v => Some(m),
            _ => Some(v),
        })?;

    values
        .iter()
        .position(|v| *v >= max - tolerance)
        .map(|idx| (idx, values[idx]))
}
