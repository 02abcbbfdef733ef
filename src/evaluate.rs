//! Scoring an estimated interval against a known ground truth.
//!
//! Ground truth comes from clip file names of the form `<anything>_<start>_<end>.mp4`, which is
//! the naming scheme used by [crate::clip].

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::search::TimeInterval;
use crate::{Error, Result};

const GROUND_TRUTH_PATTERN: &str = r"_(\d+)_(\d+)\.mp4$";

static GROUND_TRUTH_RE: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();

fn ground_truth_re() -> Result<&'static Regex> {
    GROUND_TRUTH_RE
        .get_or_init(|| Regex::new(GROUND_TRUTH_PATTERN))
        .as_ref()
        .map_err(|e| Error::InvalidConfig(e.to_string()))
}

/// Euclidean distance between two intervals, treated as `(start, end)` points.
pub fn euclidean_distance(estimated: &TimeInterval, ground_truth: &TimeInterval) -> f64 {
    let ds = estimated.start - ground_truth.start;
    let de = estimated.end - ground_truth.end;
    (ds * ds + de * de).sqrt()
}

/// Signed fraction of the ground truth covered by the estimate.
///
/// This is 1.0 for a perfect match and negative when the intervals are disjoint; it is not
/// clamped. A zero-length ground truth is rejected.
pub fn overlap_ratio(estimated: &TimeInterval, ground_truth: &TimeInterval) -> Result<f64> {
    let gt_len = ground_truth.end - ground_truth.start;
    if gt_len == 0.0 {
        return Err(Error::ZeroLengthGroundTruth {
            start: ground_truth.start,
        });
    }
    let overlap =
        ground_truth.end.min(estimated.end) - ground_truth.start.max(estimated.start);
    Ok(overlap / gt_len)
}

/// Parses the ground truth `(start, end)` embedded in a clip file name.
pub fn ground_truth_from_path(path: impl AsRef<Path>) -> Result<TimeInterval> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let re = ground_truth_re()?;
    let not_found = || Error::GroundTruthNotFound(path.display().to_string());
    let captures = re.captures(&name).ok_or_else(not_found)?;

    // The pattern only matches digits, so parsing can only fail on overflow.
    let start: f64 = captures[1].parse().map_err(|_| not_found())?;
    let end: f64 = captures[2].parse().map_err(|_| not_found())?;

    TimeInterval::new(start, end)
}

/// Comparison of an estimated interval against the ground truth.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Evaluation {
    pub estimated: TimeInterval,
    pub ground_truth: TimeInterval,
    pub distance: f64,
    pub overlap: f64,
}

impl Evaluation {
    pub fn new(estimated: TimeInterval, ground_truth: TimeInterval) -> Result<Self> {
        Ok(Self {
            estimated,
            ground_truth,
            distance: euclidean_distance(&estimated, &ground_truth),
            overlap: overlap_ratio(&estimated, &ground_truth)?,
        })
    }
}
