#[cfg(feature = "rayon")]
extern crate rayon;

use std::path::Path;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use super::{Extractor, FrameSignal};
use crate::search::{self, CorrelationResult, Localization, TimeInterval};
use crate::{Error, Result};

// L2-normalizes every descriptor into one flat buffer.
//
// A zero-norm descriptor (e.g., a black frame) stays all zeros, so its cosine similarity
// with any other descriptor is 0.
fn normalize(signal: &FrameSignal) -> Vec<f32> {
    let mut out = Vec::with_capacity(signal.len() * signal.descriptor_len());
    for d in signal.descriptors() {
        let norm = d.iter().map(|v| *v as f64 * *v as f64).sum::<f64>().sqrt();
        if norm > 0.0 {
            out.extend(d.iter().map(|v| (*v as f64 / norm) as f32));
        } else {
            out.extend(std::iter::repeat(0.0).take(d.len()));
        }
    }
    out
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum()
}

// Average cosine similarity between the window starting at `start` and the clip.
//
// This is the trace of `window * clip^T` divided by the window length.
fn window_score(full: &[f32], clip: &[f32], dim: usize, window: usize, start: usize) -> f64 {
    let sum: f64 = (0..window)
        .map(|j| {
            let f = &full[(start + j) * dim..(start + j + 1) * dim];
            let c = &clip[j * dim..(j + 1) * dim];
            dot(f, c)
        })
        .sum();
    sum / window as f64
}

/// Finds the window of `full` that best matches `clip`.
///
/// A window of `clip.len()` descriptors slides over `full` one descriptor at a time. Each
/// window is scored by the mean cosine similarity of its descriptors with the clip's, pairwise
/// in order. The highest-scoring window wins; ties go to the lowest start index.
///
/// Returns `None` if either signal is empty, if the clip is longer than the full signal, or if
/// the descriptor sizes differ, since no window can be scored in those cases.
pub fn best_window(full: &FrameSignal, clip: &FrameSignal) -> Option<CorrelationResult> {
    let (m, w, dim) = (full.len(), clip.len(), full.descriptor_len());
    if m == 0 || w == 0 || w > m || dim != clip.descriptor_len() {
        return None;
    }

    let full_n = normalize(full);
    let clip_n = normalize(clip);
    let num_windows = m - w + 1;

    #[cfg(feature = "rayon")]
    let scores: Vec<f64> = (0..num_windows)
        .into_par_iter()
        .map(|i| window_score(&full_n, &clip_n, dim, w, i))
        .collect();
    #[cfg(not(feature = "rayon"))]
    let scores: Vec<f64> = (0..num_windows)
        .map(|i| window_score(&full_n, &clip_n, dim, w, i))
        .collect();

    search::argmax(&scores).map(|(offset, score)| CorrelationResult { offset, score })
}

/// Locates a clip inside a full video by comparing sampled frames.
///
/// Both videos are sampled every `sample_step` frames, and each sampled frame is reduced to a
/// small grayscale descriptor (see [Extractor]). The best window is found with [best_window].
/// The window index is then converted back to a time using the full video's frame rate, and the
/// end time is derived from the clip's true frame count and frame rate.
#[derive(Copy, Clone, Debug, Default)]
pub struct Correlator {
    extractor: Extractor,
}

impl Correlator {
    /// Returns a new [Correlator] with the provided `sample_step`.
    pub fn with_sample_step(mut self, sample_step: usize) -> Self {
        self.extractor = self.extractor.with_sample_step(sample_step);
        self
    }

    /// Returns a new [Correlator] that resizes frames to `width x height`.
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.extractor = self.extractor.with_frame_size(width, height);
        self
    }

    /// Returns a new [Correlator] with `threaded_decoding` set to the provided value.
    pub fn with_threaded_decoding(mut self, threaded_decoding: bool) -> Self {
        self.extractor = self.extractor.with_threaded_decoding(threaded_decoding);
        self
    }

    pub fn sample_step(&self) -> usize {
        self.extractor.sample_step()
    }

    /// Finds the best window of `clip` inside `full`, or `None` if no window can be scored.
    pub fn correlate(
        &self,
        full: &FrameSignal,
        clip: &FrameSignal,
    ) -> Result<Option<CorrelationResult>> {
        let span = tracing::span!(tracing::Level::TRACE, "frame_correlate");
        let _enter = span.enter();

        if !full.is_empty() && !clip.is_empty() && full.descriptor_len() != clip.descriptor_len() {
            return Err(Error::InvalidConfig(format!(
                "descriptor size mismatch: full={}x{} clip={}x{}",
                full.width(),
                full.height(),
                clip.width(),
                clip.height()
            )));
        }

        tracing::debug!(
            full_frames = full.len(),
            clip_frames = clip.len(),
            "computing frame cross-correlation"
        );
        let result = best_window(full, clip);
        match &result {
            Some(r) => tracing::debug!(offset = r.offset, score = r.score, "found best window"),
            None => tracing::warn!("no valid windows found"),
        }

        Ok(result)
    }

    /// Converts a window index into a [TimeInterval].
    ///
    /// `start = offset * sample_step / full_fps` and `end = start + clip_frame_count / clip_fps`.
    pub fn to_interval(
        &self,
        result: &CorrelationResult,
        full_fps: f64,
        clip_frame_count: u64,
        clip_fps: f64,
    ) -> Result<TimeInterval> {
        if !(full_fps > 0.0 && clip_fps > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "frame rates must be positive: full={} clip={}",
                full_fps, clip_fps
            )));
        }
        let start_frame = result.offset * self.sample_step();
        let start = start_frame as f64 / full_fps;
        TimeInterval::new(start, start + clip_frame_count as f64 / clip_fps)
    }

    /// Decodes both files and locates `clip` inside `full`.
    ///
    /// Returns `Ok(None)` when no window can be scored, e.g. when no clip frame could be decoded.
    pub fn run(
        &self,
        full: impl AsRef<Path>,
        clip: impl AsRef<Path>,
    ) -> Result<Option<Localization>> {
        let (full, clip) = (full.as_ref(), clip.as_ref());

        tracing::info!("extracting frames from videos...");
        let full_track = self.extractor.run(full)?;
        let clip_track = self.extractor.run(clip)?;

        let result = match self.correlate(&full_track.signal, &clip_track.signal)? {
            Some(r) => r,
            None => return Ok(None),
        };
        let interval = self.to_interval(
            &result,
            full_track.frames_per_second,
            clip_track.frame_count,
            clip_track.frames_per_second,
        )?;

        Ok(Some(Localization { interval, result }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const DIM: usize = 16;

    // A descriptor whose pattern depends on `seed`, with no zero norm.
    fn descriptor(seed: u32) -> Vec<f32> {
        (0..DIM as u32)
            .map(|i| ((seed.wrapping_mul(2654435761).wrapping_add(i * 40503)) % 251) as f32 + 1.0)
            .collect()
    }

    fn signal(seeds: impl IntoIterator<Item = u32>) -> FrameSignal {
        let descriptors: Vec<Vec<f32>> = seeds.into_iter().map(descriptor).collect();
        FrameSignal::from_descriptors(&descriptors).unwrap()
    }

    #[test]
    fn test_self_match() {
        let full = signal(0..40);
        let clip = signal(17..25);
        let result = best_window(&full, &clip).unwrap();
        assert_eq!(result.offset, 17);
        assert!((result.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_scale_invariance() {
        let full = signal(0..20);
        let clip: Vec<Vec<f32>> = (5..9)
            .map(|s| descriptor(s).into_iter().map(|v| v * 3.5).collect())
            .collect();
        let clip = FrameSignal::from_descriptors(&clip).unwrap();
        assert_eq!(best_window(&full, &clip).unwrap().offset, 5);
    }

    #[test]
    fn test_empty_sequences_have_no_match() {
        let empty = FrameSignal::new(DIM as u32, 1);
        let full = signal(0..10);
        assert_eq!(best_window(&full, &empty), None);
        assert_eq!(best_window(&empty, &full), None);
        assert_eq!(best_window(&empty, &empty), None);

        let correlator = Correlator::default();
        assert_eq!(correlator.correlate(&full, &empty).unwrap(), None);
    }

    #[test]
    fn test_clip_longer_than_full_has_no_match() {
        assert_eq!(best_window(&signal(0..3), &signal(0..4)), None);
    }

    #[test]
    fn test_tie_goes_to_lowest_window() {
        // The pattern [1, 2] appears at windows 1 and 4.
        let full = signal([0, 1, 2, 3, 1, 2, 5]);
        let clip = signal([1, 2]);
        let result = best_window(&full, &clip).unwrap();
        assert_eq!(result.offset, 1);
    }

    #[test]
    fn test_zero_norm_frames_score_zero() {
        let black = vec![0.0f32; DIM];
        let full = FrameSignal::from_descriptors(&[black.clone(), descriptor(1)]).unwrap();
        let clip = FrameSignal::from_descriptors(&[black]).unwrap();
        let result = best_window(&full, &clip).unwrap();
        assert_eq!(result.offset, 0);
        assert_eq!(result.score, 0.0);
        assert!(result.score.is_finite());
    }

    #[test]
    fn test_descriptor_size_mismatch() {
        let full = signal(0..4);
        let clip = FrameSignal::from_descriptors(&[vec![1.0; DIM + 1]]).unwrap();
        assert_eq!(best_window(&full, &clip), None);
        let err = Correlator::default().correlate(&full, &clip).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_interval_conversion_and_shift() {
        let correlator = Correlator::default();
        let full = signal(0..200);
        let mut starts = Vec::new();
        for t0 in [30u32, 60] {
            let clip = signal(t0..t0 + 15);
            let result = correlator.correlate(&full, &clip).unwrap().unwrap();
            assert_eq!(result.offset, t0 as usize);
            // 150 true frames at 30fps in the clip.
            let interval = correlator.to_interval(&result, 30.0, 150, 30.0).unwrap();
            assert_eq!(interval.start, t0 as f64 * 10.0 / 30.0);
            assert_eq!(interval.end, interval.start + 5.0);
            starts.push(interval.start);
        }
        // Moving the clip by 30 sampled frames moves it by 300 source frames (10s).
        assert_eq!(starts[1] - starts[0], 10.0);
    }

    #[test]
    fn test_interval_rejects_bad_frame_rate() {
        let result = CorrelationResult {
            offset: 1,
            score: 1.0,
        };
        assert!(Correlator::default()
            .to_interval(&result, 0.0, 10, 25.0)
            .is_err());
    }
}
