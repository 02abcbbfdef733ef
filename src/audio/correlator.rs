use std::path::{Path, PathBuf};

use realfft::RealFftPlanner;

use super::{AudioSignal, Extractor};
use crate::search::{self, CorrelationResult, Localization, TimeInterval};
use crate::{Error, Result};

/// Computes the "valid" cross-correlation of `full` and `clip`.
///
/// Output index `k` is `sum(full[k + n] * clip[n])` over the clip, for every offset where the
/// clip fully overlaps the full signal, i.e. `full.len() - clip.len() + 1` values.
///
/// Both spectra are computed with a real FFT of length `L >= full.len()`. The circular
/// correlation `IFFT(F * conj(C))` never wraps around inside the valid region because the
/// clip is zero-padded and `k + n < full.len() <= L`.
pub fn correlate_valid(full: &[f32], clip: &[f32]) -> Result<Vec<f64>> {
    if clip.is_empty() {
        return Err(Error::EmptySignal {
            path: PathBuf::new(),
            stage: "clip audio",
        });
    }
    if clip.len() > full.len() {
        return Err(Error::ClipLongerThanFull {
            clip_len: clip.len(),
            full_len: full.len(),
        });
    }

    let n = full.len().next_power_of_two();
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n);
    let c2r = planner.plan_fft_inverse(n);

    let mut full_buf = r2c.make_input_vec();
    for (dst, src) in full_buf.iter_mut().zip(full) {
        *dst = *src as f64;
    }
    let mut clip_buf = r2c.make_input_vec();
    for (dst, src) in clip_buf.iter_mut().zip(clip) {
        *dst = *src as f64;
    }

    let mut full_spectrum = r2c.make_output_vec();
    let mut clip_spectrum = r2c.make_output_vec();
    r2c.process(&mut full_buf, &mut full_spectrum)
        .map_err(|e| Error::FftError(e.to_string()))?;
    r2c.process(&mut clip_buf, &mut clip_spectrum)
        .map_err(|e| Error::FftError(e.to_string()))?;

    for (f, c) in full_spectrum.iter_mut().zip(&clip_spectrum) {
        *f *= c.conj();
    }

    // The inverse real FFT requires purely real DC and Nyquist bins.
    if let Some(dc) = full_spectrum.first_mut() {
        dc.im = 0.0;
    }
    if n % 2 == 0 {
        if let Some(nyquist) = full_spectrum.last_mut() {
            nyquist.im = 0.0;
        }
    }

    let mut output = c2r.make_output_vec();
    c2r.process(&mut full_spectrum, &mut output)
        .map_err(|e| Error::FftError(e.to_string()))?;

    // realfft does not normalize.
    let scale = n as f64;
    let valid = full.len() - clip.len() + 1;
    Ok(output[..valid].iter().map(|v| v / scale).collect())
}

/// Locates a clip inside a full video by cross-correlating their audio tracks.
///
/// At a high-level, the correlator does the following:
///
/// 1. Decodes both audio tracks, resamples them to `sample_rate`, mixes them down to mono and
///    peak-normalizes them (see [Extractor])
/// 2. Runs an FFT-based valid-mode cross-correlation of the clip against the full signal
/// 3. Picks the offset with the largest correlation (lowest offset on ties)
/// 4. Converts the offset to seconds and adds the clip's playback duration
///
/// # Example
///
/// ```
/// use clipseek::audio::Correlator;
///
/// let correlator = Correlator::default().with_sample_rate(22050);
/// let found = correlator.run("full.mp4", "full_clip_130_145.mp4").unwrap();
/// println!("{:?}", found.interval);
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct Correlator {
    extractor: Extractor,
}

impl Correlator {
    /// Returns a new [Correlator] with the provided `sample_rate`.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.extractor = self.extractor.with_sample_rate(sample_rate);
        self
    }

    /// Returns a new [Correlator] with `threaded_decoding` set to the provided value.
    pub fn with_threaded_decoding(mut self, threaded_decoding: bool) -> Self {
        self.extractor = self.extractor.with_threaded_decoding(threaded_decoding);
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.extractor.sample_rate()
    }

    /// Finds the offset of `clip` inside `full`.
    ///
    /// The score is the peak correlation divided by the clip length. Since both signals are
    /// peak-normalized rather than energy-normalized, it is not bounded to `[-1, 1]`.
    pub fn correlate(&self, full: &AudioSignal, clip: &AudioSignal) -> Result<CorrelationResult> {
        let span = tracing::span!(tracing::Level::TRACE, "audio_correlate");
        let _enter = span.enter();

        if full.sample_rate() != clip.sample_rate() {
            return Err(Error::InvalidConfig(format!(
                "sample rate mismatch: full={} clip={}",
                full.sample_rate(),
                clip.sample_rate()
            )));
        }

        tracing::debug!(
            full_len = full.len(),
            clip_len = clip.len(),
            "computing cross-correlation"
        );
        let correlation = correlate_valid(full.samples(), clip.samples())?;

        // Both signals are peak-normalized, so |corr| <= clip.len(). FFT rounding noise scales
        // with that bound rather than with the best value, which may be close to zero.
        let tolerance = super::TIE_TOLERANCE * clip.len() as f64;
        let (offset, value) = search::argmax_with_tolerance(&correlation, tolerance)
            .ok_or_else(|| Error::FftError("correlation produced no finite values".to_string()))?;

        let result = CorrelationResult {
            offset,
            score: value / clip.len() as f64,
        };
        tracing::debug!(offset, score = result.score, "found best audio offset");

        Ok(result)
    }

    /// Converts a sample offset into a [TimeInterval] spanning `clip_duration` seconds.
    pub fn to_interval(&self, result: &CorrelationResult, clip_duration: f64) -> Result<TimeInterval> {
        let start = result.offset as f64 / self.sample_rate() as f64;
        TimeInterval::new(start, start + clip_duration.max(0.0))
    }

    /// Decodes both files and locates `clip` inside `full`.
    pub fn run(&self, full: impl AsRef<Path>, clip: impl AsRef<Path>) -> Result<Localization> {
        let (full, clip) = (full.as_ref(), clip.as_ref());

        tracing::info!("extracting audio from videos...");
        let full_track = self.extractor.run(full)?;
        let clip_track = self.extractor.run(clip)?;

        if clip_track.signal.len() > full_track.signal.len() {
            return Err(Error::ClipLongerThanFull {
                clip_len: clip_track.signal.len(),
                full_len: full_track.signal.len(),
            });
        }

        tracing::info!("computing cross-correlation...");
        let result = self.correlate(&full_track.signal, &clip_track.signal)?;
        let interval = self.to_interval(&result, clip_track.duration)?;

        Ok(Localization { interval, result })
    }
}
