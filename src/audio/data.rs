use std::path::Path;

use crate::{Error, Result};

/// Mono audio samples at a fixed sample rate, peak-normalized to `[-1, 1]`.
///
/// An [AudioSignal] can only be built through [AudioSignal::from_interleaved] or
/// [AudioSignal::from_mono], both of which mix down and normalize, so every instance
/// satisfies the normalization invariant.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioSignal {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioSignal {
    /// Builds a signal from interleaved samples (`c1, c2, c1, c2, ...`).
    ///
    /// Multi-channel audio is collapsed to mono by taking the arithmetic mean of each
    /// sample across channels. `source` is only used to attribute errors.
    pub fn from_interleaved(
        interleaved: &[f32],
        channels: usize,
        sample_rate: u32,
        source: impl AsRef<Path>,
    ) -> Result<Self> {
        if channels == 0 {
            return Err(Error::InvalidConfig(
                "audio must have at least one channel".to_string(),
            ));
        }
        let mono = if channels == 1 {
            interleaved.to_vec()
        } else {
            interleaved
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };
        Self::from_mono(mono, sample_rate, source)
    }

    /// Builds a signal from mono samples, normalizing by the peak absolute value.
    ///
    /// Fails if the signal is empty or silent, since the normalization divisor
    /// would be zero.
    pub fn from_mono(mut samples: Vec<f32>, sample_rate: u32, source: impl AsRef<Path>) -> Result<Self> {
        let source = source.as_ref();
        if samples.is_empty() {
            return Err(Error::EmptySignal {
                path: source.to_owned(),
                stage: "audio",
            });
        }

        let peak = samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
        if peak == 0.0 || !peak.is_finite() {
            return Err(Error::SilentSignal(source.to_owned()));
        }

        for s in &mut samples {
            *s /= peak;
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length of the signal, in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
