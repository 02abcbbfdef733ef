mod correlator;
mod data;
mod extractor;

pub use correlator::{correlate_valid, Correlator};
pub use data::AudioSignal;
pub use extractor::{AudioTrack, Extractor};

/// Default audio sample rate (Hz).
///
/// Both the full video and the clip are decoded and resampled to this rate before
/// correlation. The best offset is a sample index, so this is also the time
/// resolution of the audio path: one sample is `1 / 22050` seconds.
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

/// Relative tolerance used when picking the best FFT correlation value.
///
/// Values within `TIE_TOLERANCE * clip_len` of the maximum are treated as equal, and the lowest
/// offset among them wins. `clip_len` bounds the magnitude of the correlation of two
/// peak-normalized signals.
pub const TIE_TOLERANCE: f64 = 1e-9;
