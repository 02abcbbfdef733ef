use std::path::PathBuf;

pub mod audio;
pub mod clip;
pub mod evaluate;
#[cfg(test)]
mod fixture;
pub mod search;
pub mod util;
pub mod video;

pub use search::{CorrelationResult, Localization, TimeInterval};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("clip signal is longer than the full signal: clip={clip_len} full={full_len}")]
    ClipLongerThanFull { clip_len: usize, full_len: usize },
    #[error("audio track is silent (peak amplitude is zero): {0:?}")]
    SilentSignal(PathBuf),
    #[error("decoded {stage} signal is empty: {path:?}")]
    EmptySignal { path: PathBuf, stage: &'static str },
    #[error("ground truth interval has zero length (start=end={start})")]
    ZeroLengthGroundTruth { start: f64 },
    #[error("video stream has no usable frame rate: {0:?}")]
    InvalidFrameRate(PathBuf),
    #[error("invalid time range: start={start} end={end}")]
    InvalidTimeRange { start: f64, end: f64 },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("could not extract start and end time from clip path: {0}")]
    GroundTruthNotFound(String),
    #[error("no audio stream found in: {0:?}")]
    NoAudioStream(PathBuf),
    #[error("no video stream found in: {0:?}")]
    NoVideoStream(PathBuf),
    #[error("FFmpeg error: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),
    #[error("FFT error: {0}")]
    FftError(String),
    #[error("serde_json error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
