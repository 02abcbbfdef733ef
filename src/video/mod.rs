mod correlator;
mod data;
mod extractor;

pub use correlator::{best_window, Correlator};
pub use data::FrameSignal;
pub use extractor::{Extractor, VideoTrack};

/// Default frame sampling step.
///
/// Only every Nth frame of a video is decoded into a descriptor. This is also the time
/// resolution of the frame path: the recovered start time is a multiple of
/// `DEFAULT_SAMPLE_STEP / fps` seconds.
pub const DEFAULT_SAMPLE_STEP: usize = 10;

/// Default descriptor width, in pixels.
pub const DEFAULT_FRAME_WIDTH: u32 = 160;

/// Default descriptor height, in pixels.
///
/// Frames are stretched to `DEFAULT_FRAME_WIDTH x DEFAULT_FRAME_HEIGHT` without preserving
/// aspect ratio, giving 19200-element grayscale descriptors.
pub const DEFAULT_FRAME_HEIGHT: u32 = 120;
