use std::io::Read;
use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

/// Format-level durations are expressed in `AV_TIME_BASE` units (microseconds).
const AV_TIME_BASE: f64 = 1_000_000.0;

/// Formats the given [Duration] as "HH:MM:SS.mmm"
pub fn format_time(t: Duration) -> String {
    let hours = t.as_secs() / 3600;
    let minutes = (t.as_secs() % 3600) / 60;
    let seconds = t.as_secs() % 60;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        hours,
        minutes,
        seconds,
        t.subsec_millis()
    )
}

/// Formats a time in (non-negative) seconds. See [format_time].
pub fn format_seconds(secs: f64) -> String {
    format_time(Duration::from_secs_f64(secs.max(0.0)))
}

/// Checks if the given path points to a valid video file.
///
/// If `full` is set to **false**, only the file header will be checked. This is a very cheap
/// operation, but it does not guarantee validity. If set to **true**, FFmpeg will be used to
/// check the video contents - note that this is more expensive, but much more accurate.
///
/// If `audio` is set to true, this function will ensure that the video contains *at least* one audio stream.
/// This flag is only used when `full` is set to **true**.
pub fn is_valid_video_file(path: impl AsRef<Path>, full: bool, audio: bool) -> bool {
    if !full {
        let mut buf = [0u8; 8192];
        let n = match std::fs::File::open(path.as_ref()).and_then(|mut f| f.read(&mut buf)) {
            Ok(n) => n,
            Err(_) => return false,
        };
        return infer::is_video(&buf[..n]);
    }

    if let Ok(input) = ffmpeg_next::format::input(&path.as_ref()) {
        let num_video_streams = input
            .streams()
            .filter(|s| s.parameters().medium() == ffmpeg_next::util::media::Type::Video)
            .count();
        let num_audio_streams = input
            .streams()
            .filter(|s| s.parameters().medium() == ffmpeg_next::util::media::Type::Audio)
            .count();
        num_video_streams > 0 && (!audio || num_audio_streams > 0)
    } else {
        false
    }
}

/// Returns the underlying FFmpeg version integer used by clipseek.
pub fn ffmpeg_version() -> u32 {
    ffmpeg_next::util::version()
}

/// Returns the underlying FFmpeg version string used by clipseek.
pub fn ffmpeg_version_string() -> String {
    let version_int = ffmpeg_version();

    // Reference: https://github.com/FFmpeg/FFmpeg/blob/130d19bf2044ac76372d1b97ab87ab283c8b37f8/libavutil/version.h#L64
    format!(
        "{}.{}.{}",
        version_int >> 16,             // MAJOR
        (version_int & 0x00FF00) >> 8, // MINOR
        version_int & 0xFF             // MICRO
    )
}

// Converts a timestamp in time base units into seconds.
pub(crate) fn to_seconds(time_base: ffmpeg_next::util::rational::Rational, raw_timestamp: i64) -> f64 {
    raw_timestamp as f64 * f64::from(time_base)
}

// Converts seconds into a timestamp in time base units.
pub(crate) fn from_seconds(time_base: ffmpeg_next::util::rational::Rational, secs: f64) -> i64 {
    (secs / f64::from(time_base)) as i64
}

// Returns the playback duration of the media, in seconds.
//
// The container duration is preferred since it covers every stream. Some
// containers only store it per stream, so fall back to the given stream.
pub(crate) fn media_duration(
    ctx: &ffmpeg_next::format::context::Input,
    stream: &ffmpeg_next::format::stream::Stream,
) -> Option<f64> {
    if ctx.duration() > 0 {
        Some(ctx.duration() as f64 / AV_TIME_BASE)
    } else if stream.duration() > 0 {
        Some(to_seconds(stream.time_base(), stream.duration()))
    } else {
        None
    }
}

pub(crate) fn find_best_stream<'a>(
    input: &'a ffmpeg_next::format::context::Input,
    kind: ffmpeg_next::media::Type,
    path: &Path,
) -> Result<ffmpeg_next::format::stream::Stream<'a>> {
    input.streams().best(kind).ok_or_else(|| match kind {
        ffmpeg_next::media::Type::Video => Error::NoVideoStream(path.to_owned()),
        _ => Error::NoAudioStream(path.to_owned()),
    })
}

// Interprets the result of a decoder's `receive_frame`.
//
// `Ok(true)` means a frame was written. `Ok(false)` means the decoder needs more input
// (EAGAIN) or has been fully drained (EOF). Anything else is a real decode error.
pub(crate) fn frame_received(
    result: std::result::Result<(), ffmpeg_next::Error>,
) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(ffmpeg_next::Error::Eof) => Ok(false),
        Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn build_threading_config() -> ffmpeg_next::codec::threading::Config {
    let mut config = ffmpeg_next::codec::threading::Config::default();
    config.count = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.kind = ffmpeg_next::codec::threading::Type::Frame;
    config
}
