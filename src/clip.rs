//! Cutting sub-clips out of a video.
//!
//! Clips are written without re-encoding: packets are copied from the source container into a
//! new one. Since copying can only start on a keyframe, the written clip begins at the keyframe
//! at or before the requested start. [cut] names the clip after the range that was actually
//! copied, so the ground truth in the file name matches the clip's content.

use std::path::{Path, PathBuf};

use ffmpeg_next::{codec::Id, media::Type};

use crate::search::TimeInterval;
use crate::util;
use crate::{Error, Result};

/// Returns the path of the clip of `video` covering `[start, end)`.
///
/// The name is `<stem>_clip_<start>_<end>.mp4` with times rounded to whole seconds, which
/// is what [crate::evaluate::ground_truth_from_path] expects. If `output_dir` is not set, the
/// clip is placed next to the video.
pub fn clip_file_name(
    video: impl AsRef<Path>,
    start: f64,
    end: f64,
    output_dir: Option<&Path>,
) -> PathBuf {
    let video = video.as_ref();
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    let name = format!(
        "{}_clip_{}_{}.mp4",
        stem,
        start.max(0.0).round() as u64,
        end.max(0.0).round() as u64
    );
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| video.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(name)
}

/// Copies the `[start, end)` range of a video into a new file.
#[derive(Clone, Debug)]
pub struct Cutter {
    input: PathBuf,
    output: PathBuf,
    start: f64,
    end: f64,
}

impl Cutter {
    /// Constructs a new [Cutter]. The output container format is inferred from the extension.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_owned(),
            output: output.as_ref().to_owned(),
            start: 0.0,
            end: f64::INFINITY,
        }
    }

    /// Returns a new [Cutter] with the provided range, in seconds.
    pub fn with_range(mut self, start: f64, end: f64) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Writes the clip and returns the range of the source that it covers.
    ///
    /// The returned start is the timestamp of the first copied packet, which is at or before
    /// the requested start. The end is where the last copied packet ends, capped at the
    /// requested end.
    pub fn run(&self) -> Result<TimeInterval> {
        let span = tracing::span!(tracing::Level::TRACE, "cut");
        let _enter = span.enter();

        if !(self.start >= 0.0 && self.end > self.start) {
            return Err(Error::InvalidTimeRange {
                start: self.start,
                end: self.end,
            });
        }

        let mut ictx = ffmpeg_next::format::input(&self.input)?;
        let mut octx = ffmpeg_next::format::output(&self.output)?;

        // Maps input stream index to output stream index. Only audio and video are kept.
        let mut stream_map: Vec<Option<usize>> = Vec::new();
        let mut num_output_streams = 0;
        for stream in ictx.streams() {
            let medium = stream.parameters().medium();
            if medium != Type::Video && medium != Type::Audio {
                stream_map.push(None);
                continue;
            }
            let mut out_stream = octx.add_stream(ffmpeg_next::encoder::find(Id::None))?;
            out_stream.set_parameters(stream.parameters());
            // Reset the codec tag to let the muxer choose.
            unsafe {
                (*out_stream.parameters().as_mut_ptr()).codec_tag = 0;
            }
            stream_map.push(Some(num_output_streams));
            num_output_streams += 1;
        }

        if num_output_streams == 0 {
            return Err(Error::NoVideoStream(self.input.clone()));
        }

        octx.set_metadata(ictx.metadata().to_owned());
        octx.write_header()?;

        // Seek to the keyframe at or before the start. Without a stream index, FFmpeg
        // expects the timestamp in microseconds.
        let seek_ts = (self.start * 1_000_000.0) as i64;
        if seek_ts > 0 {
            ictx.seek(seek_ts, ..seek_ts)?;
        }

        // Packets of mapped streams, with their timestamp in seconds.
        let mut packets = ictx.packets().filter_map(|(stream, packet)| {
            let input_idx = stream.index();
            let output_idx = stream_map.get(input_idx).copied().flatten()?;
            let time_base = stream.time_base();
            let ts = packet.pts().or_else(|| packet.dts())?;
            let secs = util::to_seconds(time_base, ts);
            Some((input_idx, output_idx, time_base, secs, packet))
        });

        // Streams are interleaved loosely, so the earliest packet after the seek is not always
        // the first one read. Look ahead until every stream has produced a packet.
        let mut pending = Vec::new();
        let mut seen = vec![false; stream_map.len()];
        for item in packets.by_ref() {
            let past_end = item.3 >= self.end;
            seen[item.0] = true;
            pending.push(item);
            let all_seen = stream_map
                .iter()
                .zip(&seen)
                .all(|(mapped, seen)| mapped.is_none() || *seen);
            if all_seen || past_end {
                break;
            }
        }

        // Output timestamps are shifted so that the earliest copied packet starts at zero.
        let origin = pending
            .iter()
            .map(|item| item.3)
            .filter(|secs| *secs < self.end)
            .fold(None, |acc: Option<f64>, secs| Some(acc.map_or(secs, |a| a.min(secs))));
        let mut last_end = 0.0f64;
        let mut finished = vec![false; stream_map.len()];
        let mut copied = 0usize;

        for (input_idx, output_idx, input_time_base, secs, mut packet) in
            pending.into_iter().chain(packets)
        {
            let Some(origin) = origin else {
                break;
            };
            if finished[input_idx] || secs < origin {
                continue;
            }
            if secs >= self.end {
                finished[input_idx] = true;
                let done = stream_map
                    .iter()
                    .zip(&finished)
                    .all(|(mapped, done)| mapped.is_none() || *done);
                if done {
                    break;
                }
                continue;
            }

            let duration = util::to_seconds(input_time_base, packet.duration().max(0));
            last_end = last_end.max(secs + duration);

            let shift = util::from_seconds(input_time_base, origin);
            packet.set_pts(packet.pts().map(|t| t - shift));
            packet.set_dts(packet.dts().map(|t| t - shift));

            let output_time_base = octx
                .stream(output_idx)
                .map(|s| s.time_base())
                .ok_or_else(|| Error::InvalidConfig("missing output stream".to_string()))?;
            packet.set_stream(output_idx);
            packet.rescale_ts(input_time_base, output_time_base);
            packet.set_position(-1);
            packet.write_interleaved(&mut octx)?;
            copied += 1;
        }

        octx.write_trailer()?;

        let start = origin.ok_or_else(|| Error::EmptySignal {
            path: self.input.clone(),
            stage: "clip",
        })?;
        let range = TimeInterval::new(start, last_end.min(self.end).max(start))?;

        tracing::debug!(
            copied,
            start = range.start,
            end = range.end,
            "wrote clip {}",
            self.output.display()
        );

        Ok(range)
    }
}

/// Cuts `[start, end)` out of `video` and returns the clip's path with the range it covers.
///
/// The clip is first written under the requested range's name, then renamed after the copied
/// range (see [Cutter::run]) when the two names differ.
pub fn cut(
    video: impl AsRef<Path>,
    start: f64,
    end: f64,
    output_dir: Option<&Path>,
) -> Result<(PathBuf, TimeInterval)> {
    let video = video.as_ref();
    let requested = clip_file_name(video, start, end, output_dir);
    let range = Cutter::new(video, &requested).with_range(start, end).run()?;

    let output = clip_file_name(video, range.start, range.end, output_dir);
    if output != requested {
        std::fs::rename(&requested, &output)?;
    }

    tracing::info!(
        start = range.start,
        end = range.end,
        "cut clip {}",
        output.display()
    );

    Ok((output, range))
}
