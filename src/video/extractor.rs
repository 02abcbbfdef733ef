extern crate ffmpeg_next;

use std::path::Path;

use super::FrameSignal;
use crate::util;
use crate::{Error, Result};

/// Wraps the `FFmpeg` video decoder.
struct Decoder {
    decoder: ffmpeg_next::codec::decoder::Video,
}

impl Decoder {
    fn from_stream(stream: ffmpeg_next::format::stream::Stream, threaded: bool) -> Result<Self> {
        let ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let mut decoder = ctx.decoder();

        if threaded {
            decoder.set_threading(util::build_threading_config());
        }

        Ok(Self {
            decoder: decoder.video()?,
        })
    }

    fn send_packet(&mut self, packet: &ffmpeg_next::packet::Packet) -> Result<()> {
        Ok(self.decoder.send_packet(packet)?)
    }

    fn send_eof(&mut self) -> Result<()> {
        Ok(self.decoder.send_eof()?)
    }

    // Returns `false` once the decoder needs more input or is drained.
    fn receive_frame(&mut self, frame: &mut ffmpeg_next::frame::Video) -> Result<bool> {
        util::frame_received(self.decoder.receive_frame(frame))
    }
}

/// Sampled frames of one video, plus the stream properties needed for time conversion.
#[derive(Clone, Debug)]
pub struct VideoTrack {
    pub signal: FrameSignal,
    pub frames_per_second: f64,
    /// Number of frames in the stream (not the number of sampled frames).
    pub frame_count: u64,
}

// Tracks sampling state while frames are decoded in order.
struct Sampler {
    step: u64,
    limit: Option<u64>,
    decoded: u64,
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    buf: Vec<u8>,
    signal: FrameSignal,
}

impl Sampler {
    fn new(step: usize, limit: Option<u64>, width: u32, height: u32) -> Self {
        Self {
            step: step as u64,
            limit,
            decoded: 0,
            scaler: None,
            buf: Vec::with_capacity(width as usize * height as usize),
            signal: FrameSignal::new(width, height),
        }
    }

    fn is_done(&self) -> bool {
        self.limit.map_or(false, |limit| self.decoded >= limit)
    }

    // Returns a scaler for the given frame, rebuilding it if the input geometry changed.
    fn scaler_for(
        &mut self,
        frame: &ffmpeg_next::frame::Video,
    ) -> Result<&mut ffmpeg_next::software::scaling::Context> {
        let stale = match &self.scaler {
            Some(s) => {
                let input = s.input();
                input.format != frame.format()
                    || input.width != frame.width()
                    || input.height != frame.height()
            }
            None => true,
        };
        if stale {
            self.scaler = Some(ffmpeg_next::software::scaling::Context::get(
                frame.format(),
                frame.width(),
                frame.height(),
                ffmpeg_next::format::Pixel::GRAY8,
                self.signal.width(),
                self.signal.height(),
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )?);
        }
        self.scaler
            .as_mut()
            .ok_or_else(|| Error::InvalidConfig("scaler unavailable".to_string()))
    }

    // Handles the next decoded frame, in decode order.
    fn accept(&mut self, frame: &ffmpeg_next::frame::Video) -> Result<()> {
        let idx = self.decoded;
        self.decoded += 1;
        if idx % self.step != 0 {
            return Ok(());
        }

        let mut gray = ffmpeg_next::frame::Video::empty();
        self.scaler_for(frame)?.run(frame, &mut gray)?;

        // GRAY8 rows may carry stride padding; copy row by row.
        let (width, height) = (self.signal.width() as usize, self.signal.height() as usize);
        let stride = gray.stride(0);
        let data = gray.data(0);
        self.buf.clear();
        for row in 0..height {
            let start = row * stride;
            self.buf.extend_from_slice(&data[start..start + width]);
        }
        self.signal.push_gray(&self.buf)
    }
}

/// Decodes the best video stream of a file into a [FrameSignal].
///
/// Every `sample_step`-th frame (starting from frame 0) is converted to grayscale and
/// stretched to `width x height`. Frames are decoded in a single sequential pass. If
/// decoding fails part way through, sampling stops and the shorter signal is returned.
#[derive(Copy, Clone, Debug)]
pub struct Extractor {
    sample_step: usize,
    width: u32,
    height: u32,
    threaded_decoding: bool,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            sample_step: super::DEFAULT_SAMPLE_STEP,
            width: super::DEFAULT_FRAME_WIDTH,
            height: super::DEFAULT_FRAME_HEIGHT,
            threaded_decoding: false,
        }
    }
}

impl Extractor {
    /// Returns a new [Extractor] with the provided `sample_step`.
    pub fn with_sample_step(mut self, sample_step: usize) -> Self {
        self.sample_step = sample_step;
        self
    }

    /// Returns a new [Extractor] that resizes frames to `width x height`.
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Returns a new [Extractor] with `threaded_decoding` set to the provided value.
    pub fn with_threaded_decoding(mut self, threaded_decoding: bool) -> Self {
        self.threaded_decoding = threaded_decoding;
        self
    }

    pub fn sample_step(&self) -> usize {
        self.sample_step
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.sample_step == 0 {
            return Err(Error::InvalidConfig(
                "frame sample step must be positive".to_string(),
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "frame size must be positive: {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    fn frame_rate(stream: &ffmpeg_next::format::stream::Stream) -> Option<f64> {
        [stream.avg_frame_rate(), stream.rate()]
            .into_iter()
            .filter(|r| r.numerator() > 0 && r.denominator() > 0)
            .map(f64::from)
            .next()
    }

    /// Decodes and samples the video stream of `path`.
    pub fn run(&self, path: impl AsRef<Path>) -> Result<VideoTrack> {
        let span = tracing::span!(tracing::Level::TRACE, "frame_extract");
        let _enter = span.enter();

        self.validate()?;
        let path = path.as_ref();

        let mut ctx = ffmpeg_next::format::input(&path)?;
        let stream = util::find_best_stream(&ctx, ffmpeg_next::media::Type::Video, path)?;
        let stream_idx = stream.index();

        let frames_per_second =
            Self::frame_rate(&stream).ok_or_else(|| Error::InvalidFrameRate(path.to_owned()))?;

        // Prefer the frame count stored in the stream. Otherwise, estimate it from the duration.
        let frame_count = if stream.frames() > 0 {
            Some(stream.frames() as u64)
        } else {
            util::media_duration(&ctx, &stream).map(|d| (d * frames_per_second) as u64)
        };

        let mut decoder = Decoder::from_stream(stream, self.threaded_decoding)?;
        let mut sampler = Sampler::new(self.sample_step, frame_count, self.width, self.height);
        let mut frame = ffmpeg_next::frame::Video::empty();

        tracing::debug!(
            frames_per_second,
            ?frame_count,
            sample_step = self.sample_step,
            "starting frame sampling for {}",
            path.display()
        );

        // A decode error would desynchronize frame indices from source frames, so
        // sampling stops at the first one.
        let stop = |e: Error| {
            tracing::warn!("stopping frame sampling for {}: {}", path.display(), e);
        };

        let mut failed = false;
        'packets: for (s, p) in ctx.packets() {
            if s.index() != stream_idx {
                continue;
            }
            if let Err(e) = decoder.send_packet(&p) {
                stop(e);
                failed = true;
                break;
            }
            loop {
                match decoder.receive_frame(&mut frame) {
                    Ok(true) => (),
                    Ok(false) => break,
                    Err(e) => {
                        stop(e);
                        failed = true;
                        break 'packets;
                    }
                }
                if sampler.is_done() {
                    break 'packets;
                }
                if let Err(e) = sampler.accept(&frame) {
                    stop(e);
                    failed = true;
                    break 'packets;
                }
            }
            if sampler.is_done() {
                break;
            }
        }

        // Drain frames still buffered in the decoder.
        if !failed && !sampler.is_done() && decoder.send_eof().is_ok() {
            while !sampler.is_done() {
                match decoder.receive_frame(&mut frame) {
                    Ok(true) => (),
                    Ok(false) => break,
                    Err(e) => {
                        stop(e);
                        break;
                    }
                }
                if let Err(e) = sampler.accept(&frame) {
                    stop(e);
                    break;
                }
            }
        }

        let frame_count = frame_count.unwrap_or(sampler.decoded);
        tracing::debug!(
            num_frames = sampler.signal.len(),
            decoded = sampler.decoded,
            "completed frame sampling for {}",
            path.display()
        );

        Ok(VideoTrack {
            signal: sampler.signal,
            frames_per_second,
            frame_count,
        })
    }
}
