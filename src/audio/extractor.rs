extern crate ffmpeg_next;

use std::path::Path;

use super::AudioSignal;
use crate::util;
use crate::{Error, Result};

/// Thin wrapper around the native `FFmpeg` audio decoder.
struct Decoder {
    decoder: ffmpeg_next::codec::decoder::Audio,
}

impl Decoder {
    fn from_stream(stream: ffmpeg_next::format::stream::Stream, threaded: bool) -> Result<Self> {
        let ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let mut decoder = ctx.decoder();

        if threaded {
            decoder.set_threading(util::build_threading_config());
        }

        let decoder = decoder.audio()?;

        Ok(Self { decoder })
    }

    // Some streams do not carry an explicit layout; derive one from the channel count.
    fn channel_layout(&self) -> ffmpeg_next::ChannelLayout {
        let layout = self.decoder.channel_layout();
        if layout.is_empty() {
            ffmpeg_next::ChannelLayout::default(self.decoder.channels() as i32)
        } else {
            layout
        }
    }

    fn send_packet(&mut self, packet: &ffmpeg_next::packet::Packet) -> Result<()> {
        Ok(self.decoder.send_packet(packet)?)
    }

    fn send_eof(&mut self) -> Result<()> {
        Ok(self.decoder.send_eof()?)
    }

    // Returns `false` once the decoder needs more input or is drained.
    fn receive_frame(&mut self, frame: &mut ffmpeg_next::frame::Audio) -> Result<bool> {
        util::frame_received(self.decoder.receive_frame(frame))
    }
}

/// The decoded audio of one file, plus its playback duration.
#[derive(Clone, Debug)]
pub struct AudioTrack {
    pub signal: AudioSignal,
    /// Playback duration of the file, in seconds. This comes from the container and
    /// is independent of how many samples were decoded.
    pub duration: f64,
}

/// Decodes the best audio stream of a video into an [AudioSignal].
///
/// Audio is resampled to `sample_rate` as packed `f32`, keeping the source channel layout,
/// then mixed down to mono and peak-normalized.
#[derive(Copy, Clone, Debug)]
pub struct Extractor {
    sample_rate: u32,
    threaded_decoding: bool,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            sample_rate: super::DEFAULT_SAMPLE_RATE,
            threaded_decoding: false,
        }
    }
}

impl Extractor {
    /// Returns a new [Extractor] with the provided `sample_rate`.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Returns a new [Extractor] with `threaded_decoding` set to the provided value.
    pub fn with_threaded_decoding(mut self, threaded_decoding: bool) -> Self {
        self.threaded_decoding = threaded_decoding;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    // Copies the interleaved samples of a resampled frame into `out`.
    //
    // Note that `data` is a fixed-size buffer. To get the _actual_ sample bytes, we need to use:
    // a) sample count, b) channel count, and c) number of bytes per F32 sample.
    fn append_samples(frame: &ffmpeg_next::frame::Audio, out: &mut Vec<f32>) {
        let len = frame.samples() * frame.channels() as usize * std::mem::size_of::<f32>();
        let raw = &frame.data(0)[..len];
        out.extend(
            raw.chunks_exact(4)
                .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
        );
    }

    // Resamples a decoded frame and drains the resampler's delay buffer.
    fn resample_frame(
        resampler: &mut ffmpeg_next::software::resampling::Context,
        frame: &ffmpeg_next::frame::Audio,
        frame_resampled: &mut ffmpeg_next::frame::Audio,
        out: &mut Vec<f32>,
    ) -> Result<()> {
        let mut delay = match resampler.run(frame, frame_resampled) {
            Ok(v) => v,
            // If resampling fails due to changed input, construct a new resampler for this frame
            // and swap out the existing one. The output format is unchanged.
            Err(ffmpeg_next::Error::InputChanged) => {
                let (format, channel_layout, rate) = {
                    let output = resampler.output();
                    (output.format, output.channel_layout, output.rate)
                };
                let mut local_resampler = frame.resampler(format, channel_layout, rate)?;
                let delay = local_resampler.run(frame, frame_resampled)?;
                *resampler = local_resampler;
                delay
            }
            Err(e) => return Err(e.into()),
        };

        loop {
            Self::append_samples(frame_resampled, out);
            if delay.is_none() {
                break;
            }
            delay = resampler.flush(frame_resampled)?;
        }

        Ok(())
    }

    /// Decodes and resamples the whole audio track of `path`.
    pub fn run(&self, path: impl AsRef<Path>) -> Result<AudioTrack> {
        let span = tracing::span!(tracing::Level::TRACE, "audio_extract");
        let _enter = span.enter();

        let path = path.as_ref();
        if self.sample_rate == 0 {
            return Err(Error::InvalidConfig(
                "audio sample rate must be positive".to_string(),
            ));
        }

        let mut ctx = ffmpeg_next::format::input(&path)?;
        let stream = util::find_best_stream(&ctx, ffmpeg_next::media::Type::Audio, path)?;
        let stream_idx = stream.index();
        let duration = util::media_duration(&ctx, &stream);
        let mut decoder = Decoder::from_stream(stream, self.threaded_decoding)?;

        let layout = decoder.channel_layout();
        let channels = layout.channels().max(1) as usize;
        let mut resampler = decoder.decoder.resampler(
            ffmpeg_next::format::Sample::F32(ffmpeg_next::format::sample::Type::Packed),
            layout,
            self.sample_rate,
        )?;

        tracing::debug!(
            channels,
            sample_rate = self.sample_rate,
            "starting audio decode for {}",
            path.display()
        );

        let mut interleaved = Vec::new();
        let mut frame = ffmpeg_next::frame::Audio::empty();
        let mut frame_resampled = ffmpeg_next::frame::Audio::empty();

        // We are only interested in packets for the selected stream.
        let audio_packets = ctx
            .packets()
            .filter(|(s, _)| s.index() == stream_idx)
            .map(|(_, p)| p);

        for p in audio_packets {
            decoder.send_packet(&p)?;
            while decoder.receive_frame(&mut frame)? {
                Self::resample_frame(&mut resampler, &frame, &mut frame_resampled, &mut interleaved)?;
            }
        }

        // Drain frames still buffered in the decoder.
        decoder.send_eof()?;
        while decoder.receive_frame(&mut frame)? {
            Self::resample_frame(&mut resampler, &frame, &mut frame_resampled, &mut interleaved)?;
        }

        let signal = AudioSignal::from_interleaved(&interleaved, channels, self.sample_rate, path)?;
        let duration = duration.unwrap_or_else(|| signal.duration());

        tracing::debug!(
            num_samples = signal.len(),
            duration,
            "completed audio decode for {}",
            path.display()
        );

        Ok(AudioTrack { signal, duration })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixture;

    #[test]
    fn test_missing_file_is_a_decode_error() {
        ffmpeg_next::init().unwrap();
        let err = Extractor::default().run("/nonexistent/video.mp4").unwrap_err();
        assert!(matches!(err, Error::FFmpegError(_)));
    }

    #[test]
    fn test_zero_sample_rate_is_rejected() {
        let err = Extractor::default()
            .with_sample_rate(0)
            .run("/nonexistent/video.mp4")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_extract_synthetic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp4");
        fixture::write(&path, 3, true).unwrap();

        let track = Extractor::default().run(&path).unwrap();
        assert!((track.duration - 3.0).abs() < 0.15, "{}", track.duration);
        assert_eq!(track.signal.sample_rate(), 22050);
        let expected = 3 * 22050;
        assert!(track.signal.len().abs_diff(expected) < 4096, "{}", track.signal.len());
        assert!(track.signal.samples().iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_extract_resamples_to_configured_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp4");
        fixture::write(&path, 2, true).unwrap();

        let track = Extractor::default().with_sample_rate(8000).run(&path).unwrap();
        assert_eq!(track.signal.sample_rate(), 8000);
        assert!(track.signal.len().abs_diff(2 * 8000) < 2048, "{}", track.signal.len());
    }

    #[test]
    fn test_video_without_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silent.mp4");
        fixture::write(&path, 1, false).unwrap();

        let err = Extractor::default().run(&path).unwrap_err();
        assert!(matches!(err, Error::NoAudioStream(_)));
    }
}
