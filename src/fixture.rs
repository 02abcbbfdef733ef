//! Synthetic media for tests.
//!
//! Writes a small MP4 with an MPEG-4 video track showing a scrolling random texture and,
//! optionally, an AAC track of white noise. Both encoders are built into FFmpeg, so tests
//! do not depend on media files or external libraries.

use std::path::Path;

use ffmpeg_next::codec::Id;
use ffmpeg_next::format::{sample, Pixel, Sample};
use ffmpeg_next::{ChannelLayout, Rational};

use crate::Result;

pub(crate) const FPS: i32 = 25;
pub(crate) const GOP: u32 = 50;
pub(crate) const WIDTH: u32 = 64;
pub(crate) const HEIGHT: u32 = 48;
pub(crate) const SAMPLE_RATE: i32 = 22050;

// Pixels the texture moves per frame.
const SCROLL: u32 = 2;

fn texel(u: u32, v: u32) -> u8 {
    let mut h = u.wrapping_mul(0x9E37_79B1) ^ v.wrapping_mul(0x85EB_CA77);
    h ^= h >> 15;
    h = h.wrapping_mul(0x2C1B_3C6D);
    h ^= h >> 12;
    (h & 0xFF) as u8
}

fn video_frame(idx: u32) -> ffmpeg_next::frame::Video {
    let mut frame = ffmpeg_next::frame::Video::new(Pixel::YUV420P, WIDTH, HEIGHT);
    let stride = frame.stride(0);
    let luma = frame.data_mut(0);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            luma[y as usize * stride + x as usize] = texel((x + SCROLL * idx) / 4, y / 4);
        }
    }
    frame.data_mut(1).fill(128);
    frame.data_mut(2).fill(128);
    frame.set_pts(Some(idx as i64));
    frame
}

// Moves every pending packet from `encoder` into the output.
fn drain(
    encoder: &mut ffmpeg_next::encoder::Encoder,
    octx: &mut ffmpeg_next::format::context::Output,
    stream_idx: usize,
    time_base: Rational,
) -> Result<()> {
    let mut packet = ffmpeg_next::Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        let stream_time_base = octx
            .stream(stream_idx)
            .map(|s| s.time_base())
            .unwrap_or(time_base);
        packet.set_stream(stream_idx);
        packet.rescale_ts(time_base, stream_time_base);
        packet.write_interleaved(octx)?;
    }
    Ok(())
}

struct AudioOut {
    encoder: ffmpeg_next::encoder::audio::Encoder,
    stream_idx: usize,
    frame_size: usize,
    pts: i64,
    state: u64,
}

impl AudioOut {
    fn next_frame(&mut self) -> ffmpeg_next::frame::Audio {
        let mut frame = ffmpeg_next::frame::Audio::new(
            Sample::F32(sample::Type::Planar),
            self.frame_size,
            ChannelLayout::MONO,
        );
        frame.set_rate(SAMPLE_RATE as u32);
        for bytes in frame.data_mut(0).chunks_exact_mut(4).take(self.frame_size) {
            self.state = self
                .state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let v = ((self.state >> 33) as f64 / (1u64 << 31) as f64 - 0.5) as f32;
            bytes.copy_from_slice(&v.to_ne_bytes());
        }
        frame.set_pts(Some(self.pts));
        self.pts += self.frame_size as i64;
        frame
    }
}

/// Writes `seconds` of synthetic video (and noise audio if `audio` is set) to `path`.
pub(crate) fn write(path: &Path, seconds: u32, audio: bool) -> Result<()> {
    ffmpeg_next::init()?;

    let mut octx = ffmpeg_next::format::output(&path)?;
    let global_header = octx
        .format()
        .flags()
        .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

    let video_time_base = Rational::new(1, FPS);
    let codec = ffmpeg_next::encoder::find(Id::MPEG4).ok_or(ffmpeg_next::Error::EncoderNotFound)?;
    let (video_idx, mut video) = {
        let mut stream = octx.add_stream(codec)?;
        let ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let mut encoder = ctx.encoder().video()?;
        encoder.set_width(WIDTH);
        encoder.set_height(HEIGHT);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(video_time_base);
        encoder.set_frame_rate(Some(Rational::new(FPS, 1)));
        encoder.set_gop(GOP);
        encoder.set_max_b_frames(0);
        encoder.set_bit_rate(400_000);
        if global_header {
            encoder.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_as(codec)?;
        stream.set_parameters(&encoder);
        stream.set_time_base(video_time_base);
        (stream.index(), encoder)
    };

    let audio_time_base = Rational::new(1, SAMPLE_RATE);
    let mut audio_out = if audio {
        let codec = ffmpeg_next::encoder::find(Id::AAC).ok_or(ffmpeg_next::Error::EncoderNotFound)?;
        let mut stream = octx.add_stream(codec)?;
        let ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let mut encoder = ctx.encoder().audio()?;
        encoder.set_rate(SAMPLE_RATE);
        encoder.set_channel_layout(ChannelLayout::MONO);
        encoder.set_channels(1);
        encoder.set_format(Sample::F32(sample::Type::Planar));
        encoder.set_bit_rate(96_000);
        encoder.set_time_base(audio_time_base);
        if global_header {
            encoder.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_as(codec)?;
        stream.set_parameters(&encoder);
        stream.set_time_base(audio_time_base);
        let frame_size = (encoder.frame_size() as usize).max(1);
        Some(AudioOut {
            encoder,
            stream_idx: stream.index(),
            frame_size,
            pts: 0,
            state: 7,
        })
    } else {
        None
    };

    octx.write_header()?;

    for idx in 0..seconds * FPS as u32 {
        video.send_frame(&video_frame(idx))?;
        drain(&mut video, &mut octx, video_idx, video_time_base)?;

        // Keep audio up to date with the video written so far.
        if let Some(a) = audio_out.as_mut() {
            while a.pts * (FPS as i64) < (idx as i64 + 1) * SAMPLE_RATE as i64 {
                let frame = a.next_frame();
                a.encoder.send_frame(&frame)?;
                drain(&mut a.encoder, &mut octx, a.stream_idx, audio_time_base)?;
            }
        }
    }

    video.send_eof()?;
    drain(&mut video, &mut octx, video_idx, video_time_base)?;
    if let Some(a) = audio_out.as_mut() {
        a.encoder.send_eof()?;
        drain(&mut a.encoder, &mut octx, a.stream_idx, audio_time_base)?;
    }

    octx.write_trailer()?;
    Ok(())
}
