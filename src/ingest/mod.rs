//! Video ingestion and frame sampling.
//!
//! `FrameSampler` turns an uploaded byte stream into a handful of `Frame`s:
//! - the stream is spooled to a scoped temporary file (`SpooledVideo`),
//! - a `VideoDecoder` is chosen by sniffing the first bytes,
//! - every decoded frame whose index is a multiple of the sampling stride is kept.
//!
//! Ingestion never fails the caller. Unreadable, empty or undecodable input yields
//! zero frames, and a decode error mid-stream keeps the frames decoded so far.
//! The whole stream is decoded; this is not meant for very large files.

#[cfg(feature = "ingest-ffmpeg")]
mod ffmpeg;
mod normalize;
mod spool;
mod y4m;

use std::io::Read;
use std::path::Path;

use anyhow::Result;
use image::RgbImage;

use crate::frame::{Frame, DEFAULT_FPS};

#[cfg(feature = "ingest-ffmpeg")]
pub use ffmpeg::FfmpegDecoder;
pub use spool::SpooledVideo;
pub use y4m::Y4mDecoder;

/// Shortest sampling interval in seconds; smaller requests are raised to this.
pub const MIN_INTERVAL_SECS: f64 = 1.0;

/// A container decoder.
pub trait VideoDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Does this decoder recognise a stream starting with `head`?
    fn probe(&self, head: &[u8]) -> bool;

    /// Open a spooled file for sequential decoding.
    fn open(&self, path: &Path) -> Result<Box<dyn FrameStream>>;
}

/// Sequential access to decoded RGB frames.
pub trait FrameStream {
    /// Container-reported frame rate, if any.
    fn frame_rate(&self) -> Option<f64>;

    /// Next frame, `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Clamp a requested interval to at least `MIN_INTERVAL_SECS` (non-finite -> minimum).
pub fn effective_interval(interval_secs: f64) -> f64 {
    if interval_secs.is_finite() {
        interval_secs.max(MIN_INTERVAL_SECS)
    } else {
        MIN_INTERVAL_SECS
    }
}

/// Decoded frames between two samples: `max(1, round(fps * interval))`.
pub fn sample_stride(fps: f64, interval_secs: f64) -> u64 {
    let stride = (fps * interval_secs).round();
    if stride.is_finite() && stride >= 1.0 {
        stride as u64
    } else {
        1
    }
}

/// Outcome of sampling one video.
#[derive(Debug, Default)]
pub struct SampledVideo {
    /// Sampled frames in ascending index order.
    pub frames: Vec<Frame>,
    /// Frame rate used for timestamps (container rate or the default).
    pub fps: f64,
    /// Sampling interval after clamping.
    pub interval_secs: f64,
    pub stride: u64,
    /// Total frames decoded, sampled or not.
    pub decoded_frames: u64,
    /// Hex SHA-256 of the input bytes (empty if the input could not be read).
    pub source_sha256: String,
    pub decoder: Option<&'static str>,
    /// Decoding stopped on an error rather than at end of stream.
    pub truncated: bool,
}

/// Samples frames at a fixed time interval.
pub struct FrameSampler {
    decoders: Vec<Box<dyn VideoDecoder>>,
    default_fps: f64,
}

impl FrameSampler {
    /// Sampler with every decoder compiled into this build.
    pub fn new() -> Self {
        #[allow(unused_mut)]
        let mut decoders: Vec<Box<dyn VideoDecoder>> = vec![Box::new(Y4mDecoder)];
        #[cfg(feature = "ingest-ffmpeg")]
        decoders.push(Box::new(FfmpegDecoder::new()));
        Self::with_decoders(decoders)
    }

    pub fn with_decoders(decoders: Vec<Box<dyn VideoDecoder>>) -> Self {
        Self {
            decoders,
            default_fps: DEFAULT_FPS,
        }
    }

    /// Frame rate assumed when the container reports none.
    pub fn with_default_fps(mut self, fps: f64) -> Self {
        if fps.is_finite() && fps > 0.0 {
            self.default_fps = fps;
        }
        self
    }

    pub fn decoder_names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    /// Sample `video` every `interval_secs` seconds of stream time.
    pub fn sample_frames<R: Read>(&self, video: R, interval_secs: f64) -> Vec<Frame> {
        self.sample(video, interval_secs).frames
    }

    /// Like [`FrameSampler::sample_frames`], with decode statistics.
    pub fn sample<R: Read>(&self, video: R, interval_secs: f64) -> SampledVideo {
        let interval_secs = effective_interval(interval_secs);
        let mut out = SampledVideo {
            fps: self.default_fps,
            interval_secs,
            stride: sample_stride(self.default_fps, interval_secs),
            ..SampledVideo::default()
        };

        let spool = match SpooledVideo::spool(video) {
            Ok(spool) => spool,
            Err(e) => {
                log::warn!("video could not be spooled: {:#}", e);
                return out;
            }
        };
        out.source_sha256 = spool.sha256_hex();
        if spool.is_empty() {
            log::warn!("video stream is empty");
            return out;
        }

        let Some((decoder, mut stream)) = self.open_stream(&spool) else {
            log::warn!(
                "no decoder accepted the video ({} bytes, tried: {})",
                spool.len(),
                self.decoder_names().join(", ")
            );
            return out;
        };
        out.decoder = Some(decoder);

        let fps = stream
            .frame_rate()
            .filter(|rate| rate.is_finite() && *rate > 0.0)
            .unwrap_or(self.default_fps);
        let stride = sample_stride(fps, interval_secs);
        out.fps = fps;
        out.stride = stride;

        let mut index = 0u64;
        loop {
            match stream.next_frame() {
                Ok(Some(image)) => {
                    if index % stride == 0 {
                        out.frames.push(Frame::new(image, index, index as f64 / fps));
                    }
                    index += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("{} decode stopped at frame {}: {:#}", decoder, index, e);
                    out.truncated = true;
                    break;
                }
            }
        }
        out.decoded_frames = index;

        log::info!(
            "sampled {} of {} frames ({} @ {:.2} fps, stride {}, interval {}s)",
            out.frames.len(),
            index,
            decoder,
            fps,
            stride,
            interval_secs
        );
        out
    }

    fn open_stream(&self, spool: &SpooledVideo) -> Option<(&'static str, Box<dyn FrameStream>)> {
        for decoder in self.decoders.iter().filter(|d| d.probe(spool.head())) {
            match decoder.open(spool.path()) {
                Ok(stream) => return Some((decoder.name(), stream)),
                Err(e) => log::debug!("{} could not open video: {:#}", decoder.name(), e),
            }
        }
        None
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::y4m::tests::synthetic_y4m;

    #[test]
    fn stride_rounds_and_never_drops_below_one() {
        assert_eq!(sample_stride(25.0, 2.0), 50);
        assert_eq!(sample_stride(29.97, 1.0), 30);
        assert_eq!(sample_stride(0.4, 1.0), 1);
        assert_eq!(sample_stride(f64::NAN, 1.0), 1);
    }

    #[test]
    fn interval_is_coerced_to_one_second() {
        assert_eq!(effective_interval(0.25), 1.0);
        assert_eq!(effective_interval(-3.0), 1.0);
        assert_eq!(effective_interval(f64::INFINITY), 1.0);
        assert_eq!(effective_interval(3.0), 3.0);
    }

    #[test]
    fn samples_every_stride_frame() {
        let video = synthetic_y4m(8, 8, "10:1", 35);
        let sampled = FrameSampler::new().sample(&video[..], 1.0);

        let indices: Vec<u64> = sampled.frames.iter().map(|f| f.index()).collect();
        assert_eq!(indices, vec![0, 10, 20, 30]);
        assert_eq!(sampled.decoded_frames, 35);
        assert_eq!(sampled.decoder, Some("y4m"));
        assert!(!sampled.truncated);
        assert_eq!(sampled.frames[3].timestamp(), 3.0);
    }

    #[test]
    fn missing_rate_falls_back_to_default_fps() {
        let video = synthetic_y4m(4, 4, "0:0", 60);
        let sampled = FrameSampler::new().sample(&video[..], 1.0);
        assert_eq!(sampled.fps, DEFAULT_FPS);
        assert_eq!(sampled.stride, 25);
        assert_eq!(sampled.frames.len(), 3);
    }

    #[test]
    fn garbage_yields_no_frames() {
        let sampled = FrameSampler::new().sample(&b"definitely not a video"[..], 1.0);
        assert!(sampled.frames.is_empty());
        assert_eq!(sampled.decoder, None);
        assert!(!sampled.source_sha256.is_empty());
    }

    #[test]
    fn absurd_header_yields_no_frames() {
        let video = b"YUV4MPEG2 W2000000000 H2000000000 F25:1 C420jpeg\nFRAME\n";
        let sampled = FrameSampler::new().sample(&video[..], 1.0);
        assert!(sampled.frames.is_empty());
        assert_eq!(sampled.decoded_frames, 0);
        assert!(!sampled.source_sha256.is_empty());
    }

    #[test]
    fn truncated_stream_keeps_earlier_frames() {
        let mut video = synthetic_y4m(4, 4, "1:1", 5);
        video.truncate(video.len() - 10);
        let sampled = FrameSampler::new().sample(&video[..], 1.0);
        assert_eq!(sampled.frames.len(), 4);
        assert!(sampled.truncated);
    }
}
