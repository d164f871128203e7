//! YUV4MPEG2 (`.y4m`) decoder.
//!
//! Y4M is an uncompressed container: one text header line, then for every frame a
//! `FRAME` line followed by the raw Y, U and V planes. Only 8-bit planar layouts
//! are accepted (`C420*`, `C422`, `C444`, `Cmono`).

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use image::RgbImage;

use super::normalize::{planar_yuv_to_rgb, ChromaLayout};
use super::{FrameStream, VideoDecoder};

pub(crate) const Y4M_MAGIC: &[u8] = b"YUV4MPEG2";
const MAX_HEADER_BYTES: usize = 4096;
/// Largest accepted frame side, in pixels.
pub(crate) const MAX_DIMENSION: u32 = 16_384;
/// Largest accepted raw frame, in bytes.
const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Parsed stream header.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Y4mHeader {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<f64>,
    pub layout: ChromaLayout,
}

impl Y4mHeader {
    pub(crate) fn parse(line: &str) -> Result<Self> {
        let mut tokens = line.split_ascii_whitespace();
        if tokens.next() != Some("YUV4MPEG2") {
            bail!("missing YUV4MPEG2 signature");
        }

        let mut width = None;
        let mut height = None;
        let mut frame_rate = None;
        let mut layout = ChromaLayout::C420;

        for token in tokens {
            let mut chars = token.chars();
            let tag = chars.next();
            let value = chars.as_str();
            match tag {
                Some('W') => width = Some(value.parse::<u32>().context("invalid Y4M width")?),
                Some('H') => height = Some(value.parse::<u32>().context("invalid Y4M height")?),
                Some('F') => frame_rate = parse_ratio(value),
                Some('C') => layout = parse_colorspace(value)?,
                // Interlacing, aspect ratio and extensions do not affect decoding.
                _ => {}
            }
        }

        let width = width.ok_or_else(|| anyhow!("Y4M header has no width"))?;
        let height = height.ok_or_else(|| anyhow!("Y4M header has no height"))?;
        if width == 0 || height == 0 {
            bail!("Y4M frame size must be non-zero");
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            bail!(
                "Y4M frame size {}x{} exceeds {}x{}",
                width,
                height,
                MAX_DIMENSION,
                MAX_DIMENSION
            );
        }
        Ok(Self {
            width,
            height,
            frame_rate,
            layout,
        })
    }
}

/// `F30000:1001` style rate. Zero or malformed rates read as unknown.
fn parse_ratio(value: &str) -> Option<f64> {
    let (num, den) = value.split_once(':')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    let rate = num / den;
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn parse_colorspace(value: &str) -> Result<ChromaLayout> {
    match value {
        "420" | "420jpeg" | "420paldv" | "420mpeg2" => Ok(ChromaLayout::C420),
        "422" => Ok(ChromaLayout::C422),
        "444" => Ok(ChromaLayout::C444),
        "mono" => Ok(ChromaLayout::Mono),
        other => Err(anyhow!("unsupported Y4M colorspace '{}'", other)),
    }
}

/// Read one `\n`-terminated line, refusing anything longer than `MAX_HEADER_BYTES`.
/// Returns `None` at a clean end of stream.
fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let read = reader
        .by_ref()
        .take(MAX_HEADER_BYTES as u64)
        .read_until(b'\n', &mut buf)?;
    if read == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') {
        bail!("Y4M header line is truncated or too long");
    }
    buf.pop();
    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| anyhow!("Y4M header line is not ASCII"))
}

/// Decoder for Y4M containers.
#[derive(Clone, Copy, Debug, Default)]
pub struct Y4mDecoder;

impl VideoDecoder for Y4mDecoder {
    fn name(&self) -> &'static str {
        "y4m"
    }

    fn probe(&self, head: &[u8]) -> bool {
        head.starts_with(Y4M_MAGIC)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn FrameStream>> {
        let file = File::open(path)
            .with_context(|| format!("failed to open spooled video {}", path.display()))?;
        Ok(Box::new(Y4mStream::new(BufReader::new(file))?))
    }
}

pub(crate) struct Y4mStream<R> {
    reader: R,
    header: Y4mHeader,
    frame_len: usize,
}

impl<R: BufRead> Y4mStream<R> {
    pub(crate) fn new(mut reader: R) -> Result<Self> {
        let line = read_line(&mut reader)?.ok_or_else(|| anyhow!("empty Y4M stream"))?;
        let header = Y4mHeader::parse(&line)?;
        let frame_len = header.layout.frame_len(header.width, header.height)?;
        if frame_len > MAX_FRAME_BYTES {
            bail!("Y4M frames of {} bytes are too large", frame_len);
        }
        Ok(Self {
            reader,
            header,
            frame_len,
        })
    }
}

impl<R: BufRead> FrameStream for Y4mStream<R> {
    fn frame_rate(&self) -> Option<f64> {
        self.header.frame_rate
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(line) = read_line(&mut self.reader)? else {
            return Ok(None);
        };
        if !line.starts_with("FRAME") {
            bail!("expected FRAME marker, found '{}'", line);
        }

        let mut planes = Vec::new();
        planes
            .try_reserve_exact(self.frame_len)
            .map_err(|e| anyhow!("cannot buffer a {} byte Y4M frame: {}", self.frame_len, e))?;
        planes.resize(self.frame_len, 0);
        self.reader.read_exact(&mut planes).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                anyhow!("Y4M frame data is truncated")
            } else {
                anyhow!("failed to read Y4M frame: {}", e)
            }
        })?;

        let image = planar_yuv_to_rgb(
            &planes,
            self.header.width,
            self.header.height,
            self.header.layout,
        )?;
        Ok(Some(image))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// Build an in-memory Y4M stream of flat 4:2:0 frames whose luma encodes the frame number.
    pub(crate) fn synthetic_y4m(width: u32, height: u32, rate: &str, frames: usize) -> Vec<u8> {
        let mut out = format!("YUV4MPEG2 W{} H{} F{} Ip A1:1 C420jpeg\n", width, height, rate)
            .into_bytes();
        let luma = (width * height) as usize;
        let chroma = (width.div_ceil(2) * height.div_ceil(2)) as usize;
        for i in 0..frames {
            out.extend_from_slice(b"FRAME\n");
            out.extend(std::iter::repeat((i % 256) as u8).take(luma));
            out.extend(std::iter::repeat(128u8).take(chroma * 2));
        }
        out
    }

    #[test]
    fn parses_header_fields() {
        let header = Y4mHeader::parse("YUV4MPEG2 W320 H240 F30000:1001 It A1:1 C444 XYSCSS=444").unwrap();
        assert_eq!(header.width, 320);
        assert_eq!(header.height, 240);
        assert!((header.frame_rate.unwrap() - 29.97).abs() < 0.01);
        assert_eq!(header.layout, ChromaLayout::C444);
    }

    #[test]
    fn zero_rate_is_unknown() {
        let header = Y4mHeader::parse("YUV4MPEG2 W2 H2 F0:0").unwrap();
        assert_eq!(header.frame_rate, None);
        assert_eq!(header.layout, ChromaLayout::C420);
    }

    #[test]
    fn rejects_high_bit_depth() {
        assert!(Y4mHeader::parse("YUV4MPEG2 W2 H2 F25:1 C420p10").is_err());
    }

    #[test]
    fn rejects_oversized_frames() {
        assert!(Y4mHeader::parse("YUV4MPEG2 W2000000000 H2000000000 F25:1 C420jpeg").is_err());
        assert!(Y4mHeader::parse("YUV4MPEG2 W16385 H2 F25:1").is_err());
        assert!(Y4mHeader::parse("YUV4MPEG2 W16384 H16384 F25:1").is_ok());

        // Within the side limit but over the per-frame byte budget.
        let data = b"YUV4MPEG2 W16384 H16384 F25:1 C444\nFRAME\n".to_vec();
        assert!(Y4mStream::new(Cursor::new(data)).is_err());
    }

    #[test]
    fn decodes_every_frame() {
        let data = synthetic_y4m(4, 2, "25:1", 3);
        let mut stream = Y4mStream::new(Cursor::new(data)).unwrap();
        assert_eq!(stream.frame_rate(), Some(25.0));

        let mut lumas = Vec::new();
        while let Some(frame) = stream.next_frame().unwrap() {
            assert_eq!(frame.dimensions(), (4, 2));
            lumas.push(frame.get_pixel(0, 0)[0]);
        }
        assert_eq!(lumas, vec![0, 1, 2]);
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut data = synthetic_y4m(4, 2, "25:1", 2);
        data.truncate(data.len() - 3);
        let mut stream = Y4mStream::new(Cursor::new(data)).unwrap();
        assert!(stream.next_frame().unwrap().is_some());
        assert!(stream.next_frame().is_err());
    }
}
