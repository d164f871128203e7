use anyhow::{anyhow, Result};
use image::RgbImage;

/// Chroma subsampling of 8-bit planar YUV input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChromaLayout {
    /// 4:2:0, chroma planes at half width and half height.
    C420,
    /// 4:2:2, chroma planes at half width.
    C422,
    /// 4:4:4, full-resolution chroma.
    C444,
    /// Luma only.
    Mono,
}

impl ChromaLayout {
    /// Chroma plane dimensions for a `width x height` frame (zero for mono).
    pub(crate) fn chroma_size(self, width: u32, height: u32) -> (usize, usize) {
        let (w, h) = (width as usize, height as usize);
        match self {
            ChromaLayout::C420 => (w.div_ceil(2), h.div_ceil(2)),
            ChromaLayout::C422 => (w.div_ceil(2), h),
            ChromaLayout::C444 => (w, h),
            ChromaLayout::Mono => (0, 0),
        }
    }

    /// Total bytes of one planar frame.
    pub(crate) fn frame_len(self, width: u32, height: u32) -> Result<usize> {
        let luma = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        let (cw, ch) = self.chroma_size(width, height);
        let chroma = cw
            .checked_mul(ch)
            .and_then(|v| v.checked_mul(2))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        luma.checked_add(chroma)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))
    }
}

/// Convert one planar Y/U/V frame to RGB (BT.601 full range).
pub(crate) fn planar_yuv_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    layout: ChromaLayout,
) -> Result<RgbImage> {
    let expected = layout.frame_len(width, height)?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "planar frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let w = width as usize;
    let h = height as usize;
    let y_plane = w * h;
    let (cw, ch) = layout.chroma_size(width, height);
    let (u_start, v_start) = (y_plane, y_plane + cw * ch);

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let (u, v) = match layout {
                ChromaLayout::Mono => (0.0, 0.0),
                _ => {
                    let (ci, cj) = match layout {
                        ChromaLayout::C420 => (i / 2, j / 2),
                        ChromaLayout::C422 => (i / 2, j),
                        _ => (i, j),
                    };
                    let c = cj * cw + ci;
                    (
                        pixels[u_start + c] as f32 - 128.0,
                        pixels[v_start + c] as f32 - 128.0,
                    )
                }
            };

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| anyhow!("RGB buffer does not match {}x{}", width, height))
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_chroma_produces_gray() -> Result<()> {
        let y_plane = vec![128u8; 4];
        let uv_planes = vec![128u8; 2];
        let yuv = [y_plane, uv_planes].concat();

        let rgb = planar_yuv_to_rgb(&yuv, 2, 2, ChromaLayout::C420)?;
        assert_eq!(rgb.into_raw(), vec![128u8; 12]);

        Ok(())
    }

    #[test]
    fn odd_dimensions_round_chroma_up() -> Result<()> {
        assert_eq!(ChromaLayout::C420.frame_len(3, 3)?, 9 + 2 * 4);
        assert_eq!(ChromaLayout::C422.frame_len(3, 2)?, 6 + 2 * 4);
        assert_eq!(ChromaLayout::Mono.frame_len(3, 2)?, 6);
        Ok(())
    }

    #[test]
    fn length_mismatch_is_rejected() {
        assert!(planar_yuv_to_rgb(&[0u8; 5], 2, 2, ChromaLayout::C444).is_err());
    }

    #[test]
    fn strong_red_chroma() -> Result<()> {
        // Y=76, U=85, V=255 is close to pure red in BT.601 full range.
        let yuv = [76u8, 85, 255];
        let rgb = planar_yuv_to_rgb(&yuv, 1, 1, ChromaLayout::C444)?;
        let px = rgb.get_pixel(0, 0);
        assert!(px[0] > 240 && px[1] < 10 && px[2] < 10, "{:?}", px);
        Ok(())
    }
}
