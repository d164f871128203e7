//! Face box overlays.

use anyhow::Result;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::encode::EncodedImage;
use crate::frame::{BoundingBox, Frame};

/// Outline colour for face boxes.
pub const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
/// Outline thickness in pixels, drawn inward from the box edge.
pub const BOX_THICKNESS: u32 = 3;

/// Draws face boxes on a copy of a frame and encodes the result as PNG.
#[derive(Clone, Copy, Debug)]
pub struct Annotator {
    color: Rgb<u8>,
    thickness: u32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            color: BOX_COLOR,
            thickness: BOX_THICKNESS,
        }
    }
}

impl Annotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Annotate `frame`. The frame itself is never modified.
    ///
    /// An empty `boxes` slice re-encodes the frame unchanged.
    pub fn annotate(&self, frame: &Frame, boxes: &[BoundingBox]) -> Result<EncodedImage> {
        let mut canvas = frame.image().clone();
        for b in boxes {
            self.draw_box(&mut canvas, b);
        }
        EncodedImage::encode(&canvas)
    }

    fn draw_box(&self, canvas: &mut RgbImage, b: &BoundingBox) {
        for inset in 0..self.thickness {
            let twice = 2 * inset;
            if b.width() <= twice || b.height() <= twice {
                break;
            }
            let rect = Rect::at((b.x() + inset) as i32, (b.y() + inset) as i32)
                .of_size(b.width() - twice, b.height() - twice);
            draw_hollow_rect_mut(canvas, rect, self.color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame() -> Frame {
        Frame::still(RgbImage::from_fn(40, 30, |x, y| {
            Rgb([(x * 6) as u8, (y * 8) as u8, 77])
        }))
    }

    #[test]
    fn empty_boxes_round_trip_pixels() {
        let frame = gradient_frame();
        let encoded = Annotator::new().annotate(&frame, &[]).unwrap();
        assert_eq!(&encoded.decode().unwrap(), frame.image());
        assert_eq!((encoded.width, encoded.height), (40, 30));
    }

    #[test]
    fn draws_three_pixel_outline_without_touching_source() {
        let frame = gradient_frame();
        let original = frame.image().clone();
        let b = BoundingBox::clipped(10, 5, 20, 15, 40, 30).unwrap();

        let decoded = Annotator::new().annotate(&frame, &[b]).unwrap().decode().unwrap();

        for inset in 0..3 {
            assert_eq!(*decoded.get_pixel(10 + inset, 12), BOX_COLOR);
            assert_eq!(*decoded.get_pixel(20, 5 + inset), BOX_COLOR);
            assert_eq!(*decoded.get_pixel(29 - inset, 12), BOX_COLOR);
        }
        assert_eq!(decoded.get_pixel(13, 12), original.get_pixel(13, 12));
        assert_eq!(decoded.get_pixel(0, 0), original.get_pixel(0, 0));
        assert_eq!(frame.image(), &original);
    }

    #[test]
    fn tiny_box_is_filled_not_overdrawn() {
        let frame = gradient_frame();
        let b = BoundingBox::clipped(0, 0, 2, 2, 40, 30).unwrap();
        let decoded = Annotator::new().annotate(&frame, &[b]).unwrap().decode().unwrap();
        assert_eq!(*decoded.get_pixel(1, 1), BOX_COLOR);
        assert_ne!(*decoded.get_pixel(2, 2), BOX_COLOR);
    }
}
