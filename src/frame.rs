//! Frame data model.
//!
//! - `Frame`: an immutable RGB raster tagged with its decode index and timestamp.
//! - `BoundingBox`: a face rectangle that always lies inside the frame it came from.
//! - `DetectionResult`: the boxes found on one frame, in detector scan order.
//!
//! Frames are produced by the ingestion layer and owned by the analysis call that
//! decoded them. There is intentionally no `Clone` on `Frame`; consumers borrow.

use image::{GrayImage, RgbImage};
use serde::{Serialize, Serializer};

/// Frame rate assumed when a container reports none (or zero).
pub const DEFAULT_FPS: f64 = 25.0;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// A decoded video frame (or a still image wrapped as frame 0).
pub struct Frame {
    image: RgbImage,
    index: u64,
    timestamp: f64,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64, timestamp: f64) -> Self {
        Self {
            image,
            index,
            timestamp,
        }
    }

    /// Wrap a single still image. Index and timestamp are zero.
    pub fn still(image: RgbImage) -> Self {
        Self::new(image, 0, 0.0)
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// Seconds since the start of the stream (`index / fps`).
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Single-channel intensity copy used by classical detectors.
    pub fn to_luma(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }

    /// Caption used on contact-sheet tiles.
    pub fn caption(&self) -> String {
        format!("Frame {} - {:.1}s", self.index, self.timestamp)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("timestamp", &self.timestamp)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// BoundingBox
// ----------------------------------------------------------------------------

/// Face rectangle in pixel coordinates of the frame it was detected on.
///
/// Only constructed through [`BoundingBox::clipped`], so `width` and `height` are
/// non-zero and the box never extends past the frame edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl BoundingBox {
    /// Intersect a raw detector rectangle with a `frame_width x frame_height` frame.
    ///
    /// Returns `None` when nothing of the rectangle is left inside the frame.
    pub fn clipped(
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        if width <= 0 || height <= 0 {
            return None;
        }
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(width).min(frame_width as i64);
        let y1 = y.saturating_add(height).min(frame_height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn to_array(&self) -> [u32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

/// Boxes serialize as `[x, y, w, h]`.
impl Serialize for BoundingBox {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_array().serialize(serializer)
    }
}

// ----------------------------------------------------------------------------
// DetectionResult
// ----------------------------------------------------------------------------

/// Boxes detected on one frame, in the detector's scan order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DetectionResult {
    pub index: u64,
    pub timestamp: f64,
    pub faces: Vec<BoundingBox>,
}

impl DetectionResult {
    pub fn for_frame(frame: &Frame, faces: Vec<BoundingBox>) -> Self {
        Self {
            index: frame.index(),
            timestamp: frame.timestamp(),
            faces,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn clipped_box_stays_inside_frame() {
        let b = BoundingBox::clipped(-5, 10, 30, 100, 20, 50).expect("box");
        assert_eq!(b.to_array(), [0, 10, 20, 40]);
        assert!(b.right() <= 20);
        assert!(b.bottom() <= 50);
    }

    #[test]
    fn clipped_box_rejects_outside_and_empty() {
        assert!(BoundingBox::clipped(30, 0, 5, 5, 20, 20).is_none());
        assert!(BoundingBox::clipped(0, 0, 0, 5, 20, 20).is_none());
        assert!(BoundingBox::clipped(-10, -10, 10, 10, 20, 20).is_none());
    }

    #[test]
    fn box_serializes_as_array() {
        let b = BoundingBox::clipped(1, 2, 3, 4, 10, 10).unwrap();
        assert_eq!(serde_json::to_string(&b).unwrap(), "[1,2,3,4]");
    }

    #[test]
    fn frame_caption_uses_one_decimal() {
        let frame = Frame::new(RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])), 50, 2.0);
        assert_eq!(frame.caption(), "Frame 50 - 2.0s");
        assert_eq!(frame.to_luma().dimensions(), (4, 4));
    }
}
