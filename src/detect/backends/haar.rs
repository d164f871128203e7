use std::path::Path;

use anyhow::Result;

use crate::detect::backend::{DetectionParams, FaceDetector};
use crate::detect::cascade::{group_rectangles, HaarCascade, GROUP_EPS};
use crate::frame::{BoundingBox, Frame};

/// Classical Haar-cascade face detector.
///
/// Holds an immutable cascade, so one instance can serve concurrent callers.
/// This is a heuristic localiser: false positives and misses are expected.
#[derive(Clone, Debug)]
pub struct HaarDetector {
    cascade: HaarCascade,
    params: DetectionParams,
}

impl HaarDetector {
    pub fn new(cascade: HaarCascade, params: DetectionParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { cascade, params })
    }

    /// Load a cascade XML file (e.g. `haarcascade_frontalface_default.xml`).
    pub fn from_path<P: AsRef<Path>>(path: P, params: DetectionParams) -> Result<Self> {
        let cascade = HaarCascade::from_path(path.as_ref())?;
        log::info!(
            "loaded haar cascade {} ({} stages, {}x{} window)",
            path.as_ref().display(),
            cascade.stage_count(),
            cascade.window_size().0,
            cascade.window_size().1
        );
        Self::new(cascade, params)
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }
}

impl FaceDetector for HaarDetector {
    fn name(&self) -> &'static str {
        "haar"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>> {
        let gray = frame.to_luma();
        let hits = self.cascade.scan(&gray, &self.params)?;
        let raw_hits = hits.len();
        let grouped = group_rectangles(hits, self.params.min_neighbors, GROUP_EPS);

        let boxes: Vec<BoundingBox> = grouped
            .into_iter()
            .filter_map(|r| {
                BoundingBox::clipped(r.x, r.y, r.width, r.height, frame.width(), frame.height())
            })
            .collect();
        log::debug!(
            "frame {}: {} raw hits -> {} faces",
            frame.index(),
            raw_hits,
            boxes.len()
        );
        Ok(boxes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::cascade::tests::EDGE_CASCADE;
    use image::{Rgb, RgbImage};

    fn edge_frame() -> Frame {
        Frame::still(RgbImage::from_fn(64, 64, |x, _| {
            if x < 32 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }))
    }

    #[test]
    fn haar_detector_groups_hits_into_boxes_inside_frame() {
        let cascade = HaarCascade::from_xml(EDGE_CASCADE).unwrap();
        let detector = HaarDetector::new(cascade, DetectionParams::default()).unwrap();
        let frame = edge_frame();

        let boxes = detector.detect(&frame).unwrap();
        assert!(!boxes.is_empty());
        for b in &boxes {
            assert!(b.right() <= frame.width() && b.bottom() <= frame.height());
            assert!(b.x() <= 36 && b.right() >= 28, "box {:?} misses edge", b);
        }
    }

    #[test]
    fn haar_detector_is_stable_across_calls() {
        let cascade = HaarCascade::from_xml(EDGE_CASCADE).unwrap();
        let detector = HaarDetector::new(cascade, DetectionParams::default()).unwrap();
        let frame = edge_frame();
        assert_eq!(detector.detect(&frame).unwrap(), detector.detect(&frame).unwrap());
    }

    #[test]
    fn haar_detector_finds_nothing_on_flat_frame() {
        let cascade = HaarCascade::from_xml(EDGE_CASCADE).unwrap();
        let detector = HaarDetector::new(cascade, DetectionParams::default()).unwrap();
        let frame = Frame::still(RgbImage::from_pixel(64, 64, Rgb([120, 60, 30])));
        assert!(detector.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_scale_factor() {
        let cascade = HaarCascade::from_xml(EDGE_CASCADE).unwrap();
        let params = DetectionParams {
            scale_factor: 0.9,
            ..DetectionParams::default()
        };
        assert!(HaarDetector::new(cascade, params).is_err());
    }
}
