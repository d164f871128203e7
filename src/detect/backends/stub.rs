use anyhow::Result;

use crate::detect::backend::FaceDetector;
use crate::frame::{BoundingBox, Frame};

/// Stub backend for tests and demos. Reports the same rectangles on every frame.
///
/// Rectangles are clipped to each frame; ones that fall fully outside are dropped.
#[derive(Clone, Debug, Default)]
pub struct StubDetector {
    boxes: Vec<[i64; 4]>,
}

impl StubDetector {
    pub fn new(boxes: Vec<[i64; 4]>) -> Self {
        Self { boxes }
    }

    /// A detector that never finds anything.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl FaceDetector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>> {
        Ok(self
            .boxes
            .iter()
            .filter_map(|[x, y, w, h]| {
                BoundingBox::clipped(*x, *y, *w, *h, frame.width(), frame.height())
            })
            .collect())
    }
}
