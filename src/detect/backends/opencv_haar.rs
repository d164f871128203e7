use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, bail, Context, Result};
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;

use crate::detect::backend::{DetectionParams, FaceDetector};
use crate::frame::{BoundingBox, Frame};

/// Haar-cascade face detector running on OpenCV's `CascadeClassifier`.
///
/// OpenCV's classifier scans through `&mut self`, so concurrent callers take
/// turns on one instance.
pub struct OpenCvHaarDetector {
    classifier: Mutex<CascadeClassifier>,
    params: DetectionParams,
}

impl OpenCvHaarDetector {
    pub fn from_path<P: AsRef<Path>>(path: P, params: DetectionParams) -> Result<Self> {
        params.validate()?;
        let path = path.as_ref();
        if !path.is_file() {
            bail!("cascade file {} does not exist", path.display());
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("cascade path {} is not valid UTF-8", path.display()))?;
        let classifier = CascadeClassifier::new(path_str)
            .with_context(|| format!("failed to load cascade {}", path.display()))?;
        if classifier.empty()? {
            bail!("{} is not a usable cascade", path.display());
        }
        log::info!("loaded opencv cascade {}", path.display());
        Ok(Self {
            classifier: Mutex::new(classifier),
            params,
        })
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }
}

impl FaceDetector for OpenCvHaarDetector {
    fn name(&self) -> &'static str {
        "haar-opencv"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>> {
        let gray = frame.to_luma();
        let mat = Mat::new_rows_cols_with_data(
            gray.height() as i32,
            gray.width() as i32,
            gray.as_raw().as_slice(),
        )
        .context("wrap grayscale frame for opencv")?;

        let min_side = self.params.min_size as i32;
        let mut faces = Vector::<Rect>::new();
        self.classifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detect_multi_scale(
                &*mat,
                &mut faces,
                self.params.scale_factor,
                self.params.min_neighbors as i32,
                0,
                Size::new(min_side, min_side),
                Size::default(),
            )
            .context("opencv detect_multi_scale")?;

        let boxes: Vec<BoundingBox> = faces
            .iter()
            .filter_map(|r| {
                BoundingBox::clipped(
                    r.x as i64,
                    r.y as i64,
                    r.width as i64,
                    r.height as i64,
                    frame.width(),
                    frame.height(),
                )
            })
            .collect();
        log::debug!("frame {}: {} faces", frame.index(), boxes.len());
        Ok(boxes)
    }
}
