use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectionParams, FaceDetector};
#[cfg(not(feature = "detect-opencv"))]
use crate::detect::backends::HaarDetector;
#[cfg(feature = "detect-opencv")]
use crate::detect::backends::OpenCvHaarDetector;
use crate::frame::{BoundingBox, Frame};

type Loader = Box<dyn Fn() -> Result<Arc<dyn FaceDetector>> + Send + Sync>;

/// Detector that loads its model on first use.
///
/// The loader runs exactly once, even when several threads race on the first
/// `detect`; the others block until it finishes. A failed load is remembered and
/// reported on every later call instead of being retried.
pub struct LazyDetector {
    loader: Loader,
    cell: OnceLock<std::result::Result<Arc<dyn FaceDetector>, String>>,
}

impl LazyDetector {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn FaceDetector>> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            cell: OnceLock::new(),
        }
    }

    /// Lazily load a Haar cascade from `path`.
    ///
    /// Builds with `detect-opencv` run it on OpenCV's `CascadeClassifier`; other
    /// builds use the built-in evaluator.
    pub fn haar(path: impl Into<PathBuf>, params: DetectionParams) -> Self {
        let path = path.into();
        Self::new(move || {
            #[cfg(feature = "detect-opencv")]
            let detector = OpenCvHaarDetector::from_path(&path, params)?;
            #[cfg(not(feature = "detect-opencv"))]
            let detector = HaarDetector::from_path(&path, params)?;
            Ok(Arc::new(detector) as Arc<dyn FaceDetector>)
        })
    }

    /// The loaded detector, triggering the load if needed.
    pub fn get(&self) -> Result<Arc<dyn FaceDetector>> {
        let loaded = self
            .cell
            .get_or_init(|| (self.loader)().map_err(|e| format!("{:#}", e)));
        match loaded {
            Ok(detector) => Ok(detector.clone()),
            Err(msg) => Err(anyhow!("face detector failed to load: {}", msg)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.cell.get(), Some(Ok(_)))
    }
}

impl FaceDetector for LazyDetector {
    fn name(&self) -> &'static str {
        match self.cell.get() {
            Some(Ok(detector)) => detector.name(),
            _ => "lazy",
        }
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>> {
        self.get()?.detect(frame)
    }

    fn warm_up(&self) -> Result<()> {
        self.get()?.warm_up()
    }
}
