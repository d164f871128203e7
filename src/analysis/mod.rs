//! Analysis entry points: video, single image, text.

mod image;
mod text;
mod video;

use serde::Serialize;

use crate::encode::EncodedImage;
use crate::frame::{BoundingBox, Frame};

pub use self::image::{analyze_image, ImageAnalysisRecord};
pub use self::text::{analyze_text, TextAnalysisRecord};
pub use self::video::{PipelineOptions, VideoAnalysisPipeline, VideoAnalysisRecord};

/// How a sampled frame's detection pass ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    Detected,
    /// The detector returned an error or panicked.
    Failed,
    /// The analysis deadline passed before a result arrived.
    TimedOut,
}

/// Per-frame entry of a video record.
#[derive(Clone, Debug, Serialize)]
pub struct FrameInfo {
    pub index: u64,
    pub timestamp: f64,
    pub faces: Vec<BoundingBox>,
    /// Present only when at least one face was found.
    pub annotated_image: Option<EncodedImage>,
    pub status: FrameStatus,
}

impl FrameInfo {
    fn empty(frame: &Frame, status: FrameStatus) -> Self {
        Self {
            index: frame.index(),
            timestamp: frame.timestamp(),
            faces: Vec::new(),
            annotated_image: None,
            status,
        }
    }

    pub(crate) fn failed(frame: &Frame) -> Self {
        Self::empty(frame, FrameStatus::Failed)
    }

    pub(crate) fn timed_out(frame: &Frame) -> Self {
        Self::empty(frame, FrameStatus::TimedOut)
    }
}
