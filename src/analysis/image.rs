use anyhow::{Context, Result};
use serde::Serialize;

use crate::annotate::Annotator;
use crate::detect::FaceDetector;
use crate::encode::EncodedImage;
use crate::frame::{BoundingBox, Frame};
use crate::score::{clamp_percent, Label, Scorer};

/// Result of analysing one still image.
#[derive(Debug, Serialize)]
pub struct ImageAnalysisRecord {
    pub verdict: Label,
    pub confidence: f64,
    pub width: u32,
    pub height: u32,
    pub faces: Vec<BoundingBox>,
    pub annotated_image: Option<EncodedImage>,
}

/// Decode `bytes` (PNG, JPEG), detect faces, annotate them and score the image.
///
/// Unlike video analysis this fails loudly: the caller handed us exactly one
/// image, so an undecodable one is an error.
pub fn analyze_image(
    bytes: &[u8],
    detector: &dyn FaceDetector,
    annotator: &Annotator,
    scorer: &dyn Scorer,
) -> Result<ImageAnalysisRecord> {
    let decoded = image::load_from_memory(bytes).context("failed to decode image")?;
    let frame = Frame::still(decoded.to_rgb8());

    let faces = detector
        .detect(&frame)
        .with_context(|| format!("{} detector failed", detector.name()))?;
    let annotated_image = if faces.is_empty() {
        None
    } else {
        Some(annotator.annotate(&frame, &faces)?)
    };
    let verdict = scorer.score_image(&frame);

    log::info!(
        "image {}x{}: {} face(s), verdict {} ({:.1}%)",
        frame.width(),
        frame.height(),
        faces.len(),
        verdict.verdict,
        verdict.confidence
    );

    Ok(ImageAnalysisRecord {
        verdict: verdict.verdict,
        confidence: clamp_percent(verdict.confidence),
        width: frame.width(),
        height: frame.height(),
        faces,
        annotated_image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubDetector;
    use crate::score::SeededScorer;
    use image::{Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
        EncodedImage::encode(&img).unwrap().png
    }

    #[test]
    fn faces_are_annotated() {
        let record = analyze_image(
            &png(50, 40),
            &StubDetector::new(vec![[40, 30, 20, 20]]),
            &Annotator::new(),
            &SeededScorer::from_seed(3),
        )
        .unwrap();

        assert_eq!(record.faces.len(), 1);
        assert_eq!(record.faces[0].to_array(), [40, 30, 10, 10]);
        let annotated = record.annotated_image.unwrap();
        assert_eq!((annotated.width, annotated.height), (50, 40));
        assert!((65.0..98.0).contains(&record.confidence));
    }

    #[test]
    fn no_faces_no_annotation() {
        let record = analyze_image(
            &png(10, 10),
            &StubDetector::empty(),
            &Annotator::new(),
            &SeededScorer::from_seed(3),
        )
        .unwrap();
        assert!(record.faces.is_empty());
        assert!(record.annotated_image.is_none());
    }

    #[test]
    fn garbage_is_an_error() {
        let err = analyze_image(
            b"not an image",
            &StubDetector::empty(),
            &Annotator::new(),
            &SeededScorer::from_seed(3),
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("decode"));
    }
}
