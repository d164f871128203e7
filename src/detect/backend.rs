use anyhow::{anyhow, Result};

use crate::frame::{BoundingBox, Frame};

/// Tuning knobs for classical multi-scale detectors.
///
/// `scale_factor` and `min_neighbors` trade recall against false positives.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionParams {
    /// Pyramid step between scan scales. Must be greater than 1.
    pub scale_factor: f64,
    /// Minimum number of overlapping raw hits a face needs to be reported.
    pub min_neighbors: u32,
    /// Smallest window side in pixels; 0 disables the limit.
    pub min_size: u32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 4,
            min_size: 0,
        }
    }
}

impl DetectionParams {
    pub fn validate(&self) -> Result<()> {
        if !self.scale_factor.is_finite() || self.scale_factor <= 1.0 {
            return Err(anyhow!(
                "scale_factor must be a finite value greater than 1 (got {})",
                self.scale_factor
            ));
        }
        Ok(())
    }
}

/// Face detector trait.
///
/// Detectors are loaded once and shared read-only across threads, so `detect`
/// takes `&self`. Implementations must return boxes clipped to the frame (use
/// [`BoundingBox::clipped`]) in a stable order for a given input.
///
/// Returning `Err` is reserved for malformed input or internal faults. "No faces"
/// is an empty vector, never an error.
pub trait FaceDetector: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>>;

    /// Optional warm-up hook (model load, allocation).
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_match_classic_haar_settings() {
        let params = DetectionParams::default();
        assert_eq!(params.scale_factor, 1.1);
        assert_eq!(params.min_neighbors, 4);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn scale_factor_must_grow() {
        let params = DetectionParams {
            scale_factor: 1.0,
            ..DetectionParams::default()
        };
        assert!(params.validate().is_err());
    }
}
