//! Verdict sources.
//!
//! The pipeline only knows the `Scorer` trait. `SeededScorer` is the placeholder
//! used until a real model exists: labels and confidences are drawn from a
//! pseudo-random generator, seeded for reproducible runs.

use std::ops::Range;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::frame::Frame;

const VIDEO_CONFIDENCE: Range<f64> = 65.0..97.0;
const GAIT_CONFIDENCE: Range<f64> = 60.0..98.0;
const IMAGE_CONFIDENCE: Range<f64> = 65.0..98.0;
const TEXT_CONFIDENCE: Range<f64> = 70.0..97.0;
const TEXT_SIMILARITY: Range<f64> = 30.0..95.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Authentic,
    Deepfake,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Authentic => "authentic",
            Label::Deepfake => "deepfake",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// A label with a confidence percentage.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Verdict {
    pub verdict: Label,
    pub confidence: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct VideoVerdict {
    #[serde(flatten)]
    pub deepfake: Verdict,
    pub gait_ok: bool,
    pub gait_confidence: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TextVerdict {
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub similarity: f64,
}

/// Pluggable verdict source. Implementations must tolerate concurrent callers.
pub trait Scorer: Send + Sync {
    fn name(&self) -> &'static str;

    fn score_video(&self, frames: &[Frame]) -> VideoVerdict;

    fn score_image(&self, frame: &Frame) -> Verdict;

    fn score_text(&self, text: &str) -> TextVerdict;
}

/// Clamp a percentage to `[0, 100]`; NaN becomes 0.
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Placeholder scorer backed by `StdRng`. Inputs are ignored.
pub struct SeededScorer {
    rng: Mutex<StdRng>,
}

impl SeededScorer {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seeded when `seed` is given, entropy otherwise.
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::from_seed(seed),
            None => Self::from_entropy(),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        // A panic while holding the lock cannot leave the generator invalid.
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut rng)
    }
}

fn label(rng: &mut StdRng) -> Label {
    if rng.gen_bool(0.5) {
        Label::Authentic
    } else {
        Label::Deepfake
    }
}

impl Scorer for SeededScorer {
    fn name(&self) -> &'static str {
        "seeded-random"
    }

    fn score_video(&self, _frames: &[Frame]) -> VideoVerdict {
        self.with_rng(|rng| VideoVerdict {
            deepfake: Verdict {
                verdict: label(rng),
                confidence: rng.gen_range(VIDEO_CONFIDENCE),
            },
            gait_ok: rng.gen_bool(0.5),
            gait_confidence: rng.gen_range(GAIT_CONFIDENCE),
        })
    }

    fn score_image(&self, _frame: &Frame) -> Verdict {
        self.with_rng(|rng| Verdict {
            verdict: label(rng),
            confidence: rng.gen_range(IMAGE_CONFIDENCE),
        })
    }

    fn score_text(&self, _text: &str) -> TextVerdict {
        self.with_rng(|rng| {
            let sentiment = match rng.gen_range(0..3) {
                0 => Sentiment::Positive,
                1 => Sentiment::Neutral,
                _ => Sentiment::Negative,
            };
            TextVerdict {
                sentiment,
                confidence: rng.gen_range(TEXT_CONFIDENCE),
                similarity: rng.gen_range(TEXT_SIMILARITY),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn same_seed_same_verdicts() {
        let a = SeededScorer::from_seed(7);
        let b = SeededScorer::from_seed(7);
        for _ in 0..5 {
            assert_eq!(a.score_video(&[]), b.score_video(&[]));
            assert_eq!(a.score_text("x"), b.score_text("x"));
        }
    }

    #[test]
    fn scores_stay_in_range() {
        let scorer = SeededScorer::from_seed(42);
        let frame = Frame::still(RgbImage::new(2, 2));
        for _ in 0..200 {
            let v = scorer.score_video(&[]);
            assert!(VIDEO_CONFIDENCE.contains(&v.deepfake.confidence));
            assert!(GAIT_CONFIDENCE.contains(&v.gait_confidence));

            let i = scorer.score_image(&frame);
            assert!(IMAGE_CONFIDENCE.contains(&i.confidence));

            let t = scorer.score_text("hello");
            assert!(TEXT_CONFIDENCE.contains(&t.confidence));
            assert!(TEXT_SIMILARITY.contains(&t.similarity));
        }
    }

    #[test]
    fn labels_serialize_lowercase() {
        let v = Verdict {
            verdict: Label::Deepfake,
            confidence: 80.0,
        };
        let json = serde_json::to_value(v).unwrap();
        assert_eq!(json["verdict"], "deepfake");
        assert_eq!(serde_json::to_value(Sentiment::Neutral).unwrap(), "Neutral");
    }

    #[test]
    fn clamp_percent_bounds() {
        assert_eq!(clamp_percent(120.0), 100.0);
        assert_eq!(clamp_percent(-1.0), 0.0);
        assert_eq!(clamp_percent(f64::NAN), 0.0);
        assert_eq!(clamp_percent(55.5), 55.5);
    }
}
