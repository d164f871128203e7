use serde::Serialize;

use crate::score::{clamp_percent, Scorer, Sentiment};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TextAnalysisRecord {
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub similarity: f64,
    /// Characters analysed after trimming.
    pub chars: usize,
}

/// Sentiment and similarity for a block of text.
pub fn analyze_text(text: &str, scorer: &dyn Scorer) -> TextAnalysisRecord {
    let text = text.trim();
    let verdict = scorer.score_text(text);
    log::debug!(
        "text ({} chars): {:?} {:.1}%",
        text.chars().count(),
        verdict.sentiment,
        verdict.confidence
    );
    TextAnalysisRecord {
        sentiment: verdict.sentiment,
        confidence: clamp_percent(verdict.confidence),
        similarity: clamp_percent(verdict.similarity),
        chars: text.chars().count(),
    }
}
