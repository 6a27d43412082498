mod lexicon;
mod pipeline;
mod roberta;
mod vader;
mod worker;

use anyhow::Result;
use async_trait::async_trait;
pub use lexicon::{Lexicon, LexiconSource, VADER_LEXICON_URL};
pub use pipeline::SentimentClassifier;
pub use roberta::{RobertaClassifier, RobertaResources};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
pub use vader::VaderScorer;

/// Scorer represents an entity that computes a sentiment score for a single text.
///
/// Implementations are loaded once at startup and shared read-only between requests.
#[async_trait]
pub trait Scorer: Send + Sync {
    type Output: Send;

    /// Scores a single text.
    ///
    /// * `text` - text to score.
    ///
    /// # Returns
    /// * Scorer specific output or error if the underlying model failed.
    async fn score(&self, text: &str) -> Result<Self::Output>;

    /// Short name used in logs, metrics and error messages.
    fn name(&self) -> &'static str;
}

/// Lexicon based polarity scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LexiconScores {
    #[serde(rename = "neg")]
    pub negative: f64,
    #[serde(rename = "neu")]
    pub neutral: f64,
    #[serde(rename = "pos")]
    pub positive: f64,
    pub compound: f64,
}

/// Probability distribution over three sentiment classes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RobertaScores {
    #[serde(rename = "roberta_neg")]
    pub negative: f64,
    #[serde(rename = "roberta_neu")]
    pub neutral: f64,
    #[serde(rename = "roberta_pos")]
    pub positive: f64,
}

/// Best label and its confidence as reported by a classification pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PipelineSentiment {
    pub label: String,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_serialize_with_wire_names() {
        let lexicon = LexiconScores {
            negative: 0.0,
            neutral: 0.254,
            positive: 0.746,
            compound: 0.8316,
        };
        let value = serde_json::to_value(lexicon).unwrap();
        assert_eq!(value["neg"], 0.0);
        assert_eq!(value["neu"], 0.254);
        assert_eq!(value["pos"], 0.746);
        assert_eq!(value["compound"], 0.8316);

        let roberta = RobertaScores {
            negative: 0.1,
            neutral: 0.2,
            positive: 0.7,
        };
        let value = serde_json::to_value(roberta).unwrap();
        assert_eq!(value["roberta_neg"], 0.1);
        assert_eq!(value["roberta_neu"], 0.2);
        assert_eq!(value["roberta_pos"], 0.7);
    }
}
