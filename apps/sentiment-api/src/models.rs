use sentiment_scorers::{LexiconScores, PipelineSentiment, RobertaScores};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
pub struct AnalysisRequest {
    /// Text to analyze
    #[validate(required, length(min = 1))]
    pub text: Option<String>,
}

#[cfg(test)]
impl AnalysisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

/// Outcome of a single scorer: its result, or the message of an isolated failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ScoreSlot<T> {
    Scored(T),
    Failed { error: String },
}

impl<T> ScoreSlot<T> {
    pub fn scored(&self) -> Option<&T> {
        match self {
            ScoreSlot::Scored(value) => Some(value),
            ScoreSlot::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisResponse {
    /// Lexicon based scores
    pub vader: ScoreSlot<LexiconScores>,
    /// Three-class transformer distribution
    pub roberta: ScoreSlot<RobertaScores>,
    /// Best label of the sentiment-analysis pipeline
    pub huggingface: ScoreSlot<PipelineSentiment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchResult {
    pub text: String,
    pub sentiment: AnalysisResponse,
}

/// Number of texts per pipeline label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchSummary {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchResponse {
    pub results: Vec<BatchResult>,
    pub summary: BatchSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn it_should_validate_text_presence() {
        assert!(AnalysisRequest::new("fine").validate().is_ok());
        assert!(AnalysisRequest::new("").validate().is_err());
        assert!(AnalysisRequest::default().validate().is_err());
    }

    #[test]
    fn it_should_serialize_failed_slot_as_error_object() {
        let slot: ScoreSlot<RobertaScores> = ScoreSlot::Failed {
            error: "input too long".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&slot).unwrap(),
            json!({"error": "input too long"})
        );
        assert!(slot.scored().is_none());
    }

    #[test]
    fn it_should_serialize_scored_slot_transparently() {
        let slot = ScoreSlot::Scored(PipelineSentiment {
            label: "POSITIVE".to_string(),
            score: 0.5,
        });
        assert_eq!(
            serde_json::to_value(&slot).unwrap(),
            json!({"label": "POSITIVE", "score": 0.5})
        );
    }
}
