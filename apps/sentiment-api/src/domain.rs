use crate::{
    models::{
        AnalysisRequest, AnalysisResponse, BatchResponse, BatchResult, BatchSummary, ScoreSlot,
    },
    telemetry::Metrics,
};
use futures::future::join_all;
use sentiment_scorers::{LexiconScores, PipelineSentiment, RobertaScores, Scorer};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, sync::Arc, time::Instant};
use thiserror::Error;
use validator::Validate;

pub type SharedScorer<T> = Arc<dyn Scorer<Output = T>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("No text provided")]
    MissingText,

    #[error("{message}")]
    Scorer {
        scorer: &'static str,
        message: String,
    },
}

/// What a scorer failure does to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// The failure is embedded as `{"error": message}` in the scorer's slot.
    Isolate,
    /// The failure fails the whole request.
    Propagate,
}

impl FaultPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultPolicy::Isolate => "isolate",
            FaultPolicy::Propagate => "propagate",
        }
    }
}

impl FromStr for FaultPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "isolate" => Ok(FaultPolicy::Isolate),
            "propagate" => Ok(FaultPolicy::Propagate),
            other => Err(format!("unknown fault policy {other:?}")),
        }
    }
}

/// Per scorer fault policy.
///
/// The defaults keep the established behavior: only the RoBERTa scorer is fault isolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultPolicies {
    pub vader: FaultPolicy,
    pub roberta: FaultPolicy,
    pub huggingface: FaultPolicy,
}

impl Default for FaultPolicies {
    fn default() -> Self {
        Self {
            vader: FaultPolicy::Propagate,
            roberta: FaultPolicy::Isolate,
            huggingface: FaultPolicy::Propagate,
        }
    }
}

/// AggregationService runs every scorer on the same text and merges the results.
pub struct AggregationService {
    vader: SharedScorer<LexiconScores>,
    roberta: SharedScorer<RobertaScores>,
    huggingface: SharedScorer<PipelineSentiment>,
    policies: FaultPolicies,
    metrics: Arc<Metrics>,
}

impl AggregationService {
    /// Creates a new instance of the AggregationService.
    ///
    /// # Arguments
    /// * `vader` - lexicon scorer.
    /// * `roberta` - three-class transformer scorer.
    /// * `huggingface` - sentiment-analysis pipeline scorer.
    /// * `policies` - what a failure of each scorer does to the request.
    /// * `metrics` - metrics to record scorer latency and failures in.
    pub fn new(
        vader: SharedScorer<LexiconScores>,
        roberta: SharedScorer<RobertaScores>,
        huggingface: SharedScorer<PipelineSentiment>,
        policies: FaultPolicies,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            vader,
            roberta,
            huggingface,
            policies,
            metrics,
        }
    }

    /// Analyzes a single text with all scorers.
    ///
    /// # Arguments
    /// * `request` - request holding the text.
    ///
    /// # Returns
    /// * Combined response once every scorer completed, `MissingText` when the text is
    ///   absent or empty, or the first failure of a scorer with the `Propagate` policy.
    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisResponse, AnalysisError> {
        let text = validated_text(request)?;
        self.analyze_text(text).await
    }

    /// Analyzes a list of texts and counts pipeline labels.
    ///
    /// Every item is validated before any scorer runs. The batch fails as a whole if any
    /// item fails.
    pub async fn analyze_batch(
        &self,
        requests: &[AnalysisRequest],
    ) -> Result<BatchResponse, AnalysisError> {
        let texts = requests
            .iter()
            .map(validated_text)
            .collect::<Result<Vec<_>, _>>()?;

        let responses = join_all(texts.iter().map(|text| self.analyze_text(text)))
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        let mut summary = BatchSummary::default();
        let results = texts
            .into_iter()
            .zip(responses)
            .map(|(text, sentiment)| {
                count_label(&mut summary, &sentiment.huggingface);
                BatchResult {
                    text: text.to_owned(),
                    sentiment,
                }
            })
            .collect();

        Ok(BatchResponse { results, summary })
    }

    async fn analyze_text(&self, text: &str) -> Result<AnalysisResponse, AnalysisError> {
        let (vader, roberta, huggingface) = futures::join!(
            self.run(self.vader.as_ref(), text, self.policies.vader),
            self.run(self.roberta.as_ref(), text, self.policies.roberta),
            self.run(self.huggingface.as_ref(), text, self.policies.huggingface),
        );

        Ok(AnalysisResponse {
            vader: vader?,
            roberta: roberta?,
            huggingface: huggingface?,
        })
    }

    async fn run<T: Send>(
        &self,
        scorer: &dyn Scorer<Output = T>,
        text: &str,
        policy: FaultPolicy,
    ) -> Result<ScoreSlot<T>, AnalysisError> {
        let name = scorer.name();
        let start_time = Instant::now();
        let result = scorer.score(text).await;
        self.metrics
            .record_scorer(name, start_time.elapsed().as_secs_f64(), result.is_ok());

        let err = match result {
            Ok(output) => return Ok(ScoreSlot::Scored(output)),
            Err(err) => err,
        };
        let message = format!("{err:#}");
        self.metrics.record_scorer_failure(name, policy.as_str());

        match policy {
            FaultPolicy::Isolate => {
                tracing::warn!(scorer = name, "scorer failed, isolating: {message}");
                Ok(ScoreSlot::Failed { error: message })
            }
            FaultPolicy::Propagate => {
                tracing::error!(scorer = name, "scorer failed: {message}");
                Err(AnalysisError::Scorer {
                    scorer: name,
                    message,
                })
            }
        }
    }
}

fn validated_text(request: &AnalysisRequest) -> Result<&str, AnalysisError> {
    request
        .validate()
        .map_err(|_| AnalysisError::MissingText)?;
    request.text.as_deref().ok_or(AnalysisError::MissingText)
}

fn count_label(summary: &mut BatchSummary, slot: &ScoreSlot<PipelineSentiment>) {
    match slot.scored().map(|s| s.label.to_lowercase()).as_deref() {
        Some("positive") => summary.positive += 1,
        Some("negative") => summary.negative += 1,
        _ => summary.neutral += 1,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::telemetry::DEFAULT_BUCKETS;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use sentiment_scorers::VaderScorer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test double returning a fixed output, or failing for texts containing `fail_on`.
    pub(crate) struct FixedScorer<T> {
        pub name: &'static str,
        pub output: T,
        pub fail_on: Option<&'static str>,
        pub calls: AtomicUsize,
    }

    impl<T> FixedScorer<T> {
        pub(crate) fn new(name: &'static str, output: T) -> Self {
            Self {
                name,
                output,
                fail_on: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing_on(mut self, needle: &'static str) -> Self {
            self.fail_on = Some(needle);
            self
        }
    }

    #[async_trait]
    impl<T: Clone + Send + Sync> Scorer for FixedScorer<T> {
        type Output = T;

        async fn score(&self, text: &str) -> Result<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_on {
                Some(needle) if text.contains(needle) => {
                    Err(anyhow!("{} exploded on input", self.name))
                }
                _ => Ok(self.output.clone()),
            }
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    /// Pipeline double labelling texts with "bad" as negative.
    pub(crate) struct KeywordPipeline;

    #[async_trait]
    impl Scorer for KeywordPipeline {
        type Output = PipelineSentiment;

        async fn score(&self, text: &str) -> Result<PipelineSentiment> {
            if text.contains("explode") {
                return Err(anyhow!("pipeline exploded"));
            }
            let label = if text.contains("bad") { "NEGATIVE" } else { "POSITIVE" };
            Ok(PipelineSentiment {
                label: label.to_string(),
                score: 0.99,
            })
        }

        fn name(&self) -> &'static str {
            "huggingface"
        }
    }

    pub(crate) fn roberta_scores() -> RobertaScores {
        RobertaScores {
            negative: 0.1,
            neutral: 0.3,
            positive: 0.6,
        }
    }

    pub(crate) fn service_with(
        roberta: SharedScorer<RobertaScores>,
        huggingface: SharedScorer<PipelineSentiment>,
    ) -> AggregationService {
        AggregationService::new(
            Arc::new(VaderScorer::embedded().unwrap()),
            roberta,
            huggingface,
            FaultPolicies::default(),
            Arc::new(Metrics::new(&DEFAULT_BUCKETS).unwrap()),
        )
    }

    pub(crate) fn service() -> AggregationService {
        let roberta = FixedScorer::new("roberta", roberta_scores()).failing_on("roberta-fail");
        service_with(
            Arc::new(roberta),
            Arc::new(KeywordPipeline),
        )
    }

    #[tokio::test]
    async fn it_should_fill_all_slots() {
        let response = service()
            .analyze(&AnalysisRequest::new("The service was great!"))
            .await
            .unwrap();

        let vader = response.vader.scored().unwrap();
        assert!(vader.compound > 0.0);
        assert_eq!(response.roberta, ScoreSlot::Scored(roberta_scores()));
        assert_eq!(response.huggingface.scored().unwrap().label, "POSITIVE");
    }

    #[tokio::test]
    async fn it_should_reject_missing_or_empty_text_before_scoring() {
        let roberta = Arc::new(FixedScorer::new("roberta", roberta_scores()));
        let service = service_with(roberta.clone(), Arc::new(KeywordPipeline));

        let missing = service.analyze(&AnalysisRequest::default()).await;
        let empty = service.analyze(&AnalysisRequest::new("")).await;

        assert_eq!(missing.unwrap_err(), AnalysisError::MissingText);
        assert_eq!(empty.unwrap_err(), AnalysisError::MissingText);
        assert_eq!(roberta.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn it_should_isolate_roberta_failures() {
        let response = service()
            .analyze(&AnalysisRequest::new("roberta-fail but otherwise good"))
            .await
            .unwrap();

        assert_eq!(
            response.roberta,
            ScoreSlot::Failed {
                error: "roberta exploded on input".to_string()
            }
        );
        assert!(response.vader.scored().is_some());
        assert!(response.huggingface.scored().is_some());
    }

    #[tokio::test]
    async fn it_should_propagate_pipeline_failures_after_all_scorers_ran() {
        let roberta = Arc::new(FixedScorer::new("roberta", roberta_scores()));
        let service = service_with(roberta.clone(), Arc::new(KeywordPipeline));

        let err = service
            .analyze(&AnalysisRequest::new("explode please"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AnalysisError::Scorer {
                scorer: "huggingface",
                message: "pipeline exploded".to_string()
            }
        );
        assert_eq!(err.to_string(), "pipeline exploded");
        assert_eq!(roberta.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn it_should_follow_configured_policies() {
        let service = AggregationService::new(
            Arc::new(VaderScorer::embedded().unwrap()),
            Arc::new(FixedScorer::new("roberta", roberta_scores()).failing_on("roberta-fail")),
            Arc::new(KeywordPipeline),
            FaultPolicies {
                vader: FaultPolicy::Propagate,
                roberta: FaultPolicy::Propagate,
                huggingface: FaultPolicy::Isolate,
            },
            Arc::new(Metrics::new(&DEFAULT_BUCKETS).unwrap()),
        );

        let err = service
            .analyze(&AnalysisRequest::new("roberta-fail"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Scorer { scorer: "roberta", .. }));

        let response = service
            .analyze(&AnalysisRequest::new("explode"))
            .await
            .unwrap();
        assert_eq!(
            response.huggingface,
            ScoreSlot::Failed {
                error: "pipeline exploded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn it_should_be_idempotent() {
        let service = service();
        let request = AnalysisRequest::new("Decent food, but the wait was awful.");
        let first = service.analyze(&request).await.unwrap();
        let second = service.analyze(&request).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn it_should_summarize_batches() {
        let requests = vec![
            AnalysisRequest::new("good stuff"),
            AnalysisRequest::new("bad stuff"),
            AnalysisRequest::new("more good stuff"),
        ];

        let batch = service().analyze_batch(&requests).await.unwrap();

        assert_eq!(batch.results.len(), 3);
        assert_eq!(batch.results[1].text, "bad stuff");
        assert_eq!(
            batch.summary,
            BatchSummary {
                positive: 2,
                negative: 1,
                neutral: 0
            }
        );
    }

    #[tokio::test]
    async fn it_should_count_isolated_pipeline_failures_as_neutral() {
        let service = AggregationService::new(
            Arc::new(VaderScorer::embedded().unwrap()),
            Arc::new(FixedScorer::new("roberta", roberta_scores())),
            Arc::new(KeywordPipeline),
            FaultPolicies {
                huggingface: FaultPolicy::Isolate,
                ..FaultPolicies::default()
            },
            Arc::new(Metrics::new(&DEFAULT_BUCKETS).unwrap()),
        );

        let batch = service
            .analyze_batch(&[AnalysisRequest::new("explode")])
            .await
            .unwrap();
        assert_eq!(batch.summary.neutral, 1);
    }

    #[tokio::test]
    async fn it_should_fail_whole_batch() {
        let service = service();

        let invalid = service
            .analyze_batch(&[AnalysisRequest::new("fine"), AnalysisRequest::default()])
            .await;
        assert_eq!(invalid.unwrap_err(), AnalysisError::MissingText);

        let failed = service
            .analyze_batch(&[AnalysisRequest::new("fine"), AnalysisRequest::new("explode")])
            .await;
        assert!(matches!(failed, Err(AnalysisError::Scorer { .. })));

        let empty = service.analyze_batch(&[]).await.unwrap();
        assert!(empty.results.is_empty());
        assert_eq!(empty.summary, BatchSummary::default());
    }

    #[test]
    fn it_should_parse_fault_policies() {
        assert_eq!("Isolate".parse::<FaultPolicy>(), Ok(FaultPolicy::Isolate));
        assert_eq!(" propagate ".parse::<FaultPolicy>(), Ok(FaultPolicy::Propagate));
        assert!("ignore".parse::<FaultPolicy>().is_err());
    }
}
