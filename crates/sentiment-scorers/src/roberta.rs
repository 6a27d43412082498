use crate::{RobertaScores, Scorer, worker::ModelWorker};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rust_bert::{
    pipelines::{
        common::{ModelResource, ModelType},
        sequence_classification::{SequenceClassificationConfig, SequenceClassificationModel},
    },
    resources::{LocalResource, RemoteResource, ResourceProvider},
};
use std::path::PathBuf;
use tokio::task::JoinHandle;

const NAME: &str = "roberta";
const CLASSES: usize = 3;

/// Locations of the three-class RoBERTa sentiment model files.
///
/// Each location is either an `http(s)` URL, downloaded and cached by `rust-bert`,
/// or a path to a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobertaResources {
    pub model_id: String,
    pub model: String,
    pub config: String,
    pub vocab: String,
    pub merges: String,
}

impl Default for RobertaResources {
    fn default() -> Self {
        let model_id = "cardiffnlp/twitter-roberta-base-sentiment";
        let base = format!("https://huggingface.co/{model_id}/resolve/main");
        Self {
            model_id: model_id.to_owned(),
            model: format!("{base}/rust_model.ot"),
            config: format!("{base}/config.json"),
            vocab: format!("{base}/vocab.json"),
            merges: format!("{base}/merges.txt"),
        }
    }
}

impl RobertaResources {
    fn resource(&self, location: &str) -> Box<dyn ResourceProvider + Send> {
        if location.starts_with("http://") || location.starts_with("https://") {
            Box::new(RemoteResource::new(location, &self.model_id))
        } else {
            Box::new(LocalResource::from(PathBuf::from(location)))
        }
    }

    fn into_config(self) -> SequenceClassificationConfig {
        SequenceClassificationConfig::new(
            ModelType::Roberta,
            ModelResource::Torch(self.resource(&self.model)),
            self.resource(&self.config),
            self.resource(&self.vocab),
            Some(self.resource(&self.merges)),
            false,
            None,
            None,
        )
    }
}

/// Runner for a three-class (negative, neutral, positive) RoBERTa classifier.
#[derive(Debug, Clone)]
pub struct RobertaClassifier {
    worker: ModelWorker<RobertaScores>,
}

impl RobertaClassifier {
    /// Loads the model on a dedicated thread.
    ///
    /// * `resources` - model file locations.
    /// * `capacity` - number of texts that can wait for the model.
    ///
    /// # Returns
    /// * Join handle of the model thread and the classifier, or the load error.
    pub async fn spawn(
        resources: RobertaResources,
        capacity: usize,
    ) -> Result<(JoinHandle<Result<()>>, RobertaClassifier)> {
        let (handle, worker) = ModelWorker::spawn(
            NAME,
            capacity,
            move || {
                SequenceClassificationModel::new(resources.into_config())
                    .map_err(anyhow::Error::from)
            },
            predict,
        )
        .await?;
        Ok((handle, RobertaClassifier { worker }))
    }
}

fn predict(model: &SequenceClassificationModel, text: &str) -> Result<RobertaScores> {
    // Every class clears a zero threshold, giving the sigmoid of each raw output.
    let labels = model
        .predict_multilabel(&[text], 0.0)?
        .pop()
        .ok_or_else(|| anyhow!("classifier returned no prediction"))?;
    distribution(labels.iter().map(|label| (label.id, label.score)))
}

fn distribution(sigmoids: impl IntoIterator<Item = (i64, f64)>) -> Result<RobertaScores> {
    let mut logits = [None; CLASSES];
    for (id, score) in sigmoids {
        if let Some(slot) = usize::try_from(id).ok().and_then(|id| logits.get_mut(id)) {
            *slot = Some(logit(score));
        }
    }
    let logits = logits
        .iter()
        .enumerate()
        .map(|(id, value)| value.ok_or_else(|| anyhow!("classifier returned no score for class {id}")))
        .collect::<Result<Vec<f64>>>()?;

    let probabilities = softmax(&logits);
    Ok(RobertaScores {
        negative: probabilities[0],
        neutral: probabilities[1],
        positive: probabilities[2],
    })
}

/// Inverse of the logistic sigmoid. Saturated inputs are clamped to stay finite.
fn logit(probability: f64) -> f64 {
    let p = probability.clamp(f64::EPSILON, 1.0 - f64::EPSILON);
    (p / (1.0 - p)).ln()
}

/// Numerically stable softmax.
fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[async_trait]
impl Scorer for RobertaClassifier {
    type Output = RobertaScores;

    async fn score(&self, text: &str) -> Result<RobertaScores> {
        self.worker.submit(text).await
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    #[test]
    fn softmax_should_sum_to_one_and_keep_order() {
        let p = softmax(&[-1.2, 0.3, 2.5]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p[0] < p[1] && p[1] < p[2]);

        let large = softmax(&[1000.0, 1000.0, 999.0]);
        assert!(large.iter().all(|v| v.is_finite()));
        assert!((large[0] - large[1]).abs() < 1e-12);
    }

    #[test]
    fn logit_should_invert_sigmoid() {
        for x in [-4.0, -0.5, 0.0, 1.3, 6.0] {
            assert!((logit(sigmoid(x)) - x).abs() < 1e-9);
        }
        assert!(logit(1.0).is_finite());
        assert!(logit(0.0).is_finite());
    }

    #[test]
    fn distribution_should_match_softmax_of_raw_outputs() -> Result<()> {
        let raw = [2.1, -0.4, -1.9];
        let expected = softmax(&raw);
        // labels may come back in any order
        let scores = distribution([(2, sigmoid(raw[2])), (0, sigmoid(raw[0])), (1, sigmoid(raw[1]))])?;

        assert!((scores.negative - expected[0]).abs() < 1e-9);
        assert!((scores.neutral - expected[1]).abs() < 1e-9);
        assert!((scores.positive - expected[2]).abs() < 1e-9);
        assert!((scores.negative + scores.neutral + scores.positive - 1.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn distribution_should_fail_on_missing_class() {
        let err = distribution([(0, 0.4), (2, 0.7)]).unwrap_err();
        assert!(err.to_string().contains("class 1"));
    }

    #[test]
    fn resources_should_default_to_cardiffnlp() {
        let resources = RobertaResources::default();
        assert_eq!(resources.model_id, "cardiffnlp/twitter-roberta-base-sentiment");
        assert!(resources.model.ends_with("/rust_model.ot"));
        assert!(resources.merges.ends_with("/merges.txt"));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "downloads the RoBERTa sentiment weights"]
    async fn it_should_score_text() -> Result<()> {
        let (_handle, classifier) = RobertaClassifier::spawn(RobertaResources::default(), 4).await?;
        let scores = classifier.score("I love this place, the staff are wonderful!").await?;
        assert!(scores.positive > scores.negative);
        assert!((scores.negative + scores.neutral + scores.positive - 1.0).abs() < 1e-6);
        Ok(())
    }
}
