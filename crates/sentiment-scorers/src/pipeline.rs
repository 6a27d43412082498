use crate::{PipelineSentiment, Scorer, worker::ModelWorker};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rust_bert::pipelines::sentiment::{SentimentConfig, SentimentModel, SentimentPolarity};
use tokio::task::JoinHandle;

const NAME: &str = "huggingface";

/// Runner for the default sentiment-analysis pipeline (DistilBERT fine-tuned on SST-2).
#[derive(Debug, Clone)]
pub struct SentimentClassifier {
    worker: ModelWorker<PipelineSentiment>,
}

impl SentimentClassifier {
    /// Loads the pipeline on a dedicated thread.
    ///
    /// * `capacity` - number of texts that can wait for the model.
    ///
    /// # Returns
    /// * Join handle of the model thread and the classifier, or the load error.
    pub async fn spawn(capacity: usize) -> Result<(JoinHandle<Result<()>>, SentimentClassifier)> {
        let (handle, worker) = ModelWorker::spawn(
            NAME,
            capacity,
            || SentimentModel::new(SentimentConfig::default()).map_err(anyhow::Error::from),
            predict,
        )
        .await?;
        Ok((handle, SentimentClassifier { worker }))
    }
}

fn predict(model: &SentimentModel, text: &str) -> Result<PipelineSentiment> {
    let sentiment = model
        .predict([text])
        .pop()
        .ok_or_else(|| anyhow!("sentiment pipeline returned no prediction"))?;
    let label = match sentiment.polarity {
        SentimentPolarity::Positive => "POSITIVE",
        SentimentPolarity::Negative => "NEGATIVE",
    };
    Ok(PipelineSentiment {
        label: label.to_owned(),
        score: sentiment.score,
    })
}

#[async_trait]
impl Scorer for SentimentClassifier {
    type Output = PipelineSentiment;

    async fn score(&self, text: &str) -> Result<PipelineSentiment> {
        self.worker.submit(text).await
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "downloads the DistilBERT SST-2 weights"]
    async fn it_should_predict_sentiment() -> Result<()> {
        let (_handle, classifier) = SentimentClassifier::spawn(4).await?;

        let positive = classifier
            .score("Probably my all-time favorite movie, a story of selflessness and dedication.")
            .await?;
        assert_eq!(positive.label, "POSITIVE");
        assert!((0.5..=1.0).contains(&positive.score));

        let negative = classifier
            .score("This film tried to be too many things all at once and failed at all of them.")
            .await?;
        assert_eq!(negative.label, "NEGATIVE");
        Ok(())
    }
}
