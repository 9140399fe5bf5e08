use super::ModelLink;
use crate::labels::LabelSet;
use crate::model::{LinkResult, LinkStrategy, Prompt};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Spread of the log-space scores; larger means more confident.
const SHARPNESS: f64 = 4.0;

/// Offline link with deterministic, prompt-dependent label scores.
///
/// Scores come from a SHA-256 of the model identifier and the prompt, so
/// repeated runs agree exactly and different "models" disagree.
#[derive(Debug, Clone)]
pub struct FakeLink {
    model: String,
    labels: LabelSet,
}

impl FakeLink {
    pub fn new(model: impl Into<String>, labels: LabelSet) -> Self {
        Self {
            model: model.into(),
            labels,
        }
    }

    fn score(&self, prompt: &Prompt) -> LinkResult {
        let mut h = Sha256::new();
        h.update(self.model.as_bytes());
        h.update(b"\n");
        h.update(prompt.as_str().as_bytes());
        let digest = h.finalize();
        let scores: Vec<Option<f64>> = (0..self.labels.len())
            .map(|i| {
                let byte = digest.as_slice()[i % digest.len()];
                Some(f64::from(byte) / 255.0 * SHARPNESS)
            })
            .collect();
        let mut res = LinkResult::from_label_scores(&self.labels, &scores, "");
        res.raw_label = res.predicted_label.to_uppercase();
        res
    }
}

#[async_trait]
impl ModelLink for FakeLink {
    async fn invoke(&self, prompts: &[Prompt]) -> anyhow::Result<Vec<LinkResult>> {
        Ok(prompts.iter().map(|p| self.score(p)).collect())
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn strategy(&self) -> LinkStrategy {
        LinkStrategy::Fake
    }
}
