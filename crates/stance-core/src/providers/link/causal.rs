use super::http::{plain_prompts, Choice, ChoiceLogprobs, CompletionParams, CompletionsBackend};
use super::ModelLink;
use crate::labels::{clean_token, LabelSet};
use crate::model::{log_sum_exp, LinkMode, LinkResult, LinkStrategy, Prompt};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Alternatives requested per generated position.
const TOP_LOGPROBS: u32 = 20;

/// Decoder-only link: greedy generation, scored by the probability mass the
/// first answer position puts on each label's distinguishing tokens.
pub struct CausalLink {
    backend: CompletionsBackend,
    labels: LabelSet,
    mode: LinkMode,
    max_label_tokens: u32,
    reasoning_tokens: u32,
}

impl CausalLink {
    pub fn new(
        backend: CompletionsBackend,
        labels: LabelSet,
        mode: LinkMode,
        max_label_tokens: u32,
        reasoning_tokens: u32,
    ) -> Self {
        Self {
            backend,
            labels,
            mode,
            max_label_tokens: max_label_tokens.max(1),
            reasoning_tokens,
        }
    }
}

#[async_trait]
impl ModelLink for CausalLink {
    async fn invoke(&self, prompts: &[Prompt]) -> anyhow::Result<Vec<LinkResult>> {
        let inputs = match self.mode {
            LinkMode::Direct => plain_prompts(prompts),
            LinkMode::Reasoning => {
                self.backend
                    .with_rationale(prompts, self.reasoning_tokens)
                    .await?
            }
        };
        let params = CompletionParams::greedy(self.max_label_tokens).with_logprobs(TOP_LOGPROBS);
        let choices = self.backend.complete(&inputs, params).await?;
        Ok(choices
            .iter()
            .map(|c| score_first_token(&self.labels, c))
            .collect())
    }

    fn model_id(&self) -> &str {
        self.backend.model()
    }

    fn strategy(&self) -> LinkStrategy {
        LinkStrategy::Causal
    }
}

/// Score one choice from the top log-probabilities at its answer position:
/// the first generated token that carries a word, so leading whitespace and
/// quotes are skipped.
pub(crate) fn score_first_token(labels: &LabelSet, choice: &Choice) -> LinkResult {
    let raw = choice.text.trim().to_string();
    let Some(lp) = choice.logprobs.as_ref() else {
        warn!(raw = %raw, "choice carries no logprobs");
        return LinkResult::unresolved(labels, raw, "response carries no logprobs");
    };

    let position = lp
        .tokens
        .iter()
        .position(|t| !clean_token(t).is_empty())
        .unwrap_or(0);
    let result = score_at(labels, lp, position, &raw);
    if !result.is_unresolved() {
        return result;
    }

    // Preamble before the answer ("The answer is FOR"): score the first
    // token that spells the label the raw text normalizes to.
    let answer = labels.normalize(&raw).and_then(|label| {
        let idx = labels.position(label)?;
        lp.tokens
            .iter()
            .position(|t| labels.distinguished_by(t) == Some(idx))
    });
    match answer {
        Some(p) if p != position => {
            debug!(raw = %raw, position = p, "answer found past the first word");
            score_at(labels, lp, p, &raw)
        }
        _ => {
            warn!(raw = %raw, "no label token among top logprobs");
            result
        }
    }
}

fn score_at(labels: &LabelSet, lp: &ChoiceLogprobs, position: usize, raw: &str) -> LinkResult {
    let Some(top) = lp.top_logprobs.get(position).and_then(|t| t.as_ref()) else {
        return LinkResult::unresolved(labels, raw, "no top logprobs at answer position");
    };

    let mut mass: Vec<Vec<f64>> = vec![Vec::new(); labels.len()];
    for (token, logprob) in top {
        if let Some(idx) = labels.distinguished_by(token) {
            mass[idx].push(*logprob);
        }
    }
    let scores: Vec<Option<f64>> = mass
        .iter()
        .map(|m| (!m.is_empty()).then(|| log_sum_exp(m)))
        .collect();
    LinkResult::from_label_scores(labels, &scores, raw)
}
