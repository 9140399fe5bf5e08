//! Encoder-decoder link.
//!
//! Each candidate label is scored by its likelihood given the prompt: the
//! server echoes `prompt + " " + label` with per-token log-probabilities and
//! the tokens past the prompt's end are summed. Offsets are in characters,
//! as OpenAI-compatible servers report `text_offset`. The serving endpoint
//! must honor `echo` with `max_tokens: 0`.

use super::http::{plain_prompts, Choice, CompletionParams, CompletionsBackend};
use super::ModelLink;
use crate::labels::LabelSet;
use crate::model::{LinkMode, LinkResult, LinkStrategy, Prompt};
use async_trait::async_trait;
use tracing::{debug, warn};

pub struct Seq2SeqLink {
    backend: CompletionsBackend,
    labels: LabelSet,
    mode: LinkMode,
    max_label_tokens: u32,
    reasoning_tokens: u32,
}

impl Seq2SeqLink {
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
impl ModelLink for Seq2SeqLink {
    async fn invoke(&self, prompts: &[Prompt]) -> anyhow::Result<Vec<LinkResult>> {
        let inputs = match self.mode {
            LinkMode::Direct => plain_prompts(prompts),
            LinkMode::Reasoning => {
                self.backend
                    .with_rationale(prompts, self.reasoning_tokens)
                    .await?
            }
        };

        let generated = self
            .backend
            .complete(&inputs, CompletionParams::greedy(self.max_label_tokens))
            .await?;

        // scores[record][label]
        let mut scores: Vec<Vec<Option<f64>>> = vec![Vec::new(); inputs.len()];
        for label in self.labels.iter() {
            let conditioned: Vec<String> = inputs
                .iter()
                .map(|p| format!("{} {}", p, label))
                .collect();
            let echoed = self
                .backend
                .complete(&conditioned, CompletionParams::echo_only())
                .await?;
            for ((row, input), choice) in scores.iter_mut().zip(&inputs).zip(&echoed) {
                row.push(continuation_logprob(choice, input.chars().count()));
            }
        }

        Ok(generated
            .into_iter()
            .zip(scores)
            .map(|(choice, row)| {
                let res = LinkResult::from_label_scores(&self.labels, &row, choice.text.trim());
                if res.is_unresolved() {
                    warn!(raw = %res.raw_label, "no label could be scored");
                } else if let Some(said) = self.labels.normalize(&res.raw_label) {
                    if said != res.predicted_label {
                        debug!(
                            generated = said,
                            scored = %res.predicted_label,
                            "greedy answer disagrees with label likelihoods"
                        );
                    }
                }
                res
            })
            .collect())
    }

    fn model_id(&self) -> &str {
        self.backend.model()
    }

    fn strategy(&self) -> LinkStrategy {
        LinkStrategy::Seq2seq
    }
}

/// Sum of token log-probabilities starting at or after character `prompt_len`.
pub(crate) fn continuation_logprob(choice: &Choice, prompt_len: usize) -> Option<f64> {
    let lp = choice.logprobs.as_ref()?;
    if lp.text_offset.len() != lp.token_logprobs.len() {
        return None;
    }
    let mut total = 0.0;
    let mut counted = 0usize;
    for (offset, logprob) in lp.text_offset.iter().zip(&lp.token_logprobs) {
        if *offset < prompt_len {
            continue;
        }
        total += (*logprob)?;
        counted += 1;
    }
    (counted > 0).then_some(total)
}
