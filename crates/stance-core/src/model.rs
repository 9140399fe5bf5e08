use crate::labels::{LabelSet, UNRESOLVED_LABEL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Log-probability assigned to labels that received no probability mass.
pub const LOGPROB_FLOOR: f64 = -100.0;

/// One input unit: a short text and the target whose stance is asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(alias = "Tweet")]
    pub text: String,
    #[serde(alias = "Target")]
    pub target: String,
}

impl Record {
    pub fn new(text: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target: target.into(),
        }
    }
}

/// Prompt derived from the record at the same index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prompt(pub String);

impl Prompt {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One link's verdict for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkResult {
    pub predicted_label: String,
    pub raw_label: String,
    pub confidence: f64,
    /// Normalized log-probability for every label in the set.
    pub label_logprobs: BTreeMap<String, f64>,
    /// Why the record could not be decoded, when it carries the sentinel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LinkResult {
    /// Build a result from per-label scores in log space (label-set order).
    ///
    /// Scores are softmax-normalized over the label set; `None` or
    /// non-finite entries carry no mass. If nothing carries mass the record
    /// gets the unresolved sentinel.
    pub fn from_label_scores(
        labels: &LabelSet,
        scores: &[Option<f64>],
        raw_label: impl Into<String>,
    ) -> Self {
        let raw_label = raw_label.into();
        let finite: Vec<f64> = scores
            .iter()
            .flatten()
            .copied()
            .filter(|s| s.is_finite())
            .collect();
        if scores.len() != labels.len() || finite.is_empty() {
            return Self::unresolved(labels, raw_label, "no probability mass on any label");
        }

        let lse = log_sum_exp(&finite);
        let mut label_logprobs = BTreeMap::new();
        let mut best: Option<(usize, f64)> = None;
        for (idx, label) in labels.iter().enumerate() {
            let lp = match scores[idx] {
                Some(s) if s.is_finite() => (s - lse).max(LOGPROB_FLOOR),
                _ => LOGPROB_FLOOR,
            };
            label_logprobs.insert(label.to_string(), lp);
            if best.map(|(_, b)| lp > b).unwrap_or(true) {
                best = Some((idx, lp));
            }
        }

        let (best_idx, best_lp) = best.unwrap_or((0, LOGPROB_FLOOR));
        Self {
            predicted_label: labels.get(best_idx).unwrap_or(UNRESOLVED_LABEL).to_string(),
            raw_label,
            confidence: best_lp.exp().clamp(0.0, 1.0),
            label_logprobs,
            error: None,
        }
    }

    /// Sentinel for a record the link could not decode.
    pub fn unresolved(
        labels: &LabelSet,
        raw_label: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            predicted_label: UNRESOLVED_LABEL.to_string(),
            raw_label: raw_label.into(),
            confidence: 0.0,
            label_logprobs: labels
                .iter()
                .map(|l| (l.to_string(), LOGPROB_FLOOR))
                .collect(),
            error: Some(reason.into()),
        }
    }

    pub fn is_unresolved(&self) -> bool {
        self.predicted_label == UNRESOLVED_LABEL
    }
}

pub(crate) fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Whether a link answers directly or reasons before answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    #[default]
    Direct,
    Reasoning,
}

impl LinkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Reasoning => "reasoning",
        }
    }
}

/// How a link turns a prompt into label scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkStrategy {
    /// Decide from the model identifier.
    #[default]
    Auto,
    /// Decoder-only: first distinguishing label token log-probabilities.
    Causal,
    /// Encoder-decoder: likelihood of each candidate label given the prompt.
    Seq2seq,
    /// Deterministic offline link.
    Fake,
}

impl LinkStrategy {
    /// Resolve `Auto` against a model identifier.
    pub fn resolve(self, model: &str) -> Self {
        match self {
            Self::Auto => {
                let m = model.to_lowercase();
                if ["t5", "ul2", "bart"].iter().any(|k| m.contains(k)) {
                    Self::Seq2seq
                } else {
                    Self::Causal
                }
            }
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Causal => "causal",
            Self::Seq2seq => "seq2seq",
            Self::Fake => "fake",
        }
    }
}

/// Final, cascade-annotated output row for the record at `index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedRow {
    pub index: usize,
    pub record: Record,
    pub pred_label: String,
    pub conf_score: f64,
    pub label_logprobs: BTreeMap<String, f64>,
    pub raw_pred_label: String,
    /// 0-based position of the link that resolved the record.
    pub resolved_at: usize,
    pub history: Vec<LinkResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::default_labels;

    fn stance() -> LabelSet {
        LabelSet::new(default_labels()).unwrap()
    }

    #[test]
    fn scores_are_normalized_over_the_label_set() {
        let labels = stance();
        let res = LinkResult::from_label_scores(
            &labels,
            &[Some(-0.5), Some(-2.0), Some(-3.0)],
            "FOR",
        );
        assert_eq!(res.predicted_label, "for");
        assert_eq!(res.raw_label, "FOR");
        let mass: f64 = res.label_logprobs.values().map(|lp| lp.exp()).sum();
        assert!((mass - 1.0).abs() < 1e-9);
        assert!((res.confidence - res.label_logprobs["for"].exp()).abs() < 1e-12);
        assert!(res.error.is_none());
    }

    #[test]
    fn missing_labels_get_the_floor_but_stay_present() {
        let labels = stance();
        let res = LinkResult::from_label_scores(&labels, &[None, Some(-1.0), None], "against");
        assert_eq!(res.predicted_label, "against");
        assert_eq!(res.label_logprobs.len(), 3);
        assert_eq!(res.label_logprobs["for"], LOGPROB_FLOOR);
        assert!((res.confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn no_mass_yields_sentinel() {
        let labels = stance();
        let res = LinkResult::from_label_scores(&labels, &[None, None, Some(f64::NAN)], "??");
        assert!(res.is_unresolved());
        assert_eq!(res.confidence, 0.0);
        assert_eq!(res.raw_label, "??");
        assert_eq!(res.label_logprobs.len(), 3);
        assert!(res.error.is_some());
    }

    #[test]
    fn ties_resolve_in_label_order() {
        let labels = stance();
        let res = LinkResult::from_label_scores(&labels, &[Some(-1.0), Some(-1.0), None], "");
        assert_eq!(res.predicted_label, "for");
        assert!((res.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn auto_strategy_follows_model_family() {
        assert_eq!(
            LinkStrategy::Auto.resolve("google/flan-t5-small"),
            LinkStrategy::Seq2seq
        );
        assert_eq!(LinkStrategy::Auto.resolve("google/flan-ul2"), LinkStrategy::Seq2seq);
        assert_eq!(
            LinkStrategy::Auto.resolve("meta-llama/Meta-Llama-3-8B-Instruct"),
            LinkStrategy::Causal
        );
        assert_eq!(LinkStrategy::Fake.resolve("t5"), LinkStrategy::Fake);
    }

    #[test]
    fn record_accepts_csv_style_field_names() {
        let r: Record = serde_json::from_str(r#"{"Tweet": "hi", "Target": "x"}"#).unwrap();
        assert_eq!(r, Record::new("hi", "x"));
    }
}
