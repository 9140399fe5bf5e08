//! Label vocabulary for a run, and normalization of raw model output onto it.

use crate::errors::{ChainError, ChainResult};
use serde::{Deserialize, Serialize};

/// Smallest label set a cascade can rank.
pub const MIN_LABELS: usize = 2;
/// Largest label set supported per run.
pub const MAX_LABELS: usize = 10;

/// Sentinel predicted label for records a link could not decode.
pub const UNRESOLVED_LABEL: &str = "unresolved";

pub fn default_labels() -> Vec<String> {
    vec!["for".into(), "against".into(), "neutral".into()]
}

/// Ordered, lower-cased, de-duplicated label vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new<I, S>(labels: I) -> ChainResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for raw in labels {
            let label = raw.as_ref().trim().to_lowercase();
            if label.is_empty() {
                return Err(ChainError::config("label set contains an empty label"));
            }
            if label == UNRESOLVED_LABEL {
                return Err(ChainError::config(format!(
                    "'{}' is reserved for undecodable records",
                    UNRESOLVED_LABEL
                )));
            }
            if out.contains(&label) {
                return Err(ChainError::config(format!("duplicate label '{}'", label)));
            }
            out.push(label);
        }
        if !(MIN_LABELS..=MAX_LABELS).contains(&out.len()) {
            return Err(ChainError::config(format!(
                "unsupported label set size {} (supported: {}..={})",
                out.len(),
                MIN_LABELS,
                MAX_LABELS
            )));
        }
        Ok(Self { labels: out })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.labels.get(idx).map(String::as_str)
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Map raw model output onto a label.
    ///
    /// Exact match after trimming quotes and punctuation first, then the
    /// first word that is a label.
    pub fn normalize(&self, raw: &str) -> Option<&str> {
        let cleaned = clean_token(raw);
        if let Some(idx) = self.position(&cleaned) {
            return self.get(idx);
        }
        cleaned
            .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
            .filter(|w| !w.is_empty())
            .find_map(|w| self.position(w))
            .and_then(|idx| self.get(idx))
    }

    /// Labels for which `fragment` is a distinguishing prefix: it starts the
    /// label and no other label. Used to credit first-token probability mass.
    pub fn distinguished_by(&self, fragment: &str) -> Option<usize> {
        let fragment = clean_token(fragment);
        if fragment.is_empty() {
            return None;
        }
        let mut hits = self
            .labels
            .iter()
            .enumerate()
            .filter(|(_, l)| l.starts_with(fragment.as_str()));
        match (hits.next(), hits.next()) {
            (Some((idx, _)), None) => Some(idx),
            _ => None,
        }
    }

    /// Upper-cased, quoted list for prompt templates:
    /// `"FOR", "AGAINST", or "NEUTRAL"`.
    pub fn display_list(&self) -> String {
        let quoted: Vec<String> = self
            .labels
            .iter()
            .map(|l| format!("\"{}\"", l.to_uppercase()))
            .collect();
        match quoted.split_last() {
            Some((last, rest)) if rest.len() >= 2 => format!("{}, or {}", rest.join(", "), last),
            Some((last, rest)) if rest.len() == 1 => format!("{} or {}", rest[0], last),
            Some((last, _)) => last.clone(),
            None => String::new(),
        }
    }
}

impl TryFrom<Vec<String>> for LabelSet {
    type Error = ChainError;

    fn try_from(value: Vec<String>) -> ChainResult<Self> {
        Self::new(value)
    }
}

impl From<LabelSet> for Vec<String> {
    fn from(value: LabelSet) -> Self {
        value.labels
    }
}

pub(crate) fn clean_token(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}
