use crate::model::LinkResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Running,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Running,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRow {
    pub id: String,
    pub created_at: String,
    pub finished_at: Option<String>,
    pub status: BatchStatus,
    pub record_count: usize,
    /// SHA-256 over the batch's prompts; equal for reruns of the same input.
    pub input_digest: String,
    pub labels: Vec<String>,
    pub models: Vec<String>,
    pub error: Option<String>,
}

/// One record's entry in a link's persisted output table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkResultRow {
    pub link_index: usize,
    /// Index into the batch's original input.
    pub record_index: usize,
    pub model: String,
    pub predicted_label: String,
    pub raw_label: String,
    pub confidence: f64,
    pub label_logprobs: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LinkResultRow {
    pub fn new(link_index: usize, record_index: usize, model: &str, result: &LinkResult) -> Self {
        Self {
            link_index,
            record_index,
            model: model.to_string(),
            predicted_label: result.predicted_label.clone(),
            raw_label: result.raw_label.clone(),
            confidence: result.confidence,
            label_logprobs: result.label_logprobs.clone(),
            error: result.error.clone(),
        }
    }

    pub fn to_result(&self) -> LinkResult {
        LinkResult {
            predicted_label: self.predicted_label.clone(),
            raw_label: self.raw_label.clone(),
            confidence: self.confidence,
            label_logprobs: self.label_logprobs.clone(),
            error: self.error.clone(),
        }
    }
}
