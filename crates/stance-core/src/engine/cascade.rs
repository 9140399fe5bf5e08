//! Per-record cascade state.
//!
//! A record is either pending or resolved. Only a pending record can observe
//! a link's result, and observing consumes it, so a record can be resolved
//! at most once.

use crate::model::{AnnotatedRow, LinkResult, Record};

#[derive(Debug, Clone, PartialEq)]
pub enum CascadeState {
    Pending(PendingRecord),
    Resolved(ResolvedRecord),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    index: usize,
    history: Vec<LinkResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRecord {
    index: usize,
    link: usize,
    earlier: Vec<LinkResult>,
    last: LinkResult,
}

impl PendingRecord {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            history: Vec::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn history(&self) -> &[LinkResult] {
        &self.history
    }

    /// Record link `link`'s result; the record resolves there when `clears`.
    pub fn observe(mut self, link: usize, result: LinkResult, clears: bool) -> CascadeState {
        if clears {
            CascadeState::Resolved(ResolvedRecord {
                index: self.index,
                link,
                earlier: self.history,
                last: result,
            })
        } else {
            self.history.push(result);
            CascadeState::Pending(self)
        }
    }
}

impl ResolvedRecord {
    pub fn index(&self) -> usize {
        self.index
    }

    /// 0-based position of the resolving link.
    pub fn resolved_at(&self) -> usize {
        self.link
    }

    pub fn final_result(&self) -> &LinkResult {
        &self.last
    }

    /// Results of every link that ran for this record, in link order.
    pub fn history(&self) -> impl Iterator<Item = &LinkResult> {
        self.earlier.iter().chain(std::iter::once(&self.last))
    }

    pub fn history_len(&self) -> usize {
        self.earlier.len() + 1
    }

    pub fn into_row(self, record: Record) -> AnnotatedRow {
        let history = self.history().cloned().collect();
        AnnotatedRow {
            index: self.index,
            record,
            pred_label: self.last.predicted_label,
            conf_score: self.last.confidence,
            label_logprobs: self.last.label_logprobs,
            raw_pred_label: self.last.raw_label,
            resolved_at: self.link,
            history,
        }
    }
}

impl CascadeState {
    pub fn index(&self) -> usize {
        match self {
            Self::Pending(p) => p.index(),
            Self::Resolved(r) => r.index(),
        }
    }
}
