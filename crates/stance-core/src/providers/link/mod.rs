//! Model links: one inference-capable model behind a single `invoke` contract.
//!
//! - `causal.rs`: decoder-only scoring of first distinguishing label tokens
//! - `seq2seq.rs`: encoder-decoder scoring conditioned on each candidate label
//! - `fake.rs`: deterministic offline link
//! - `http.rs`: OpenAI-compatible completions backend shared by the HTTP links
//! - `factory.rs`: fail-fast construction from a [`LinkSpec`](crate::config::LinkSpec)

pub mod causal;
pub mod factory;
pub mod fake;
pub mod http;
pub mod seq2seq;

pub use factory::{build_link, LinkOptions};

use crate::model::{LinkResult, LinkStrategy, Prompt};
use async_trait::async_trait;

#[async_trait]
pub trait ModelLink: Send + Sync {
    /// Label every prompt. The returned vector has the same length and order
    /// as `prompts`; records that cannot be decoded carry the unresolved
    /// sentinel. An `Err` fails the whole call.
    async fn invoke(&self, prompts: &[Prompt]) -> anyhow::Result<Vec<LinkResult>>;

    fn model_id(&self) -> &str;

    fn strategy(&self) -> LinkStrategy;
}

/// Suffix appended to a prompt to elicit a rationale in reasoning mode.
pub(crate) const REASONING_CUE: &str = "\nLet's think step by step.";
/// Cue appended after a rationale, before the label is scored.
pub(crate) const ANSWER_CUE: &str = "\nAnswer:";
