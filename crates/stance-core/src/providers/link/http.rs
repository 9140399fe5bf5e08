//! HTTP layer for OpenAI-compatible `/completions` servers.
//!
//! This is the only place that talks to the network; the strategy modules
//! only see decoded [`Choice`]s.

use super::{ANSWER_CUE, REASONING_CUE};
use crate::errors::{ChainError, ChainResult};
use crate::model::Prompt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const USER_AGENT_VALUE: &str = concat!("stance/", env!("CARGO_PKG_VERSION"));

/// Sampling parameters for one batched completions call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    pub max_tokens: u32,
    pub logprobs: Option<u32>,
    pub echo: bool,
}

impl CompletionParams {
    pub fn greedy(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            logprobs: None,
            echo: false,
        }
    }

    pub fn with_logprobs(mut self, top: u32) -> Self {
        self.logprobs = Some(top);
        self
    }

    /// Score the prompt itself without generating.
    pub fn echo_only() -> Self {
        Self {
            max_tokens: 0,
            logprobs: Some(1),
            echo: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a [String],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    logprobs: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    echo: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub logprobs: Option<ChoiceLogprobs>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChoiceLogprobs {
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub token_logprobs: Vec<Option<f64>>,
    #[serde(default)]
    pub top_logprobs: Vec<Option<HashMap<String, f64>>>,
    #[serde(default)]
    pub text_offset: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Clone)]
pub struct CompletionsBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl CompletionsBackend {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT_VALUE)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to create HTTP client: {}", e))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    /// Check reachability, credentials and the model identifier before any
    /// batch is processed.
    pub async fn probe(&self, link: usize) -> ChainResult<()> {
        let url = format!("{}/models", self.base_url);
        let resp = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ChainError::config_at(link, format!("cannot reach {}: {}", url, e)))?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ChainError::config_at(
                    link,
                    format!(
                        "authentication failed for model '{}' (status {})",
                        self.model,
                        resp.status().as_u16()
                    ),
                ));
            }
            s if !s.is_success() => {
                return Err(ChainError::config_at(
                    link,
                    format!("model listing failed with status {}", s.as_u16()),
                ));
            }
            _ => {}
        }

        let list: ModelList = resp.json().await.map_err(|e| {
            ChainError::config_at(link, format!("invalid model listing: {}", e))
        })?;
        if !list.data.iter().any(|m| m.id == self.model) {
            return Err(ChainError::config_at(
                link,
                format!("unknown model identifier '{}'", self.model),
            ));
        }
        debug!(model = %self.model, "model probe ok");
        Ok(())
    }

    /// One batched, greedy completions call. Choices come back in prompt order.
    pub async fn complete(
        &self,
        prompts: &[String],
        params: CompletionParams,
    ) -> anyhow::Result<Vec<Choice>> {
        if prompts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/completions", self.base_url);
        let body = CompletionRequest {
            model: &self.model,
            prompt: prompts,
            max_tokens: params.max_tokens,
            temperature: 0.0,
            logprobs: params.logprobs,
            echo: params.echo,
        };

        let resp = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_else(|_| String::new());
            anyhow::bail!(
                "completions API error (status {}): {}",
                status.as_u16(),
                error_text
            );
        }

        let parsed: CompletionResponse = resp.json().await?;
        let mut choices = parsed.choices;
        if choices.len() != prompts.len() {
            anyhow::bail!(
                "completions API returned {} choices for {} prompts",
                choices.len(),
                prompts.len()
            );
        }
        choices.sort_by_key(|c| c.index);
        if choices.iter().enumerate().any(|(i, c)| c.index != i) {
            anyhow::bail!("completions API returned non-contiguous choice indices");
        }
        Ok(choices)
    }

    /// Reasoning mode: elicit a rationale, then return the prompts to score.
    pub async fn with_rationale(
        &self,
        prompts: &[Prompt],
        reasoning_tokens: u32,
    ) -> anyhow::Result<Vec<String>> {
        let cued: Vec<String> = prompts
            .iter()
            .map(|p| format!("{}{}", p.as_str(), REASONING_CUE))
            .collect();
        let rationales = self
            .complete(&cued, CompletionParams::greedy(reasoning_tokens))
            .await?;
        Ok(cued
            .into_iter()
            .zip(rationales)
            .map(|(prompt, choice)| format!("{} {}{}", prompt, choice.text.trim(), ANSWER_CUE))
            .collect())
    }
}

pub(crate) fn plain_prompts(prompts: &[Prompt]) -> Vec<String> {
    prompts.iter().map(|p| p.as_str().to_string()).collect()
}
