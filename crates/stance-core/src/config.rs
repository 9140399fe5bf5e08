use crate::errors::{ChainError, ChainResult};
use crate::labels::{default_labels, LabelSet};
use crate::model::{LinkMode, LinkStrategy};
use crate::prompt::{PromptBuilder, DEFAULT_TEMPLATE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

/// A chain definition: label vocabulary, prompt template, ordered links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub version: u32,
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub settings: Settings,
    pub links: Vec<LinkSpec>,
    /// Post-cascade minimum confidence per link position.
    #[serde(default)]
    pub filters: Vec<f64>,
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// OpenAI-compatible API root, e.g. `http://localhost:8000/v1`.
    pub base_url: String,
    /// Environment variable holding the bearer token. Unset means no auth.
    pub api_key_env: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key_env: None,
            request_timeout_secs: 120,
        }
    }
}

impl ProviderConfig {
    /// Resolve the credential; a named but unset variable is a configuration error.
    pub fn api_key(&self) -> ChainResult<Option<String>> {
        match &self.api_key_env {
            None => Ok(None),
            Some(var) => match std::env::var(var) {
                Ok(v) if !v.trim().is_empty() => Ok(Some(v)),
                _ => Err(ChainError::config(format!(
                    "missing credential: environment variable {} is not set",
                    var
                ))),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Default deadline for one link's `invoke`.
    pub link_timeout_secs: Option<u64>,
    /// Tokens generated for the raw label.
    pub max_label_tokens: u32,
    /// Tokens generated for the rationale in reasoning mode.
    pub reasoning_tokens: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            link_timeout_secs: Some(600),
            max_label_tokens: 4,
            reasoning_tokens: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkSpec {
    pub model: String,
    #[serde(default)]
    pub strategy: LinkStrategy,
    /// Escalation threshold; ignored on the last link.
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub mode: LinkMode,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl LinkSpec {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            strategy: LinkStrategy::Auto,
            threshold: None,
            mode: LinkMode::Direct,
            timeout_secs: None,
        }
    }

    pub fn with_strategy(mut self, strategy: LinkStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_mode(mut self, mode: LinkMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn deadline(&self, settings: &Settings) -> Option<Duration> {
        self.timeout_secs
            .or(settings.link_timeout_secs)
            .map(Duration::from_secs)
    }
}

impl ChainConfig {
    pub fn new(links: Vec<LinkSpec>) -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            labels: default_labels(),
            template: default_template(),
            provider: ProviderConfig::default(),
            settings: Settings::default(),
            links,
            filters: Vec::new(),
        }
    }

    pub fn label_set(&self) -> ChainResult<LabelSet> {
        LabelSet::new(&self.labels)
    }

    pub fn prompt_builder(&self) -> ChainResult<PromptBuilder> {
        PromptBuilder::new(self.template.clone(), &self.label_set()?)
    }

    /// Everything that can be checked without touching a model.
    pub fn validate(&self) -> ChainResult<()> {
        if self.version != SUPPORTED_CONFIG_VERSION {
            return Err(ChainError::config(format!(
                "unsupported config version {} (supported: {})",
                self.version, SUPPORTED_CONFIG_VERSION
            )));
        }
        self.prompt_builder()?;
        if self.links.is_empty() {
            return Err(ChainError::config("chain has no links"));
        }
        let last = self.links.len() - 1;
        for (k, link) in self.links.iter().enumerate() {
            if link.model.trim().is_empty() {
                return Err(ChainError::config_at(k, "empty model identifier"));
            }
            if let Some(t) = link.threshold {
                if !(0.0..=1.0).contains(&t) {
                    return Err(ChainError::config_at(
                        k,
                        format!("threshold {} outside [0, 1]", t),
                    ));
                }
            } else if k < last {
                return Err(ChainError::config_at(
                    k,
                    "only the last link may omit its threshold",
                ));
            }
            if link.timeout_secs == Some(0) {
                return Err(ChainError::config_at(k, "timeout_secs must be positive"));
            }
        }
        validate_filters(&self.filters, self.links.len())
    }
}

/// Filters are index-aligned with links; at most one per link.
pub fn validate_filters(filters: &[f64], links: usize) -> ChainResult<()> {
    if filters.len() > links {
        return Err(ChainError::config(format!(
            "{} filters given for {} links",
            filters.len(),
            links
        )));
    }
    for (k, f) in filters.iter().enumerate() {
        if !(0.0..=1.0).contains(f) {
            return Err(ChainError::config_at(
                k,
                format!("filter {} outside [0, 1]", f),
            ));
        }
    }
    Ok(())
}

pub fn load_config(path: &Path) -> ChainResult<ChainConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ChainError::config(format!("failed to read config {}: {}", path.display(), e))
    })?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> ChainResult<ChainConfig> {
    let cfg: ChainConfig = serde_yaml::from_str(raw)
        .map_err(|e| ChainError::config(format!("failed to parse YAML: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}
