use super::causal::CausalLink;
use super::fake::FakeLink;
use super::http::CompletionsBackend;
use super::seq2seq::Seq2SeqLink;
use super::ModelLink;
use crate::config::{LinkSpec, ProviderConfig, Settings};
use crate::errors::{ChainError, ChainResult};
use crate::labels::LabelSet;
use crate::model::LinkStrategy;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Everything a link needs besides its own spec.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub labels: LabelSet,
    pub provider: ProviderConfig,
    pub settings: Settings,
    /// Probe the serving endpoint at construction. Disable only for offline
    /// tooling that never invokes the link.
    pub probe: bool,
}

impl LinkOptions {
    pub fn new(labels: LabelSet, provider: ProviderConfig, settings: Settings) -> Self {
        Self {
            labels,
            provider,
            settings,
            probe: true,
        }
    }

    /// Model-cache key: one loaded link per strategy, model, mode, label set
    /// and endpoint.
    pub fn cache_key(&self, spec: &LinkSpec) -> String {
        let strategy = spec.strategy.resolve(&spec.model);
        let labels: Vec<&str> = self.labels.iter().collect();
        format!(
            "{}:{}:{}:{}@{}",
            strategy.as_str(),
            spec.model,
            spec.mode.as_str(),
            labels.join(","),
            self.provider.base_url
        )
    }
}

/// Construct link `position` of a chain. Fails fast on anything that would
/// otherwise fail mid-cascade: bad credentials, unknown model, unreachable
/// endpoint.
pub async fn build_link(
    position: usize,
    spec: &LinkSpec,
    opts: &LinkOptions,
) -> ChainResult<Arc<dyn ModelLink>> {
    let strategy = spec.strategy.resolve(&spec.model);
    info!(
        link = position,
        model = %spec.model,
        strategy = strategy.as_str(),
        mode = spec.mode.as_str(),
        "loading model link"
    );

    if strategy == LinkStrategy::Fake {
        return Ok(Arc::new(FakeLink::new(spec.model.clone(), opts.labels.clone())));
    }

    let api_key = opts
        .provider
        .api_key()
        .map_err(|e| match e {
            ChainError::Configuration { message, .. } => ChainError::config_at(position, message),
            other => other,
        })?;
    let backend = CompletionsBackend::new(
        &opts.provider.base_url,
        spec.model.clone(),
        api_key,
        Duration::from_secs(opts.provider.request_timeout_secs.max(1)),
    )
    .map_err(|e| ChainError::config_at(position, e.to_string()))?;

    if opts.probe {
        backend.probe(position).await?;
    }

    let labels = opts.labels.clone();
    let max_label_tokens = opts.settings.max_label_tokens;
    let reasoning_tokens = opts.settings.reasoning_tokens;
    let link: Arc<dyn ModelLink> = match strategy {
        LinkStrategy::Seq2seq => Arc::new(Seq2SeqLink::new(
            backend,
            labels,
            spec.mode,
            max_label_tokens,
            reasoning_tokens,
        )),
        _ => Arc::new(CausalLink::new(
            backend,
            labels,
            spec.mode,
            max_label_tokens,
            reasoning_tokens,
        )),
    };
    Ok(link)
}
