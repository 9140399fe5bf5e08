use super::cascade::{CascadeState, PendingRecord, ResolvedRecord};
use super::filters::apply_min_confidence;
use crate::config::ChainConfig;
use crate::errors::{ChainError, ChainResult};
use crate::labels::LabelSet;
use crate::model::{AnnotatedRow, LinkResult, Prompt, Record};
use crate::prompt::PromptBuilder;
use crate::providers::link::{build_link, LinkOptions, ModelLink};
use crate::providers::ModelCache;
use crate::storage::{input_digest, BatchMeta, BatchResults, BatchStatus, ResultStore};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// One position in the cascade.
#[derive(Clone)]
pub struct ChainLink {
    pub link: Arc<dyn ModelLink>,
    /// Minimum confidence to resolve here. Ignored on the last link; `None`
    /// on an earlier link escalates every record.
    pub threshold: Option<f64>,
    /// Deadline for one `invoke` over the whole pending batch.
    pub deadline: Option<Duration>,
}

impl ChainLink {
    pub fn new(link: Arc<dyn ModelLink>) -> Self {
        Self {
            link,
            threshold: None,
            deadline: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sentinel results never clear a threshold.
    fn clears(&self, result: &LinkResult) -> bool {
        match self.threshold {
            Some(t) => !result.is_unresolved() && result.confidence >= t,
            None => false,
        }
    }
}

/// Result of one batch: the batch id in the result store and one row per
/// input record, in input order.
#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub batch_id: String,
    pub rows: Vec<AnnotatedRow>,
}

impl ChainOutput {
    /// Rows surviving the per-link minimum confidence filters.
    pub fn filtered(&self, filters: &[f64]) -> Vec<AnnotatedRow> {
        apply_min_confidence(self.rows.clone(), filters)
    }

    pub fn into_filtered(self, filters: &[f64]) -> Vec<AnnotatedRow> {
        apply_min_confidence(self.rows, filters)
    }

    /// Number of records resolved at each of `links` positions.
    pub fn resolved_counts(&self, links: usize) -> Vec<usize> {
        let mut counts = vec![0; links];
        for row in &self.rows {
            if let Some(c) = counts.get_mut(row.resolved_at) {
                *c += 1;
            }
        }
        counts
    }
}

pub struct ChainOrchestrator {
    links: Vec<ChainLink>,
    labels: LabelSet,
    prompts: PromptBuilder,
}

impl ChainOrchestrator {
    pub fn new(links: Vec<ChainLink>, labels: LabelSet, prompts: PromptBuilder) -> ChainResult<Self> {
        if links.is_empty() {
            return Err(ChainError::config("chain has no links"));
        }
        for (k, l) in links.iter().enumerate() {
            if let Some(t) = l.threshold {
                if !(0.0..=1.0).contains(&t) {
                    return Err(ChainError::config_at(
                        k,
                        format!("threshold {} outside [0, 1]", t),
                    ));
                }
            }
        }
        if let Some(t) = links.last().and_then(|l| l.threshold) {
            debug!(threshold = t, "last link resolves unconditionally; threshold ignored");
        }
        Ok(Self {
            links,
            labels,
            prompts,
        })
    }

    /// Build every link through `cache`, failing before any record is
    /// processed if a link cannot be constructed.
    pub async fn from_config(cfg: &ChainConfig, cache: &ModelCache) -> ChainResult<Self> {
        Self::from_config_with(cfg, cache, true).await
    }

    /// As [`from_config`](Self::from_config); `probe: false` skips the
    /// endpoint check for links that are never invoked.
    pub async fn from_config_with(
        cfg: &ChainConfig,
        cache: &ModelCache,
        probe: bool,
    ) -> ChainResult<Self> {
        cfg.validate()?;
        let labels = cfg.label_set()?;
        let prompts = cfg.prompt_builder()?;
        let mut opts = LinkOptions::new(labels.clone(), cfg.provider.clone(), cfg.settings.clone());
        opts.probe = probe;

        let mut links = Vec::with_capacity(cfg.links.len());
        for (k, spec) in cfg.links.iter().enumerate() {
            let key = opts.cache_key(spec);
            let link = cache
                .get_or_load(&key, || build_link(k, spec, &opts))
                .await?;
            links.push(ChainLink {
                link,
                threshold: spec.threshold,
                deadline: spec.deadline(&cfg.settings),
            });
        }
        Self::new(links, labels, prompts)
    }

    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Run one batch through the cascade, persisting every link's table in
    /// `store`. On a link failure the batch is marked failed and the error
    /// lists the records that never resolved.
    pub async fn run(&self, records: &[Record], store: &ResultStore) -> ChainResult<ChainOutput> {
        let prompts = self.prompts.build_all(records);
        let batch = store.begin(BatchMeta {
            record_count: records.len(),
            input_digest: input_digest(&prompts),
            labels: self.labels.iter().map(str::to_string).collect(),
            models: self
                .links
                .iter()
                .map(|l| l.link.model_id().to_string())
                .collect(),
        })?;
        info!(
            batch_id = batch.id(),
            records = records.len(),
            links = self.links.len(),
            "batch started"
        );

        let resolved = match self.cascade(&prompts, &batch).await {
            Ok(resolved) => resolved,
            Err(e) => {
                if let Err(fe) = batch.finish(BatchStatus::Failed, Some(&e.to_string())) {
                    warn!(batch_id = batch.id(), error = %fe, "failed to mark batch failed");
                }
                return Err(e);
            }
        };
        batch.finish(BatchStatus::Completed, None)?;

        let rows: Vec<AnnotatedRow> = resolved
            .into_iter()
            .zip(records)
            .map(|(r, record)| r.into_row(record.clone()))
            .collect();
        let output = ChainOutput {
            batch_id: batch.id().to_string(),
            rows,
        };
        info!(
            batch_id = %output.batch_id,
            resolved_per_link = ?output.resolved_counts(self.links.len()),
            "batch completed"
        );
        Ok(output)
    }

    /// The cascade proper. Returns one resolved record per prompt, in input
    /// order.
    pub async fn cascade(
        &self,
        prompts: &[Prompt],
        batch: &BatchResults,
    ) -> ChainResult<Vec<ResolvedRecord>> {
        let last = self.links.len().saturating_sub(1);
        let mut pending: Vec<PendingRecord> = (0..prompts.len()).map(PendingRecord::new).collect();
        let mut resolved: Vec<Option<ResolvedRecord>> = (0..prompts.len()).map(|_| None).collect();

        for (k, stage) in self.links.iter().enumerate() {
            if pending.is_empty() {
                debug!(link = k, "nothing pending; remaining links skipped");
                break;
            }
            let indices: Vec<usize> = pending.iter().map(PendingRecord::index).collect();
            let inputs: Vec<Prompt> = indices.iter().map(|&i| prompts[i].clone()).collect();

            let results = self.invoke(k, stage, &inputs, &indices).await?;
            batch.write(k, stage.link.model_id(), &results, &indices)?;

            let mut still_pending = Vec::new();
            let mut cleared = 0usize;
            for (record, result) in pending.into_iter().zip(results) {
                let clears = k == last || stage.clears(&result);
                match record.observe(k, result, clears) {
                    CascadeState::Resolved(r) => {
                        cleared += 1;
                        debug!(
                            record = r.index(),
                            link = k,
                            label = %r.final_result().predicted_label,
                            confidence = r.final_result().confidence,
                            links_tried = r.history_len(),
                            "resolved"
                        );
                        let i = r.index();
                        resolved[i] = Some(r);
                    }
                    CascadeState::Pending(p) => {
                        debug!(
                            record = p.index(),
                            link = k,
                            links_tried = p.history().len(),
                            "escalating"
                        );
                        still_pending.push(p);
                    }
                }
            }
            info!(
                batch_id = batch.id(),
                link = k,
                model = stage.link.model_id(),
                resolved = cleared,
                escalated = still_pending.len(),
                "link finished"
            );
            pending = still_pending;
        }

        resolved
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ChainError::config("cascade ended with unresolved records"))
    }

    async fn invoke(
        &self,
        k: usize,
        stage: &ChainLink,
        inputs: &[Prompt],
        indices: &[usize],
    ) -> ChainResult<Vec<LinkResult>> {
        let model = stage.link.model_id().to_string();
        let fail = |reason: String| {
            warn!(link = k, model = %model, %reason, pending = indices.len(), "link failed");
            ChainError::LinkInference {
                link: k,
                model: model.clone(),
                reason,
                unresolved: indices.to_vec(),
            }
        };

        let started = Instant::now();
        let fut = stage.link.invoke(inputs);
        let outcome = match stage.deadline {
            Some(d) => timeout(d, fut)
                .await
                .map_err(|_| fail(format!("deadline of {}s exceeded", d.as_secs_f64())))?,
            None => fut.await,
        };
        let results = outcome.map_err(|e| fail(format!("{:#}", e)))?;
        if results.len() != inputs.len() {
            return Err(fail(format!(
                "returned {} results for {} prompts",
                results.len(),
                inputs.len()
            )));
        }
        debug!(
            link = k,
            model = %model,
            prompts = inputs.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "link invoked"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::default_labels;
    use crate::model::LinkStrategy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Link with fixed confidences keyed by prompt text.
    struct Scripted {
        name: String,
        labels: LabelSet,
        conf: Vec<(String, f64)>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &str, conf: &[(&str, f64)]) -> Self {
            Self {
                name: name.into(),
                labels: LabelSet::new(default_labels()).unwrap(),
                conf: conf.iter().map(|(p, c)| (p.to_string(), *c)).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelLink for Scripted {
        async fn invoke(&self, prompts: &[Prompt]) -> anyhow::Result<Vec<LinkResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(prompts
                .iter()
                .map(|p| {
                    let c = self
                        .conf
                        .iter()
                        .find(|(k, _)| p.as_str().starts_with(k.as_str()))
                        .map(|(_, c)| *c)
                        .unwrap_or(0.5);
                    let mut r =
                        LinkResult::from_label_scores(&self.labels, &[Some(0.0), None, None], "FOR");
                    r.confidence = c;
                    r
                })
                .collect())
        }

        fn model_id(&self) -> &str {
            &self.name
        }

        fn strategy(&self) -> LinkStrategy {
            LinkStrategy::Fake
        }
    }

    fn chain(links: Vec<ChainLink>) -> ChainOrchestrator {
        let labels = LabelSet::new(default_labels()).unwrap();
        let prompts = PromptBuilder::new("{text}|{target}", &labels).unwrap();
        ChainOrchestrator::new(links, labels, prompts).unwrap()
    }

    #[tokio::test]
    async fn later_links_see_only_escalated_records() {
        let first = Arc::new(Scripted::new("small", &[("A", 0.9), ("B", 0.3)]));
        let second = Arc::new(Scripted::new("large", &[]));
        let c = chain(vec![
            ChainLink::new(first.clone()).with_threshold(0.6),
            ChainLink::new(second.clone()),
        ]);
        let rs = ResultStore::memory().unwrap();
        let out = c
            .run(&[Record::new("A", "x"), Record::new("B", "x")], &rs)
            .await
            .unwrap();

        assert_eq!(out.rows[0].resolved_at, 0);
        assert_eq!(out.rows[1].resolved_at, 1);
        assert_eq!(out.resolved_counts(2), vec![1, 1]);

        let batch = rs.open_batch(&out.batch_id).unwrap();
        assert_eq!(batch.read(1).unwrap().record_indices(), vec![1]);
    }

    #[tokio::test]
    async fn links_after_full_resolution_are_not_invoked() {
        let first = Arc::new(Scripted::new("small", &[("A", 0.95)]));
        let second = Arc::new(Scripted::new("large", &[]));
        let c = chain(vec![
            ChainLink::new(first.clone()).with_threshold(0.5),
            ChainLink::new(second.clone()),
        ]);
        let rs = ResultStore::memory().unwrap();
        c.run(&[Record::new("A", "x")], &rs).await.unwrap();
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_batch_completes_without_invoking() {
        let only = Arc::new(Scripted::new("m", &[]));
        let c = chain(vec![ChainLink::new(only.clone())]);
        let rs = ResultStore::memory().unwrap();
        let out = c.run(&[], &rs).await.unwrap();
        assert!(out.rows.is_empty());
        assert_eq!(only.calls.load(Ordering::SeqCst), 0);
        let b = rs.batch(&out.batch_id).unwrap().unwrap();
        assert_eq!(b.status, BatchStatus::Completed);
    }

    #[test]
    fn rejects_empty_chain_and_bad_threshold() {
        let labels = LabelSet::new(default_labels()).unwrap();
        let prompts = PromptBuilder::new("{text}|{target}", &labels).unwrap();
        assert!(ChainOrchestrator::new(Vec::new(), labels.clone(), prompts.clone()).is_err());

        let bad = ChainLink::new(Arc::new(Scripted::new("m", &[]))).with_threshold(1.2);
        let err = ChainOrchestrator::new(vec![bad], labels, prompts)
            .err()
            .expect("threshold out of range");
        assert_eq!(err.failed_link(), Some(0));
    }
}
