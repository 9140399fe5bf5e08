//! Per-batch, per-link persisted output tables.
//!
//! Each link's table is written once, before post-cascade filtering, and is
//! readable for the lifetime of the store.

use super::rows::{BatchRow, BatchStatus, LinkResultRow};
use super::store::Store;
use crate::errors::{ChainError, ChainResult};
use crate::model::{LinkResult, Prompt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// What a new batch records about itself.
#[derive(Debug, Clone, Default)]
pub struct BatchMeta {
    pub record_count: usize,
    pub input_digest: String,
    pub labels: Vec<String>,
    pub models: Vec<String>,
}

/// Hex SHA-256 over the prompts, length-prefixed so boundaries count.
pub fn input_digest(prompts: &[Prompt]) -> String {
    let mut h = Sha256::new();
    for p in prompts {
        h.update((p.as_str().len() as u64).to_le_bytes());
        h.update(p.as_str().as_bytes());
    }
    hex::encode(h.finalize())
}

/// One link's persisted output table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkTable {
    pub batch_id: String,
    pub link_index: usize,
    pub rows: Vec<LinkResultRow>,
}

impl LinkTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn record_indices(&self) -> Vec<usize> {
        self.rows.iter().map(|r| r.record_index).collect()
    }
}

#[derive(Clone)]
pub struct ResultStore {
    store: Store,
}

impl ResultStore {
    /// Wrap a store whose schema is initialized.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn memory() -> ChainResult<Self> {
        let store = Store::memory().map_err(ChainError::store)?;
        store.init_schema().map_err(ChainError::store)?;
        Ok(Self::new(store))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn begin(&self, meta: BatchMeta) -> ChainResult<BatchResults> {
        let id = uuid::Uuid::new_v4().to_string();
        let row = BatchRow {
            id: id.clone(),
            created_at: now_rfc3339(),
            finished_at: None,
            status: BatchStatus::Running,
            record_count: meta.record_count,
            input_digest: meta.input_digest,
            labels: meta.labels,
            models: meta.models,
            error: None,
        };
        self.store.insert_batch(&row).map_err(ChainError::store)?;
        debug!(batch_id = %id, records = row.record_count, "batch started");
        Ok(BatchResults {
            store: self.store.clone(),
            id,
        })
    }

    /// Handle on an existing batch, for reading its tables back.
    pub fn open_batch(&self, id: &str) -> ChainResult<BatchResults> {
        match self.store.get_batch(id).map_err(ChainError::store)? {
            Some(_) => Ok(BatchResults {
                store: self.store.clone(),
                id: id.to_string(),
            }),
            None => Err(ChainError::Store {
                message: format!("unknown batch {}", id),
            }),
        }
    }

    pub fn batch(&self, id: &str) -> ChainResult<Option<BatchRow>> {
        self.store.get_batch(id).map_err(ChainError::store)
    }

    pub fn batches(&self) -> ChainResult<Vec<BatchRow>> {
        self.store.list_batches().map_err(ChainError::store)
    }
}

/// Write/read handle scoped to one batch.
#[derive(Clone)]
pub struct BatchResults {
    store: Store,
    id: String,
}

impl BatchResults {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Persist link `link_index`'s output. `indices[i]` is the input index of
    /// `results[i]`. A link's table can be written only once.
    pub fn write(
        &self,
        link_index: usize,
        model: &str,
        results: &[LinkResult],
        indices: &[usize],
    ) -> ChainResult<()> {
        if results.len() != indices.len() {
            return Err(ChainError::Store {
                message: format!(
                    "link {} table has {} results for {} records",
                    link_index,
                    results.len(),
                    indices.len()
                ),
            });
        }
        if self.links()?.contains(&link_index) {
            return Err(ChainError::Store {
                message: format!(
                    "link {} table already written for batch {}",
                    link_index, self.id
                ),
            });
        }
        let rows: Vec<LinkResultRow> = results
            .iter()
            .zip(indices)
            .map(|(r, &i)| LinkResultRow::new(link_index, i, model, r))
            .collect();
        self.store
            .insert_link_results(&self.id, &rows)
            .map_err(ChainError::store)?;
        debug!(batch_id = %self.id, link = link_index, rows = rows.len(), "link table written");
        Ok(())
    }

    /// The table written for `link_index`; empty if that link never ran.
    pub fn read(&self, link_index: usize) -> ChainResult<LinkTable> {
        let rows = self
            .store
            .fetch_link_results(&self.id, link_index)
            .map_err(ChainError::store)?;
        Ok(LinkTable {
            batch_id: self.id.clone(),
            link_index,
            rows,
        })
    }

    /// Link positions that have a table.
    pub fn links(&self) -> ChainResult<Vec<usize>> {
        Ok(self
            .store
            .link_counts(&self.id)
            .map_err(ChainError::store)?
            .into_iter()
            .map(|(k, _)| k)
            .collect())
    }

    pub fn finish(&self, status: BatchStatus, error: Option<&str>) -> ChainResult<()> {
        self.store
            .finish_batch(&self.id, status, &now_rfc3339(), error)
            .map_err(ChainError::store)
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
