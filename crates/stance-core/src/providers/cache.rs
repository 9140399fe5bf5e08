//! Process-wide model cache with single-flight loading.
//!
//! Entries live until [`ModelCache::evict`], [`ModelCache::clear`] or process
//! exit. Concurrent requests for one key wait on a single load; a failed load
//! leaves the slot empty so the next request retries.

use super::link::ModelLink;
use crate::errors::{ChainError, ChainResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::debug;

type Slot = Arc<OnceCell<Arc<dyn ModelLink>>>;

lazy_static::lazy_static! {
    static ref GLOBAL: ModelCache = ModelCache::new();
}

#[derive(Default)]
pub struct ModelCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache shared by all batches.
    pub fn global() -> &'static ModelCache {
        &GLOBAL
    }

    fn slot(&self, key: &str) -> ChainResult<Slot> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| ChainError::config("model cache lock poisoned"))?;
        Ok(slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone())
    }

    /// Return the cached link for `key`, running `load` at most once across
    /// concurrent callers.
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> ChainResult<Arc<dyn ModelLink>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ChainResult<Arc<dyn ModelLink>>>,
    {
        let slot = self.slot(key)?;
        if let Some(link) = slot.get() {
            debug!(key, "model cache hit");
            return Ok(link.clone());
        }
        let link = slot.get_or_try_init(load).await?;
        Ok(link.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots
            .lock()
            .map(|s| s.get(key).map(|c| c.initialized()).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Drop one entry. Returns whether a loaded link was removed.
    pub fn evict(&self, key: &str) -> bool {
        self.slots
            .lock()
            .ok()
            .and_then(|mut s| s.remove(key))
            .map(|c| c.initialized())
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut s) = self.slots.lock() {
            s.clear();
        }
    }

    /// Number of loaded links.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .map(|s| s.values().filter(|c| c.initialized()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
