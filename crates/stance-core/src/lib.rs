//! Chain-ensemble stance labeling engine.
//!
//! A batch of records is turned into prompts, then pushed through an ordered
//! cascade of model links. Each link labels the records still pending; a
//! record whose confidence clears that link's threshold is resolved there and
//! never forwarded, the rest escalate. The last link accepts whatever it is
//! given. Every link's full output is persisted per batch so intermediate
//! stages stay auditable after the batch returns.
//!
//! # Quick Start
//!
//! ```no_run
//! use stance_core::config::load_config;
//! use stance_core::engine::ChainOrchestrator;
//! use stance_core::model::Record;
//! use stance_core::providers::ModelCache;
//! use stance_core::storage::{ResultStore, Store};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cfg = load_config(std::path::Path::new("chain.yaml"))?;
//! let chain = ChainOrchestrator::from_config(&cfg, ModelCache::global()).await?;
//!
//! let store = Store::open(std::path::Path::new(".stance/results.db"))?;
//! store.init_schema()?;
//! let results = ResultStore::new(store);
//!
//! let records = vec![Record::new("Wind farms are the future.", "renewable energy")];
//! let output = chain.run(&records, &results).await?;
//! let kept = output.filtered(&cfg.filters);
//! println!("batch {} kept {} rows", output.batch_id, kept.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod errors;
pub mod labels;
pub mod model;
pub mod prompt;
pub mod providers;
pub mod storage;

pub use errors::{ChainError, ChainResult};
