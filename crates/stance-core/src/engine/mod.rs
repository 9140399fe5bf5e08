pub mod cascade;
pub mod chain;
pub mod filters;

pub use cascade::{CascadeState, PendingRecord, ResolvedRecord};
pub use chain::{ChainLink, ChainOrchestrator, ChainOutput};
pub use filters::apply_min_confidence;
