pub mod cache;
pub mod link;

pub use cache::ModelCache;
pub use link::{build_link, LinkOptions, ModelLink};
