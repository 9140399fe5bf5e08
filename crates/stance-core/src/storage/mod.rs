pub mod results;
pub mod rows;
pub mod schema;
pub mod store;

pub use results::{input_digest, BatchMeta, BatchResults, LinkTable, ResultStore};
pub use rows::{BatchRow, BatchStatus, LinkResultRow};
pub use store::Store;
