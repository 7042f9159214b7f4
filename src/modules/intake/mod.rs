pub mod cases;
pub mod dataset;
pub mod transaction;

pub use cases::{load_cases, HistoricalCase};
pub use dataset::{load_labeled, LabeledTransaction};
pub use transaction::Transaction;
