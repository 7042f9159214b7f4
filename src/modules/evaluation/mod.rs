pub mod metrics;

pub use metrics::{build_report, EvaluationReport, FailedRecord, Outcome};
