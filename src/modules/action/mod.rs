pub mod report;

pub use report::{write_json_atomic, AuditLog};
