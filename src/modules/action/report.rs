use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AssessError, Result};
use crate::modules::brain::assessment::RiskAssessment;
use crate::modules::brain::decision::DecisionReview;

/// Serialises `value` as pretty JSON and moves it into place with a rename,
/// so readers never observe a half-written file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| AssessError::io(parent, e))?;
    }
    let body = serde_json::to_string_pretty(value)?;
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    std::fs::write(&tmp, body).map_err(|e| AssessError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| AssessError::io(path, e))?;
    info!("💾 Wrote {}", path.display());
    Ok(())
}

/// One line of the raw-output audit trail.
#[derive(Debug, Serialize)]
pub struct AuditRecord<'a> {
    pub record_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub transaction_id: &'a str,
    pub context_sources: Vec<String>,
    pub raw: &'a str,
    pub final_assessment: &'a RiskAssessment,
    pub decision_review: &'a DecisionReview,
    pub groundedness: f64,
}

/// Append-only audit files under `{reports_dir}`. Write failures are logged,
/// never returned, so auditing cannot fail an assessment.
#[derive(Debug, Clone)]
pub struct AuditLog {
    reports_dir: PathBuf,
}

impl AuditLog {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    pub fn raw_outputs_path(&self, now: DateTime<Utc>) -> PathBuf {
        self.reports_dir
            .join("raw_responses")
            .join(format!("llm_outputs_{}.jsonl", now.format("%Y%m%d")))
    }

    pub fn parse_errors_path(&self) -> PathBuf {
        self.reports_dir.join("parse_errors.log")
    }

    pub fn record(&self, record: &AuditRecord<'_>) {
        let path = self.raw_outputs_path(record.timestamp);
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!("⚠️ Failed to serialise audit record: {}", e);
                return;
            }
        };
        if let Err(e) = append_line(&path, &line) {
            warn!("⚠️ Failed to persist raw LLM output to {}: {}", path.display(), e);
        }
    }

    pub fn parse_error(&self, transaction_id: &str, error: &str, raw: &str) {
        let path = self.parse_errors_path();
        let entry = format!(
            "[{}] transaction={} error={}\n{}\n---",
            Utc::now().to_rfc3339(),
            transaction_id,
            error,
            raw
        );
        if let Err(e) = append_line(&path, &entry) {
            warn!("⚠️ Failed to write parse error log {}: {}", path.display(), e);
        }
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}
