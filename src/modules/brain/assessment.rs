use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AssessError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedAction {
    Approve,
    Review,
    Block,
    Escalate,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::Approve => "approve",
            RecommendedAction::Review => "review",
            RecommendedAction::Block => "block",
            RecommendedAction::Escalate => "escalate",
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape of the model reply before range checks.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AssessmentPayload {
    risk_level: RiskLevel,
    key_risk_factors: Vec<String>,
    policy_references: Vec<String>,
    recommended_action: RecommendedAction,
    confidence: f64,
}

/// Final structured decision for one transaction.
///
/// Construction goes through [`TryFrom`], so a value of this type always has
/// `confidence` in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AssessmentPayload")]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub key_risk_factors: Vec<String>,
    pub policy_references: Vec<String>,
    pub recommended_action: RecommendedAction,
    confidence: f64,
}

impl TryFrom<AssessmentPayload> for RiskAssessment {
    type Error = String;

    fn try_from(p: AssessmentPayload) -> std::result::Result<Self, Self::Error> {
        RiskAssessment::new(
            p.risk_level,
            p.key_risk_factors,
            p.policy_references,
            p.recommended_action,
            p.confidence,
        )
    }
}

impl RiskAssessment {
    pub fn new(
        risk_level: RiskLevel,
        key_risk_factors: Vec<String>,
        policy_references: Vec<String>,
        recommended_action: RecommendedAction,
        confidence: f64,
    ) -> std::result::Result<Self, String> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(format!("confidence must lie in [0, 1], got {confidence}"));
        }
        Ok(Self {
            risk_level,
            key_risk_factors,
            policy_references,
            recommended_action,
            confidence,
        })
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Parses the model's text reply. The JSON object is located (reasoning
    /// blocks and Markdown fences are skipped) but never repaired.
    pub fn from_model_reply(raw: &str) -> Result<Self> {
        let payload = extract_json(raw)?;
        serde_json::from_value(payload).map_err(|e| AssessError::MalformedResponse(e.to_string()))
    }
}

/// JSON schema sent as the strict `response_format` of the completion request.
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "risk_level": {
                "type": "string",
                "enum": ["low", "medium", "high"],
                "description": "Overall risk classification"
            },
            "key_risk_factors": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Risk factors supported by the context"
            },
            "policy_references": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Policy sections cited from the context only"
            },
            "recommended_action": {
                "type": "string",
                "enum": ["approve", "review", "block", "escalate"]
            },
            "confidence": {
                "type": "number",
                "description": "Confidence between 0.0 and 1.0"
            }
        },
        "required": [
            "risk_level",
            "key_risk_factors",
            "policy_references",
            "recommended_action",
            "confidence"
        ],
        "additionalProperties": false
    })
}

fn strip_reasoning(raw: &str) -> String {
    let mut clean = raw.to_string();
    if let (Some(start), Some(end)) = (clean.find("<think>"), clean.find("</think>")) {
        if end > start {
            clean.replace_range(start..end + "</think>".len(), "");
        }
    }
    clean
}

fn extract_json(raw: &str) -> Result<Value> {
    let cleaned = strip_reasoning(raw);
    let trimmed = cleaned.trim();

    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Ok(v);
    }
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + "```json".len()..];
        if let Some(end) = after.find("```") {
            if let Ok(v) = serde_json::from_str::<Value>(&after[..end]) {
                return Ok(v);
            }
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            if let Ok(v) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Ok(v);
            }
        }
    }

    let preview: String = trimmed.chars().take(120).collect();
    Err(AssessError::MalformedResponse(format!(
        "no JSON object found in reply: {preview:?}"
    )))
}
