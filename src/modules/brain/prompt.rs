use serde::Serialize;
use serde_json::Value;

use super::assessment::response_schema;
use crate::modules::intake::Transaction;
use crate::modules::memory::ContextChunk;

pub const SYSTEM_PROMPT: &str = r#"You are a card-fraud risk analyst. Every statement you make must be grounded in the context documents supplied with the transaction.

### GROUNDING RULES (STRICT):
1. **Policies**: cite ONLY policy sections that appear in the Context. Quote their wording; never invent section numbers or policy names.
2. **Risk factors**: list ONLY factors supported by the transaction fields or the Context (policy text or historical cases).
3. **Missing evidence**: if the Context does not cover the situation, say so in key_risk_factors and lower your confidence.

### DECISION POLICY:
- high risk and confidence >= 0.85 -> "block"
- high risk with lower confidence -> "review"
- medium risk -> "review"
- low risk -> "approve"
- if the Context contradicts itself or the case is outside every policy -> "escalate"

### OUTPUT FORMAT (JSON ONLY - NO COMMENTARY OUTSIDE JSON):
{
  "risk_level": "low" | "medium" | "high",
  "key_risk_factors": ["factor supported by context", ...],
  "policy_references": ["policy section cited from context", ...],
  "recommended_action": "approve" | "review" | "block" | "escalate",
  "confidence": 0.0
}
confidence is a number between 0.0 and 1.0. No other keys are allowed."#;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// Everything needed for one chat completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub response_schema: Value,
}

impl CompletionRequest {
    pub fn user_prompt(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

pub struct PromptAssembler {
    model: String,
}

impl PromptAssembler {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into() }
    }

    /// Pure: identical inputs give an identical request.
    pub fn build_prompt(&self, tx: &Transaction, context: &[ContextChunk]) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt(tx, context),
                },
            ],
            temperature: 0.0,
            response_schema: response_schema(),
        }
    }
}

fn user_prompt(tx: &Transaction, context: &[ContextChunk]) -> String {
    let context_text = if context.is_empty() {
        "No context documents were retrieved.".to_string()
    } else {
        context
            .iter()
            .enumerate()
            .map(|(i, hit)| {
                format!(
                    "[{}] ({}) {}\n{}",
                    i + 1,
                    hit.chunk.metadata.kind,
                    hit.chunk.citation(),
                    hit.chunk.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        r#"
=== 1. TRANSACTION ===
{}

=== 2. CONTEXT DOCUMENTS (policies and historical cases) ===
{}

=== 3. TASK ===
Assess the fraud risk of this transaction using ONLY the context above.
Respond with the JSON object described in the instructions.
"#,
        tx, context_text
    )
}
