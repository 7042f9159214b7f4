use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::assessment::RiskAssessment;
use super::decision::{DecisionReview, DecisionRules};
use super::grounding::groundedness;
use super::llm::ChatModel;
use super::prompt::PromptAssembler;
use crate::error::Result;
use crate::modules::action::report::{AuditLog, AuditRecord};
use crate::modules::intake::Transaction;
use crate::modules::memory::{ContextChunk, ContextRetriever};

/// Everything produced while assessing one transaction.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentRecord {
    pub assessment: RiskAssessment,
    pub context: Vec<ContextChunk>,
    pub raw_response: String,
    pub decision_review: DecisionReview,
    pub groundedness: f64,
}

/// Retrieval, prompt assembly, one completion call and validation.
pub struct AssessmentAgent {
    retriever: ContextRetriever,
    assembler: PromptAssembler,
    chat: Arc<dyn ChatModel>,
    rules: DecisionRules,
    top_k: usize,
    grounding_threshold: f64,
    audit: Option<AuditLog>,
}

impl AssessmentAgent {
    pub fn new(
        retriever: ContextRetriever,
        assembler: PromptAssembler,
        chat: Arc<dyn ChatModel>,
        rules: DecisionRules,
        top_k: usize,
    ) -> Self {
        Self {
            retriever,
            assembler,
            chat,
            rules,
            top_k,
            grounding_threshold: 0.75,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_grounding_threshold(mut self, threshold: f64) -> Self {
        self.grounding_threshold = threshold;
        self
    }

    pub async fn assess(&self, tx: &Transaction) -> Result<RiskAssessment> {
        self.assess_detailed(tx).await.map(|r| r.assessment)
    }

    pub async fn assess_detailed(&self, tx: &Transaction) -> Result<AssessmentRecord> {
        let tx_id = tx.id_or_unknown();
        let context = self.retriever.retrieve_for(tx, self.top_k).await?;
        info!("📚 [{}] {} context chunks retrieved", tx_id, context.len());

        let request = self.assembler.build_prompt(tx, &context);
        let raw = self.chat.complete(&request).await?;

        let mut assessment = match RiskAssessment::from_model_reply(&raw) {
            Ok(a) => a,
            Err(e) => {
                error!("❌ [{}] Model reply failed validation: {}", tx_id, e);
                if let Some(audit) = &self.audit {
                    audit.parse_error(tx_id, &e.to_string(), &raw);
                }
                return Err(e);
            }
        };

        let decision_review = self.rules.review(&mut assessment);
        if !decision_review.agrees {
            warn!(
                "⚠️ [{}] Model action '{}' differs from rule action '{}'{}",
                tx_id,
                decision_review.model_action,
                decision_review.expected_action,
                if decision_review.overridden { " (overridden)" } else { "" }
            );
        }

        let texts: Vec<&str> = context.iter().map(|c| c.chunk.text.as_str()).collect();
        let grounded = groundedness(&assessment.policy_references, &texts, self.grounding_threshold);
        if grounded < 1.0 {
            warn!("⚠️ [{}] Only {:.0}% of policy references found in context", tx_id, grounded * 100.0);
        }

        info!(
            "✅ [{}] {} risk -> {} ({:.0}% confidence)",
            tx_id,
            assessment.risk_level,
            assessment.recommended_action,
            assessment.confidence() * 100.0
        );

        if let Some(audit) = &self.audit {
            audit.record(&AuditRecord {
                record_id: Uuid::new_v4(),
                timestamp: Utc::now(),
                transaction_id: tx_id,
                context_sources: context.iter().map(|c| c.chunk.citation()).collect(),
                raw: &raw,
                final_assessment: &assessment,
                decision_review: &decision_review,
                groundedness: grounded,
            });
        }

        Ok(AssessmentRecord {
            assessment,
            context,
            raw_response: raw,
            decision_review,
            groundedness: grounded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::{DecisionMode, RetrievalStrategy};
    use crate::error::AssessError;
    use crate::modules::brain::assessment::RecommendedAction;
    use crate::modules::brain::prompt::CompletionRequest;
    use crate::modules::memory::document::{ChunkKind, DocumentChunk, IndexedChunk};
    use crate::modules::memory::{Embedder, HashingEmbedder, LocalIndex, VectorIndex};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for Scripted {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request.user_prompt().to_string());
            Ok(self.reply.clone())
        }
    }

    const HIGH_REVIEW: &str = r#"{"risk_level":"high","key_risk_factors":["new device"],"policy_references":["Section 6.1 Tier-1 countries"],"recommended_action":"review","confidence":0.93}"#;

    async fn build_agent(reply: &str, mode: DecisionMode) -> (AssessmentAgent, Arc<Scripted>) {
        let embedder = Arc::new(HashingEmbedder::new(64));
        let index = Arc::new(LocalIndex::in_memory());
        let text = "Section 6.1 Tier-1 countries: NG transactions on a new device are blocked";
        index.ensure_ready(64).await.unwrap();
        index
            .upsert(vec![IndexedChunk {
                vector: embedder.embed_text(text),
                chunk: DocumentChunk::new(ChunkKind::Policy, "policy.md", 0, text.into(), embedder.model_id()),
            }])
            .await
            .unwrap();

        let chat = Arc::new(Scripted {
            reply: reply.to_string(),
            prompts: Mutex::new(vec![]),
        });
        let rules = DecisionRules {
            mode,
            block_confidence: 0.85,
        };
        let agent = AssessmentAgent::new(
            ContextRetriever::new(embedder, index, RetrievalStrategy::Global),
            PromptAssembler::new("m"),
            chat.clone(),
            rules,
            4,
        );
        (agent, chat)
    }

    fn tx() -> Transaction {
        Transaction::from_json(r#"{"amount":50000,"country":"NG","device_new":true,"velocity":9}"#).unwrap()
    }

    #[tokio::test]
    async fn advisory_mode_keeps_model_action() {
        let (agent, chat) = build_agent(HIGH_REVIEW, DecisionMode::Advisory).await;
        let record = agent.assess_detailed(&tx()).await.unwrap();

        assert_eq!(record.assessment.recommended_action, RecommendedAction::Review);
        assert!(!record.decision_review.agrees);
        assert_eq!(record.decision_review.expected_action, RecommendedAction::Block);
        assert_eq!(record.groundedness, 1.0);
        assert!(chat.prompts.lock().unwrap()[0].contains("Tier-1"));
    }

    #[tokio::test]
    async fn enforce_mode_overrides_action_only() {
        let (agent, _) = build_agent(HIGH_REVIEW, DecisionMode::Enforce).await;
        let a = agent.assess(&tx()).await.unwrap();
        assert_eq!(a.recommended_action, RecommendedAction::Block);
        assert_eq!(a.confidence(), 0.93);
    }

    #[tokio::test]
    async fn malformed_reply_is_logged_and_returned() {
        let dir = tempfile::TempDir::new().unwrap();
        let (agent, _) = build_agent("I think it is risky", DecisionMode::Advisory).await;
        let agent = agent.with_audit(AuditLog::new(dir.path()));

        let err = agent.assess(&tx()).await.unwrap_err();
        assert!(matches!(err, AssessError::MalformedResponse(_)));
        let log = std::fs::read_to_string(dir.path().join("parse_errors.log")).unwrap();
        assert!(log.contains("I think it is risky"));
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_rejected_not_clamped() {
        let reply = HIGH_REVIEW.replace("0.93", "1.4");
        let (agent, _) = build_agent(&reply, DecisionMode::Advisory).await;
        assert!(matches!(
            agent.assess(&tx()).await,
            Err(AssessError::MalformedResponse(_))
        ));
    }
}
