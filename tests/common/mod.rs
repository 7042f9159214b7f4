#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use risk_assessor::config::settings::{EmbeddingProvider, RetrievalStrategy, StoreBackend};
use risk_assessor::modules::brain::{ChatModel, CompletionRequest};
use risk_assessor::modules::memory::{HashingEmbedder, LocalIndex};
use risk_assessor::{Pipeline, Result, Settings};

pub const BLOCK_REPLY: &str = r#"{
  "risk_level": "high",
  "key_risk_factors": ["Tier-1 country NG", "amount above EUR 10,000", "new device", "velocity 9"],
  "policy_references": ["Tier-1 countries: NG, GH, KP"],
  "recommended_action": "block",
  "confidence": 0.95
}"#;

pub const EMBEDDING_DIM: usize = 512;

/// Chat model that replays canned replies and records every prompt it was sent.
pub struct ScriptedChat {
    replies: Mutex<Vec<String>>,
    fallback: String,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedChat {
    pub fn always(reply: &str) -> Arc<Self> {
        Self::sequence(&[], reply)
    }

    /// Replies in order, then `fallback` forever.
    pub fn sequence(replies: &[&str], fallback: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
            fallback: fallback.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.prompts.lock().unwrap().push(request.user_prompt().to_string());
        let next = self.replies.lock().unwrap().pop();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

pub fn data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("data")
}

/// Offline settings over the bundled corpus, writing reports into `work`.
pub fn offline_settings(work: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.embedding.provider = EmbeddingProvider::Hashing;
    settings.embedding.dimension = EMBEDDING_DIM;
    settings.store.backend = StoreBackend::Local;
    settings.store.local_path = work.join("index.json");
    settings.ingest.policy_paths = vec![data_dir().join("policies").join("card_fraud_policy.md")];
    settings.ingest.cases_path = data_dir().join("cases").join("historical_cases.csv");
    // The hashing embedder scores case rows, which share the transaction's
    // field names, far above policy prose; balanced retrieval keeps policy in view.
    settings.retrieval.strategy = RetrievalStrategy::Balanced;
    settings.paths.reports_dir = work.join("reports");
    settings
}

pub fn offline_pipeline(settings: Settings, chat: Arc<ScriptedChat>) -> (Pipeline, Arc<LocalIndex>) {
    let index = Arc::new(LocalIndex::in_memory());
    let pipeline = Pipeline::with_components(
        settings,
        Arc::new(HashingEmbedder::new(EMBEDDING_DIM)),
        index.clone(),
        chat,
    );
    (pipeline, index)
}
