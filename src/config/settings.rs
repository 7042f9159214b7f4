use std::env;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{AssessError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "assessor_config";
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const EMBEDDING_KEY_VAR: &str = "EMBEDDING_API_KEY";
pub const QDRANT_KEY_VAR: &str = "QDRANT_API_KEY";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
    /// Local feature-hashing embedder, no network.
    Hashing,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub base_url: String,
    pub dimension: usize,
    pub max_input_chars: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Openai,
            model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            dimension: 1536,
            max_input_chars: 8000,
            batch_size: 64,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub model: String,
    pub base_url: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Qdrant,
    /// JSON file on disk, brute-force cosine search.
    Local,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub qdrant_url: String,
    pub collection: String,
    pub local_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Qdrant,
            qdrant_url: "http://localhost:6334".to_string(),
            collection: "fraud_context".to_string(),
            local_path: PathBuf::from("vectorstore/index.json"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub policy_paths: Vec<PathBuf>,
    pub cases_path: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            policy_paths: vec![PathBuf::from("data/policies/card_fraud_policy.md")],
            cases_path: PathBuf::from("data/cases/historical_cases.csv"),
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Plain top-k over every chunk.
    Global,
    /// Split k between policy chunks and case chunks.
    Balanced,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub strategy: RetrievalStrategy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            strategy: RetrievalStrategy::Global,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMode {
    /// Record disagreement between model and rules, keep the model's action.
    /// This is the default, so the model's own recommendation reaches the
    /// output unchanged; pick `enforce` to always apply the rule action.
    Advisory,
    /// Replace the model's action with the rule action.
    Enforce,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DecisionConfig {
    pub mode: DecisionMode,
    pub block_confidence: f64,
    pub grounding_threshold: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            mode: DecisionMode::Advisory,
            block_confidence: 0.85,
            grounding_threshold: 0.75,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub transaction: PathBuf,
    pub output: PathBuf,
    pub reports_dir: PathBuf,
    pub evaluation_dataset: PathBuf,
    pub evaluation_report: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            transaction: PathBuf::from("data/transactions/sample_transaction.json"),
            output: PathBuf::from("evaluations_output.json"),
            reports_dir: PathBuf::from("reports"),
            evaluation_dataset: PathBuf::from("data/transactions/test_transactions.json"),
            evaluation_report: PathBuf::from("reports/evaluation_report.json"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub embedding: EmbeddingConfig,
    pub chat: ChatConfig,
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub retrieval: RetrievalConfig,
    pub decision: DecisionConfig,
    pub retry: RetryConfig,
    pub paths: PathsConfig,
}

impl Settings {
    /// Defaults, then the optional config file, then `ASSESSOR_*` overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("ASSESSOR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AssessError::Configuration(e.to_string()))?;

        let settings: Settings = settings
            .try_deserialize()
            .map_err(|e| AssessError::Configuration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.chunk_size == 0 {
            return Err(AssessError::Configuration("ingest.chunk_size must be > 0".into()));
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(AssessError::Configuration(format!(
                "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
                self.ingest.chunk_overlap, self.ingest.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(AssessError::Configuration("retrieval.top_k must be > 0".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(AssessError::Configuration("embedding.dimension must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.decision.block_confidence) {
            return Err(AssessError::Configuration(
                "decision.block_confidence must lie in [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.decision.grounding_threshold) {
            return Err(AssessError::Configuration(
                "decision.grounding_threshold must lie in [0, 1]".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AssessError::Configuration("retry.max_attempts must be >= 1".into()));
        }
        Ok(())
    }
}

/// Secrets are read from the environment only, never from the config file.
#[derive(Clone, Default)]
pub struct Credentials {
    pub chat_api_key: Option<String>,
    pub embedding_api_key: Option<String>,
    pub qdrant_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("chat_api_key", &self.chat_api_key.as_ref().map(|_| "***"))
            .field("embedding_api_key", &self.embedding_api_key.as_ref().map(|_| "***"))
            .field("qdrant_api_key", &self.qdrant_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Self {
        let read = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        let chat_api_key = read(API_KEY_VAR);
        Self {
            embedding_api_key: read(EMBEDDING_KEY_VAR).or_else(|| chat_api_key.clone()),
            chat_api_key,
            qdrant_api_key: read(QDRANT_KEY_VAR),
        }
    }

    pub fn require_chat_key(&self) -> Result<&str> {
        self.chat_api_key.as_deref().ok_or_else(|| {
            AssessError::Configuration(format!(
                "Set {API_KEY_VAR} in your environment (e.g. export {API_KEY_VAR}=...)"
            ))
        })
    }

    pub fn require_embedding_key(&self, settings: &Settings) -> Result<Option<&str>> {
        match settings.embedding.provider {
            EmbeddingProvider::Hashing => Ok(None),
            EmbeddingProvider::Openai => self.embedding_api_key.as_deref().map(Some).ok_or_else(|| {
                AssessError::Configuration(format!(
                    "embedding provider 'openai' needs {EMBEDDING_KEY_VAR} or {API_KEY_VAR}"
                ))
            }),
        }
    }
}
