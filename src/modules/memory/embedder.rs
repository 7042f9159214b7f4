use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::settings::{EmbeddingConfig, EmbeddingProvider};
use crate::config::Credentials;
use crate::error::{AssessError, Result};
use crate::utils::http_client::post_json;
use crate::utils::RetryPolicy;

/// Turns text into vectors. Ingestion and retrieval must share one instance
/// so both sides live in the same embedding space.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier stored next to every vector; searches filter on it.
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| AssessError::Index("embedder returned no vector".into()))
    }
}

pub fn build_embedder(
    cfg: &EmbeddingConfig,
    creds: &Credentials,
    client: Client,
    retry: RetryPolicy,
) -> Result<Arc<dyn Embedder>> {
    match cfg.provider {
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(cfg.dimension))),
        EmbeddingProvider::Openai => {
            let api_key = creds.embedding_api_key.clone().ok_or_else(|| {
                AssessError::Configuration("missing embedding API key".to_string())
            })?;
            Ok(Arc::new(OpenAiEmbedder::new(cfg, api_key, client, retry)))
        }
    }
}

// ---------------------------------------------------------------------------
// Hosted embeddings (OpenAI-compatible `/embeddings`)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    dimension: usize,
    max_input_chars: usize,
    batch_size: usize,
    retry: RetryPolicy,
}

impl OpenAiEmbedder {
    pub fn new(cfg: &EmbeddingConfig, api_key: String, client: Client, retry: RetryPolicy) -> Self {
        Self {
            client,
            api_key,
            api_base: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            dimension: cfg.dimension,
            max_input_chars: cfg.max_input_chars,
            batch_size: cfg.batch_size.max(1),
            retry,
        }
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.api_base);
        let body = json!({
            "model": self.model,
            "input": inputs,
            "encoding_format": "float"
        });

        let text = self
            .retry
            .run("embedding request", || {
                post_json(&self.client, "embedding provider", &url, &self.api_key, &body)
            })
            .await?;

        let mut resp: EmbeddingResponse = serde_json::from_str(&text)?;
        if resp.data.len() != inputs.len() {
            return Err(AssessError::Provider {
                provider: "embedding provider",
                status: 200,
                body: format!("expected {} vectors, got {}", inputs.len(), resp.data.len()),
            });
        }
        resp.data.sort_by_key(|item| item.index);

        resp.data
            .into_iter()
            .map(|item| {
                if item.embedding.len() != self.dimension {
                    return Err(AssessError::Configuration(format!(
                        "embedding.dimension is {} but model '{}' returned {} values",
                        self.dimension,
                        self.model,
                        item.embedding.len()
                    )));
                }
                Ok(item.embedding)
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            // the provider rejects inputs over its token limit
            let safe: Vec<String> = batch
                .iter()
                .map(|t| t.chars().take(self.max_input_chars).collect())
                .collect();
            debug!("embedding batch of {} inputs with {}", safe.len(), self.model);
            vectors.extend(self.request(&safe).await?);
        }
        Ok(vectors)
    }
}

// ---------------------------------------------------------------------------
// Local feature-hashing embedder
// ---------------------------------------------------------------------------

/// Deterministic bag-of-words embedder: tokens are hashed into buckets with
/// a signed FNV-1a hash and the vector is L2-normalised. Works offline, so it
/// backs the `hashing` provider and the test suite.
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("feature-hashing-{dimension}"),
        }
    }

    fn fnv1a(token: &str) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let hash = Self::fnv1a(token);
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Cosine similarity; zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}
