use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::chunker::TextSplitter;
use super::document::{ChunkKind, DocumentChunk, IndexedChunk};
use super::embedder::Embedder;
use super::index::{count_by_kind, VectorIndex};
use crate::error::{AssessError, Result};
use crate::modules::intake::cases::load_cases;

#[derive(Debug, Clone)]
pub struct IngestStats {
    pub policy_chunks: usize,
    pub case_chunks: usize,
    pub total_in_index: u64,
    pub elapsed_secs: f64,
}

/// Reads policies and cases, chunks and embeds them, and upserts into the index.
pub struct DocumentStoreBuilder {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    splitter: TextSplitter,
}

impl DocumentStoreBuilder {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            splitter: TextSplitter::new(chunk_size, chunk_overlap),
        }
    }

    pub fn policy_chunks(&self, source: &str, text: &str) -> Vec<DocumentChunk> {
        self.splitter
            .split(text)
            .into_iter()
            .map(|span| {
                DocumentChunk::new(
                    ChunkKind::Policy,
                    source,
                    span.offset as u64,
                    span.text,
                    self.embedder.model_id(),
                )
            })
            .collect()
    }

    pub fn case_chunks(&self, cases_path: &Path) -> Result<Vec<DocumentChunk>> {
        let source = cases_path.display().to_string();
        let cases = load_cases(cases_path)?;
        Ok(cases
            .iter()
            .enumerate()
            .map(|(row, case)| {
                DocumentChunk::new(
                    ChunkKind::Case,
                    &source,
                    row as u64,
                    case.to_chunk_text(),
                    self.embedder.model_id(),
                )
                .with_case_label(&case.label, case.risk_score)
            })
            .collect())
    }

    /// Idempotent: chunk ids are derived from source and offset, so a second
    /// run over the same files overwrites rather than duplicates.
    pub async fn build_index(&self, policy_paths: &[PathBuf], cases_path: &Path) -> Result<IngestStats> {
        let start = Instant::now();

        let mut chunks = Vec::new();
        for path in policy_paths {
            let text = std::fs::read_to_string(path).map_err(|e| AssessError::io(path, e))?;
            let policy = self.policy_chunks(&path.display().to_string(), &text);
            info!("📄 {} -> {} policy chunks", path.display(), policy.len());
            chunks.extend(policy);
        }
        let cases = self.case_chunks(cases_path)?;
        info!("🗂️ {} -> {} case chunks", cases_path.display(), cases.len());
        chunks.extend(cases);

        self.index.ensure_ready(self.embedder.dimension()).await?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(AssessError::Index(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let indexed: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedChunk { chunk, vector })
            .collect();
        let per_kind = count_by_kind(&indexed);

        self.index.upsert(indexed).await?;
        self.index.flush().await?;

        let stats = IngestStats {
            policy_chunks: per_kind.get(&ChunkKind::Policy).copied().unwrap_or(0),
            case_chunks: per_kind.get(&ChunkKind::Case).copied().unwrap_or(0),
            total_in_index: self.index.count().await?,
            elapsed_secs: start.elapsed().as_secs_f64(),
        };
        info!(
            "✅ Ingested {} policy + {} case chunks ({} in index, {:.2}s)",
            stats.policy_chunks, stats.case_chunks, stats.total_in_index, stats.elapsed_secs
        );
        Ok(stats)
    }

    /// Drops the index and ingests from scratch, for when sources changed or shrank.
    pub async fn rebuild(&self, policy_paths: &[PathBuf], cases_path: &Path) -> Result<IngestStats> {
        info!("♻️ Rebuilding vector index from scratch");
        self.index.clear().await?;
        self.build_index(policy_paths, cases_path).await
    }

    /// Builds only when the index holds no chunks from the active embedding model.
    /// Chunks from other models are invisible to search, so they do not count.
    pub async fn ensure_built(&self, policy_paths: &[PathBuf], cases_path: &Path) -> Result<Option<IngestStats>> {
        let model = self.embedder.model_id();
        let existing = self.index.count_for_model(model).await?;
        if existing > 0 {
            info!("📚 Vector index already holds {} chunks for '{}', skipping ingestion", existing, model);
            return Ok(None);
        }

        let foreign = self.index.count().await?;
        if foreign > 0 {
            warn!(
                "⚠️ Vector index holds {} chunks from other embedding models and none from '{}'; ingesting",
                foreign, model
            );
        }
        self.build_index(policy_paths, cases_path).await.map(Some)
    }
}
