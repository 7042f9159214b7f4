use std::sync::Arc;

use tracing::{debug, info};

use super::document::{sort_hits, ChunkKind, ContextChunk};
use super::embedder::Embedder;
use super::index::{SearchRequest, VectorIndex};
use crate::config::settings::RetrievalStrategy;
use crate::error::Result;
use crate::modules::intake::Transaction;

/// Embeds a query and returns the closest policy and case chunks.
pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    strategy: RetrievalStrategy,
}

impl ContextRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, strategy: RetrievalStrategy) -> Self {
        Self {
            embedder,
            index,
            strategy,
        }
    }

    /// At most `k` chunks, best first. An empty index yields an empty list.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ContextChunk>> {
        if k == 0 {
            return Ok(vec![]);
        }
        let vector = self.embedder.embed(query).await?;
        let model = self.embedder.model_id();

        let hits = match self.strategy {
            RetrievalStrategy::Global => self.search(&vector, model, k, None).await?,
            RetrievalStrategy::Balanced => {
                let policy_k = k.div_ceil(2);
                let case_k = k - policy_k;
                let mut hits = self.search(&vector, model, policy_k, Some(ChunkKind::Policy)).await?;
                hits.extend(self.search(&vector, model, case_k, Some(ChunkKind::Case)).await?);
                // backfill from the other kind when one side is short
                if hits.len() < k {
                    let missing = k - hits.len();
                    let mut all = self.search(&vector, model, k, None).await?;
                    all.retain(|h| !hits.iter().any(|x| x.chunk.id == h.chunk.id));
                    hits.extend(all.into_iter().take(missing));
                }
                sort_hits(&mut hits);
                hits
            }
        };

        if hits.is_empty() {
            info!("🔍 No context found in the vector index");
        } else {
            debug!(
                "retrieved {} chunks (top score {:.3})",
                hits.len(),
                hits.first().map(|h| h.score).unwrap_or_default()
            );
        }
        Ok(hits)
    }

    /// The query is the canonical JSON serialisation of the transaction.
    pub async fn retrieve_for(&self, tx: &Transaction, k: usize) -> Result<Vec<ContextChunk>> {
        self.retrieve(&tx.canonical_query(), k).await
    }

    async fn search(
        &self,
        vector: &[f32],
        model: &str,
        limit: usize,
        kind: Option<ChunkKind>,
    ) -> Result<Vec<ContextChunk>> {
        if limit == 0 {
            return Ok(vec![]);
        }
        self.index
            .search(SearchRequest {
                vector,
                limit,
                embedding_model: model,
                kind,
            })
            .await
    }
}
