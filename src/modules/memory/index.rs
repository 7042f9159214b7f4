use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use qdrant_client::{
    qdrant::{
        vectors_config::Config, CollectionInfo, Condition, CountPoints, CreateCollection,
        DeleteCollection, Distance, Filter, GetCollectionInfoRequest, PointStruct, ScoredPoint,
        SearchPoints, UpsertPoints, Value as QdrantValue, VectorParams, VectorsConfig,
    },
    Payload, Qdrant,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::document::{sort_hits, ChunkKind, ChunkMetadata, ContextChunk, DocumentChunk, IndexedChunk};
use super::embedder::cosine_similarity;
use crate::config::settings::{StoreBackend, StoreConfig};
use crate::error::{AssessError, Result};

const UPSERT_BATCH: usize = 64;

/// What to look for in a nearest-neighbour search.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub vector: &'a [f32],
    pub limit: usize,
    /// Only chunks embedded by this model are compared.
    pub embedding_model: &'a str,
    pub kind: Option<ChunkKind>,
}

/// Persistent store of chunk embeddings with similarity search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Creates the collection if needed; fails if it already holds vectors of another size.
    async fn ensure_ready(&self, dimension: usize) -> Result<()>;

    /// Insert-or-replace by chunk id.
    async fn upsert(&self, chunks: Vec<IndexedChunk>) -> Result<()>;

    /// Hits in descending score order. An empty index returns no hits.
    async fn search(&self, request: SearchRequest<'_>) -> Result<Vec<ContextChunk>>;

    async fn count(&self) -> Result<u64>;

    /// Chunks embedded by `embedding_model`; the only ones a search with that model can see.
    async fn count_for_model(&self, embedding_model: &str) -> Result<u64>;

    /// Drops every stored chunk.
    async fn clear(&self) -> Result<()>;

    /// Persists pending writes, for backends that buffer.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

pub fn open_index(cfg: &StoreConfig, qdrant_api_key: Option<String>) -> Result<Arc<dyn VectorIndex>> {
    match cfg.backend {
        StoreBackend::Qdrant => Ok(Arc::new(QdrantIndex::connect(
            &cfg.qdrant_url,
            qdrant_api_key,
            &cfg.collection,
        )?)),
        StoreBackend::Local => Ok(Arc::new(LocalIndex::open(&cfg.local_path)?)),
    }
}

// ---------------------------------------------------------------------------
// Qdrant
// ---------------------------------------------------------------------------

pub struct QdrantIndex {
    qdrant: Qdrant,
    collection: String,
}

impl QdrantIndex {
    pub fn connect(url: &str, api_key: Option<String>, collection: &str) -> Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let qdrant = builder.build().map_err(AssessError::index)?;
        Ok(Self {
            qdrant,
            collection: collection.to_string(),
        })
    }

    async fn exists(&self) -> Result<bool> {
        self.qdrant
            .collection_exists(self.collection.as_str())
            .await
            .map_err(AssessError::index)
    }

    async fn count_filtered(&self, filter: Option<Filter>) -> Result<u64> {
        if !self.exists().await? {
            return Ok(0);
        }
        let info = self
            .qdrant
            .count(CountPoints {
                collection_name: self.collection.clone(),
                filter,
                exact: Some(true),
                ..Default::default()
            })
            .await
            .map_err(AssessError::index)?;
        Ok(info.result.map(|r| r.count).unwrap_or(0))
    }

    fn to_point(&self, item: IndexedChunk) -> Result<PointStruct> {
        let meta = &item.chunk.metadata;
        let payload: Payload = json!({
            "chunk_id": item.chunk.id,
            "text": item.chunk.text,
            "kind": meta.kind.as_str(),
            "source": meta.source,
            "offset": meta.offset,
            "content_hash": meta.content_hash,
            "embedding_model": meta.embedding_model,
            "label": meta.label,
            "risk_score": meta.risk_score,
        })
        .try_into()
        .map_err(AssessError::index)?;

        Ok(PointStruct::new(item.chunk.id.clone(), item.vector, payload))
    }

    fn from_point(point: ScoredPoint) -> Result<ContextChunk> {
        let payload = &point.payload;
        let text_field = |name: &str| -> Result<String> {
            payload
                .get(name)
                .and_then(QdrantValue::as_str)
                .map(|s| s.to_string())
                .ok_or_else(|| AssessError::Index(format!("point payload is missing '{name}'")))
        };

        let kind_raw = text_field("kind")?;
        let kind = ChunkKind::parse(&kind_raw)
            .ok_or_else(|| AssessError::Index(format!("unknown chunk kind '{kind_raw}'")))?;
        let offset = payload
            .get("offset")
            .and_then(QdrantValue::as_integer)
            .unwrap_or_default()
            .max(0) as u64;

        Ok(ContextChunk {
            chunk: DocumentChunk {
                id: text_field("chunk_id")?,
                text: text_field("text")?,
                metadata: ChunkMetadata {
                    kind,
                    source: text_field("source")?,
                    offset,
                    content_hash: text_field("content_hash").unwrap_or_default(),
                    embedding_model: text_field("embedding_model")?,
                    label: text_field("label").ok(),
                    risk_score: payload.get("risk_score").and_then(QdrantValue::as_double),
                },
            },
            score: point.score,
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_ready(&self, dimension: usize) -> Result<()> {
        if self.exists().await? {
            let info = self
                .qdrant
                .collection_info(GetCollectionInfoRequest {
                    collection_name: self.collection.clone(),
                })
                .await
                .map_err(AssessError::index)?;
            let existing = info.result.as_ref().and_then(vector_size);
            return check_dimension(&self.collection, existing, dimension);
        }
        info!("📦 Creating Qdrant collection '{}' with dim {}...", self.collection, dimension);
        self.qdrant
            .create_collection(CreateCollection {
                collection_name: self.collection.clone(),
                vectors_config: Some(VectorsConfig {
                    config: Some(Config::Params(VectorParams {
                        size: dimension as u64,
                        distance: Distance::Cosine.into(),
                        ..Default::default()
                    })),
                }),
                ..Default::default()
            })
            .await
            .map_err(AssessError::index)?;
        info!("✅ Qdrant collection created.");
        Ok(())
    }

    async fn upsert(&self, chunks: Vec<IndexedChunk>) -> Result<()> {
        let points = chunks
            .into_iter()
            .map(|c| self.to_point(c))
            .collect::<Result<Vec<_>>>()?;

        for batch in points.chunks(UPSERT_BATCH) {
            self.qdrant
                .upsert_points(UpsertPoints {
                    collection_name: self.collection.clone(),
                    wait: Some(true),
                    points: batch.to_vec(),
                    ..Default::default()
                })
                .await
                .map_err(AssessError::index)?;
        }
        Ok(())
    }

    async fn search(&self, request: SearchRequest<'_>) -> Result<Vec<ContextChunk>> {
        if request.limit == 0 || !self.exists().await? {
            return Ok(vec![]);
        }

        let mut must = vec![Condition::matches(
            "embedding_model",
            request.embedding_model.to_string(),
        )];
        if let Some(kind) = request.kind {
            must.push(Condition::matches("kind", kind.as_str().to_string()));
        }

        let response = self
            .qdrant
            .search_points(SearchPoints {
                collection_name: self.collection.clone(),
                vector: request.vector.to_vec(),
                filter: Some(Filter {
                    must,
                    ..Default::default()
                }),
                limit: request.limit as u64,
                with_payload: Some(true.into()),
                ..Default::default()
            })
            .await
            .map_err(AssessError::index)?;

        let mut hits = response
            .result
            .into_iter()
            .map(Self::from_point)
            .collect::<Result<Vec<_>>>()?;
        sort_hits(&mut hits);
        Ok(hits)
    }

    async fn count(&self) -> Result<u64> {
        self.count_filtered(None).await
    }

    async fn count_for_model(&self, embedding_model: &str) -> Result<u64> {
        self.count_filtered(Some(Filter {
            must: vec![Condition::matches("embedding_model", embedding_model.to_string())],
            ..Default::default()
        }))
        .await
    }

    async fn clear(&self) -> Result<()> {
        if self.exists().await? {
            info!("🧹 Dropping Qdrant collection '{}'", self.collection);
            self.qdrant
                .delete_collection(DeleteCollection {
                    collection_name: self.collection.clone(),
                    ..Default::default()
                })
                .await
                .map_err(AssessError::index)?;
        }
        Ok(())
    }
}

/// Size of the collection's single unnamed vector, if it has one.
fn vector_size(info: &CollectionInfo) -> Option<u64> {
    let vectors = info.config.as_ref()?.params.as_ref()?.vectors_config.as_ref()?;
    match vectors.config.as_ref()? {
        Config::Params(params) => Some(params.size),
        _ => None,
    }
}

fn check_dimension(collection: &str, existing: Option<u64>, dimension: usize) -> Result<()> {
    match existing {
        Some(size) if size != dimension as u64 => Err(AssessError::Configuration(format!(
            "Qdrant collection '{collection}' holds {size}-dimensional vectors but the embedder produces {dimension}; rebuild the index"
        ))),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Local (file-backed, brute force)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct LocalIndexFile {
    dimension: Option<usize>,
    chunks: Vec<IndexedChunk>,
}

/// In-process index with optional JSON persistence. Search is an exact
/// cosine scan, which is plenty for a policy document and a case table.
pub struct LocalIndex {
    path: Option<PathBuf>,
    chunks: DashMap<String, IndexedChunk>,
    dimension: std::sync::RwLock<Option<usize>>,
}

impl LocalIndex {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            chunks: DashMap::new(),
            dimension: std::sync::RwLock::new(None),
        }
    }

    /// Loads the file when present; otherwise starts empty and writes on flush.
    pub fn open(path: &Path) -> Result<Self> {
        let index = Self {
            path: Some(path.to_path_buf()),
            ..Self::in_memory()
        };
        if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|e| AssessError::io(path, e))?;
            let file: LocalIndexFile = serde_json::from_str(&raw)?;
            for item in file.chunks {
                index.chunks.insert(item.chunk.id.clone(), item);
            }
            index.set_dimension(file.dimension);
            debug!("loaded {} chunks from {}", index.chunks.len(), path.display());
        }
        Ok(index)
    }

    fn current_dimension(&self) -> Option<usize> {
        self.dimension.read().map(|d| *d).unwrap_or(None)
    }

    fn set_dimension(&self, dim: Option<usize>) {
        if let Ok(mut guard) = self.dimension.write() {
            *guard = dim;
        }
    }
}

#[async_trait]
impl VectorIndex for LocalIndex {
    async fn ensure_ready(&self, dimension: usize) -> Result<()> {
        match self.current_dimension() {
            Some(existing) if existing != dimension && !self.chunks.is_empty() => {
                Err(AssessError::Configuration(format!(
                    "local index holds {existing}-dimensional vectors but the embedder produces {dimension}; rebuild the index"
                )))
            }
            _ => {
                self.set_dimension(Some(dimension));
                Ok(())
            }
        }
    }

    async fn upsert(&self, chunks: Vec<IndexedChunk>) -> Result<()> {
        for item in chunks {
            if let Some(dim) = self.current_dimension() {
                if item.vector.len() != dim {
                    return Err(AssessError::Index(format!(
                        "vector for chunk {} has {} values, index expects {}",
                        item.chunk.id,
                        item.vector.len(),
                        dim
                    )));
                }
            }
            self.chunks.insert(item.chunk.id.clone(), item);
        }
        Ok(())
    }

    async fn search(&self, request: SearchRequest<'_>) -> Result<Vec<ContextChunk>> {
        let mut hits: Vec<ContextChunk> = self
            .chunks
            .iter()
            .filter(|entry| {
                let meta = &entry.value().chunk.metadata;
                meta.embedding_model == request.embedding_model
                    && request.kind.map_or(true, |k| meta.kind == k)
            })
            .map(|entry| ContextChunk {
                score: cosine_similarity(request.vector, &entry.value().vector),
                chunk: entry.value().chunk.clone(),
            })
            .collect();

        sort_hits(&mut hits);
        hits.truncate(request.limit);
        Ok(hits)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.chunks.len() as u64)
    }

    async fn count_for_model(&self, embedding_model: &str) -> Result<u64> {
        Ok(self
            .chunks
            .iter()
            .filter(|e| e.value().chunk.metadata.embedding_model == embedding_model)
            .count() as u64)
    }

    async fn clear(&self) -> Result<()> {
        self.chunks.clear();
        self.set_dimension(None);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut chunks: Vec<IndexedChunk> = self.chunks.iter().map(|e| e.value().clone()).collect();
        chunks.sort_by(|a, b| a.chunk.id.cmp(&b.chunk.id));
        let file = LocalIndexFile {
            dimension: self.current_dimension(),
            chunks,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AssessError::io(parent, e))?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(&file)?).map_err(|e| AssessError::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| AssessError::io(path, e))?;
        info!("💾 Local index saved ({} chunks) to {}", file.chunks.len(), path.display());
        Ok(())
    }
}

/// Counts chunks per kind; used for ingest summaries.
pub fn count_by_kind(chunks: &[IndexedChunk]) -> HashMap<ChunkKind, usize> {
    let mut counts = HashMap::new();
    for c in chunks {
        *counts.entry(c.chunk.metadata.kind).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(source: &str, offset: u64, kind: ChunkKind, vector: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            chunk: DocumentChunk::new(kind, source, offset, format!("{source}:{offset}"), "m1"),
            vector,
        }
    }

    fn request<'a>(vector: &'a [f32], limit: usize) -> SearchRequest<'a> {
        SearchRequest {
            vector,
            limit,
            embedding_model: "m1",
            kind: None,
        }
    }

    #[tokio::test]
    async fn empty_index_returns_no_hits() {
        let index = LocalIndex::in_memory();
        let hits = index.search(request(&[1.0, 0.0], 4)).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn hits_are_ranked_by_similarity() {
        let index = LocalIndex::in_memory();
        index.ensure_ready(2).await.unwrap();
        index
            .upsert(vec![
                item("p.md", 0, ChunkKind::Policy, vec![0.0, 1.0]),
                item("p.md", 10, ChunkKind::Policy, vec![1.0, 0.0]),
                item("c.csv", 0, ChunkKind::Case, vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let hits = index.search(request(&[1.0, 0.1], 2)).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.metadata.offset, 10);
        assert!(hits[0].score >= hits[1].score);

        let again = index.search(request(&[1.0, 0.1], 2)).await.unwrap();
        assert_eq!(hits, again);
    }

    #[tokio::test]
    async fn kind_and_model_filters_apply() {
        let index = LocalIndex::in_memory();
        let mut foreign = item("p.md", 99, ChunkKind::Policy, vec![1.0, 0.0]);
        foreign.chunk.metadata.embedding_model = "other-model".into();
        index
            .upsert(vec![
                foreign,
                item("c.csv", 0, ChunkKind::Case, vec![0.5, 0.5]),
            ])
            .await
            .unwrap();

        let mut req = request(&[1.0, 0.0], 5);
        let hits = index.search(req.clone()).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.metadata.kind, ChunkKind::Case);

        req.kind = Some(ChunkKind::Policy);
        assert!(index.search(req).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_id() {
        let index = LocalIndex::in_memory();
        let batch = vec![
            item("p.md", 0, ChunkKind::Policy, vec![1.0, 0.0]),
            item("p.md", 5, ChunkKind::Policy, vec![0.0, 1.0]),
        ];
        index.upsert(batch.clone()).await.unwrap();
        index.upsert(batch).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let index = LocalIndex::in_memory();
        index.ensure_ready(2).await.unwrap();
        index.upsert(vec![item("p.md", 0, ChunkKind::Policy, vec![1.0, 0.0])]).await.unwrap();
        assert!(index.ensure_ready(3).await.unwrap_err().is_configuration());
        assert!(index
            .upsert(vec![item("p.md", 1, ChunkKind::Policy, vec![1.0, 0.0, 0.0])])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn flush_and_reopen_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store").join("index.json");

        let index = LocalIndex::open(&path).unwrap();
        index.ensure_ready(2).await.unwrap();
        index
            .upsert(vec![item("p.md", 0, ChunkKind::Policy, vec![0.6, 0.8])])
            .await
            .unwrap();
        index.flush().await.unwrap();

        let reopened = LocalIndex::open(&path).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        let hits = reopened.search(request(&[0.6, 0.8], 1)).await.unwrap();
        assert_eq!(hits[0].chunk.text, "p.md:0");
    }

    #[tokio::test]
    async fn model_count_ignores_foreign_chunks() {
        let index = LocalIndex::in_memory();
        let mut foreign = item("p.md", 7, ChunkKind::Policy, vec![1.0, 0.0]);
        foreign.chunk.metadata.embedding_model = "other-model".into();
        index
            .upsert(vec![foreign, item("p.md", 0, ChunkKind::Policy, vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 2);
        assert_eq!(index.count_for_model("m1").await.unwrap(), 1);
        assert_eq!(index.count_for_model("absent").await.unwrap(), 0);
    }

    fn collection_with_size(size: u64) -> CollectionInfo {
        use qdrant_client::qdrant::{CollectionConfig, CollectionParams};
        CollectionInfo {
            config: Some(CollectionConfig {
                params: Some(CollectionParams {
                    vectors_config: Some(VectorsConfig {
                        config: Some(Config::Params(VectorParams {
                            size,
                            ..Default::default()
                        })),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn existing_qdrant_collection_size_is_checked() {
        let info = collection_with_size(1536);
        assert_eq!(vector_size(&info), Some(1536));
        assert!(check_dimension("c", vector_size(&info), 1536).is_ok());
        assert!(check_dimension("c", vector_size(&info), 512)
            .unwrap_err()
            .is_configuration());
        assert_eq!(vector_size(&CollectionInfo::default()), None);
        assert!(check_dimension("c", None, 512).is_ok());
    }

    #[tokio::test]
    async fn clear_empties_the_index() {
        let index = LocalIndex::in_memory();
        index.upsert(vec![item("p.md", 0, ChunkKind::Policy, vec![1.0])]).await.unwrap();
        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }
}
