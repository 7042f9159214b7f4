use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Policy,
    Case,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Policy => "policy",
            ChunkKind::Case => "case",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "policy" => Some(ChunkKind::Policy),
            "case" => Some(ChunkKind::Case),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub kind: ChunkKind,
    /// Source document id (the path the text was read from).
    pub source: String,
    /// Byte offset for policy text, row index for cases.
    pub offset: u64,
    pub content_hash: String,
    pub embedding_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl DocumentChunk {
    pub fn new(kind: ChunkKind, source: &str, offset: u64, text: String, embedding_model: &str) -> Self {
        Self {
            id: chunk_id(source, offset),
            metadata: ChunkMetadata {
                kind,
                source: source.to_string(),
                offset,
                content_hash: content_hash(&text),
                embedding_model: embedding_model.to_string(),
                label: None,
                risk_score: None,
            },
            text,
        }
    }

    pub fn with_case_label(mut self, label: &str, risk_score: f64) -> Self {
        self.metadata.label = Some(label.to_string());
        self.metadata.risk_score = Some(risk_score);
        self
    }

    /// Short tag used when the chunk is quoted in a prompt.
    pub fn citation(&self) -> String {
        match (&self.metadata.kind, &self.metadata.label) {
            (ChunkKind::Case, Some(label)) => format!(
                "case row {} of {} (label: {})",
                self.metadata.offset, self.metadata.source, label
            ),
            (ChunkKind::Case, None) => {
                format!("case row {} of {}", self.metadata.offset, self.metadata.source)
            }
            (ChunkKind::Policy, _) => format!(
                "policy {} @ byte {}",
                self.metadata.source, self.metadata.offset
            ),
        }
    }
}

/// A chunk with its embedding, as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk: DocumentChunk,
    pub vector: Vec<f32>,
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Orders hits by descending score, ties by chunk id.
pub fn sort_hits(hits: &mut [ContextChunk]) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
}

/// Point id derived from `(source, offset)`, so re-ingesting overwrites instead of duplicating.
pub fn chunk_id(source: &str, offset: u64) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{source}#{offset}").as_bytes()).to_string()
}

pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
