pub mod chunker;
pub mod document;
pub mod embedder;
pub mod index;
pub mod ingest;
pub mod retriever;

pub use document::{ChunkKind, ContextChunk, DocumentChunk};
pub use embedder::{build_embedder, Embedder, HashingEmbedder};
pub use index::{open_index, LocalIndex, VectorIndex};
pub use ingest::DocumentStoreBuilder;
pub use retriever::ContextRetriever;
