//! Vector index abstraction
//!
//! Two operations matter to Phil:
//! - `upsert` during ingestion (idempotent by entry id, last write wins)
//! - `query` during chat (top-K by similarity, metadata included)
//!
//! Backends:
//! - Pinecone (REST data plane)
//! - In-memory brute-force cosine index (tests, offline development)

mod memory;
mod pinecone;

pub use memory::InMemoryIndex;
pub use pinecone::PineconeIndex;

use crate::config::IndexConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Metadata stored alongside every corpus chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Chunk text
    pub text: String,

    /// Source document key, e.g. `seneca`
    pub philosopher: String,

    /// Sequence index of the chunk within its document
    pub chunk: usize,
}

/// A persisted (id, vector, metadata) triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl IndexEntry {
    /// Identity for chunk `index` of `document`
    pub fn entry_id(document: &str, index: usize) -> String {
        format!("{}-{}", document, index)
    }
}

/// A similarity query
#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub include_metadata: bool,
}

impl IndexQuery {
    pub fn new(vector: Vec<f32>, top_k: usize) -> Self {
        Self {
            vector,
            top_k,
            include_metadata: true,
        }
    }
}

/// One ranked query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMatch {
    pub id: String,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChunkMetadata>,
}

/// Summary of the index contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_vector_count: u64,
    pub dimension: Option<usize>,
}

/// Common trait for vector index backends
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite entries by id
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()>;

    /// Return up to `top_k` matches ordered by descending similarity
    async fn query(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>>;

    /// Describe the index (entry count, dimension)
    async fn stats(&self) -> Result<IndexStats>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Create a vector index client based on configuration
pub fn create_index(config: &IndexConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.provider.as_str() {
        "pinecone" => {
            let api_key = config
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| AppError::Configuration {
                    message: "Pinecone API key required (index.api_key or PINECONE_API_KEY)".to_string(),
                })?;
            let host = config.host.clone().ok_or_else(|| AppError::Configuration {
                message: format!("index.host required for Pinecone index '{}'", config.name),
            })?;
            Ok(Arc::new(PineconeIndex::new(
                api_key,
                host,
                config.name.clone(),
                config.namespace.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "memory" => Ok(Arc::new(InMemoryIndex::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown index provider: {}", other),
        }),
    }
}
