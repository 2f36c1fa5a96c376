//! Phil Common Library
//!
//! Shared code for the Phil services including:
//! - Embedding, vector index and generation client abstractions
//! - Chat orchestration (retrieval-augmented prompt building and streaming)
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod chat;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod generation;
pub mod index;
pub mod metrics;

// Re-export commonly used types
pub use chat::{ChatMessage, ChatOrchestrator, Role};
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use generation::Generator;
pub use index::VectorIndex;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Default generation model
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-1.5-flash";

/// Name of the vector index holding the philosophy corpus
pub const DEFAULT_INDEX_NAME: &str = "phil";

/// Number of passages retrieved per chat turn
pub const RETRIEVAL_TOP_K: usize = 3;
