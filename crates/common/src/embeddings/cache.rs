//! Content-hash embedding cache
//!
//! Wraps another embedder and memoizes vectors by the SHA-256 of the input
//! text. Once `capacity` entries are stored, new texts pass straight through
//! without being cached.

use super::Embedder;
use crate::errors::Result;
use crate::metrics;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    capacity: usize,
    entries: RwLock<HashMap<String, Vec<f32>>>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, capacity: usize) -> Self {
        Self {
            inner,
            capacity,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn cache_key(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.inner.model_name().as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Number of cached vectors
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = self.cache_key(text);

        if let Some(hit) = self.entries.read().await.get(&key) {
            metrics::record_cache(true, "embedding");
            return Ok(hit.clone());
        }
        metrics::record_cache(false, "embedding");

        let vector = self.inner.embed(text).await?;

        let mut entries = self.entries.write().await;
        if entries.len() < self.capacity {
            entries.insert(key, vector.clone());
        }

        Ok(vector)
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbedder;

    #[tokio::test]
    async fn test_repeated_text_hits_cache() {
        let inner = Arc::new(MockEmbedder::new(8));
        let cached = CachedEmbedder::new(inner.clone(), 10);

        let first = cached.embed("The obstacle is the way").await.unwrap();
        let second = cached.embed("The obstacle is the way").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.calls(), 1);
        assert_eq!(cached.len().await, 1);
    }

    #[tokio::test]
    async fn test_capacity_bounds_entries() {
        let inner = Arc::new(MockEmbedder::new(4));
        let cached = CachedEmbedder::new(inner.clone(), 1);

        cached.embed("one").await.unwrap();
        cached.embed("two").await.unwrap();
        cached.embed("two").await.unwrap();

        assert_eq!(cached.len().await, 1);
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let inner = Arc::new(MockEmbedder::failing(4));
        let cached = CachedEmbedder::new(inner.clone(), 10);

        assert!(cached.embed("fails").await.is_err());
        inner.set_failing(false);
        assert!(cached.embed("fails").await.is_ok());
        assert_eq!(inner.calls(), 2);
    }
}
