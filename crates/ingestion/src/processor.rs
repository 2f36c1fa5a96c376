//! Ingestion processor
//!
//! Core logic for loading the corpus into the vector index: chunk each
//! document, embed every chunk, and upsert it under a stable id.

use crate::chunker::chunk_text;
use crate::corpus::Document;
use crate::errors::{IngestionError, Result};
use phil_common::config::IngestionConfig;
use phil_common::index::{ChunkMetadata, IndexEntry};
use phil_common::{metrics, Embedder, VectorIndex};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Chunk count for one ingested document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReport {
    pub key: String,
    pub chunks: usize,
}

/// Outcome of a completed ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub documents: Vec<DocumentReport>,
    pub dry_run: bool,
}

impl IngestionReport {
    pub fn total_chunks(&self) -> usize {
        self.documents.iter().map(|d| d.chunks).sum()
    }
}

/// Chunk every document and report counts without touching the network
pub fn plan(documents: &[Document], chunk_size: usize) -> IngestionReport {
    let documents = documents
        .iter()
        .map(|doc| {
            let chunks = chunk_text(&doc.text, chunk_size).len();
            info!(document = %doc.key, chunks, "Dry run: document chunked");
            DocumentReport {
                key: doc.key.clone(),
                chunks,
            }
        })
        .collect();

    IngestionReport {
        documents,
        dry_run: true,
    }
}

/// Sequential, fail-fast ingestion job
pub struct IngestionProcessor {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chunk_size: usize,
    embed_delay: Duration,
    progress_interval: usize,
}

impl IngestionProcessor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: &IngestionConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            chunk_size: config.chunk_size,
            embed_delay: config.embed_delay(),
            progress_interval: config.progress_interval.max(1),
        }
    }

    /// Embed and upsert every chunk of every document, in order
    ///
    /// The first embedding or upsert failure aborts the run; entries written
    /// before it stay in the index.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub async fn run(&self, documents: &[Document]) -> Result<IngestionReport> {
        let mut report = IngestionReport::default();
        let mut first_call = true;

        for doc in documents {
            let chunks = self.ingest_document(doc, &mut first_call).await?;
            report.documents.push(DocumentReport {
                key: doc.key.clone(),
                chunks,
            });
        }

        info!(total_chunks = report.total_chunks(), "Ingestion complete");
        Ok(report)
    }

    async fn ingest_document(&self, doc: &Document, first_call: &mut bool) -> Result<usize> {
        info!(document = %doc.key, "Processing document");

        let chunks = chunk_text(&doc.text, self.chunk_size);
        let total = chunks.len();
        info!(document = %doc.key, chunks = total, "Document chunked");

        for (i, text) in chunks.into_iter().enumerate() {
            if !*first_call && !self.embed_delay.is_zero() {
                tokio::time::sleep(self.embed_delay).await;
            }
            *first_call = false;

            let id = IndexEntry::entry_id(&doc.key, i);
            let values = self
                .embedder
                .embed(&text)
                .await
                .map_err(|source| IngestionError::Embed { id: id.clone(), source })?;

            let entry = IndexEntry {
                id: id.clone(),
                values,
                metadata: ChunkMetadata {
                    text,
                    philosopher: doc.key.clone(),
                    chunk: i,
                },
            };
            self.index
                .upsert(vec![entry])
                .await
                .map_err(|source| IngestionError::Upsert { id, source })?;

            let uploaded = i + 1;
            if uploaded % self.progress_interval == 0 {
                info!(document = %doc.key, "{}/{} chunks uploaded", uploaded, total);
            }
        }

        metrics::record_ingestion(&doc.key, total);
        info!(document = %doc.key, chunks = total, "Document complete");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phil_common::embeddings::MockEmbedder;
    use phil_common::errors::{AppError, RetrievalStage};
    use phil_common::index::InMemoryIndex;

    fn config() -> IngestionConfig {
        IngestionConfig {
            embed_delay_ms: 0,
            ..IngestionConfig::default()
        }
    }

    fn corpus() -> Vec<Document> {
        vec![
            Document::new(
                "marcus_aurelius",
                "You have power over your mind. Not outside events. Realize this.",
            ),
            Document::new("epictetus", "Some things are up to us and some are not."),
        ]
    }

    fn small_chunks() -> IngestionConfig {
        IngestionConfig {
            chunk_size: 20,
            ..config()
        }
    }

    #[tokio::test]
    async fn test_entries_have_stable_ids_and_metadata() {
        let embedder = Arc::new(MockEmbedder::new(8));
        let index = Arc::new(InMemoryIndex::new());
        let processor = IngestionProcessor::new(embedder.clone(), index.clone(), &small_chunks());

        let report = processor.run(&corpus()).await.unwrap();

        assert_eq!(
            report.documents,
            vec![
                DocumentReport { key: "marcus_aurelius".to_string(), chunks: 3 },
                DocumentReport { key: "epictetus".to_string(), chunks: 1 },
            ]
        );
        assert_eq!(report.total_chunks(), 4);
        assert!(!report.dry_run);
        assert_eq!(embedder.calls(), 4);

        let entries = index.entries();
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["epictetus-0", "marcus_aurelius-0", "marcus_aurelius-1", "marcus_aurelius-2"]
        );

        let second = &entries[2];
        assert_eq!(second.metadata.philosopher, "marcus_aurelius");
        assert_eq!(second.metadata.chunk, 1);
        assert_eq!(second.metadata.text, "Not outside events.");
        assert_eq!(second.values, embedder.vector_for("Not outside events."));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let embedder = Arc::new(MockEmbedder::new(8));
        let index = Arc::new(InMemoryIndex::new());
        let processor = IngestionProcessor::new(embedder, index.clone(), &config());

        processor.run(&corpus()).await.unwrap();
        let first = index.entries();
        processor.run(&corpus()).await.unwrap();

        assert_eq!(index.entries(), first);
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_run() {
        let embedder = Arc::new(MockEmbedder::failing(8));
        let index = Arc::new(InMemoryIndex::new());
        let processor = IngestionProcessor::new(embedder.clone(), index.clone(), &config());

        let err = processor.run(&corpus()).await.unwrap_err();

        assert!(err.to_string().starts_with("Embedding of marcus_aurelius-0"));
        match err {
            IngestionError::Embed { id, source } => {
                assert_eq!(id, "marcus_aurelius-0");
                assert!(matches!(source, AppError::EmbeddingError { .. }));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(embedder.calls(), 1);
        assert_eq!(index.upserts(), 0);
    }

    #[tokio::test]
    async fn test_upsert_failure_aborts_run() {
        let embedder = Arc::new(MockEmbedder::new(8));
        let index = Arc::new(InMemoryIndex::new());
        index.set_failing(true);
        let processor = IngestionProcessor::new(embedder.clone(), index.clone(), &config());

        let err = processor.run(&corpus()).await.unwrap_err();

        assert!(matches!(
            err,
            IngestionError::Upsert {
                source: AppError::RetrievalError { stage: RetrievalStage::IndexUpsert, .. },
                ..
            }
        ));
        assert_eq!(embedder.calls(), 1);
        assert_eq!(index.upserts(), 1);
    }

    #[test]
    fn test_dry_run_counts_chunks() {
        let report = plan(&corpus(), small_chunks().chunk_size);

        assert!(report.dry_run);
        assert_eq!(report.total_chunks(), 4);
        assert_eq!(report.documents[0].chunks, 3);
    }

    #[tokio::test]
    async fn test_delay_separates_embedding_calls() {
        let embedder = Arc::new(MockEmbedder::new(8));
        let index = Arc::new(InMemoryIndex::new());
        let config = IngestionConfig {
            embed_delay_ms: 20,
            ..small_chunks()
        };
        let processor = IngestionProcessor::new(embedder, index, &config);

        let start = std::time::Instant::now();
        processor.run(&corpus()).await.unwrap();

        // Four chunks, three gaps.
        assert!(start.elapsed() >= Duration::from_millis(60));
    }
}
