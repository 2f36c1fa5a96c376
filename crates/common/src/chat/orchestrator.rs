//! Per-turn RAG pipeline: validate → embed → retrieve → prompt → stream

use super::prompt::{build_prompt, RetrievedPassage};
use super::{ChatMessage, Role};
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result, RetrievalStage};
use crate::generation::{FragmentStream, Generator};
use crate::index::{IndexQuery, VectorIndex};
use crate::metrics::{self, TurnOutcome};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// Stateless chat pipeline over injected clients
///
/// Cheap to share: every request gets its own stream and nothing is
/// mutated between calls.
pub struct ChatOrchestrator {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    top_k: usize,
}

impl ChatOrchestrator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            top_k: crate::RETRIEVAL_TOP_K,
        }
    }

    /// Check the conversation and return its latest (user) message
    pub fn validate(messages: &[ChatMessage]) -> Result<&ChatMessage> {
        let latest = messages
            .last()
            .ok_or_else(|| AppError::invalid("conversation has no messages"))?;

        if latest.role != Role::User {
            return Err(AppError::invalid("latest message must come from the user"));
        }
        if latest.content.trim().is_empty() {
            return Err(AppError::invalid("latest message is empty"));
        }

        Ok(latest)
    }

    /// Embed `query` and fetch the top passages, in rank order
    #[instrument(skip_all, fields(top_k = self.top_k))]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>> {
        let start = Instant::now();

        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| AppError::retrieval(RetrievalStage::Embedding, e))?;

        let matches = self
            .index
            .query(&IndexQuery::new(vector, self.top_k))
            .await
            .map_err(|e| match e {
                AppError::RetrievalError { .. } => e,
                other => AppError::retrieval(RetrievalStage::IndexQuery, other),
            })?;

        let passages: Vec<RetrievedPassage> = matches
            .into_iter()
            .filter_map(|m| match m.metadata {
                Some(metadata) => Some(RetrievedPassage {
                    philosopher: metadata.philosopher,
                    text: metadata.text,
                    score: m.score,
                }),
                None => {
                    debug!(id = %m.id, "Skipping match without metadata");
                    None
                }
            })
            .collect();

        metrics::record_retrieval(start.elapsed().as_secs_f64(), passages.len());
        debug!(passages = passages.len(), "Context retrieved");
        Ok(passages)
    }

    /// Validate, retrieve and compose the prompt for the latest turn
    pub async fn prepare(&self, messages: &[ChatMessage]) -> Result<String> {
        let latest = Self::validate(messages)?;
        let passages = self.retrieve(&latest.content).await?;
        Ok(build_prompt(messages, &passages))
    }

    /// Answer the conversation as a stream of text fragments
    ///
    /// Validation and retrieval failures are returned before any generation
    /// call. Once streaming has started, a generation failure is delivered
    /// as the final `Err` item; fragments already yielded stand.
    #[instrument(skip_all, fields(turns = messages.len()))]
    pub async fn respond(&self, messages: &[ChatMessage]) -> Result<FragmentStream> {
        let prompt = match self.prepare(messages).await {
            Ok(prompt) => prompt,
            Err(e) => {
                let outcome = if matches!(e, AppError::InvalidRequest { .. }) {
                    TurnOutcome::Rejected
                } else {
                    error!(stage = "retrieval", error = %e, "Chat turn aborted before generation");
                    TurnOutcome::RetrievalFailed
                };
                metrics::record_chat_turn(outcome);
                return Err(e);
            }
        };

        let mut upstream = match self.generator.generate_stream(&prompt).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(stage = "generation", model = self.generator.model_name(), error = %e, "Failed to start generation");
                metrics::record_chat_turn(TurnOutcome::GenerationFailed);
                return Err(e);
            }
        };

        info!(
            model = self.generator.model_name(),
            prompt_chars = prompt.len(),
            "Streaming reply"
        );

        let stream = async_stream::stream! {
            let mut forwarded = 0usize;
            while let Some(item) = upstream.next().await {
                match item {
                    Ok(text) if text.is_empty() => continue,
                    Ok(text) => {
                        forwarded += 1;
                        metrics::record_generation_fragment();
                        yield Ok(text);
                    }
                    Err(e) => {
                        error!(stage = "generation", forwarded, error = %e, "Generation stream failed");
                        metrics::record_chat_turn(TurnOutcome::GenerationFailed);
                        yield Err(e);
                        return;
                    }
                }
            }
            debug!(forwarded, "Reply stream finished");
            metrics::record_chat_turn(TurnOutcome::Streamed);
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbedder;
    use crate::generation::MockGenerator;
    use crate::index::{ChunkMetadata, IndexEntry, InMemoryIndex};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    struct Harness {
        embedder: Arc<MockEmbedder>,
        index: Arc<InMemoryIndex>,
        generator: Arc<MockGenerator>,
        orchestrator: ChatOrchestrator,
    }

    fn harness(generator: MockGenerator) -> Harness {
        let embedder = Arc::new(MockEmbedder::new(8));
        let index = Arc::new(InMemoryIndex::new());
        let generator = Arc::new(generator);
        let orchestrator = ChatOrchestrator::new(embedder.clone(), index.clone(), generator.clone());
        Harness {
            embedder,
            index,
            generator,
            orchestrator,
        }
    }

    fn reply() -> MockGenerator {
        MockGenerator::new(vec![
            "What would ".to_string(),
            String::new(),
            "Seneca ask?".to_string(),
        ])
    }

    async fn seed(h: &Harness, query: &str) {
        // Store the passage under the query's own vector so it ranks first.
        let entry = IndexEntry {
            id: "seneca-0".to_string(),
            values: h.embedder.vector_for(query),
            metadata: ChunkMetadata {
                text: "On anger...".to_string(),
                philosopher: "Seneca".to_string(),
                chunk: 0,
            },
        };
        h.index.upsert(vec![entry]).await.unwrap();
    }

    async fn collect(stream: FragmentStream) -> Vec<Result<String>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_empty_conversation_is_invalid_and_makes_no_calls() {
        let h = harness(reply());
        let err = h.orchestrator.respond(&[]).await.err().unwrap();

        assert!(matches!(err, AppError::InvalidRequest { .. }));
        assert_eq!(h.embedder.calls(), 0);
        assert_eq!(h.index.queries(), 0);
        assert_eq!(h.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_latest_turn_must_be_user() {
        let messages = vec![
            ChatMessage::user("Hello"),
            ChatMessage::assistant("What brings you here?"),
        ];
        assert_err!(ChatOrchestrator::validate(&messages));
        assert_err!(ChatOrchestrator::validate(&[ChatMessage::user("   ")]));
        assert_ok!(ChatOrchestrator::validate(&[ChatMessage::user("Why?")]));
    }

    #[tokio::test]
    async fn test_streams_fragments_in_order_and_skips_empty() {
        let h = harness(reply());
        let query = "How do I stay calm?";
        seed(&h, query).await;

        let stream = h.orchestrator.respond(&[ChatMessage::user(query)]).await.unwrap();
        let fragments: Vec<String> = collect(stream).await.into_iter().map(|f| f.unwrap()).collect();

        assert_eq!(fragments, vec!["What would ", "Seneca ask?"]);
        assert_eq!(h.embedder.calls(), 1);
        assert_eq!(h.index.queries(), 1);
        assert_eq!(h.generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_prompt_carries_retrieved_context() {
        let h = harness(reply());
        let query = "How do I stay calm?";
        seed(&h, query).await;

        let stream = h.orchestrator.respond(&[ChatMessage::user(query)]).await.unwrap();
        collect(stream).await;

        let prompt = h.generator.last_prompt().unwrap();
        assert!(prompt.contains("[Seneca]: On anger..."));
        assert!(!prompt.contains("Previous conversation"));
    }

    #[tokio::test]
    async fn test_retrieval_uses_top_three() {
        let h = harness(reply());
        for i in 0..5 {
            h.index
                .upsert(vec![IndexEntry {
                    id: IndexEntry::entry_id("epictetus", i),
                    values: h.embedder.vector_for(&format!("passage {}", i)),
                    metadata: ChunkMetadata {
                        text: format!("passage {}", i),
                        philosopher: "epictetus".to_string(),
                        chunk: i,
                    },
                }])
                .await
                .unwrap();
        }

        let passages = h.orchestrator.retrieve("passage 3").await.unwrap();
        assert_eq!(passages.len(), 3);
        assert_eq!(passages[0].text, "passage 3");
    }

    #[tokio::test]
    async fn test_empty_index_yields_empty_context() {
        let h = harness(reply());
        let prompt = h
            .orchestrator
            .prepare(&[ChatMessage::user("Is anything in my control?")])
            .await
            .unwrap();
        assert!(prompt.contains("Relevant philosophical wisdom:\n\n"));
    }

    #[tokio::test]
    async fn test_embedding_failure_never_reaches_generator() {
        let h = harness(reply());
        h.embedder.set_failing(true);

        let err = h
            .orchestrator
            .respond(&[ChatMessage::user("Why am I anxious?")])
            .await
            .err()
            .unwrap();

        assert!(matches!(
            err,
            AppError::RetrievalError { stage: RetrievalStage::Embedding, .. }
        ));
        assert_eq!(h.index.queries(), 0);
        assert_eq!(h.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_index_failure_never_reaches_generator() {
        let h = harness(reply());
        h.index.set_failing(true);

        let err = h
            .orchestrator
            .respond(&[ChatMessage::user("Why am I anxious?")])
            .await
            .err()
            .unwrap();

        assert!(matches!(
            err,
            AppError::RetrievalError { stage: RetrievalStage::IndexQuery, .. }
        ));
        assert_eq!(h.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_generation_start_failure_is_returned() {
        let h = harness(MockGenerator::failing_on_start());
        let err = h
            .orchestrator
            .respond(&[ChatMessage::user("Hello")])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::GenerationError { .. }));
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_sent_fragments() {
        let generator = MockGenerator::failing_after(
            vec!["First thought. ".to_string(), "Second".to_string()],
            1,
        );
        let h = harness(generator);

        let stream = h.orchestrator.respond(&[ChatMessage::user("Hello")]).await.unwrap();
        let items = collect(stream).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "First thought. ");
        assert!(matches!(items[1], Err(AppError::GenerationError { .. })));
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Generator whose stream reports how far it was pulled and when it is dropped
    struct TrackedGenerator {
        dropped: Arc<AtomicBool>,
        pulled: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Generator for TrackedGenerator {
        async fn generate_stream(&self, _prompt: &str) -> Result<FragmentStream> {
            let guard = DropFlag(self.dropped.clone());
            let pulled = self.pulled.clone();
            let stream = async_stream::stream! {
                let _guard = guard;
                for i in 0..10 {
                    pulled.fetch_add(1, Ordering::SeqCst);
                    yield Ok(format!("fragment {} ", i));
                }
            };
            Ok(Box::pin(stream))
        }

        fn model_name(&self) -> &str {
            "tracked"
        }
    }

    #[tokio::test]
    async fn test_dropping_reply_stream_releases_upstream() {
        let dropped = Arc::new(AtomicBool::new(false));
        let pulled = Arc::new(AtomicUsize::new(0));
        let orchestrator = ChatOrchestrator::new(
            Arc::new(MockEmbedder::new(8)),
            Arc::new(InMemoryIndex::new()),
            Arc::new(TrackedGenerator {
                dropped: dropped.clone(),
                pulled: pulled.clone(),
            }),
        );

        let mut stream = orchestrator.respond(&[ChatMessage::user("Hello")]).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, "fragment 0 ");
        assert!(!dropped.load(Ordering::SeqCst));

        drop(stream);

        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
    }
}
