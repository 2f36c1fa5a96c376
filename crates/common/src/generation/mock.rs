//! Scripted generator for testing

use super::{FragmentStream, Generator};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Replays a fixed list of fragments, optionally failing part-way
pub struct MockGenerator {
    fragments: Vec<String>,
    fail_after: Option<usize>,
    fail_on_start: bool,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn new(fragments: Vec<String>) -> Self {
        Self {
            fragments,
            fail_after: None,
            fail_on_start: false,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Emit the first `count` fragments, then end the stream with a `GenerationError`
    pub fn failing_after(fragments: Vec<String>, count: usize) -> Self {
        Self {
            fail_after: Some(count),
            ..Self::new(fragments)
        }
    }

    /// Refuse to open a stream at all
    pub fn failing_on_start() -> Self {
        Self {
            fail_on_start: true,
            ..Self::new(Vec::new())
        }
    }

    /// Number of `generate_stream` calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent prompt received
    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().ok().and_then(|p| p.last().cloned())
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        if self.fail_on_start {
            return Err(AppError::GenerationError {
                message: "mock generator configured to fail".to_string(),
            });
        }

        let fragments = self.fragments.clone();
        let fail_after = self.fail_after;

        let stream = async_stream::stream! {
            for (i, fragment) in fragments.into_iter().enumerate() {
                if fail_after == Some(i) {
                    yield Err(AppError::GenerationError {
                        message: format!("mock stream failed after {} fragments", i),
                    });
                    return;
                }
                tokio::task::yield_now().await;
                yield Ok(fragment);
            }
        };

        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        "mock-generation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn fragments() -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    #[tokio::test]
    async fn test_replays_fragments_in_order() {
        let generator = MockGenerator::new(fragments());
        let items: Vec<_> = generator.generate_stream("p").await.unwrap().collect().await;
        let texts: Vec<String> = items.into_iter().map(|i| i.unwrap()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(generator.last_prompt().as_deref(), Some("p"));
    }

    #[tokio::test]
    async fn test_fails_mid_stream() {
        let generator = MockGenerator::failing_after(fragments(), 2);
        let items: Vec<_> = generator.generate_stream("p").await.unwrap().collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(items[1].is_ok());
        assert!(matches!(items[2], Err(AppError::GenerationError { .. })));
    }
}
