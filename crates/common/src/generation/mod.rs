//! Streaming text generation
//!
//! A [`Generator`] turns a prompt into a lazy, ordered, finite stream of text
//! fragments. The stream is consumed once. Upstream failures arrive as an
//! `Err` item and end the stream; they are never swallowed.

mod gemini;
mod mock;

pub use gemini::GeminiGenerator;
pub use mock::MockGenerator;

use crate::config::GenerationConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Boxed stream of generated text fragments
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Trait for streaming language-model providers
#[async_trait]
pub trait Generator: Send + Sync {
    /// Start generating a response to `prompt`
    ///
    /// Errors returned here happen before any fragment is produced; errors
    /// after that are delivered through the stream.
    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create a generator based on configuration
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "gemini" => {
            let key = config
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| AppError::Configuration {
                    message: "Gemini API key required (generation.api_key or GEMINI_API_KEY)".to_string(),
                })?;
            Ok(Arc::new(GeminiGenerator::new(
                key,
                config.model.clone(),
                config.api_base.clone(),
                Duration::from_secs(config.connect_timeout_secs),
            )?))
        }
        "mock" => Ok(Arc::new(MockGenerator::new(vec![
            "What within this situation ".to_string(),
            "is truly in your control?".to_string(),
        ]))),
        other => Err(AppError::Configuration {
            message: format!("Unknown generation provider: {}", other),
        }),
    }
}
