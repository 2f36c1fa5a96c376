//! Google Gemini streaming client
//!
//! Uses `models/{model}:streamGenerateContent?alt=sse`, which answers with
//! server-sent events. Every `data:` payload is a JSON response chunk whose
//! first candidate carries the next piece of text.

use super::{FragmentStream, Generator};
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

impl GeminiGenerator {
    /// Create a new Gemini generator
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        // Only the connect phase is bounded: a response may stream for a while.
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.stream_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::GenerationError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GenerationError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let model = self.model.clone();
        let mut body = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::default();
            let mut fragments = 0usize;

            while let Some(chunk) = body.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        metrics::record_generation_error(&model);
                        yield Err(AppError::GenerationError {
                            message: format!("Stream interrupted: {}", e),
                        });
                        return;
                    }
                };

                for payload in decoder.push(&bytes) {
                    match parse_payload(&payload) {
                        Ok(texts) => {
                            for text in texts {
                                fragments += 1;
                                yield Ok(text);
                            }
                        }
                        Err(e) => {
                            metrics::record_generation_error(&model);
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            for payload in decoder.finish() {
                match parse_payload(&payload) {
                    Ok(texts) => {
                        for text in texts {
                            fragments += 1;
                            yield Ok(text);
                        }
                    }
                    Err(e) => {
                        metrics::record_generation_error(&model);
                        yield Err(e);
                        return;
                    }
                }
            }

            debug!(model = %model, fragments, "Generation stream completed");
        };

        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Extract the text parts of one SSE payload
fn parse_payload(payload: &str) -> Result<Vec<String>> {
    let chunk: GenerateChunk = serde_json::from_str(payload).map_err(|e| {
        AppError::GenerationError {
            message: format!("Malformed stream chunk: {}", e),
        }
    })?;

    if let Some(error) = chunk.error {
        return Err(AppError::GenerationError {
            message: format!("API error {}: {}", error.code, error.message),
        });
    }

    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(AppError::GenerationError {
            message: format!("Prompt blocked: {}", reason),
        });
    }

    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return Ok(Vec::new());
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if matches!(reason, "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT") {
            warn!(finish_reason = reason, "Generation stopped by provider");
        }
    }

    Ok(candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default())
}

/// Incremental server-sent-events decoder
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across network chunks are reassembled. `data:` lines of
/// one event are joined with `\n`; a blank line ends the event.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            self.handle_line(line, &mut events);
        }

        events
    }

    fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            self.handle_line(line.trim_end_matches('\r'), &mut events);
        }
        self.dispatch(&mut events);
        events
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(events);
        } else if let Some(data) = line.strip_prefix("data:") {
            self.data.push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
        // Comments (":") and other fields (event, id, retry) are ignored.
    }

    fn dispatch(&mut self, events: &mut Vec<String>) {
        if self.data.is_empty() {
            return;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        if !payload.trim().is_empty() {
            events.push(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_decoder_handles_split_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        let events = decoder.push(b"1}\r\n\r\ndata: {\"b\":2}\n\n");
        assert_eq!(events, vec!["{\"a\":1}".to_string(), "{\"b\":2}".to_string()]);
    }

    #[test]
    fn test_sse_decoder_reassembles_utf8() {
        let mut decoder = SseDecoder::default();
        let bytes = "data: \"Πάντα ῥεῖ\"\n\n".as_bytes();
        let (head, tail) = bytes.split_at(10);
        let mut events = decoder.push(head);
        events.extend(decoder.push(tail));
        assert_eq!(events, vec!["\"Πάντα ῥεῖ\"".to_string()]);
    }

    #[test]
    fn test_sse_decoder_flushes_unterminated_event() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b": keep-alive\n").is_empty());
        assert!(decoder.push(b"data: {\"c\":3}").is_empty());
        assert_eq!(decoder.finish(), vec!["{\"c\":3}".to_string()]);
    }

    #[test]
    fn test_parse_payload_extracts_text() {
        let payload = r#"{"candidates":[{"content":{"parts":[{"text":"What is "},{"text":"in your control?"}],"role":"model"}}]}"#;
        let texts = parse_payload(payload).unwrap();
        assert_eq!(texts, vec!["What is ", "in your control?"]);
    }

    #[test]
    fn test_parse_payload_final_chunk_without_text() {
        let payload = r#"{"candidates":[{"finishReason":"STOP"}],"usageMetadata":{"totalTokenCount":42}}"#;
        assert!(parse_payload(payload).unwrap().is_empty());
    }

    #[test]
    fn test_parse_payload_error_object() {
        let payload = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = parse_payload(payload).unwrap_err();
        assert!(matches!(err, AppError::GenerationError { .. }));
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn test_parse_payload_blocked_prompt() {
        let payload = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert!(parse_payload(payload).is_err());
    }

    #[test]
    fn test_stream_url() {
        let generator = GeminiGenerator::new(
            "key".to_string(),
            "gemini-1.5-flash".to_string(),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            generator.stream_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:streamGenerateContent?alt=sse"
        );
    }
}
