//! Chat handler

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::AppState;
use phil_common::{
    errors::{AppError, Result},
    ChatMessage,
};

/// Chat request: the full conversation so far, oldest first
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1))]
    pub messages: Vec<ChatMessage>,
}

/// Stream a reply to the latest user message as plain text
///
/// Errors found before the first fragment come back as a JSON error body.
/// A failure after streaming has started aborts the response body.
pub async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = payload.map_err(|e| AppError::invalid(e.body_text()))?;

    request
        .validate()
        .map_err(|e| AppError::invalid(e.to_string()))?;

    info!(turns = request.messages.len(), "Chat request");

    let fragments = state.orchestrator.respond(&request.messages).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(fragments))
        .map_err(|e| AppError::Internal {
            message: format!("failed to build stream response: {}", e),
        })
}
