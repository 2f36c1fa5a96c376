//! Error types for Phil services
//!
//! Provides a single error enum covering every stage of a chat turn:
//! - Request validation
//! - Embedding and vector index calls (the retrieval phase)
//! - Streaming generation
//!
//! Each error maps to a machine-readable code and an HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    InvalidRequest,

    // Rate limiting (6xxx)
    RateLimited,

    // External service errors (8xxx)
    EmbeddingError,
    RetrievalError,
    GenerationError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::InvalidRequest => 1001,
            ErrorCode::RateLimited => 6001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::RetrievalError => 8003,
            ErrorCode::GenerationError => 8004,
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
        }
    }
}

/// Pipeline stage in which a retrieval failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStage {
    Embedding,
    IndexQuery,
    IndexUpsert,
}

impl fmt::Display for RetrievalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalStage::Embedding => write!(f, "embedding"),
            RetrievalStage::IndexQuery => write!(f, "index query"),
            RetrievalStage::IndexUpsert => write!(f, "index upsert"),
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Retrieval failed during {stage}: {message}")]
    RetrievalError {
        stage: RetrievalStage,
        message: String,
    },

    #[error("Generation failed: {message}")]
    GenerationError { message: String },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    /// Shorthand for an `InvalidRequest`
    pub fn invalid(message: impl Into<String>) -> Self {
        AppError::InvalidRequest {
            message: message.into(),
        }
    }

    /// Wrap any error raised before generation into a `RetrievalError` for `stage`
    pub fn retrieval(stage: RetrievalStage, source: impl fmt::Display) -> Self {
        AppError::RetrievalError {
            stage,
            message: source.to_string(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::RetrievalError { .. } => ErrorCode::RetrievalError,
            AppError::GenerationError { .. } => ErrorCode::GenerationError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::EmbeddingError { .. }
            | AppError::RetrievalError { .. }
            | AppError::GenerationError { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let details = match &self {
            AppError::RetrievalError { stage, .. } => Some(serde_json::json!({ "stage": stage })),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_request_is_client_error() {
        let err = AppError::invalid("conversation has no messages");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
    }

    #[test]
    fn test_retrieval_error_names_stage() {
        let err = AppError::retrieval(RetrievalStage::Embedding, "quota exceeded");
        assert_eq!(err.code(), ErrorCode::RetrievalError);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "Retrieval failed during embedding: quota exceeded"
        );
    }

    #[test]
    fn test_upstream_errors_are_server_errors() {
        let generation = AppError::GenerationError {
            message: "stream reset".into(),
        };
        let embedding = AppError::EmbeddingError {
            message: "401".into(),
        };
        assert!(generation.is_server_error());
        assert!(embedding.is_server_error());
        assert_eq!(ErrorCode::GenerationError.as_code(), 8004);
    }
}
