//! Ingestion job error types

use phil_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Corpus file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Embedding of {id} failed: {source}")]
    Embed {
        id: String,
        #[source]
        source: AppError,
    },

    #[error("Upsert of {id} failed: {source}")]
    Upsert {
        id: String,
        #[source]
        source: AppError,
    },
}

pub type Result<T> = std::result::Result<T, IngestionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failing_stage() {
        let embed = IngestionError::Embed {
            id: "seneca-4".to_string(),
            source: AppError::EmbeddingError {
                message: "quota exceeded".to_string(),
            },
        };
        assert!(embed.to_string().starts_with("Embedding of seneca-4 failed"));

        let upsert = IngestionError::Upsert {
            id: "seneca-4".to_string(),
            source: AppError::invalid("bad vector"),
        };
        assert!(upsert.to_string().starts_with("Upsert of seneca-4 failed"));
    }
}
