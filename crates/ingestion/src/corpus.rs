//! Corpus loading
//!
//! The corpus is a fixed set of plain-text files, one per philosopher, read
//! from a data directory. The file stem doubles as the document key stored
//! in index metadata.

use crate::errors::{IngestionError, Result};
use std::path::Path;
use tracing::info;

/// Document keys, in ingestion order
pub const CORPUS_KEYS: [&str; 3] = ["marcus_aurelius", "epictetus", "seneca"];

/// A source text and the key that identifies it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub key: String,
    pub text: String,
}

impl Document {
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

/// Read every corpus file from `dir`; a missing file fails the whole load
pub async fn load_corpus(dir: &Path) -> Result<Vec<Document>> {
    let mut documents = Vec::with_capacity(CORPUS_KEYS.len());

    for key in CORPUS_KEYS {
        let path = dir.join(format!("{}.txt", key));
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IngestionError::FileNotFound(path.display().to_string()));
            }
            Err(e) => {
                return Err(IngestionError::Read {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };

        info!(document = key, bytes = text.len(), "Loaded corpus file");
        documents.push(Document::new(key, text));
    }

    Ok(documents)
}
