//! Pinecone vector index client
//!
//! Talks to the index data plane directly (`{host}/vectors/upsert`,
//! `{host}/query`, `{host}/describe_index_stats`).

use super::{ChunkMetadata, IndexEntry, IndexMatch, IndexQuery, IndexStats, VectorIndex};
use crate::errors::{AppError, Result, RetrievalStage};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

const API_VERSION: &str = "2024-07";

/// Pinecone accepts at most this many vectors per upsert request
const MAX_UPSERT_BATCH: usize = 100;

pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    host: String,
    name: String,
    namespace: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertRequest<'a> {
    vectors: &'a [IndexEntry],
    namespace: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    namespace: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: f32,
    metadata: Option<WireMetadata>,
}

// Pinecone returns every metadata number as a float.
#[derive(Deserialize)]
struct WireMetadata {
    #[serde(default)]
    text: String,
    #[serde(default)]
    philosopher: String,
    #[serde(default)]
    chunk: f64,
}

impl From<WireMetadata> for ChunkMetadata {
    fn from(wire: WireMetadata) -> Self {
        ChunkMetadata {
            text: wire.text,
            philosopher: wire.philosopher,
            chunk: wire.chunk.max(0.0) as usize,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    total_vector_count: u64,
    dimension: Option<usize>,
}

impl PineconeIndex {
    pub fn new(
        api_key: String,
        host: String,
        name: String,
        namespace: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{}", host)
        };

        Ok(Self {
            client,
            api_key,
            host: host.trim_end_matches('/').to_string(),
            name,
            namespace,
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        stage: RetrievalStage,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.host, path);

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::retrieval(stage, format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::retrieval(
                stage,
                format!("Pinecone error {}: {}", status, body),
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()> {
        for batch in entries.chunks(MAX_UPSERT_BATCH) {
            let request = UpsertRequest {
                vectors: batch,
                namespace: &self.namespace,
            };
            self.post("/vectors/upsert", &request, RetrievalStage::IndexUpsert)
                .await?;
            debug!(index = %self.name, count = batch.len(), "Upserted vectors");
        }
        Ok(())
    }

    async fn query(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>> {
        let start = Instant::now();
        let request = QueryRequest {
            vector: &query.vector,
            top_k: query.top_k,
            include_metadata: query.include_metadata,
            include_values: false,
            namespace: &self.namespace,
        };

        let response = self
            .post("/query", &request, RetrievalStage::IndexQuery)
            .await?;
        let parsed: QueryResponse = response.json().await.map_err(|e| {
            AppError::retrieval(
                RetrievalStage::IndexQuery,
                format!("Failed to parse response: {}", e),
            )
        })?;

        let matches: Vec<IndexMatch> = parsed
            .matches
            .into_iter()
            .map(|m| IndexMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata.map(ChunkMetadata::from),
            })
            .collect();

        metrics::record_index_query(start.elapsed().as_secs_f64(), matches.len());
        Ok(matches)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let response = self
            .post(
                "/describe_index_stats",
                &serde_json::json!({}),
                RetrievalStage::IndexQuery,
            )
            .await?;
        let stats: StatsResponse = response.json().await.map_err(|e| {
            AppError::retrieval(
                RetrievalStage::IndexQuery,
                format!("Failed to parse stats: {}", e),
            )
        })?;

        Ok(IndexStats {
            total_vector_count: stats.total_vector_count,
            dimension: stats.dimension,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_request_wire_shape() {
        let vector = [0.1f32, 0.2];
        let request = QueryRequest {
            vector: &vector,
            top_k: 3,
            include_metadata: true,
            include_values: false,
            namespace: "",
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["topK"], 3);
        assert_eq!(value["includeMetadata"], true);
        assert_eq!(value["includeValues"], false);
    }

    #[test]
    fn test_query_response_parses_float_chunk_index() {
        let body = r#"{
            "matches": [
                {"id": "seneca-4", "score": 0.91,
                 "metadata": {"text": "On anger...", "philosopher": "seneca", "chunk": 4.0}},
                {"id": "epictetus-1", "score": 0.87}
            ],
            "namespace": ""
        }"#;
        let parsed: QueryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.matches.len(), 2);

        let first = parsed.matches.into_iter().next().unwrap();
        let metadata = ChunkMetadata::from(first.metadata.unwrap());
        assert_eq!(metadata.chunk, 4);
        assert_eq!(metadata.philosopher, "seneca");
    }

    #[test]
    fn test_host_gets_scheme() {
        let index = PineconeIndex::new(
            "pc-test".to_string(),
            "phil-abc.svc.pinecone.io/".to_string(),
            "phil".to_string(),
            String::new(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(index.host, "https://phil-abc.svc.pinecone.io");
        assert_eq!(index.name(), "phil");
    }
}
