//! Metrics and observability utilities
//!
//! Prometheus-style metrics for the chat pipeline and ingestion, all under
//! the `phil_` prefix.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all Phil metrics
pub const METRICS_PREFIX: &str = "phil";

/// Histogram buckets for upstream latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Chat metrics
    describe_counter!(
        format!("{}_chat_turns_total", METRICS_PREFIX),
        Unit::Count,
        "Chat turns by outcome"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embed + index query latency per chat turn"
    );

    describe_counter!(
        format!("{}_generation_fragments_total", METRICS_PREFIX),
        Unit::Count,
        "Text fragments forwarded to callers"
    );

    describe_counter!(
        format!("{}_generation_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Generation failures, including mid-stream"
    );

    // Index metrics
    describe_histogram!(
        format!("{}_index_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Vector index query latency in seconds"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    // Cache metrics
    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_chunks_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks embedded and upserted"
    );

    tracing::info!("Metrics registered");
}

/// Outcome of one chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Streamed,
    Rejected,
    RetrievalFailed,
    GenerationFailed,
}

impl TurnOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            TurnOutcome::Streamed => "streamed",
            TurnOutcome::Rejected => "rejected",
            TurnOutcome::RetrievalFailed => "retrieval_failed",
            TurnOutcome::GenerationFailed => "generation_failed",
        }
    }
}

/// Helper to record chat turn outcomes
pub fn record_chat_turn(outcome: TurnOutcome) {
    counter!(
        format!("{}_chat_turns_total", METRICS_PREFIX),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Helper to record retrieval latency
pub fn record_retrieval(duration_secs: f64, matches: usize) {
    histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        "matches" => matches.to_string()
    )
    .record(duration_secs);
}

/// Helper to record forwarded fragments
pub fn record_generation_fragment() {
    counter!(format!("{}_generation_fragments_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record generation failures
pub fn record_generation_error(model: &str) {
    counter!(
        format!("{}_generation_errors_total", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .increment(1);
}

/// Helper to record index query metrics
pub fn record_index_query(duration_secs: f64, result_count: usize) {
    histogram!(
        format!("{}_index_query_duration_seconds", METRICS_PREFIX),
        "results" => result_count.to_string()
    )
    .record(duration_secs);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    let name = if hit { "cache_hits_total" } else { "cache_misses_total" };
    counter!(
        format!("{}_{}", METRICS_PREFIX, name),
        "cache" => cache_name.to_string()
    )
    .increment(1);
}

/// Helper to record ingestion metrics
pub fn record_ingestion(document: &str, chunks: usize) {
    counter!(
        format!("{}_chunks_ingested_total", METRICS_PREFIX),
        "document" => document.to_string()
    )
    .increment(chunks as u64);
}
