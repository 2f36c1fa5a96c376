//! In-memory [`VectorIndex`] for tests and offline development.
//!
//! Entries live in a `BTreeMap` keyed by id behind a `std::sync::RwLock`.
//! Queries are brute-force cosine similarity; equal scores are ordered by
//! ascending id so results are deterministic for a given index state.

use super::{IndexEntry, IndexMatch, IndexQuery, IndexStats, VectorIndex};
use crate::errors::{AppError, Result, RetrievalStage};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

pub struct InMemoryIndex {
    entries: RwLock<BTreeMap<String, IndexEntry>>,
    queries: AtomicUsize,
    upserts: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            queries: AtomicUsize::new(0),
            upserts: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail with a `RetrievalError`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `query` calls made so far
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of `upsert` calls made so far
    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Snapshot of all entries ordered by id
    pub fn entries(&self) -> Vec<IndexEntry> {
        self.entries
            .read()
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, stage: RetrievalStage) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::retrieval(stage, "in-memory index configured to fail"));
        }
        Ok(())
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

fn poisoned(stage: RetrievalStage) -> AppError {
    AppError::retrieval(stage, "in-memory index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.check(RetrievalStage::IndexUpsert)?;

        let mut stored = self
            .entries
            .write()
            .map_err(|_| poisoned(RetrievalStage::IndexUpsert))?;
        for entry in entries {
            stored.insert(entry.id.clone(), entry);
        }
        Ok(())
    }

    async fn query(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.check(RetrievalStage::IndexQuery)?;

        let stored = self
            .entries
            .read()
            .map_err(|_| poisoned(RetrievalStage::IndexQuery))?;

        // BTreeMap iteration is id-ordered and the sort is stable, so ties keep id order.
        let mut scored: Vec<(f32, &IndexEntry)> = stored
            .values()
            .map(|entry| (cosine_sim(&query.vector, &entry.values), entry))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(query.top_k)
            .map(|(score, entry)| IndexMatch {
                id: entry.id.clone(),
                score,
                metadata: query.include_metadata.then(|| entry.metadata.clone()),
            })
            .collect())
    }

    async fn stats(&self) -> Result<IndexStats> {
        self.check(RetrievalStage::IndexQuery)?;
        let stored = self
            .entries
            .read()
            .map_err(|_| poisoned(RetrievalStage::IndexQuery))?;

        Ok(IndexStats {
            total_vector_count: stored.len() as u64,
            dimension: stored.values().next().map(|e| e.values.len()),
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}
