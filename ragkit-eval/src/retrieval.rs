//! Retrieval quality metrics: hit rate, MRR, precision and recall.
//!
//! The metric functions compare retrieved segment ids with the expected ids
//! for one query. Only exact id matches count.

use std::collections::HashSet;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use ragkit_core::{RagError, Result, Retriever};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::QaPairSet;

/// 1.0 if any expected id appears in `retrieved`, else 0.0.
pub fn hit_rate(expected: &[String], retrieved: &[String]) -> f64 {
    if retrieved.iter().any(|id| expected.contains(id)) { 1.0 } else { 0.0 }
}

/// 1 / (1-based rank of the first expected id in `retrieved`), or 0.0 if none appears.
pub fn reciprocal_rank(expected: &[String], retrieved: &[String]) -> f64 {
    retrieved
        .iter()
        .position(|id| expected.contains(id))
        .map_or(0.0, |rank| 1.0 / (rank + 1) as f64)
}

/// Fraction of retrieved ids that are expected. 0.0 when nothing was retrieved.
pub fn precision(expected: &[String], retrieved: &[String]) -> f64 {
    if retrieved.is_empty() {
        return 0.0;
    }
    let hits = retrieved.iter().filter(|id| expected.contains(id)).count();
    hits as f64 / retrieved.len() as f64
}

/// Fraction of distinct expected ids that were retrieved. 0.0 when nothing is expected.
pub fn recall(expected: &[String], retrieved: &[String]) -> f64 {
    let expected: HashSet<&String> = expected.iter().collect();
    if expected.is_empty() {
        return 0.0;
    }
    let found = retrieved.iter().filter(|id| expected.contains(id)).collect::<HashSet<_>>();
    found.len() as f64 / expected.len() as f64
}

/// Per-query retrieval outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalEvalResult {
    pub query_id: String,
    pub query: String,
    pub expected_ids: Vec<String>,
    /// Retrieved segment ids, best first.
    pub retrieved_ids: Vec<String>,
    pub hit_rate: f64,
    pub mrr: f64,
    pub precision: f64,
    pub recall: f64,
}

/// Per-query results plus their means.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalReport {
    /// Results in dataset order.
    pub results: Vec<RetrievalEvalResult>,
    pub hit_rate: f64,
    pub mrr: f64,
    pub precision: f64,
    pub recall: f64,
}

impl RetrievalReport {
    /// Aggregate per-query results. Every mean is 0.0 for an empty list.
    pub fn from_results(results: Vec<RetrievalEvalResult>) -> Self {
        let mean = |metric: fn(&RetrievalEvalResult) -> f64| {
            if results.is_empty() {
                0.0
            } else {
                results.iter().map(metric).sum::<f64>() / results.len() as f64
            }
        };
        Self {
            hit_rate: mean(|r| r.hit_rate),
            mrr: mean(|r| r.mrr),
            precision: mean(|r| r.precision),
            recall: mean(|r| r.recall),
            results,
        }
    }
}

/// Scores any [`Retriever`] against a [`QaPairSet`].
pub struct RetrieverEvaluator {
    retriever: Arc<dyn Retriever>,
    workers: usize,
}

impl RetrieverEvaluator {
    /// Evaluate `retriever`, one query at a time by default.
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self { retriever, workers: 1 }
    }

    /// Allow up to `workers` retrievals in flight at once.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Retrieve for one query and score the result.
    ///
    /// # Errors
    ///
    /// [`RagError::EvaluationFailed`] naming `query_id` if retrieval fails.
    pub async fn evaluate(
        &self,
        query_id: &str,
        query: &str,
        expected_ids: &[String],
    ) -> Result<RetrievalEvalResult> {
        let retrieved = self.retriever.retrieve(query).await.map_err(|e| {
            warn!(query.id = %query_id, error = %e, "retrieval failed");
            RagError::EvaluationFailed { query_id: query_id.to_string(), source: Box::new(e) }
        })?;
        let retrieved_ids: Vec<String> = retrieved.into_iter().map(|r| r.segment.id).collect();

        Ok(RetrievalEvalResult {
            query_id: query_id.to_string(),
            query: query.to_string(),
            hit_rate: hit_rate(expected_ids, &retrieved_ids),
            mrr: reciprocal_rank(expected_ids, &retrieved_ids),
            precision: precision(expected_ids, &retrieved_ids),
            recall: recall(expected_ids, &retrieved_ids),
            expected_ids: expected_ids.to_vec(),
            retrieved_ids,
        })
    }

    /// Evaluate every pair in `dataset`.
    ///
    /// # Errors
    ///
    /// The first [`RagError::EvaluationFailed`] in dataset order.
    pub async fn evaluate_dataset(&self, dataset: &QaPairSet) -> Result<RetrievalReport> {
        let results: Vec<RetrievalEvalResult> = stream::iter(dataset.pairs())
            .map(|pair| self.evaluate(&pair.id, &pair.query, &pair.expected_segment_ids))
            .buffered(self.workers)
            .try_collect()
            .await?;

        let report = RetrievalReport::from_results(results);
        info!(
            query_count = report.results.len(),
            hit_rate = report.hit_rate,
            mrr = report.mrr,
            "retrieval evaluation completed"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for RetrieverEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrieverEvaluator").field("workers", &self.workers).finish_non_exhaustive()
    }
}
