//! Runs query engines and judged evaluators over many queries with bounded concurrency.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use ragkit_core::{Query, QueryEngine, RagError, Response, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::dataset::QaPairSet;
use crate::response::{EvaluationResult, Evaluator};

/// Per-evaluator results for a batch, plus the responses they judged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchEvalReport {
    /// Query ids, in input order.
    pub query_ids: Vec<String>,
    /// Generated responses, in input order.
    pub responses: Vec<Response>,
    /// Evaluator name to one result per query, in input order.
    pub results: BTreeMap<String, Vec<EvaluationResult>>,
}

impl BatchEvalReport {
    /// Fraction of passing results for `evaluator`, or `None` if it did not run.
    ///
    /// An empty batch scores 0.0.
    pub fn score(&self, evaluator: &str) -> Option<f64> {
        self.results.get(evaluator).map(|results| {
            if results.is_empty() {
                0.0
            } else {
                results.iter().filter(|r| r.passing).count() as f64 / results.len() as f64
            }
        })
    }

    /// Every evaluator's score.
    pub fn scores(&self) -> BTreeMap<String, f64> {
        self.results.keys().filter_map(|name| Some((name.clone(), self.score(name)?))).collect()
    }
}

/// Generates a response per query and runs every evaluator on it.
///
/// At most `workers` engine or judge calls are in flight at once. Results
/// keep query order regardless of completion order.
///
/// # Example
///
/// ```rust,ignore
/// use ragkit_eval::{BatchEvalRunner, FaithfulnessEvaluator, RelevancyEvaluator};
///
/// let runner = BatchEvalRunner::new(8)
///     .with_evaluator(Arc::new(FaithfulnessEvaluator::new(judge.clone())))
///     .with_evaluator(Arc::new(RelevancyEvaluator::new(judge)));
/// let report = runner.evaluate_queries(engine.as_ref(), &questions).await?;
/// println!("faithfulness: {:?}", report.score("faithfulness"));
/// ```
pub struct BatchEvalRunner {
    evaluators: Vec<Arc<dyn Evaluator>>,
    workers: usize,
}

impl BatchEvalRunner {
    /// Create a runner allowing `workers` concurrent calls (at least one).
    pub fn new(workers: usize) -> Self {
        Self { evaluators: Vec::new(), workers: workers.max(1) }
    }

    /// Add an evaluator. Evaluators are keyed by [`Evaluator::name`], so
    /// names must be unique within a runner.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    /// Evaluate free-text queries. Each query's text doubles as its id.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidInput`] if two evaluators share a name
    /// - [`RagError::EvaluationFailed`] for the first query, in input order,
    ///   whose response could not be generated
    pub async fn evaluate_queries(
        &self,
        engine: &dyn QueryEngine,
        queries: &[String],
    ) -> Result<BatchEvalReport> {
        let items = queries.iter().map(|q| (q.as_str(), q.as_str())).collect();
        self.run(engine, items).await
    }

    /// Evaluate every query in `dataset`, keyed by query id.
    ///
    /// # Errors
    ///
    /// As for [`evaluate_queries`](Self::evaluate_queries).
    pub async fn evaluate_dataset(
        &self,
        engine: &dyn QueryEngine,
        dataset: &QaPairSet,
    ) -> Result<BatchEvalReport> {
        self.run(engine, dataset.queries().collect()).await
    }

    async fn run(
        &self,
        engine: &dyn QueryEngine,
        items: Vec<(&str, &str)>,
    ) -> Result<BatchEvalReport> {
        let mut names = HashSet::with_capacity(self.evaluators.len());
        let duplicate = self.evaluators.iter().map(|e| e.name()).find(|name| !names.insert(*name));
        if let Some(duplicate) = duplicate {
            return Err(RagError::InvalidInput(format!("duplicate evaluator name '{duplicate}'")));
        }

        let semaphore = Semaphore::new(self.workers);
        let outcomes =
            join_all(items.iter().map(|(id, query)| self.run_one(&semaphore, engine, id, query)))
                .await;

        let mut report = BatchEvalReport::default();
        for evaluator in &self.evaluators {
            report.results.insert(evaluator.name().to_string(), Vec::with_capacity(items.len()));
        }
        for ((id, _), outcome) in items.iter().zip(outcomes) {
            let (response, checks) = outcome?;
            report.query_ids.push((*id).to_string());
            report.responses.push(response);
            for (evaluator, result) in self.evaluators.iter().zip(checks) {
                if let Some(results) = report.results.get_mut(evaluator.name()) {
                    results.push(result);
                }
            }
        }

        info!(
            query_count = report.query_ids.len(),
            scores = ?report.scores(),
            "batch evaluation completed"
        );
        Ok(report)
    }

    async fn run_one(
        &self,
        semaphore: &Semaphore,
        engine: &dyn QueryEngine,
        query_id: &str,
        query: &str,
    ) -> Result<(Response, Vec<EvaluationResult>)> {
        let fail = |e: RagError| RagError::EvaluationFailed {
            query_id: query_id.to_string(),
            source: Box::new(e),
        };

        let response = {
            let _permit = semaphore.acquire().await.map_err(|e| fail(closed(e)))?;
            engine.query(&Query::new(query)).await.map_err(|e| {
                warn!(query.id = %query_id, error = %e, "response generation failed");
                fail(e)
            })?
        };

        let judged = &response;
        let checks = join_all(self.evaluators.iter().map(|evaluator| async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(e) => return EvaluationResult::invalid(query, Some(judged), e.to_string()),
            };
            match evaluator.evaluate(query, judged).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(
                        query.id = %query_id,
                        evaluator = evaluator.name(),
                        error = %e,
                        "judge failed"
                    );
                    EvaluationResult::invalid(query, Some(judged), e.to_string())
                }
            }
        }))
        .await;

        Ok((response, checks))
    }
}

fn closed(e: tokio::sync::AcquireError) -> RagError {
    RagError::upstream("batch evaluation", e.to_string())
}

impl std::fmt::Debug for BatchEvalRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.evaluators.iter().map(|e| e.name()).collect();
        f.debug_struct("BatchEvalRunner")
            .field("evaluators", &names)
            .field("workers", &self.workers)
            .finish()
    }
}
