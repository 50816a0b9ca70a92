//! # ragkit-eval
//!
//! Evaluation harness for ragkit retrievers and query engines.
//!
//! ## Overview
//!
//! - [`QaPairGenerator`] - asks a model for questions answerable from each segment
//! - [`QaPairSet`] - question to expected-segment mapping, persisted as JSON
//! - [`RetrieverEvaluator`] - hit rate, MRR, precision and recall for any [`Retriever`](ragkit_core::Retriever)
//! - [`FaithfulnessEvaluator`] / [`RelevancyEvaluator`] - YES/NO judgements by a judge model
//! - [`BatchEvalRunner`] - runs an engine and its judges over many queries with bounded concurrency
//!
//! Errors are [`ragkit_core::RagError`]; evaluation failures surface as
//! [`RagError::EvaluationFailed`](ragkit_core::RagError::EvaluationFailed)
//! naming the query.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ragkit_eval::{EvalConfig, QaPairGenerator, RetrieverEvaluator};
//!
//! let dataset = QaPairGenerator::new(llm, EvalConfig::default())?.generate(&segments).await?;
//! let report = RetrieverEvaluator::new(retriever).evaluate_dataset(&dataset).await?;
//! println!("hit rate {:.2}, MRR {:.2}", report.hit_rate, report.mrr);
//! ```

pub mod batch;
pub mod config;
pub mod dataset;
pub mod generate;
pub mod response;
pub mod retrieval;

pub use batch::{BatchEvalReport, BatchEvalRunner};
pub use config::{EvalConfig, EvalConfigBuilder, FailurePolicy};
pub use dataset::{QaPair, QaPairSet};
pub use generate::QaPairGenerator;
pub use response::{
    EvaluationResult, Evaluator, FaithfulnessEvaluator, JudgeVerdict, RelevancyEvaluator,
};
pub use retrieval::{
    RetrievalEvalResult, RetrievalReport, RetrieverEvaluator, hit_rate, precision, recall,
    reciprocal_rank,
};
