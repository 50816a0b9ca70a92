//! Query engines: answer a natural-language query with cited context.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::RagConfig;
use crate::document::{SearchResult, Segment};
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;
use crate::retriever::Retriever;
use crate::synthesizer::ResponseSynthesizer;

/// A question plus optional per-call parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    /// The question text.
    pub text: String,
    /// Overrides the engine's bound result count for this call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl Query {
    /// Create a query with the engine's default parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), top_k: None }
    }

    /// Override the number of segments retrieved for this query.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::new(text)
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::new(text)
    }
}

/// A segment used as supporting context for a [`Response`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceNode {
    /// The supporting segment.
    pub segment: Segment,
    /// Retrieval score, when the segment came from a similarity search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl From<SearchResult> for SourceNode {
    fn from(result: SearchResult) -> Self {
        Self { segment: result.segment, score: Some(result.score) }
    }
}

/// A synthesized answer with the context it was generated from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// The answer text.
    pub text: String,
    /// Supporting context, in the order it was given to the model.
    pub sources: Vec<SourceNode>,
}

impl Response {
    /// Texts of the supporting segments, in order.
    pub fn source_texts(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.segment.text.as_str()).collect()
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Anything that can answer a [`Query`].
///
/// Callers and the evaluation harness hold engines as `Arc<dyn QueryEngine>`
/// and never depend on a concrete engine type.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Answer `query`.
    async fn query(&self, query: &Query) -> Result<Response>;
}

/// Retrieve-then-synthesize query engine.
///
/// Embeds the query, retrieves the top segments, and asks a language model to
/// answer from them.
///
/// # Example
///
/// ```rust,ignore
/// use ragkit_core::{Query, QueryEngine};
///
/// let engine = index.as_query_engine(gateway, llm, 3)?;
/// let response = engine.query(&Query::new("What was Uber's revenue?")).await?;
/// for source in &response.sources {
///     println!("{} ({:?})", source.segment.id, source.score);
/// }
/// ```
pub struct RetrieverQueryEngine {
    retriever: Arc<dyn Retriever>,
    synthesizer: ResponseSynthesizer,
    similarity_threshold: Option<f32>,
}

impl RetrieverQueryEngine {
    /// Create an engine with a compact-mode synthesizer.
    pub fn new(retriever: Arc<dyn Retriever>, llm: Arc<dyn LanguageModel>) -> Self {
        Self { retriever, synthesizer: ResponseSynthesizer::new(llm), similarity_threshold: None }
    }

    /// Replace the synthesizer.
    pub fn with_synthesizer(mut self, synthesizer: ResponseSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Drop retrieved segments scoring below `threshold` before synthesis.
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    /// Apply the similarity threshold, response mode and citation settings
    /// from `config`.
    ///
    /// `top_k` is fixed by the retriever; bind it with
    /// [`VectorIndex::as_query_engine_with_config`](crate::VectorIndex::as_query_engine_with_config).
    pub fn with_config(mut self, config: &RagConfig) -> Self {
        self.synthesizer = self
            .synthesizer
            .with_mode(config.response_mode)
            .with_citations(config.citations);
        self.similarity_threshold = config.similarity_threshold;
        self
    }

    /// The retriever this engine reads from.
    pub fn retriever(&self) -> &Arc<dyn Retriever> {
        &self.retriever
    }
}

#[async_trait]
impl QueryEngine for RetrieverQueryEngine {
    async fn query(&self, query: &Query) -> Result<Response> {
        if query.text.trim().is_empty() {
            return Err(RagError::InvalidInput("query text is empty".to_string()));
        }

        let mut results = match query.top_k {
            Some(top_k) => self.retriever.retrieve_top_k(&query.text, top_k).await?,
            None => self.retriever.retrieve(&query.text).await?,
        };
        if let Some(threshold) = self.similarity_threshold {
            results.retain(|r| r.score >= threshold);
        }
        let sources: Vec<SourceNode> = results.into_iter().map(SourceNode::from).collect();

        let text = self.synthesizer.synthesize(&query.text, &sources).await?;
        info!(source_count = sources.len(), "query completed");

        Ok(Response { text, sources })
    }
}

impl std::fmt::Debug for RetrieverQueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrieverQueryEngine")
            .field("synthesizer", &self.synthesizer)
            .field("similarity_threshold", &self.similarity_threshold)
            .finish_non_exhaustive()
    }
}
