//! Retrievers: turn a query string into ranked segments.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::document::SearchResult;
use crate::embedding::EmbeddingGateway;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// Something that can fetch the segments most relevant to a query.
///
/// The evaluation harness depends only on this trait, so any ranking
/// strategy can be scored the same way.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return relevant segments for `query`, best first.
    async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>>;

    /// Same as [`retrieve`](Retriever::retrieve) with a one-off result count.
    ///
    /// The default ignores `top_k` and truncates the normal result list.
    async fn retrieve_top_k(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let mut results = self.retrieve(query).await?;
        results.truncate(top_k);
        Ok(results)
    }
}

/// A [`VectorIndex`] bound to an [`EmbeddingGateway`] and a fixed `k`.
#[derive(Debug, Clone)]
pub struct VectorRetriever {
    index: Arc<VectorIndex>,
    gateway: Arc<EmbeddingGateway>,
    top_k: usize,
    similarity_threshold: Option<f32>,
}

impl VectorRetriever {
    /// Create a retriever returning at most `top_k` results per query.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidInput`] if `top_k == 0`
    /// - [`RagError::DimensionMismatch`] if the gateway's vectors do not fit a
    ///   non-empty index
    pub fn new(
        index: Arc<VectorIndex>,
        gateway: Arc<EmbeddingGateway>,
        top_k: usize,
    ) -> Result<Self> {
        if top_k == 0 {
            return Err(RagError::InvalidInput("top_k must be greater than zero".to_string()));
        }
        if !index.is_empty() && index.dimensions() != gateway.dimensions() {
            return Err(RagError::DimensionMismatch {
                expected: index.dimensions(),
                actual: gateway.dimensions(),
            });
        }
        Ok(Self { index, gateway, top_k, similarity_threshold: None })
    }

    /// Drop results scoring below `threshold`.
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    /// The bound index.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// The bound result count.
    pub fn top_k(&self) -> usize {
        self.top_k
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.retrieve_top_k(query, self.top_k).await
    }

    async fn retrieve_top_k(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if self.index.is_empty() {
            return Err(RagError::EmptyIndex);
        }
        let query_vector = self.gateway.embed_query(query).await?;
        let mut results = self.index.search(&query_vector, top_k)?;
        if let Some(threshold) = self.similarity_threshold {
            results.retain(|r| r.score >= threshold);
        }
        debug!(result_count = results.len(), top_k, "retrieved segments");
        Ok(results)
    }
}
