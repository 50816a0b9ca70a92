//! Embedding providers and the batching, caching gateway in front of them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// Implementations report throttling as [`RagError::RateLimited`] and every
/// other service failure as [`RagError::UpstreamUnavailable`]. They never retry.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Batches and caches embedding requests for one [`EmbeddingProvider`].
///
/// Identical texts passed to [`embed_texts`](Self::embed_texts) are sent to
/// the provider once per gateway lifetime. The cache is never evicted, so it
/// grows with the corpus; use [`clear_cache`](Self::clear_cache) between
/// indexing runs. Query texts read the cache but are not added to it. Every
/// vector returned by the provider is checked against
/// [`dimensions`](EmbeddingProvider::dimensions).
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use ragkit_core::{EmbeddingGateway, HashingEmbedder};
///
/// let gateway = EmbeddingGateway::new(Arc::new(HashingEmbedder::new(64)), 16);
/// let vectors = gateway.embed_texts(&["first", "second"]).await?;
/// ```
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    cache: RwLock<HashMap<String, Vec<f32>>>,
}

impl EmbeddingGateway {
    /// Create a gateway that sends at most `batch_size` texts per provider call.
    ///
    /// A `batch_size` of zero is treated as one.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self { provider, batch_size: batch_size.max(1), cache: RwLock::new(HashMap::new()) }
    }

    /// Dimensionality of every vector this gateway returns.
    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Number of distinct texts currently cached.
    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Drop every cached vector.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    /// Embed a single query text.
    ///
    /// A cached vector is reused; a fresh one is not cached.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.cache.read().await.get(text) {
            return Ok(vector.clone());
        }
        let mut vectors = self.embed_batch_checked(&[text]).await?;
        vectors.pop().ok_or(RagError::SizeMismatch { segments: 1, vectors: 0 })
    }

    /// Embed many texts, returning one vector per input in input order.
    ///
    /// # Errors
    ///
    /// Propagates provider failures unchanged. Returns
    /// [`RagError::SizeMismatch`] if the provider returns the wrong number of
    /// vectors for a batch and [`RagError::DimensionMismatch`] if a vector has
    /// the wrong length.
    pub async fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut missing: Vec<&str> = {
            let cache = self.cache.read().await;
            texts.iter().copied().filter(|t| !cache.contains_key(*t)).collect()
        };
        missing.sort_unstable();
        missing.dedup();

        for batch in missing.chunks(self.batch_size) {
            let vectors = self.embed_batch_checked(batch).await?;
            let mut cache = self.cache.write().await;
            for (text, vector) in batch.iter().zip(vectors) {
                cache.insert((*text).to_string(), vector);
            }
        }

        let cache = self.cache.read().await;
        texts
            .iter()
            .map(|t| {
                cache.get(*t).cloned().ok_or_else(|| {
                    RagError::upstream("embedding cache", format!("no vector cached for '{t}'"))
                })
            })
            .collect()
    }

    async fn embed_batch_checked(&self, batch: &[&str]) -> Result<Vec<Vec<f32>>> {
        debug!(batch_size = batch.len(), "embedding batch");
        let vectors = self.provider.embed_batch(batch).await.map_err(|e| {
            error!(error = %e, "embedding provider failed");
            e
        })?;
        if vectors.len() != batch.len() {
            return Err(RagError::SizeMismatch { segments: batch.len(), vectors: vectors.len() });
        }
        let expected = self.provider.dimensions();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(RagError::DimensionMismatch { expected, actual: bad.len() });
        }
        Ok(vectors)
    }
}

impl std::fmt::Debug for EmbeddingGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingGateway")
            .field("dimensions", &self.provider.dimensions())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}
