//! In-memory vector index with brute-force similarity search.
//!
//! A [`VectorIndex`] is built once from segments and their vectors and is
//! immutable afterwards, so it can be shared behind an `Arc` and searched from
//! many tasks at once without locking. Rebuild it to change its contents.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::chunking::Chunker;
use crate::config::RagConfig;
use crate::document::{Document, SearchResult, Segment};
use crate::embedding::EmbeddingGateway;
use crate::engine::RetrieverQueryEngine;
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;
use crate::retriever::VectorRetriever;

/// The similarity function used to score stored vectors against a query.
///
/// Scores are always "higher is more similar".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    /// Cosine of the angle between the vectors. Zero vectors score 0.0.
    #[default]
    Cosine,
    /// Raw dot product.
    DotProduct,
    /// Negated Euclidean distance.
    Euclidean,
}

impl Similarity {
    /// Score `a` against `b`.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Similarity::Cosine => cosine_similarity(a, b),
            Similarity::DotProduct => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
            Similarity::Euclidean => {
                -a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
            }
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// A stored segment with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    /// The indexed segment.
    pub segment: Segment,
    /// The segment's embedding vector.
    pub vector: Vec<f32>,
}

/// An immutable set of (segment, vector) pairs for one corpus.
///
/// Invariants, checked by [`build`](VectorIndex::build) and
/// [`load`](VectorIndex::load):
/// - every vector has length [`dimensions`](VectorIndex::dimensions)
/// - segment ids are unique
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorIndex {
    dimensions: usize,
    similarity: Similarity,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Build an index from segments and their vectors, paired by position.
    ///
    /// The dimension is taken from the first vector. An empty input builds an
    /// empty index of dimension zero.
    ///
    /// # Errors
    ///
    /// - [`RagError::SizeMismatch`] if the counts differ
    /// - [`RagError::DimensionMismatch`] if vector lengths differ
    /// - [`RagError::InvalidInput`] on duplicate segment ids
    pub fn build(
        segments: Vec<Segment>,
        vectors: Vec<Vec<f32>>,
        similarity: Similarity,
    ) -> Result<Self> {
        if segments.len() != vectors.len() {
            return Err(RagError::SizeMismatch {
                segments: segments.len(),
                vectors: vectors.len(),
            });
        }
        let dimensions = vectors.first().map_or(0, Vec::len);
        let entries = segments
            .into_iter()
            .zip(vectors)
            .map(|(segment, vector)| IndexEntry { segment, vector })
            .collect();
        let index = Self { dimensions, similarity, entries };
        index.check_invariants()?;
        Ok(index)
    }

    /// Chunk, embed and index a set of documents in one pass.
    ///
    /// Segments keep document order, then segment order within each document.
    ///
    /// # Errors
    ///
    /// Returns the first chunking or embedding failure. Nothing is indexed
    /// unless every document succeeds.
    pub async fn from_documents(
        documents: &[Document],
        chunker: &dyn Chunker,
        gateway: &EmbeddingGateway,
        similarity: Similarity,
    ) -> Result<Self> {
        let mut segments = Vec::new();
        for document in documents {
            segments.extend(chunker.chunk(document)?);
        }

        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        let vectors = gateway.embed_texts(&texts).await?;
        let index = Self::build(segments, vectors, similarity)?;

        info!(
            document_count = documents.len(),
            segment_count = index.len(),
            dimensions = index.dimensions,
            "built vector index"
        );
        Ok(index)
    }

    /// Number of stored segments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no segments.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimensionality of the index.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Similarity function used for search.
    pub fn similarity(&self) -> Similarity {
        self.similarity
    }

    /// Stored segments, in insertion order.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.entries.iter().map(|e| &e.segment)
    }

    /// Look up a stored segment by id.
    pub fn get(&self, segment_id: &str) -> Option<&Segment> {
        self.segments().find(|s| s.id == segment_id)
    }

    /// Return the `k` segments most similar to `query`, best first.
    ///
    /// Equal scores keep insertion order. If `k` exceeds the index size every
    /// entry is returned once.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidInput`] if `k == 0`
    /// - [`RagError::DimensionMismatch`] if a non-empty index is queried with a
    ///   vector of the wrong length
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(RagError::InvalidInput("k must be greater than zero".to_string()));
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let score = self.similarity.score(&entry.vector, query);
                (i, if score.is_nan() { f32::NEG_INFINITY } else { score })
            })
            .collect();

        // `sort_by` is stable, which keeps insertion order among ties.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchResult { segment: self.entries[i].segment.clone(), score })
            .collect())
    }

    /// Write the index to `path` as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        info!(path = %path.as_ref().display(), segment_count = self.len(), "saved vector index");
        Ok(())
    }

    /// Read an index written by [`save`](VectorIndex::save).
    ///
    /// # Errors
    ///
    /// Besides I/O and parse errors, fails with the same errors as
    /// [`build`](VectorIndex::build) if the file violates an index invariant.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let index: VectorIndex = serde_json::from_reader(std::io::BufReader::new(file))?;
        index.check_invariants()?;
        info!(path = %path.as_ref().display(), segment_count = index.len(), "loaded vector index");
        Ok(index)
    }

    /// Bind this index to a gateway and a fixed `k`.
    ///
    /// # Errors
    ///
    /// See [`VectorRetriever::new`].
    pub fn as_retriever(
        self: &Arc<Self>,
        gateway: Arc<EmbeddingGateway>,
        k: usize,
    ) -> Result<VectorRetriever> {
        VectorRetriever::new(Arc::clone(self), gateway, k)
    }

    /// Bind this index to a gateway, a language model and a fixed `k`.
    ///
    /// # Errors
    ///
    /// See [`VectorRetriever::new`].
    pub fn as_query_engine(
        self: &Arc<Self>,
        gateway: Arc<EmbeddingGateway>,
        llm: Arc<dyn LanguageModel>,
        k: usize,
    ) -> Result<RetrieverQueryEngine> {
        let retriever = self.as_retriever(gateway, k)?;
        Ok(RetrieverQueryEngine::new(Arc::new(retriever), llm))
    }

    /// Bind this index using `top_k` and `similarity_threshold` from `config`.
    ///
    /// # Errors
    ///
    /// See [`VectorRetriever::new`].
    pub fn as_retriever_with_config(
        self: &Arc<Self>,
        gateway: Arc<EmbeddingGateway>,
        config: &RagConfig,
    ) -> Result<VectorRetriever> {
        let retriever = self.as_retriever(gateway, config.top_k)?;
        Ok(match config.similarity_threshold {
            Some(threshold) => retriever.with_similarity_threshold(threshold),
            None => retriever,
        })
    }

    /// Bind a query engine with every retrieval and synthesis setting from
    /// `config`.
    ///
    /// # Errors
    ///
    /// See [`VectorRetriever::new`].
    pub fn as_query_engine_with_config(
        self: &Arc<Self>,
        gateway: Arc<EmbeddingGateway>,
        llm: Arc<dyn LanguageModel>,
        config: &RagConfig,
    ) -> Result<RetrieverQueryEngine> {
        let retriever = self.as_retriever_with_config(gateway, config)?;
        Ok(RetrieverQueryEngine::new(Arc::new(retriever), llm).with_config(config))
    }

    fn check_invariants(&self) -> Result<()> {
        if let Some(bad) = self.entries.iter().find(|e| e.vector.len() != self.dimensions) {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: bad.vector.len(),
            });
        }
        let mut seen = HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !seen.insert(entry.segment.id.as_str()) {
                return Err(RagError::InvalidInput(format!(
                    "duplicate segment id '{}'",
                    entry.segment.id
                )));
            }
        }
        Ok(())
    }
}

/// Chunk, embed and index `documents` using the chunking, batching and
/// similarity settings from `config`.
///
/// Uses a [`SentenceChunker`](crate::chunking::SentenceChunker).
pub async fn build_index(
    documents: &[Document],
    config: &RagConfig,
    gateway: &EmbeddingGateway,
) -> Result<VectorIndex> {
    config.validate()?;
    let chunker = crate::chunking::SentenceChunker::from_config(config);
    VectorIndex::from_documents(documents, &chunker, gateway, config.similarity).await
}
