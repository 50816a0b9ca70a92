//! # ragkit-core
//!
//! Retrieval-augmented generation over document collections.
//!
//! ## Overview
//!
//! This crate turns raw documents into a searchable vector index and answers
//! questions against it:
//!
//! - [`Document`] / [`Segment`] - source text and the chunks cut from it
//! - [`SentenceChunker`] / [`FixedSizeChunker`] - overlapping, boundary-aware splitting
//! - [`EmbeddingGateway`] - batched, cached access to an [`EmbeddingProvider`]
//! - [`VectorIndex`] - brute-force similarity search with JSON persistence
//! - [`VectorRetriever`] - top-k retrieval bound to an index
//! - [`RetrieverQueryEngine`] - retrieve-then-synthesize question answering
//! - [`SubQuestionQueryEngine`] - decomposes a question across several named engines
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use ragkit_core::{
//!     Document, EmbeddingGateway, HashingEmbedder, MockLlm, Query, QueryEngine, RagConfig,
//!     build_index,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ragkit_core::Result<()> {
//! let config = RagConfig::builder().chunk_size(256).chunk_overlap(32).top_k(1).build()?;
//! let gateway = Arc::new(EmbeddingGateway::new(Arc::new(HashingEmbedder::new(256)), 10));
//!
//! let docs = vec![
//!     Document::new("uber", "Uber revenue grew in 2021."),
//!     Document::new("lyft", "Lyft expanded bikes and scooters."),
//! ];
//! let index = Arc::new(build_index(&docs, &config, &gateway).await?);
//!
//! let engine = index.as_query_engine(gateway, Arc::new(MockLlm::fixed("It grew.")), 1)?;
//! let response = engine.query(&Query::new("How did Uber revenue change?")).await?;
//! assert_eq!(response.sources[0].segment.document_id, "uber");
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `openai` - [`openai::OpenAIEmbeddingProvider`] and [`openai::OpenAIChatModel`]

pub mod chunking;
pub mod config;
pub mod decompose;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod llm;
pub mod mock;
#[cfg(feature = "openai")]
pub mod openai;
pub mod retriever;
pub mod synthesizer;

pub use chunking::{Chunker, FixedSizeChunker, SentenceChunker, reconstruct_text};
pub use config::{RagConfig, RagConfigBuilder};
pub use decompose::{
    DecomposedResponse, PlanOutput, QueryEngineTool, SubAnswer, SubQuestion,
    SubQuestionQueryEngine,
};
pub use document::{Document, SearchResult, Segment};
pub use embedding::{EmbeddingGateway, EmbeddingProvider};
pub use engine::{Query, QueryEngine, Response, RetrieverQueryEngine, SourceNode};
pub use error::{RagError, Result};
pub use index::{IndexEntry, Similarity, VectorIndex, build_index};
pub use llm::LanguageModel;
pub use mock::{HashingEmbedder, MockLlm};
#[cfg(feature = "openai")]
pub use openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
pub use retriever::{Retriever, VectorRetriever};
pub use synthesizer::{ResponseMode, ResponseSynthesizer};
