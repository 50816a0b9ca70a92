//! Deterministic in-process providers for tests and offline runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::llm::LanguageModel;

/// Embeds text by hashing lowercase word tokens into a fixed number of buckets.
///
/// Texts sharing vocabulary get similar vectors, which is enough for
/// retrieval tests to behave like a real embedding model. The output is
/// L2-normalized and identical across runs and platforms.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    /// Create an embedder producing vectors of length `dimensions` (at least 1).
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
        {
            let bucket = (fnv1a(token.as_bytes()) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

type Handler = dyn Fn(&str) -> Result<String> + Send + Sync;

/// A language model whose replies come from a closure.
///
/// # Example
///
/// ```rust
/// use ragkit_core::MockLlm;
///
/// let llm = MockLlm::new(|prompt| Ok(format!("echo: {}", prompt.len())));
/// let fixed = MockLlm::fixed("always this");
/// ```
#[derive(Clone)]
pub struct MockLlm {
    name: String,
    handler: Arc<Handler>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockLlm {
    /// Reply to every prompt with the result of `handler`.
    pub fn new(handler: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            name: "mock-llm".to_string(),
            handler: Arc::new(handler),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Reply to every prompt with the same text.
    pub fn fixed(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(move |_| Ok(reply.clone()))
    }

    /// Override the reported model name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sleep for `delay` before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of prompts received so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MockLlm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLlm").field("name", &self.name).finish_non_exhaustive()
    }
}

#[async_trait]
impl LanguageModel for MockLlm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(prompt)
    }
}
