//! Language model trait used for answer synthesis, planning and judging.

use async_trait::async_trait;

use crate::error::Result;

/// A text-in, text-out generation service.
///
/// The model is treated as stateless across calls: every prompt carries all
/// the context it needs. Implementations report throttling as
/// [`RagError::RateLimited`](crate::RagError::RateLimited) and every other
/// service failure as
/// [`RagError::UpstreamUnavailable`](crate::RagError::UpstreamUnavailable).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Identifier of the underlying model, for logs and reports.
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
