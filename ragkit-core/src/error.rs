//! Error types for the `ragkit-core` crate.

use thiserror::Error;

/// Errors that can occur in RAG operations.
///
/// Transient failures of external services are reported as
/// [`UpstreamUnavailable`](RagError::UpstreamUnavailable) or
/// [`RateLimited`](RagError::RateLimited). Nothing in this crate retries them;
/// use [`RagError::is_retryable`] to decide whether to back off and try again.
#[derive(Debug, Error)]
pub enum RagError {
    /// Malformed or empty arguments.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A vector did not have the dimensionality required by its context.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimensionality the index or provider requires.
        expected: usize,
        /// The dimensionality that was supplied.
        actual: usize,
    },

    /// Two sequences that must pair up one-to-one had different lengths.
    #[error("Size mismatch: {segments} segments but {vectors} vectors")]
    SizeMismatch {
        /// Number of segments (or input texts).
        segments: usize,
        /// Number of vectors.
        vectors: usize,
    },

    /// An external embedding or generation service failed.
    #[error("Upstream service unavailable ({service}): {message}")]
    UpstreamUnavailable {
        /// The service that produced the error.
        service: String,
        /// A description of the failure.
        message: String,
    },

    /// An external service throttled the request.
    #[error("Rate limited by {service}: {message}")]
    RateLimited {
        /// The service that throttled the request.
        service: String,
        /// A description of the failure.
        message: String,
    },

    /// A query was issued against an index that holds no segments.
    #[error("Index contains no segments")]
    EmptyIndex,

    /// The planning model's output could not be turned into sub-questions.
    #[error("Query planning failed: {0}")]
    PlanningFailed(String),

    /// One sub-question of a decomposed query failed.
    #[error("Sub-question {index} ('{sub_question}') on tool '{tool}' failed: {source}")]
    SubQueryFailed {
        /// Position of the sub-question in the plan.
        index: usize,
        /// The sub-question text.
        sub_question: String,
        /// The tool the sub-question was routed to.
        tool: String,
        /// The underlying failure.
        #[source]
        source: Box<RagError>,
    },

    /// A generation model returned output that could not be used.
    #[error("Generation failed{}: {message}", segment_suffix(.segment_id))]
    GenerationFailed {
        /// The segment being processed, when the failure is tied to one.
        segment_id: Option<String>,
        /// A description of the failure.
        message: String,
        /// The model call that failed, if the failure came from one.
        #[source]
        source: Option<Box<RagError>>,
    },

    /// Evaluation of one query failed and the run could not complete.
    #[error("Evaluation of query '{query_id}' failed: {source}")]
    EvaluationFailed {
        /// The identifier of the failing query.
        query_id: String,
        /// The underlying failure.
        #[source]
        source: Box<RagError>,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Reading or writing a persisted artifact failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A persisted artifact or wire payload could not be (de)serialized.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether the caller may retry the failed operation with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::UpstreamUnavailable { .. } | RagError::RateLimited { .. } => true,
            RagError::SubQueryFailed { source, .. } | RagError::EvaluationFailed { source, .. } => {
                source.is_retryable()
            }
            RagError::GenerationFailed { source: Some(source), .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Shorthand for [`RagError::UpstreamUnavailable`].
    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        RagError::UpstreamUnavailable { service: service.into(), message: message.into() }
    }

    /// Shorthand for [`RagError::GenerationFailed`].
    pub fn generation(segment_id: Option<&str>, message: impl Into<String>) -> Self {
        RagError::GenerationFailed {
            segment_id: segment_id.map(str::to_string),
            message: message.into(),
            source: None,
        }
    }

    /// A [`RagError::GenerationFailed`] caused by a failed model call.
    ///
    /// Keeps `source`, so retryability survives the wrapping.
    pub fn generation_caused_by(segment_id: Option<&str>, source: RagError) -> Self {
        RagError::GenerationFailed {
            segment_id: segment_id.map(str::to_string),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }
}

fn segment_suffix(segment_id: &Option<String>) -> String {
    segment_id.as_deref().map(|id| format!(" for segment '{id}'")).unwrap_or_default()
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
