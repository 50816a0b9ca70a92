//! Configuration for dataset generation and batch evaluation.

use std::path::Path;

use ragkit_core::{RagError, Result};
use serde::{Deserialize, Serialize};

/// What to do when question generation fails for one segment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop and return the first failure.
    #[default]
    Abort,
    /// Log the failure and continue without that segment.
    Skip,
}

/// Evaluation parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvalConfig {
    /// Questions requested per segment.
    pub questions_per_segment: usize,
    /// Segments whose trimmed text is shorter than this (in characters) are skipped.
    pub min_segment_chars: usize,
    /// Maximum number of model or engine calls in flight at once.
    pub workers: usize,
    /// Per-segment generation failure handling.
    pub failure_policy: FailurePolicy,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            questions_per_segment: 2,
            min_segment_chars: 20,
            workers: 8,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

impl EvalConfig {
    /// Create a new builder for constructing an [`EvalConfig`].
    pub fn builder() -> EvalConfigBuilder {
        EvalConfigBuilder::default()
    }

    /// Load a configuration from a JSON file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Io`] or [`RagError::Serialization`] if the file cannot
    /// be read or parsed, and [`RagError::ConfigError`] if the values are invalid.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: EvalConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the parameters are usable.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `questions_per_segment` or
    /// `workers` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.questions_per_segment == 0 {
            return Err(RagError::ConfigError(
                "questions_per_segment must be greater than zero".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(RagError::ConfigError("workers must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`EvalConfig`].
#[derive(Debug, Clone, Default)]
pub struct EvalConfigBuilder {
    config: EvalConfig,
}

impl EvalConfigBuilder {
    /// Set the number of questions requested per segment.
    pub fn questions_per_segment(mut self, n: usize) -> Self {
        self.config.questions_per_segment = n;
        self
    }

    /// Set the minimum trimmed segment length, in characters.
    pub fn min_segment_chars(mut self, chars: usize) -> Self {
        self.config.min_segment_chars = chars;
        self
    }

    /// Set the maximum number of concurrent external calls.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Set the per-segment failure policy.
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    /// Build the [`EvalConfig`].
    ///
    /// # Errors
    ///
    /// See [`EvalConfig::validate`].
    pub fn build(self) -> Result<EvalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
