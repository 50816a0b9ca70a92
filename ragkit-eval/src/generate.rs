//! Synthetic question generation from indexed segments.

use std::sync::Arc;

use futures::{StreamExt, stream};
use ragkit_core::{LanguageModel, RagError, Result, Segment};
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{EvalConfig, FailurePolicy};
use crate::dataset::{QaPair, QaPairSet};

/// Leading list markers such as `1.`, `2)`, `-`, `*`, `•` or `Q3:`.
const LIST_MARKER: &str = r"^\s*(?:\d+[.):]|[-*•]|[Qq](?:uestion)?\s*\d*\s*[.:)])\s*";

/// Asks a model to write questions answerable from each segment alone.
///
/// Segments are processed concurrently, up to `workers` at a time, but pairs
/// are assembled in segment order.
///
/// # Example
///
/// ```rust,ignore
/// use ragkit_eval::{EvalConfig, QaPairGenerator};
///
/// let generator = QaPairGenerator::new(llm, EvalConfig::default())?;
/// let segments: Vec<_> = index.segments().cloned().collect();
/// let dataset = generator.generate(&segments).await?;
/// dataset.save("qa_pairs.json")?;
/// ```
pub struct QaPairGenerator {
    llm: Arc<dyn LanguageModel>,
    config: EvalConfig,
    list_marker: Regex,
}

impl QaPairGenerator {
    /// Create a generator.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `config` is invalid.
    pub fn new(llm: Arc<dyn LanguageModel>, config: EvalConfig) -> Result<Self> {
        config.validate()?;
        let list_marker = Regex::new(LIST_MARKER)
            .map_err(|e| RagError::ConfigError(format!("invalid list marker pattern: {e}")))?;
        Ok(Self { llm, config, list_marker })
    }

    /// Generate questions for every eligible segment.
    ///
    /// # Errors
    ///
    /// Under [`FailurePolicy::Abort`], the first [`RagError::GenerationFailed`]
    /// in segment order. Under [`FailurePolicy::Skip`] failures are logged and
    /// the segment is left out.
    pub async fn generate(&self, segments: &[Segment]) -> Result<QaPairSet> {
        let eligible: Vec<&Segment> = segments
            .iter()
            .filter(|s| {
                let long_enough = s.text.trim().chars().count() >= self.config.min_segment_chars;
                if !long_enough {
                    warn!(segment.id = %s.id, "skipping short segment");
                }
                long_enough
            })
            .collect();

        let mut results = stream::iter(eligible)
            .map(|segment| async move { (segment, self.questions_for(segment).await) })
            .buffered(self.config.workers);

        let mut set = QaPairSet::new();
        let mut skipped = 0usize;
        while let Some((segment, outcome)) = results.next().await {
            let questions = match outcome {
                Ok(questions) => questions,
                Err(e) if self.config.failure_policy == FailurePolicy::Skip => {
                    warn!(segment.id = %segment.id, error = %e, "skipping segment");
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            set.insert_segment(segment.id.clone(), segment.text.clone());
            for query in questions {
                set.push(QaPair {
                    id: Uuid::new_v4().to_string(),
                    query,
                    expected_segment_ids: vec![segment.id.clone()],
                })?;
            }
        }

        info!(
            segment_count = segments.len(),
            pair_count = set.len(),
            skipped,
            "generated QA pairs"
        );
        Ok(set)
    }

    async fn questions_for(&self, segment: &Segment) -> Result<Vec<String>> {
        let raw = self
            .llm
            .generate(&self.prompt(&segment.text))
            .await
            .map_err(|e| RagError::generation_caused_by(Some(&segment.id), e))?;

        let questions = self.parse_questions(&raw);
        if questions.is_empty() {
            return Err(RagError::generation(Some(&segment.id), "model returned no questions"));
        }
        Ok(questions)
    }

    /// Split model output into at most `questions_per_segment` questions,
    /// dropping list markers and blank lines.
    pub fn parse_questions(&self, raw: &str) -> Vec<String> {
        raw.lines()
            .map(|line| self.list_marker.replace(line, "").trim().to_string())
            .filter(|line| !line.is_empty())
            .take(self.config.questions_per_segment)
            .collect()
    }

    fn prompt(&self, context: &str) -> String {
        format!(
            "Context information is below.\n\
             ---------------------\n{}\n---------------------\n\
             Given the context information and not prior knowledge, generate only questions \
             based on the below query.\n\
             You are a Teacher/Professor. Your task is to setup {} questions for an upcoming \
             quiz/examination. The questions should be diverse in nature across the document. \
             Restrict the questions to the context information provided.\n\
             Write one question per line.",
            context.trim(),
            self.config.questions_per_segment
        )
    }
}

impl std::fmt::Debug for QaPairGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QaPairGenerator")
            .field("llm", &self.llm.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
