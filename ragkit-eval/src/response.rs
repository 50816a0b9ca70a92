//! Judged response evaluation: faithfulness and relevancy.
//!
//! Each evaluator shows a judge model the query, the answer and the cited
//! context, and asks for a YES/NO verdict with a short explanation.

use std::sync::Arc;

use async_trait::async_trait;
use ragkit_core::{LanguageModel, Response, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The judge model's output, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JudgeVerdict {
    /// A YES/NO verdict was found.
    Parsed {
        passing: bool,
        /// Any text after the verdict word.
        feedback: String,
    },
    /// No verdict could be read from the output.
    Unparseable { raw: String, reason: String },
}

impl JudgeVerdict {
    /// Read a verdict from judge output.
    ///
    /// The first word decides, ignoring case, surrounding markdown emphasis
    /// and an optional `Answer:` or `Verdict:` label. `YES`/`PASS` pass and
    /// `NO`/`FAIL` fail.
    pub fn parse(raw: &str) -> Self {
        let mut rest = raw.trim_start();
        for label in ["answer:", "verdict:"] {
            if rest.len() >= label.len()
                && rest.is_char_boundary(label.len())
                && rest[..label.len()].eq_ignore_ascii_case(label)
            {
                rest = rest[label.len()..].trim_start();
            }
        }

        let word_end =
            rest.find(|c: char| !(c.is_alphanumeric() || c == '*')).unwrap_or(rest.len());
        let word = rest[..word_end].trim_matches('*').to_ascii_uppercase();
        let passing = match word.as_str() {
            "YES" | "PASS" => true,
            "NO" | "FAIL" => false,
            "" => {
                return JudgeVerdict::Unparseable {
                    raw: raw.to_string(),
                    reason: "empty judge output".to_string(),
                };
            }
            other => {
                return JudgeVerdict::Unparseable {
                    raw: raw.to_string(),
                    reason: format!("expected YES or NO, found '{other}'"),
                };
            }
        };

        let feedback = rest[word_end..].trim_start_matches(['*', '.', ',', ':', '-', ' ']).trim();
        JudgeVerdict::Parsed { passing, feedback: feedback.to_string() }
    }
}

/// Outcome of one judged check for one query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationResult {
    pub query: String,
    /// The answer being judged, if one was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Texts of the cited segments.
    #[serde(default)]
    pub contexts: Vec<String>,
    pub passing: bool,
    /// 1.0 when passing, else 0.0.
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Why the check could not produce a verdict, when it could not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
}

impl EvaluationResult {
    /// A failing result for a check that produced no verdict.
    pub fn invalid(query: &str, response: Option<&Response>, reason: impl Into<String>) -> Self {
        Self {
            query: query.to_string(),
            response: response.map(|r| r.text.clone()),
            contexts: response
                .map(|r| r.source_texts().into_iter().map(str::to_string).collect())
                .unwrap_or_default(),
            passing: false,
            score: 0.0,
            feedback: None,
            invalid_reason: Some(reason.into()),
        }
    }

    /// Whether the check produced a verdict.
    pub fn is_valid(&self) -> bool {
        self.invalid_reason.is_none()
    }
}

/// A judged check on a query's [`Response`].
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Short metric name, e.g. `faithfulness`.
    fn name(&self) -> &str;

    /// Judge `response` as an answer to `query`.
    ///
    /// Unparseable verdicts come back as failing results; only judge model
    /// failures are errors.
    async fn evaluate(&self, query: &str, response: &Response) -> Result<EvaluationResult>;
}

const FAITHFULNESS_TEMPLATE: &str = "Please tell if a given piece of information is supported \
by the context.\nYou need to answer with either YES or NO.\nAnswer YES if every claim in the \
information is supported by the context, even if most of the context is unrelated. Answer NO \
if any claim is missing from or contradicted by the context.\nAfter the YES or NO, briefly \
explain your verdict.\n\n";

const RELEVANCY_TEMPLATE: &str = "Your task is to evaluate if the response for the query is in \
line with the context information provided.\nYou have two options to answer. Either YES or \
NO.\nAnswer YES if the response for the query is in line with the context information and \
answers the query, otherwise NO.\nAfter the YES or NO, briefly explain your verdict.\n\n";

/// Passes when every claim in the answer is supported by its cited context.
#[derive(Clone)]
pub struct FaithfulnessEvaluator {
    judge: Arc<dyn LanguageModel>,
}

impl FaithfulnessEvaluator {
    pub fn new(judge: Arc<dyn LanguageModel>) -> Self {
        Self { judge }
    }
}

#[async_trait]
impl Evaluator for FaithfulnessEvaluator {
    fn name(&self) -> &str {
        "faithfulness"
    }

    async fn evaluate(&self, query: &str, response: &Response) -> Result<EvaluationResult> {
        let prompt = format!(
            "{FAITHFULNESS_TEMPLATE}Information: {}\nContext:\n{}\nAnswer: ",
            response.text,
            context_block(response)
        );
        judge(self.name(), self.judge.as_ref(), &prompt, query, response).await
    }
}

/// Passes when the answer addresses the query in line with its cited context.
#[derive(Clone)]
pub struct RelevancyEvaluator {
    judge: Arc<dyn LanguageModel>,
}

impl RelevancyEvaluator {
    pub fn new(judge: Arc<dyn LanguageModel>) -> Self {
        Self { judge }
    }
}

#[async_trait]
impl Evaluator for RelevancyEvaluator {
    fn name(&self) -> &str {
        "relevancy"
    }

    async fn evaluate(&self, query: &str, response: &Response) -> Result<EvaluationResult> {
        let prompt = format!(
            "{RELEVANCY_TEMPLATE}Query and Response:\nQuery: {query}\nResponse: {}\n\
             Context:\n{}\nAnswer: ",
            response.text,
            context_block(response)
        );
        judge(self.name(), self.judge.as_ref(), &prompt, query, response).await
    }
}

fn context_block(response: &Response) -> String {
    response.source_texts().join("\n\n")
}

async fn judge(
    metric: &str,
    model: &dyn LanguageModel,
    prompt: &str,
    query: &str,
    response: &Response,
) -> Result<EvaluationResult> {
    debug!(metric, model = model.name(), "judging response");
    let raw = model.generate(prompt).await?;

    match JudgeVerdict::parse(&raw) {
        JudgeVerdict::Parsed { passing, feedback } => Ok(EvaluationResult {
            query: query.to_string(),
            response: Some(response.text.clone()),
            contexts: response.source_texts().into_iter().map(str::to_string).collect(),
            passing,
            score: if passing { 1.0 } else { 0.0 },
            feedback: (!feedback.is_empty()).then_some(feedback),
            invalid_reason: None,
        }),
        JudgeVerdict::Unparseable { reason, .. } => {
            warn!(metric, reason = %reason, "unparseable judge verdict");
            Ok(EvaluationResult::invalid(query, Some(response), reason))
        }
    }
}

impl std::fmt::Debug for FaithfulnessEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaithfulnessEvaluator").field("judge", &self.judge.name()).finish()
    }
}

impl std::fmt::Debug for RelevancyEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelevancyEvaluator").field("judge", &self.judge.name()).finish()
    }
}
