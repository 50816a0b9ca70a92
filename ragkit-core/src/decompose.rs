//! Sub-question decomposition across several named query engines.
//!
//! A [`SubQuestionQueryEngine`] asks a planning model to split a compound
//! query into (sub-question, tool) pairs, runs every sub-question against its
//! tool concurrently, and synthesizes one answer from the sub-answers in plan
//! order.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragkit_core::{Query, QueryEngine, QueryEngineTool, SubQuestionQueryEngine};
//!
//! let tools = vec![
//!     QueryEngineTool::new("lyft_10k", "Lyft's 2021 annual report", lyft_engine),
//!     QueryEngineTool::new("uber_10k", "Uber's 2021 annual report", uber_engine),
//! ];
//! let engine = SubQuestionQueryEngine::new(tools, llm)?;
//! let response = engine
//!     .query(&Query::new("Compare revenue growth of Uber and Lyft in 2021"))
//!     .await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::document::Segment;
use crate::engine::{Query, QueryEngine, Response, SourceNode};
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;
use crate::synthesizer::ResponseSynthesizer;

/// A named, described query engine that sub-questions can be routed to.
#[derive(Clone)]
pub struct QueryEngineTool {
    /// Unique tool name; the planner refers to tools by this name.
    pub name: String,
    /// What the tool knows about, shown to the planner.
    pub description: String,
    /// The engine that answers sub-questions routed here.
    pub engine: Arc<dyn QueryEngine>,
}

impl QueryEngineTool {
    /// Wrap `engine` as a tool.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        engine: Arc<dyn QueryEngine>,
    ) -> Self {
        Self { name: name.into(), description: description.into(), engine }
    }
}

impl std::fmt::Debug for QueryEngineTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngineTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// One planned step: a question and the tool that should answer it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubQuestion {
    /// The question to ask.
    pub sub_question: String,
    /// Name of the tool to ask it of.
    pub tool_name: String,
}

/// The planning model's output, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutput {
    /// The output held a well-formed list of sub-questions.
    Parsed(Vec<SubQuestion>),
    /// The output could not be read as a sub-question list.
    Unparseable {
        /// The raw model output.
        raw: String,
        /// Why parsing failed.
        reason: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanPayload {
    Items { items: Vec<SubQuestion> },
    List(Vec<SubQuestion>),
}

impl PlanOutput {
    /// Classify raw planner output.
    ///
    /// Accepts a JSON array of `{"sub_question", "tool_name"}` objects or an
    /// object with such an array under `items`, optionally wrapped in a
    /// markdown code fence or surrounded by prose.
    pub fn parse(raw: &str) -> Self {
        let body = strip_code_fence(raw);
        let mut last_error = String::from("no JSON found");
        for candidate in [Some(body), json_span(body)].into_iter().flatten() {
            match serde_json::from_str::<PlanPayload>(candidate) {
                Ok(PlanPayload::Items { items } | PlanPayload::List(items)) => {
                    return PlanOutput::Parsed(items);
                }
                Err(e) => last_error = e.to_string(),
            }
        }
        PlanOutput::Unparseable { raw: raw.to_string(), reason: last_error }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let body = after_open.split_once('\n').map_or("", |(_, rest)| rest);
    body.rsplit_once("```").map_or(body, |(inner, _)| inner).trim()
}

fn json_span(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let end = text.rfind([']', '}'])?;
    (end > start).then(|| &text[start..=end])
}

/// A sub-question together with its answer.
#[derive(Debug, Clone, PartialEq)]
pub struct SubAnswer {
    /// Position of the sub-question in the plan.
    pub index: usize,
    /// The planned step.
    pub sub_question: SubQuestion,
    /// The tool's response.
    pub response: Response,
}

/// The final response together with every intermediate sub-answer.
#[derive(Debug, Clone, PartialEq)]
pub struct DecomposedResponse {
    /// The synthesized answer to the original query.
    pub response: Response,
    /// Sub-answers in plan order.
    pub sub_answers: Vec<SubAnswer>,
}

/// Decomposes compound queries and routes the parts to named tools.
pub struct SubQuestionQueryEngine {
    tools: Vec<QueryEngineTool>,
    by_name: HashMap<String, usize>,
    planner: Arc<dyn LanguageModel>,
    synthesizer: ResponseSynthesizer,
    max_concurrency: Option<usize>,
}

impl SubQuestionQueryEngine {
    /// Create an engine that plans and synthesizes with `llm`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if `tools` is empty or two tools
    /// share a name.
    pub fn new(tools: Vec<QueryEngineTool>, llm: Arc<dyn LanguageModel>) -> Result<Self> {
        if tools.is_empty() {
            return Err(RagError::InvalidInput("at least one tool is required".to_string()));
        }
        let mut by_name = HashMap::with_capacity(tools.len());
        for (i, tool) in tools.iter().enumerate() {
            if by_name.insert(tool.name.clone(), i).is_some() {
                return Err(RagError::InvalidInput(format!("duplicate tool name '{}'", tool.name)));
            }
        }
        Ok(Self {
            tools,
            by_name,
            synthesizer: ResponseSynthesizer::new(llm.clone()),
            planner: llm,
            max_concurrency: None,
        })
    }

    /// Use a different synthesizer for the final answer.
    pub fn with_synthesizer(mut self, synthesizer: ResponseSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Run at most `limit` sub-questions at a time. Unbounded by default.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit.max(1));
        self
    }

    /// The registered tools, in registration order.
    pub fn tools(&self) -> &[QueryEngineTool] {
        &self.tools
    }

    /// Ask the planner for sub-questions and validate them.
    ///
    /// # Errors
    ///
    /// Propagates planner failures. Returns [`RagError::PlanningFailed`] if
    /// the output is unparseable, empty, or names an unknown tool.
    pub async fn plan(&self, query: &str) -> Result<Vec<SubQuestion>> {
        let raw = self.planner.generate(&self.planning_prompt(query)).await?;
        let plan = match PlanOutput::parse(&raw) {
            PlanOutput::Parsed(plan) => plan,
            PlanOutput::Unparseable { reason, .. } => {
                warn!(reason = %reason, "planner output was not a sub-question list");
                return Err(RagError::PlanningFailed(format!("unparseable plan: {reason}")));
            }
        };
        if plan.is_empty() {
            return Err(RagError::PlanningFailed("planner returned no sub-questions".to_string()));
        }
        for step in &plan {
            if step.sub_question.trim().is_empty() {
                return Err(RagError::PlanningFailed(
                    "planner returned a blank sub-question".to_string(),
                ));
            }
            if !self.by_name.contains_key(&step.tool_name) {
                return Err(RagError::PlanningFailed(format!(
                    "planner chose unknown tool '{}'",
                    step.tool_name
                )));
            }
        }
        Ok(plan)
    }

    /// Answer `query` and return the intermediate sub-answers as well.
    ///
    /// # Errors
    ///
    /// Planning errors as in [`plan`](Self::plan); [`RagError::SubQueryFailed`]
    /// naming the first failing sub-question in plan order; and synthesis
    /// failures from the language model.
    pub async fn query_with_sub_answers(&self, query: &Query) -> Result<DecomposedResponse> {
        let plan = self.plan(&query.text).await?;
        info!(sub_question_count = plan.len(), "decomposed query");

        let dispatches = plan.into_iter().enumerate().map(|(index, step)| {
            let tool = &self.tools[self.by_name[&step.tool_name]];
            async move {
                match tool.engine.query(&Query::new(step.sub_question.clone())).await {
                    Ok(response) => Ok(SubAnswer { index, sub_question: step, response }),
                    Err(e) => {
                        warn!(index, tool = %tool.name, error = %e, "sub-question failed");
                        Err(RagError::SubQueryFailed {
                            index,
                            sub_question: step.sub_question,
                            tool: step.tool_name,
                            source: Box::new(e),
                        })
                    }
                }
            }
        });

        let limit = self.max_concurrency.unwrap_or(dispatches.len()).max(1);
        // `buffered` yields in submission order whatever the completion order.
        let sub_answers: Vec<SubAnswer> =
            stream::iter(dispatches).buffered(limit).try_collect().await?;

        let sources: Vec<SourceNode> = sub_answers.iter().map(sub_answer_source).collect();
        let text = self.synthesizer.synthesize(&query.text, &sources).await?;
        info!(sub_answer_count = sub_answers.len(), "synthesized decomposed answer");

        Ok(DecomposedResponse { response: Response { text, sources }, sub_answers })
    }

    fn planning_prompt(&self, query: &str) -> String {
        let tools: Vec<serde_json::Value> = self
            .tools
            .iter()
            .map(|t| serde_json::json!({ "name": t.name, "description": t.description }))
            .collect();
        let tools = serde_json::to_string_pretty(&tools).unwrap_or_default();
        format!(
            "Given a user question and a list of tools, output a list of relevant \
             sub-questions that together help answer the user question. Each sub-question \
             must be answerable by exactly one tool.\n\n\
             Respond with JSON only, in this format:\n\
             {{\"items\": [{{\"sub_question\": \"...\", \"tool_name\": \"...\"}}]}}\n\n\
             # Tools\n{tools}\n\n# User Question\n{query}\n\n# Output\n"
        )
    }
}

fn sub_answer_source(answer: &SubAnswer) -> SourceNode {
    let text = format!(
        "Sub question: {}\nResponse: {}",
        answer.sub_question.sub_question, answer.response.text
    );
    let metadata = HashMap::from([
        ("tool_name".to_string(), answer.sub_question.tool_name.clone()),
        ("sub_question".to_string(), answer.sub_question.sub_question.clone()),
    ]);
    SourceNode {
        segment: Segment {
            id: format!("sub_question_{}", answer.index),
            document_id: answer.sub_question.tool_name.clone(),
            index: answer.index,
            end: text.len(),
            start: 0,
            text,
            metadata,
        },
        score: None,
    }
}

#[async_trait]
impl QueryEngine for SubQuestionQueryEngine {
    async fn query(&self, query: &Query) -> Result<Response> {
        Ok(self.query_with_sub_answers(query).await?.response)
    }
}

impl std::fmt::Debug for SubQuestionQueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubQuestionQueryEngine")
            .field("tools", &self.tools)
            .field("planner", &self.planner.name())
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_items_object() {
        let raw = r#"{"items": [{"sub_question": "Uber revenue?", "tool_name": "uber"}]}"#;
        assert_eq!(
            PlanOutput::parse(raw),
            PlanOutput::Parsed(vec![SubQuestion {
                sub_question: "Uber revenue?".into(),
                tool_name: "uber".into()
            }])
        );
    }

    #[test]
    fn parses_fenced_bare_array() {
        let raw = "```json\n[{\"sub_question\": \"a\", \"tool_name\": \"t\"}]\n```";
        assert!(matches!(PlanOutput::parse(raw), PlanOutput::Parsed(items) if items.len() == 1));
    }

    #[test]
    fn parses_json_surrounded_by_prose() {
        let raw = "Sure! Here is the plan:\n[{\"sub_question\": \"a\", \"tool_name\": \"t\"}]\nDone.";
        assert!(matches!(PlanOutput::parse(raw), PlanOutput::Parsed(items) if items.len() == 1));
    }

    #[test]
    fn prose_only_is_unparseable() {
        assert!(matches!(
            PlanOutput::parse("I would ask about Uber first."),
            PlanOutput::Unparseable { .. }
        ));
    }

    #[test]
    fn missing_fields_are_unparseable() {
        assert!(matches!(
            PlanOutput::parse(r#"[{"question": "a"}]"#),
            PlanOutput::Unparseable { .. }
        ));
    }
}
