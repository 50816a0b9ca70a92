//! Turns a query plus retrieved context into an answer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::SourceNode;
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;

const CONTEXT_RULE: &str = "---------------------";

/// How retrieved context is fed to the language model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// One prompt holding every context block.
    #[default]
    Compact,
    /// Answer from the first block, then refine the answer once per further block.
    Refine,
}

/// Builds prompts from context and asks a [`LanguageModel`] for the answer.
#[derive(Clone)]
pub struct ResponseSynthesizer {
    llm: Arc<dyn LanguageModel>,
    mode: ResponseMode,
    citations: bool,
}

impl ResponseSynthesizer {
    /// Create a compact-mode synthesizer without citations.
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm, mode: ResponseMode::Compact, citations: false }
    }

    /// Set the synthesis mode.
    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    /// Number context blocks `[1]`, `[2]`, ... and ask the model to cite them.
    pub fn with_citations(mut self, enabled: bool) -> Self {
        self.citations = enabled;
        self
    }

    /// The model used for synthesis.
    pub fn llm(&self) -> &Arc<dyn LanguageModel> {
        &self.llm
    }

    /// Produce an answer to `query` from `sources`, which are used in order.
    ///
    /// # Errors
    ///
    /// Propagates model failures; returns [`RagError::GenerationFailed`] if the
    /// model answers with blank text.
    pub async fn synthesize(&self, query: &str, sources: &[SourceNode]) -> Result<String> {
        match self.mode {
            ResponseMode::Compact => {
                let blocks: Vec<String> =
                    sources.iter().enumerate().map(|(i, s)| self.block(i, s)).collect();
                self.ask(&self.qa_prompt(query, &blocks.join("\n\n"))).await
            }
            ResponseMode::Refine => {
                let Some((first, rest)) = sources.split_first() else {
                    return self.ask(&self.qa_prompt(query, "")).await;
                };
                let mut answer = self.ask(&self.qa_prompt(query, &self.block(0, first))).await?;
                for (offset, source) in rest.iter().enumerate() {
                    let prompt = refine_prompt(query, &answer, &self.block(offset + 1, source));
                    answer = self.ask(&prompt).await?;
                }
                Ok(answer)
            }
        }
    }

    fn block(&self, position: usize, source: &SourceNode) -> String {
        if self.citations {
            format!("[{}] {}", position + 1, source.segment.text.trim())
        } else {
            source.segment.text.trim().to_string()
        }
    }

    fn qa_prompt(&self, query: &str, context: &str) -> String {
        let citation_rule = if self.citations {
            "Cite the numbered sources you rely on inline, like [1] or [2].\n"
        } else {
            ""
        };
        format!(
            "Context information is below.\n{CONTEXT_RULE}\n{context}\n{CONTEXT_RULE}\n\
             Given the context information and not prior knowledge, answer the query.\n\
             {citation_rule}Query: {query}\nAnswer: "
        )
    }

    async fn ask(&self, prompt: &str) -> Result<String> {
        debug!(model = self.llm.name(), prompt_len = prompt.len(), "synthesizing answer");
        let answer = self.llm.generate(prompt).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(RagError::generation(None, "model returned an empty answer"));
        }
        Ok(answer.to_string())
    }
}

fn refine_prompt(query: &str, existing_answer: &str, context: &str) -> String {
    format!(
        "The original query is as follows: {query}\n\
         We have provided an existing answer: {existing_answer}\n\
         We have the opportunity to refine the existing answer (only if needed) with some more \
         context below.\n{CONTEXT_RULE}\n{context}\n{CONTEXT_RULE}\n\
         Given the new context, refine the original answer to better answer the query. If the \
         context isn't useful, return the original answer.\nRefined Answer: "
    )
}

impl std::fmt::Debug for ResponseSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSynthesizer")
            .field("llm", &self.llm.name())
            .field("mode", &self.mode)
            .field("citations", &self.citations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::document::Segment;
    use crate::mock::MockLlm;

    fn source(text: &str) -> SourceNode {
        SourceNode {
            segment: Segment {
                id: text.to_string(),
                document_id: "d".to_string(),
                index: 0,
                text: text.to_string(),
                start: 0,
                end: text.len(),
                metadata: HashMap::new(),
            },
            score: Some(1.0),
        }
    }

    fn recording_llm(reply: &'static str) -> (MockLlm, Arc<Mutex<Vec<String>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let seen = prompts.clone();
        let llm = MockLlm::new(move |p| {
            seen.lock().unwrap().push(p.to_string());
            Ok(reply.to_string())
        });
        (llm, prompts)
    }

    #[tokio::test]
    async fn compact_keeps_context_in_retrieval_order() {
        let (llm, prompts) = recording_llm("answer");
        let synthesizer = ResponseSynthesizer::new(Arc::new(llm));

        let answer =
            synthesizer.synthesize("q?", &[source("alpha"), source("beta")]).await.unwrap();

        assert_eq!(answer, "answer");
        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        let alpha = prompts[0].find("alpha").unwrap();
        let beta = prompts[0].find("beta").unwrap();
        assert!(alpha < beta);
        assert!(prompts[0].contains("Query: q?"));
    }

    #[tokio::test]
    async fn refine_calls_once_per_source() {
        let (llm, prompts) = recording_llm("better");
        let synthesizer =
            ResponseSynthesizer::new(Arc::new(llm)).with_mode(ResponseMode::Refine);

        synthesizer.synthesize("q", &[source("a"), source("b"), source("c")]).await.unwrap();

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[2].contains("existing answer: better"));
    }

    #[tokio::test]
    async fn citations_number_the_blocks() {
        let (llm, prompts) = recording_llm("see [1]");
        let synthesizer = ResponseSynthesizer::new(Arc::new(llm)).with_citations(true);

        synthesizer.synthesize("q", &[source("one"), source("two")]).await.unwrap();

        let prompt = prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("[1] one"));
        assert!(prompt.contains("[2] two"));
        assert!(prompt.contains("Cite the numbered sources"));
    }

    #[tokio::test]
    async fn blank_answer_is_a_generation_failure() {
        let synthesizer = ResponseSynthesizer::new(Arc::new(MockLlm::fixed("   ")));
        let err = synthesizer.synthesize("q", &[source("a")]).await.unwrap_err();
        assert!(matches!(err, RagError::GenerationFailed { .. }));
    }
}
