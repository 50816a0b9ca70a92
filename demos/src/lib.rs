//! Shared setup for the ragkit demo programs.
//!
//! Providers come from OpenAI when the `openai` feature is enabled and
//! `OPENAI_API_KEY` is set; otherwise the demos run fully offline with a
//! hashing embedder and a scripted model.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use ragkit_core::{Document, EmbeddingProvider, HashingEmbedder, LanguageModel, MockLlm};
use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber honouring `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// The embedding and generation services a demo runs against.
pub struct Providers {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub llm: Arc<dyn LanguageModel>,
    pub offline: bool,
}

/// Pick providers from the environment.
pub fn providers() -> anyhow::Result<Providers> {
    dotenvy::dotenv().ok();

    if let Some(providers) = openai_providers()? {
        return Ok(providers);
    }
    Ok(Providers {
        embedder: Arc::new(HashingEmbedder::new(256)),
        llm: Arc::new(offline_llm()),
        offline: true,
    })
}

#[cfg(feature = "openai")]
fn openai_providers() -> anyhow::Result<Option<Providers>> {
    use ragkit_core::openai::{OpenAIChatModel, OpenAIEmbeddingProvider};

    if std::env::var("OPENAI_API_KEY").is_err() {
        return Ok(None);
    }
    let embedder = OpenAIEmbeddingProvider::from_env()?;
    let llm = OpenAIChatModel::from_env()?.with_temperature(0.0);
    Ok(Some(Providers { embedder: Arc::new(embedder), llm: Arc::new(llm), offline: false }))
}

#[cfg(not(feature = "openai"))]
fn openai_providers() -> anyhow::Result<Option<Providers>> {
    Ok(None)
}

/// A scripted model that plans, answers, writes questions and judges well
/// enough to exercise every pipeline without a network.
pub fn offline_llm() -> MockLlm {
    MockLlm::new(|prompt| Ok(offline_reply(prompt))).with_name("offline-scripted")
}

fn offline_reply(prompt: &str) -> String {
    if let Some(plan) = section(prompt, "# Tools\n", "\n\n# User Question").and_then(|tools| {
        let question = section(prompt, "# User Question\n", "\n\n# Output")?;
        Some(offline_plan(tools, question))
    }) {
        return plan;
    }
    if prompt.contains("Either YES or NO") || prompt.contains("either YES or NO") {
        return "YES. The scripted judge accepts every answer.".to_string();
    }

    let context = section(prompt, "---------------------\n", "\n---------------------")
        .unwrap_or_default()
        .trim();
    let first_sentence = context.split_inclusive(". ").next().unwrap_or(context).trim();
    if prompt.contains("questions for an upcoming") {
        let subject = first_sentence.trim_end_matches('.');
        return format!("1. What does the text say about {subject}?\n2. Is it true that {subject}?");
    }
    if let Some(existing) = section(prompt, "existing answer: ", "\n") {
        return existing.to_string();
    }
    if first_sentence.is_empty() {
        "The context does not say.".to_string()
    } else {
        first_sentence.to_string()
    }
}

fn offline_plan(tools: &str, question: &str) -> String {
    let names: Vec<String> = serde_json::from_str::<Vec<serde_json::Value>>(tools)
        .unwrap_or_default()
        .iter()
        .filter_map(|t| t.get("name")?.as_str().map(str::to_string))
        .collect();
    let items: Vec<serde_json::Value> = names
        .iter()
        .map(|name| {
            serde_json::json!({ "sub_question": format!("{question} ({name})"), "tool_name": name })
        })
        .collect();
    serde_json::json!({ "items": items }).to_string()
}

fn section<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let to = text[from..].find(end).map_or(text.len(), |i| from + i);
    Some(&text[from..to])
}

/// Load every `.txt` and `.md` file under `dir` as documents.
///
/// Form feeds split a file into pages; each page becomes its own document
/// with `page` set, mirroring per-page PDF loaders.
pub fn load_corpus(dir: &Path, corpus: &str) -> anyhow::Result<Vec<Document>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("reading corpus directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "txt" || ext == "md"))
        .collect();
    paths.sort();

    let mut documents = Vec::new();
    for path in paths {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let stem = path.file_stem().map_or_else(String::new, |s| s.to_string_lossy().into_owned());
        for (page, content) in text.split('\x0c').enumerate() {
            if content.trim().is_empty() {
                continue;
            }
            documents.push(
                Document::new(format!("{corpus}_{stem}_p{}", page + 1), content)
                    .with_source_uri(path.display().to_string())
                    .with_page(page as u32 + 1)
                    .with_metadata("corpus", corpus),
            );
        }
    }
    anyhow::ensure!(!documents.is_empty(), "no .txt or .md documents found in {}", dir.display());
    Ok(documents)
}

/// A small built-in excerpt of Uber's 2021 annual report.
pub fn sample_uber() -> Vec<Document> {
    vec![
        Document::new(
            "uber_2021_p1",
            "Uber's revenue was $17.5 billion in 2021, up 57% year-over-year. Mobility revenue \
             grew as trips recovered from the pandemic, while Delivery revenue grew 67% on \
             higher order volumes.",
        )
        .with_page(1)
        .with_metadata("corpus", "uber"),
        Document::new(
            "uber_2021_p2",
            "Uber's net loss attributable to common stockholders was $496 million in 2021. \
             Risk factors include regulatory challenges to driver classification and continued \
             competition in ride-hailing and delivery markets.",
        )
        .with_page(2)
        .with_metadata("corpus", "uber"),
    ]
}

/// A small built-in excerpt of Lyft's 2021 annual report.
pub fn sample_lyft() -> Vec<Document> {
    vec![
        Document::new(
            "lyft_2021_p1",
            "Lyft's revenue was $3.2 billion in 2021, up 36% year-over-year. Active riders \
             grew to 18.7 million in the fourth quarter as ridesharing demand recovered.",
        )
        .with_page(1)
        .with_metadata("corpus", "lyft"),
        Document::new(
            "lyft_2021_p2",
            "Lyft's net loss was $1.0 billion in 2021. Lyft continued investing in bikes and \
             scooters and in autonomous vehicle partnerships while managing insurance costs.",
        )
        .with_page(2)
        .with_metadata("corpus", "lyft"),
    ]
}
