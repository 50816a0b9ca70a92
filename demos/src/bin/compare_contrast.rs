//! # Compare and contrast across two corpora
//!
//! Builds one vector index per corpus, wraps each in a query engine tool, and
//! answers compound questions with a sub-question engine that routes parts of
//! the question to the right corpus.
//!
//! Runs offline by default. With `--features openai` and `OPENAI_API_KEY` set,
//! uses OpenAI embeddings and chat.
//!
//! Run: `cargo run -p ragkit-demos --bin compare_contrast -- [UBER_DIR LYFT_DIR] [QUESTION]`

use std::path::Path;
use std::sync::Arc;

use ragkit_core::{
    EmbeddingGateway, Query, QueryEngine, QueryEngineTool, RagConfig, SubQuestionQueryEngine,
    build_index,
};
use ragkit_demos::{init_tracing, load_corpus, providers, sample_lyft, sample_uber};
use tracing::info;

const DEFAULT_QUESTION: &str = "Compare and contrast the revenue growth of Uber and Lyft in 2021";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args: Vec<String> = std::env::args().skip(1).collect();

    let (uber_docs, lyft_docs, question) = match args.as_slice() {
        [uber, lyft, rest @ ..] => (
            load_corpus(Path::new(uber), "uber")?,
            load_corpus(Path::new(lyft), "lyft")?,
            rest.first().cloned(),
        ),
        [question] => (sample_uber(), sample_lyft(), Some(question.clone())),
        [] => (sample_uber(), sample_lyft(), None),
    };
    let question = question.unwrap_or_else(|| DEFAULT_QUESTION.to_string());

    // -- 1. Providers and configuration ----------------------------------
    let providers = providers()?;
    if providers.offline {
        println!("Running offline (hashing embedder, scripted model).");
    }
    let config = RagConfig::builder().chunk_size(512).chunk_overlap(64).top_k(3).build()?;
    let gateway =
        Arc::new(EmbeddingGateway::new(providers.embedder.clone(), config.embed_batch_size));

    // -- 2. One index and engine per corpus ------------------------------
    let uber_index = Arc::new(build_index(&uber_docs, &config, &gateway).await?);
    let lyft_index = Arc::new(build_index(&lyft_docs, &config, &gateway).await?);
    info!(uber = uber_index.len(), lyft = lyft_index.len(), "indexed corpora");

    let uber_engine = uber_index
        .as_query_engine_with_config(gateway.clone(), providers.llm.clone(), &config)?;
    let lyft_engine = lyft_index
        .as_query_engine_with_config(gateway.clone(), providers.llm.clone(), &config)?;

    // -- 3. Route sub-questions to the right corpus ----------------------
    let tools = vec![
        QueryEngineTool::new(
            "uber_10k",
            "Provides information about Uber financials for year 2021",
            Arc::new(uber_engine),
        ),
        QueryEngineTool::new(
            "lyft_10k",
            "Provides information about Lyft financials for year 2021",
            Arc::new(lyft_engine),
        ),
    ];
    let engine = SubQuestionQueryEngine::new(tools, providers.llm.clone())?;

    println!("\nQuestion: {question}");
    let result = engine.query_with_sub_answers(&Query::new(question.as_str())).await?;
    for answer in &result.sub_answers {
        println!(
            "\n  [{}] {}\n      -> {}",
            answer.sub_question.tool_name, answer.sub_question.sub_question, answer.response
        );
        for source in &answer.response.sources {
            println!(
                "      source {} (score {:.3})",
                source.segment.id,
                source.score.unwrap_or_default()
            );
        }
    }
    println!("\nAnswer: {}", result.response);

    // The sub-question engine is itself a query engine.
    let follow_up: &dyn QueryEngine = &engine;
    let response = follow_up.query(&Query::new("Which company had the larger net loss?")).await?;
    println!("\nFollow-up: {response}");

    Ok(())
}
