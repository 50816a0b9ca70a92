//! # Retriever and response evaluation
//!
//! Indexes a corpus, generates a synthetic QA dataset from its segments,
//! scores retrieval with hit rate and MRR, then judges generated answers for
//! faithfulness and relevancy.
//!
//! Runs offline by default. With `--features openai` and `OPENAI_API_KEY` set,
//! uses OpenAI embeddings and chat.
//!
//! Run: `cargo run -p ragkit-demos --bin evaluate -- [CORPUS_DIR] [EVAL_CONFIG_JSON]`

use std::path::Path;
use std::sync::Arc;

use ragkit_core::{EmbeddingGateway, RagConfig, Segment, build_index};
use ragkit_demos::{init_tracing, load_corpus, providers, sample_lyft, sample_uber};
use ragkit_eval::{
    BatchEvalRunner, EvalConfig, FaithfulnessEvaluator, FailurePolicy, QaPairGenerator,
    RelevancyEvaluator, RetrieverEvaluator,
};

/// Number of generated questions sent through full response evaluation.
const RESPONSE_EVAL_QUERIES: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args: Vec<String> = std::env::args().skip(1).collect();

    let documents = match args.first() {
        Some(dir) => load_corpus(Path::new(dir), "corpus")?,
        None => sample_uber().into_iter().chain(sample_lyft()).collect(),
    };
    let eval_config = match args.get(1) {
        Some(path) => EvalConfig::from_json_file(path)?,
        None => EvalConfig::builder().workers(4).failure_policy(FailurePolicy::Skip).build()?,
    };

    let providers = providers()?;
    let config = RagConfig::builder().chunk_size(512).chunk_overlap(64).top_k(2).build()?;
    let gateway =
        Arc::new(EmbeddingGateway::new(providers.embedder.clone(), config.embed_batch_size));
    let index = Arc::new(build_index(&documents, &config, &gateway).await?);
    println!("Indexed {} documents into {} segments", documents.len(), index.len());

    // -- 1. Synthetic dataset --------------------------------------------
    let segments: Vec<Segment> = index.segments().cloned().collect();
    let generator = QaPairGenerator::new(providers.llm.clone(), eval_config.clone())?;
    let dataset = generator.generate(&segments).await?;
    let dataset_path = std::env::temp_dir().join("ragkit_qa_pairs.json");
    dataset.save(&dataset_path)?;
    println!("Generated {} QA pairs -> {}", dataset.len(), dataset_path.display());

    // -- 2. Retrieval metrics --------------------------------------------
    let retriever = Arc::new(index.as_retriever_with_config(gateway.clone(), &config)?);
    let report = RetrieverEvaluator::new(retriever)
        .with_workers(eval_config.workers)
        .evaluate_dataset(&dataset)
        .await?;
    println!("\nRetrieval (top_k = {}):", config.top_k);
    println!("  hit rate  {:.3}", report.hit_rate);
    println!("  MRR       {:.3}", report.mrr);
    println!("  precision {:.3}", report.precision);
    println!("  recall    {:.3}", report.recall);

    // -- 3. Judged response quality --------------------------------------
    let engine = index.as_query_engine_with_config(gateway, providers.llm.clone(), &config)?;
    let queries: Vec<String> = dataset
        .queries()
        .take(RESPONSE_EVAL_QUERIES)
        .map(|(_, query)| query.to_string())
        .collect();
    let runner = BatchEvalRunner::new(eval_config.workers)
        .with_evaluator(Arc::new(FaithfulnessEvaluator::new(providers.llm.clone())))
        .with_evaluator(Arc::new(RelevancyEvaluator::new(providers.llm.clone())));
    let batch = runner.evaluate_queries(&engine, &queries).await?;

    println!("\nResponses ({} queries):", batch.query_ids.len());
    for (name, score) in batch.scores() {
        println!("  {name:<12} {score:.3}");
    }
    for (query, result) in queries.iter().zip(&batch.results["faithfulness"]) {
        if !result.passing {
            println!("  unfaithful: {query} ({})", result.feedback.as_deref().unwrap_or("-"));
        }
    }

    Ok(())
}
