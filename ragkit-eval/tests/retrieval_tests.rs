//! Retrieval evaluation over real indices and scripted retrievers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;
use ragkit_core::{
    Document, EmbeddingGateway, HashingEmbedder, MockLlm, RagConfig, RagError, Result, Retriever,
    SearchResult, Segment, build_index,
};
use ragkit_eval::{
    EvalConfig, QaPair, QaPairGenerator, QaPairSet, RetrieverEvaluator, hit_rate, reciprocal_rank,
};

/// Returns the same ranked ids for every query; fails for queries containing "boom".
struct ScriptedRetriever {
    ids: Vec<&'static str>,
}

#[async_trait]
impl Retriever for ScriptedRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        if query.contains("boom") {
            return Err(RagError::upstream("scripted", "retriever down"));
        }
        Ok(self
            .ids
            .iter()
            .enumerate()
            .map(|(rank, id)| SearchResult {
                segment: Segment {
                    id: id.to_string(),
                    document_id: "doc".to_string(),
                    index: rank,
                    text: String::new(),
                    start: 0,
                    end: 0,
                    metadata: HashMap::new(),
                },
                score: 1.0 - rank as f32 * 0.1,
            })
            .collect())
    }
}

fn dataset(pairs: &[(&str, &str, &str)]) -> QaPairSet {
    let mut set = QaPairSet::new();
    for (id, query, expected) in pairs {
        set.insert_segment(*expected, "segment text");
        set.push(QaPair {
            id: id.to_string(),
            query: query.to_string(),
            expected_segment_ids: vec![expected.to_string()],
        })
        .unwrap();
    }
    set
}

#[tokio::test]
async fn scores_hits_and_misses() {
    let retriever = Arc::new(ScriptedRetriever { ids: vec!["s1", "s3", "s2"] });
    let evaluator = RetrieverEvaluator::new(retriever);

    let report = evaluator
        .evaluate_dataset(&dataset(&[("q1", "first?", "s3"), ("q2", "second?", "s9")]))
        .await
        .unwrap();

    assert_eq!(report.results[0].hit_rate, 1.0);
    assert_eq!(report.results[0].mrr, 0.5);
    assert_eq!(report.results[1].hit_rate, 0.0);
    assert_eq!(report.results[1].mrr, 0.0);
    assert_eq!(report.hit_rate, 0.5);
    assert_eq!(report.mrr, 0.25);
    assert_eq!(report.results[0].retrieved_ids, vec!["s1", "s3", "s2"]);
}

#[tokio::test]
async fn failed_retrieval_names_the_query() {
    let retriever = Arc::new(ScriptedRetriever { ids: vec!["s1"] });
    let evaluator = RetrieverEvaluator::new(retriever).with_workers(4);

    let err = evaluator
        .evaluate_dataset(&dataset(&[("ok", "fine?", "s1"), ("bad", "boom?", "s1")]))
        .await
        .unwrap_err();

    match err {
        RagError::EvaluationFailed { query_id, source } => {
            assert_eq!(query_id, "bad");
            assert!(matches!(*source, RagError::UpstreamUnavailable { .. }));
        }
        other => panic!("expected EvaluationFailed, got {other:?}"),
    }
}

/// Turns each segment's first sentence into a question, so generated pairs
/// point back at segments the index can find.
fn question_writer() -> MockLlm {
    MockLlm::new(|prompt| {
        let context = prompt
            .split("---------------------\n")
            .nth(1)
            .unwrap_or_default()
            .lines()
            .next()
            .unwrap_or_default();
        Ok(format!("1. {context}?\n2. What does it say about {context}?"))
    })
}

#[tokio::test]
async fn generated_dataset_evaluates_identically_twice() {
    let docs = vec![
        Document::new("uber", "Uber revenue grew strongly in 2021 across mobility and delivery."),
        Document::new("lyft", "Lyft expanded bikes and scooters in many cities during 2021."),
    ];
    let gateway = Arc::new(EmbeddingGateway::new(Arc::new(HashingEmbedder::new(256)), 10));
    let index = Arc::new(build_index(&docs, &RagConfig::default(), &gateway).await.unwrap());

    let segments: Vec<Segment> = index.segments().cloned().collect();
    let generator = QaPairGenerator::new(Arc::new(question_writer()), EvalConfig::default());
    let dataset = generator.unwrap().generate(&segments).await.unwrap();
    assert_eq!(dataset.len(), 4);

    let evaluator = RetrieverEvaluator::new(Arc::new(index.as_retriever(gateway, 1).unwrap()));
    let first = evaluator.evaluate_dataset(&dataset).await.unwrap();
    let second = evaluator.evaluate_dataset(&dataset).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.hit_rate, 1.0);
}

/// **Metrics agree with each other**
/// *For any* ranked list and expected set, MRR SHALL be positive exactly when
/// the hit rate is 1 and SHALL never exceed it.
mod prop_metric_consistency {
    use super::*;

    proptest! {
        #[test]
        fn mrr_is_bounded_by_hit_rate(
            retrieved in proptest::collection::vec("s[0-9]", 0..8),
            expected in proptest::collection::vec("s[0-9]", 1..3),
        ) {
            let hit = hit_rate(&expected, &retrieved);
            let mrr = reciprocal_rank(&expected, &retrieved);
            prop_assert!(mrr <= hit);
            prop_assert_eq!(mrr > 0.0, hit == 1.0);
        }
    }
}
