//! Batch response evaluation: scores, ordering and concurrency bounds.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ragkit_core::{
    Document, EmbeddingGateway, HashingEmbedder, MockLlm, Query, QueryEngine, RagConfig, RagError,
    Response, Result, build_index,
};
use ragkit_eval::{BatchEvalRunner, FaithfulnessEvaluator, QaPair, QaPairSet, RelevancyEvaluator};

/// Echoes the query after a delay that shrinks with its position, tracking overlap.
struct EchoEngine {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl EchoEngine {
    fn new() -> Self {
        Self { in_flight: AtomicUsize::new(0), peak: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl QueryEngine for EchoEngine {
    async fn query(&self, query: &Query) -> Result<Response> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let position: u64 = query.text.trim_start_matches('q').parse().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(100 - position * 5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if query.text == "q13" {
            return Err(RagError::upstream("echo", "engine down"));
        }
        Ok(Response { text: format!("answer to {}", query.text), sources: Vec::new() })
    }
}

fn queries(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("q{i}")).collect()
}

/// Passes answers to q0..q6 and fails the rest.
fn judge() -> Arc<MockLlm> {
    Arc::new(MockLlm::new(|prompt| {
        let passing = (0..7).any(|i| prompt.contains(&format!("answer to q{i}\n")));
        Ok(if passing { "YES, grounded." } else { "NO, unsupported." }.to_string())
    }))
}

#[tokio::test(start_paused = true)]
async fn seven_of_ten_passing_scores_point_seven() {
    let engine = EchoEngine::new();
    let runner = BatchEvalRunner::new(4)
        .with_evaluator(Arc::new(FaithfulnessEvaluator::new(judge())))
        .with_evaluator(Arc::new(RelevancyEvaluator::new(judge())));

    let report = runner.evaluate_queries(&engine, &queries(10)).await.unwrap();

    assert_eq!(report.score("faithfulness"), Some(0.7));
    assert_eq!(report.score("relevancy"), Some(0.7));
    assert_eq!(report.scores().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn results_keep_query_order() {
    let engine = EchoEngine::new();
    let runner =
        BatchEvalRunner::new(10).with_evaluator(Arc::new(FaithfulnessEvaluator::new(judge())));

    let report = runner.evaluate_queries(&engine, &queries(10)).await.unwrap();

    assert_eq!(report.query_ids, queries(10));
    let answers: Vec<&str> = report.responses.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(answers[0], "answer to q0");
    assert_eq!(answers[9], "answer to q9");
    let faithfulness = &report.results["faithfulness"];
    assert!(faithfulness[..7].iter().all(|r| r.passing));
    assert!(faithfulness[7..].iter().all(|r| !r.passing));
}

#[tokio::test(start_paused = true)]
async fn workers_bound_in_flight_calls() {
    let engine = EchoEngine::new();
    let runner = BatchEvalRunner::new(3);

    runner.evaluate_queries(&engine, &queries(12)).await.unwrap();

    assert_eq!(engine.peak.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn response_failure_fails_the_batch_naming_the_query() {
    let engine = EchoEngine::new();
    let runner = BatchEvalRunner::new(4);

    let err = runner.evaluate_queries(&engine, &queries(15)).await.unwrap_err();

    assert!(matches!(err, RagError::EvaluationFailed { ref query_id, .. } if query_id == "q13"));
    assert!(err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn dataset_batches_are_keyed_by_pair_id() {
    let mut dataset = QaPairSet::new();
    dataset.insert_segment("s0", "Uber revenue grew 57 percent in 2021.");
    let ids: Vec<String> = (0..4).map(|_| uuid::Uuid::new_v4().to_string()).collect();
    for (i, id) in ids.iter().enumerate() {
        let pair = QaPair {
            id: id.clone(),
            query: format!("q{i}"),
            expected_segment_ids: vec!["s0".to_string()],
        };
        dataset.push(pair).unwrap();
    }
    let runner =
        BatchEvalRunner::new(2).with_evaluator(Arc::new(FaithfulnessEvaluator::new(judge())));

    let report = runner.evaluate_dataset(&EchoEngine::new(), &dataset).await.unwrap();

    assert_eq!(report.query_ids, ids);
    assert_eq!(report.responses[3].text, "answer to q3");
    assert_eq!(report.results["faithfulness"].len(), 4);
    assert_eq!(report.score("faithfulness"), Some(1.0));
}

#[tokio::test]
async fn duplicate_evaluator_names_are_rejected() {
    let engine = EchoEngine::new();
    let runner = BatchEvalRunner::new(2)
        .with_evaluator(Arc::new(FaithfulnessEvaluator::new(judge())))
        .with_evaluator(Arc::new(FaithfulnessEvaluator::new(Arc::new(MockLlm::fixed("NO")))));

    let err = runner.evaluate_queries(&engine, &queries(2)).await.unwrap_err();

    assert!(matches!(err, RagError::InvalidInput(_)));
    assert_eq!(engine.peak.load(Ordering::SeqCst), 0, "no query should run");
}

#[tokio::test]
async fn judge_failure_is_a_failing_result() {
    let engine = EchoEngine::new();
    let broken = Arc::new(MockLlm::new(|_| Err(RagError::upstream("judge", "timeout"))));
    let runner = BatchEvalRunner::new(2).with_evaluator(Arc::new(RelevancyEvaluator::new(broken)));

    let report = runner.evaluate_queries(&engine, &queries(2)).await.unwrap();

    assert_eq!(report.score("relevancy"), Some(0.0));
    assert!(report.results["relevancy"].iter().all(|r| r.invalid_reason.is_some()));
}

#[tokio::test]
async fn evaluates_a_real_query_engine() {
    let docs = vec![Document::new("uber", "Uber revenue grew 57 percent in 2021.")];
    let gateway = Arc::new(EmbeddingGateway::new(Arc::new(HashingEmbedder::new(64)), 10));
    let index = Arc::new(build_index(&docs, &RagConfig::default(), &gateway).await.unwrap());
    let engine = index.as_query_engine(gateway, Arc::new(MockLlm::fixed("It grew 57%.")), 1);
    let engine = engine.unwrap();

    let prompts = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = prompts.clone();
    let judge = MockLlm::new(move |p| {
        seen.lock().unwrap().push(p.to_string());
        Ok("YES".to_string())
    });
    let runner = BatchEvalRunner::new(2).with_evaluator(Arc::new(FaithfulnessEvaluator::new(
        Arc::new(judge),
    )));

    let report =
        runner.evaluate_queries(&engine, &["How did Uber revenue change?".to_string()]).await;

    assert_eq!(report.unwrap().score("faithfulness"), Some(1.0));
    assert!(prompts.lock().unwrap()[0].contains("Uber revenue grew 57 percent in 2021."));
}
