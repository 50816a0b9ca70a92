//! QA pair generation: ordering, failure policies and persistence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ragkit_core::{LanguageModel, MockLlm, RagError, Result, Segment};
use ragkit_eval::{EvalConfig, FailurePolicy, QaPairGenerator, QaPairSet};

fn segment(id: &str, text: &str) -> Segment {
    Segment {
        id: id.to_string(),
        document_id: "doc".to_string(),
        index: 0,
        text: text.to_string(),
        start: 0,
        end: text.len(),
        metadata: HashMap::new(),
    }
}

fn segments() -> Vec<Segment> {
    vec![
        segment("s0", "Uber's revenue grew 57 percent in 2021 to 17.4 billion."),
        segment("s1", "Lyft's revenue grew 36 percent in 2021 to 3.2 billion."),
        segment("s2", "Both companies reported net losses for the year 2021."),
    ]
}

/// Answers slowly for the first segment, quickly for the rest, and fails on "FAIL".
struct UnevenModel;

#[async_trait]
impl LanguageModel for UnevenModel {
    fn name(&self) -> &str {
        "uneven"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        if prompt.contains("Uber") {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if prompt.contains("FAIL") {
            return Err(RagError::upstream("uneven", "model overloaded"));
        }
        let topic = if prompt.contains("Uber") {
            "Uber"
        } else if prompt.contains("Lyft") {
            "Lyft"
        } else {
            "both"
        };
        Ok(format!("1. What about {topic}?\n2. Why {topic}?\n3. Extra {topic}?"))
    }
}

fn config(policy: FailurePolicy) -> EvalConfig {
    EvalConfig::builder().workers(4).failure_policy(policy).build().unwrap()
}

#[tokio::test(start_paused = true)]
async fn pairs_follow_segment_order() {
    let generator = QaPairGenerator::new(Arc::new(UnevenModel), config(FailurePolicy::Abort));
    let set = generator.unwrap().generate(&segments()).await.unwrap();

    let queries: Vec<&str> = set.queries().map(|(_, q)| q).collect();
    assert_eq!(
        queries,
        vec![
            "What about Uber?",
            "Why Uber?",
            "What about Lyft?",
            "Why Lyft?",
            "What about both?",
            "Why both?"
        ]
    );
    assert_eq!(set.relevant_docs(&set.pairs()[0].id), Some(&["s0".to_string()][..]));
    assert_eq!(set.corpus().len(), 3);
}

#[tokio::test]
async fn query_ids_are_unique_uuids() {
    let generator = QaPairGenerator::new(Arc::new(UnevenModel), config(FailurePolicy::Abort));
    let set = generator.unwrap().generate(&segments()[1..]).await.unwrap();

    let mut ids: Vec<&str> = set.pairs().iter().map(|p| p.id.as_str()).collect();
    assert!(ids.iter().all(|id| uuid::Uuid::parse_str(id).is_ok()));
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), set.len());
}

#[tokio::test]
async fn abort_policy_returns_the_failing_segment() {
    let mut input = segments();
    input[1].text = "FAIL this segment because it is long enough.".to_string();
    let generator = QaPairGenerator::new(Arc::new(UnevenModel), config(FailurePolicy::Abort));

    let err = generator.unwrap().generate(&input).await.unwrap_err();

    assert!(matches!(
        err,
        RagError::GenerationFailed { segment_id: Some(ref id), .. } if id == "s1"
    ));
    assert!(err.is_retryable(), "an overloaded model is worth retrying");
}

#[tokio::test]
async fn skip_policy_leaves_the_segment_out() {
    let mut input = segments();
    input[1].text = "FAIL this segment because it is long enough.".to_string();
    let generator = QaPairGenerator::new(Arc::new(UnevenModel), config(FailurePolicy::Skip));

    let set = generator.unwrap().generate(&input).await.unwrap();

    assert_eq!(set.len(), 4);
    assert!(!set.corpus().contains_key("s1"));
    assert!(set.pairs().iter().all(|p| p.expected_segment_ids != vec!["s1".to_string()]));
}

#[tokio::test]
async fn short_segments_are_not_sent_to_the_model() {
    let llm = MockLlm::fixed("1. Anything?");
    let generator = QaPairGenerator::new(Arc::new(llm.clone()), EvalConfig::default()).unwrap();

    let set = generator
        .generate(&[segment("tiny", "  Too short.  "), segment("ok", &"word ".repeat(10))])
        .await
        .unwrap();

    assert_eq!(llm.call_count(), 1);
    assert_eq!(set.len(), 1);
    assert_eq!(set.pairs()[0].expected_segment_ids, vec!["ok".to_string()]);
}

#[tokio::test]
async fn empty_model_output_is_a_generation_failure() {
    let generator =
        QaPairGenerator::new(Arc::new(MockLlm::fixed("\n \n")), EvalConfig::default()).unwrap();
    let err = generator.generate(&segments()[..1]).await.unwrap_err();
    assert!(matches!(err, RagError::GenerationFailed { .. }));
}

#[tokio::test]
async fn generated_set_survives_save_and_load() {
    let generator = QaPairGenerator::new(Arc::new(UnevenModel), config(FailurePolicy::Abort));
    let set = generator.unwrap().generate(&segments()[1..]).await.unwrap();

    let file = tempfile::NamedTempFile::new().unwrap();
    set.save(file.path()).unwrap();

    assert_eq!(QaPairSet::load(file.path()).unwrap(), set);
}
