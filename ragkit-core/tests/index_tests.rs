//! Property tests for vector index search ordering.

use std::collections::HashMap;

use proptest::prelude::*;
use ragkit_core::document::Segment;
use ragkit_core::index::{Similarity, VectorIndex};

/// Generate a non-zero L2-normalized vector of the given dimension.
fn arb_normalized_vector(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero vector", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-8 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

fn segment(i: usize) -> Segment {
    Segment {
        id: format!("doc_{i}"),
        document_id: "doc".to_string(),
        index: i,
        text: format!("segment number {i}"),
        start: 0,
        end: 0,
        metadata: HashMap::new(),
    }
}

fn build(vectors: Vec<Vec<f32>>, similarity: Similarity) -> VectorIndex {
    let segments = (0..vectors.len()).map(segment).collect();
    VectorIndex::build(segments, vectors, similarity).unwrap()
}

fn arb_similarity() -> impl Strategy<Value = Similarity> {
    prop_oneof![Just(Similarity::Cosine), Just(Similarity::DotProduct), Just(Similarity::Euclidean)]
}

/// **Search results are ranked and bounded**
/// *For any* index and query, searching SHALL return `min(k, len)` results in
/// non-increasing score order, each segment at most once.
mod prop_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_k(
            vectors in proptest::collection::vec(arb_normalized_vector(DIM), 1..20),
            query in arb_normalized_vector(DIM),
            k in 1usize..25,
            similarity in arb_similarity(),
        ) {
            let count = vectors.len();
            let index = build(vectors, similarity);
            let results = index.search(&query, k).unwrap();

            prop_assert_eq!(results.len(), k.min(count));
            for pair in results.windows(2) {
                prop_assert!(
                    pair[0].score >= pair[1].score,
                    "results not in descending order: {} < {}",
                    pair[0].score,
                    pair[1].score
                );
            }
        }

        #[test]
        fn k_beyond_len_returns_every_segment_once(
            vectors in proptest::collection::vec(arb_normalized_vector(DIM), 1..20),
            query in arb_normalized_vector(DIM),
        ) {
            let count = vectors.len();
            let index = build(vectors, Similarity::Cosine);
            let results = index.search(&query, count + 5).unwrap();

            let mut ids: Vec<&str> = results.iter().map(|r| r.segment.id.as_str()).collect();
            ids.sort_unstable();
            ids.dedup();
            prop_assert_eq!(ids.len(), count);
        }

        #[test]
        fn search_is_deterministic(
            vectors in proptest::collection::vec(arb_normalized_vector(DIM), 1..20),
            query in arb_normalized_vector(DIM),
            k in 1usize..25,
        ) {
            let index = build(vectors, Similarity::Cosine);
            prop_assert_eq!(index.search(&query, k).unwrap(), index.search(&query, k).unwrap());
        }
    }
}

#[test]
fn exact_match_ranks_first() {
    let index = build(
        vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.6, 0.8, 0.0]],
        Similarity::Cosine,
    );
    let results = index.search(&[0.0, 1.0, 0.0], 2).unwrap();
    assert_eq!(results[0].segment.id, "doc_1");
    assert_eq!(results[1].segment.id, "doc_2");
    assert!((results[0].score - 1.0).abs() < 1e-6);
}

#[test]
fn empty_index_search_returns_nothing() {
    let index = VectorIndex::build(Vec::new(), Vec::new(), Similarity::Cosine).unwrap();
    assert!(index.is_empty());
    assert!(index.search(&[1.0, 2.0], 3).unwrap().is_empty());
}

#[test]
fn zero_vectors_score_zero_under_cosine() {
    let index = build(vec![vec![0.0, 0.0], vec![1.0, 0.0]], Similarity::Cosine);
    let results = index.search(&[1.0, 0.0], 2).unwrap();
    assert_eq!(results[0].segment.id, "doc_1");
    assert_eq!(results[1].score, 0.0);
}
