//! Property tests for document chunking coverage and boundaries.

use proptest::prelude::*;
use ragkit_core::chunking::{Chunker, FixedSizeChunker, SentenceChunker, reconstruct_text};
use ragkit_core::document::Document;
use ragkit_core::error::RagError;

/// Text mixing words, sentence ends, paragraph breaks and multi-byte characters.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            "[a-z]{1,10}",
            Just(" ".to_string()),
            Just(". ".to_string()),
            Just("\n\n".to_string()),
            Just("é".to_string()),
            Just("日本".to_string()),
        ],
        1..80,
    )
    .prop_map(|parts| parts.concat())
}

/// Chunk size and overlap with `overlap < size`.
fn arb_sizes() -> impl Strategy<Value = (usize, usize)> {
    (1usize..64).prop_flat_map(|size| (Just(size), 0..size))
}

/// **Segments cover the document without gaps**
/// *For any* non-empty text and valid chunk parameters, dropping each
/// segment's overlap with its predecessor and concatenating SHALL reproduce
/// the original text, and each segment SHALL be at most `chunk_size` bytes
/// unless it holds a single wider character.
mod prop_chunk_reconstruction {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn sentence_chunker_reconstructs_text(text in arb_text(), (size, overlap) in arb_sizes()) {
            let doc = Document::new("doc", text.clone());
            let segments = SentenceChunker::new(size, overlap).chunk(&doc).unwrap();

            prop_assert_eq!(reconstruct_text(&segments), text);
            for segment in &segments {
                prop_assert!(!segment.text.is_empty());
                prop_assert!(segment.text.len() <= size || segment.text.chars().count() == 1);
            }
        }

        #[test]
        fn fixed_size_chunker_reconstructs_text(text in arb_text(), (size, overlap) in arb_sizes()) {
            let doc = Document::new("doc", text.clone());
            let segments = FixedSizeChunker::new(size, overlap).chunk(&doc).unwrap();

            prop_assert_eq!(reconstruct_text(&segments), text);
        }

        #[test]
        fn segments_are_ordered_and_uniquely_named(text in arb_text(), (size, overlap) in arb_sizes()) {
            let doc = Document::new("doc", text);
            let segments = SentenceChunker::new(size, overlap).chunk(&doc).unwrap();

            for (i, segment) in segments.iter().enumerate() {
                prop_assert_eq!(segment.index, i);
                prop_assert_eq!(&segment.id, &format!("doc_{i}"));
                prop_assert_eq!(&segment.document_id, "doc");
            }
            for pair in segments.windows(2) {
                prop_assert!(pair[1].start > pair[0].start);
                prop_assert!(pair[1].start <= pair[0].end);
            }
        }
    }
}

#[test]
fn short_document_is_a_single_segment() {
    let doc = Document::new("short", "Only a few words.");
    let segments = SentenceChunker::new(1024, 200).chunk(&doc).unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].text, "Only a few words.");
}

#[test]
fn prefers_paragraph_breaks() {
    let text = "Alpha beta gamma delta.\n\nEpsilon zeta eta theta iota kappa.";
    let doc = Document::new("p", text);
    let segments = SentenceChunker::new(40, 0).chunk(&doc).unwrap();
    assert_eq!(segments[0].text, "Alpha beta gamma delta.\n\n");
    assert_eq!(reconstruct_text(&segments), text);
}

#[test]
fn overlap_is_shared_between_neighbours() {
    let doc = Document::new("o", "abcdefghijklmnopqrstuvwxyz");
    let segments = FixedSizeChunker::new(10, 3).chunk(&doc).unwrap();
    assert_eq!(segments[0].text, "abcdefghij");
    assert_eq!(segments[1].text, "hijklmnopq");
    assert!(segments[1].text.starts_with(&segments[0].text[7..]));
}

#[test]
fn page_and_source_are_copied_to_metadata() {
    let doc = Document::new("d", "Some text here.")
        .with_source_uri("file:///tmp/d.txt")
        .with_page(3)
        .with_metadata("company", "uber");
    let segments = SentenceChunker::new(100, 10).chunk(&doc).unwrap();
    let metadata = &segments[0].metadata;
    assert_eq!(metadata.get("page").map(String::as_str), Some("3"));
    assert_eq!(metadata.get("source_uri").map(String::as_str), Some("file:///tmp/d.txt"));
    assert_eq!(metadata.get("company").map(String::as_str), Some("uber"));
    assert_eq!(metadata.get("chunk_index").map(String::as_str), Some("0"));
}

#[test]
fn invalid_parameters_are_rejected() {
    let doc = Document::new("d", "text");
    assert!(matches!(SentenceChunker::new(0, 0).chunk(&doc), Err(RagError::InvalidInput(_))));
    assert!(matches!(SentenceChunker::new(10, 10).chunk(&doc), Err(RagError::InvalidInput(_))));
    let empty = Document::new("e", "");
    assert!(matches!(FixedSizeChunker::new(10, 0).chunk(&empty), Err(RagError::InvalidInput(_))));
}
