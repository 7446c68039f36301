//! Search ordering and persistence tests for the vector index.

use std::collections::HashMap;
use std::fs;

use medbot_rag::document::Chunk;
use medbot_rag::embedding::HashingEmbeddingProvider;
use medbot_rag::error::RagError;
use medbot_rag::index::{INDEX_FILE_NAME, VectorIndex, read_descriptor};
use proptest::prelude::*;

const DIM: usize = 8;

fn chunk(i: usize) -> Chunk {
    Chunk {
        id: format!("doc_{i}"),
        text: format!("chunk number {i}"),
        metadata: HashMap::new(),
        document_id: "doc".to_string(),
        start_offset: i * 10,
    }
}

fn arb_vector(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim)
}

fn index_from(vectors: Vec<Vec<f32>>) -> VectorIndex {
    let chunks = (0..vectors.len()).map(chunk).collect();
    VectorIndex::from_embeddings(chunks, vectors, "test-model", DIM).unwrap()
}

/// **Search ordering**
/// *For any* non-empty index and query, search returns exactly
/// `min(top_k, len)` distinct stored chunks in non-increasing score order,
/// and every chunk left out scores no higher than the last one returned.
mod prop_search_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_are_the_best_min_k_n_in_descending_order(
            vectors in proptest::collection::vec(arb_vector(DIM), 1..30),
            query in arb_vector(DIM),
            top_k in 1usize..40,
        ) {
            let index = index_from(vectors);
            let results = index.search(&query, top_k).unwrap();

            prop_assert_eq!(results.len(), top_k.min(index.len()));
            for pair in results.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }

            let returned: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
            let mut unique = returned.clone();
            unique.sort_unstable();
            unique.dedup();
            prop_assert_eq!(unique.len(), returned.len());

            let everything = index.search(&query, index.len()).unwrap();
            if let Some(last) = results.last() {
                let left_out =
                    everything.iter().filter(|r| !returned.contains(&r.chunk.id.as_str()));
                for result in left_out {
                    prop_assert!(result.score <= last.score);
                }
            }
        }

        #[test]
        fn scores_are_bounded_cosine_similarities(
            vectors in proptest::collection::vec(arb_vector(DIM), 1..10),
            query in arb_vector(DIM),
        ) {
            let index = index_from(vectors);
            for result in index.search(&query, index.len()).unwrap() {
                prop_assert!((-1.0001..=1.0001).contains(&result.score));
            }
        }
    }
}

#[test]
fn saved_index_answers_queries_identically_after_load() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("db_index");
    let vectors = vec![
        vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        vec![0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        vec![0.2, 0.1, 0.3, 0.9, 0.0, 0.0, 0.0, 0.4],
    ];
    let index = index_from(vectors);
    index.save(&path).unwrap();

    let loaded = VectorIndex::load(&path, DIM).unwrap();
    assert_eq!(loaded.descriptor(), index.descriptor());
    assert_eq!(loaded.chunks(), index.chunks());

    let queries = [
        [1.0, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 0.4, 1.0, 0.0, 0.0, 0.0, 0.3],
    ];
    for query in queries {
        let before = index.search(&query, 3).unwrap();
        let after = loaded.search(&query, 3).unwrap();
        let ids = |rs: &[medbot_rag::SearchResult]| {
            rs.iter().map(|r| (r.chunk.id.clone(), r.score)).collect::<Vec<_>>()
        };
        assert_eq!(ids(&before), ids(&after));
    }
}

#[test]
fn loading_with_other_dimensions_is_a_dimension_mismatch() {
    let temp = tempfile::tempdir().unwrap();
    index_from(vec![vec![1.0; DIM]]).save(temp.path()).unwrap();

    let err = VectorIndex::load(temp.path(), 16).unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 16, actual: DIM }));
}

#[test]
fn unknown_format_version_is_corrupt() {
    let temp = tempfile::tempdir().unwrap();
    index_from(vec![vec![1.0; DIM]]).save(temp.path()).unwrap();

    let payload = temp.path().join(INDEX_FILE_NAME);
    let mut json: serde_json::Value = serde_json::from_slice(&fs::read(&payload).unwrap()).unwrap();
    json["descriptor"]["format_version"] = serde_json::json!(99);
    fs::write(&payload, serde_json::to_vec(&json).unwrap()).unwrap();

    let err = VectorIndex::load(temp.path(), DIM).unwrap_err();
    assert!(matches!(err, RagError::IndexCorrupt { ref message, .. } if message.contains("99")));
}

#[test]
fn truncated_payload_is_corrupt() {
    let temp = tempfile::tempdir().unwrap();
    index_from(vec![vec![1.0; DIM]]).save(temp.path()).unwrap();

    let payload = temp.path().join(INDEX_FILE_NAME);
    let bytes = fs::read(&payload).unwrap();
    fs::write(&payload, &bytes[..bytes.len() / 2]).unwrap();

    assert!(matches!(VectorIndex::load(temp.path(), DIM), Err(RagError::IndexCorrupt { .. })));
}

#[test]
fn missing_index_is_corrupt() {
    let temp = tempfile::tempdir().unwrap();
    let err = VectorIndex::load(temp.path().join("nothing-here"), DIM).unwrap_err();
    assert!(matches!(err, RagError::IndexCorrupt { .. }));
}

#[tokio::test]
async fn load_for_rejects_an_index_built_by_another_model() {
    let temp = tempfile::tempdir().unwrap();
    index_from(vec![vec![1.0; DIM]]).save(temp.path()).unwrap();

    let provider = HashingEmbeddingProvider::new(DIM).unwrap();
    let err = VectorIndex::load_for(temp.path(), &provider).unwrap_err();
    assert!(matches!(
        err,
        RagError::EmbeddingModelMismatch { ref found, .. } if found == "test-model"
    ));
}

#[tokio::test]
async fn load_for_accepts_an_index_built_by_the_same_provider() {
    let temp = tempfile::tempdir().unwrap();
    let provider = HashingEmbeddingProvider::new(DIM).unwrap();
    let index = VectorIndex::build(vec![chunk(0), chunk(1)], &provider).await.unwrap();
    index.save(temp.path()).unwrap();

    let loaded = VectorIndex::load_for(temp.path(), &provider).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(read_descriptor(temp.path()).unwrap().embedding_model, "hashing-sha256-8");
}
