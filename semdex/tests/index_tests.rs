//! Integration tests for vector index search, concurrency, and persistence.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;
use semdex::{
    CharNgramEmbedder, DistanceMetric, Document, Embedder, Metadata, MetadataValue, RagError,
    Result, TimeoutEmbedder, VectorIndex,
};

/// Exact lowercase a–z bigram counts, one dimension per bigram.
struct BigramEmbedder;

impl BigramEmbedder {
    fn embed(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; 26 * 26];
        let letters: Vec<usize> = text
            .bytes()
            .filter(u8::is_ascii_lowercase)
            .map(|b| usize::from(b - b'a'))
            .collect();
        for pair in letters.windows(2) {
            vector[pair[0] * 26 + pair[1]] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for BigramEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::embed(t)).collect())
    }

    fn dimensions(&self) -> usize {
        26 * 26
    }
}

/// Never answers within any reasonable deadline.
struct StalledEmbedder;

#[async_trait]
impl Embedder for StalledEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(texts.iter().map(|_| vec![1.0; 4]).collect())
    }

    fn dimensions(&self) -> usize {
        4
    }
}

fn docs(contents: &[&str]) -> Vec<Document> {
    contents.iter().map(|c| Document::new(*c)).collect()
}

#[tokio::test]
async fn nearest_animal_follows_exact_match() {
    let index = VectorIndex::new(DistanceMetric::Cosine);
    index.add(&docs(&["cat", "dog", "car"]), &BigramEmbedder).await.unwrap();

    let results = index.similarity_search_with_score("cat", &BigramEmbedder, 2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].document.content(), "cat");
    assert!(results[0].distance.abs() < 1e-6);
    assert_eq!(results[1].document.content(), "car");
    assert!((results[1].distance - 0.5).abs() < 1e-6);
}

#[tokio::test]
async fn concurrent_adds_store_the_union() {
    let index = Arc::new(VectorIndex::default());
    let embedder = CharNgramEmbedder::default();
    let left: Vec<Document> = (0..50).map(|i| Document::new(format!("left {i}"))).collect();
    let right: Vec<Document> = (0..50).map(|i| Document::new(format!("right {i}"))).collect();

    let (a, b) = tokio::join!(index.add(&left, &embedder), index.add(&right, &embedder));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(index.len().await, 100);
    let mut ids: Vec<String> = a.into_iter().chain(b).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 100);
    for id in &ids {
        assert!(index.get(id).await.is_some());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_see_partial_batches() {
    let index = Arc::new(VectorIndex::default());
    let embedder = Arc::new(CharNgramEmbedder::default());
    let batch: Vec<Document> = (0..25).map(|i| Document::new(format!("doc {i}"))).collect();

    let writer = {
        let index = Arc::clone(&index);
        let embedder = Arc::clone(&embedder);
        tokio::spawn(async move {
            for _ in 0..8 {
                index.add(&batch, embedder.as_ref()).await.unwrap();
            }
        })
    };
    let reader = {
        let index = Arc::clone(&index);
        tokio::spawn(async move {
            for _ in 0..200 {
                assert_eq!(index.len().await % 25, 0);
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();
    assert_eq!(index.len().await, 200);
}

#[tokio::test(start_paused = true)]
async fn timed_out_add_leaves_index_unchanged() {
    let index = VectorIndex::default();
    index.add_embedded(docs(&["seed"]), vec![vec![1.0, 0.0, 0.0, 0.0]]).await.unwrap();

    let embedder = TimeoutEmbedder::new(Arc::new(StalledEmbedder), Duration::from_secs(2));
    let err = index.add(&docs(&["late"]), &embedder).await.unwrap_err();

    assert!(matches!(err, RagError::Timeout { .. }));
    assert!(err.is_transient());
    assert_eq!(index.len().await, 1);
}

#[tokio::test]
async fn wrong_embedder_is_a_dimension_mismatch() {
    let index = VectorIndex::default();
    index.add(&docs(&["cat"]), &BigramEmbedder).await.unwrap();

    let err = index.similarity_search("cat", &CharNgramEmbedder::default(), 1).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 676, actual: 256 }));
}

#[tokio::test]
async fn persisted_index_answers_identically() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = CharNgramEmbedder::default();
    let index = VectorIndex::new(DistanceMetric::Cosine);
    let corpus = [
        "The quick brown fox",
        "jumps over the lazy dog",
        "Pack my box with five dozen liquor jugs",
        "How vexingly quick daft zebras jump",
    ];
    let documents: Vec<Document> = corpus
        .iter()
        .enumerate()
        .map(|(i, text)| Document::new(*text).with_entry("source", format!("pangram-{i}.txt")))
        .collect();
    index.add(&documents, &embedder).await.unwrap();
    index.persist(dir.path().join("nested/index")).await.unwrap();

    let loaded = VectorIndex::load(dir.path().join("nested/index")).await.unwrap();
    assert_eq!(loaded.len().await, 4);

    for query in ["quick fox", "lazy dog", "zebras", "liquor"] {
        let before = index.similarity_search_with_score(query, &embedder, 3).await.unwrap();
        let after = loaded.similarity_search_with_score(query, &embedder, 3).await.unwrap();
        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(&after) {
            assert_eq!(b.id, a.id);
            assert_eq!(b.document, a.document);
            assert!((b.distance - a.distance).abs() < 1e-6);
        }
    }

    // Persisting again overwrites with the current state.
    let first = index.records().await[0].id.clone();
    assert_eq!(index.delete(&[first.as_str()]).await, 1);
    index.persist(dir.path().join("nested/index")).await.unwrap();
    let reloaded = VectorIndex::load(dir.path().join("nested/index")).await.unwrap();
    assert_eq!(reloaded.len().await, 3);
}

#[tokio::test]
async fn loaded_index_accepts_new_documents() {
    let dir = tempfile::tempdir().unwrap();
    let index = VectorIndex::default();
    index.add(&docs(&["cat", "dog"]), &BigramEmbedder).await.unwrap();
    index.persist(dir.path()).await.unwrap();

    let loaded = VectorIndex::load(dir.path()).await.unwrap();
    loaded.add(&docs(&["car"]), &BigramEmbedder).await.unwrap();
    let results = loaded.similarity_search("car", &BigramEmbedder, 1).await.unwrap();
    assert_eq!(results[0].content(), "car");
}

fn arb_vector(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim)
        .prop_filter("non-zero vector", |v| v.iter().any(|x| x.abs() > 1e-3))
}

/// **Search results are bounded and ordered**
/// *For any* set of stored vectors and any query, a search returns exactly
/// `min(k, len)` results in non-decreasing distance order, and a stored
/// vector used as the query comes back first at distance zero.
mod prop_search_bounds {
    use super::*;

    const DIM: usize = 8;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_bounded_and_ordered(
            vectors in proptest::collection::vec(arb_vector(DIM), 1..30),
            query in arb_vector(DIM),
            k in 1usize..40,
            metric in prop_oneof![
                Just(DistanceMetric::Cosine),
                Just(DistanceMetric::Euclidean),
                Just(DistanceMetric::InnerProduct),
            ],
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (results, self_hit, count) = rt.block_on(async {
                let index = VectorIndex::new(metric);
                let documents: Vec<Document> =
                    (0..vectors.len()).map(|i| Document::new(format!("v{i}"))).collect();
                index.add_embedded(documents, vectors.clone()).await.unwrap();

                let results = index.similarity_search_by_vector(&query, k).await.unwrap();
                let self_hit = index.similarity_search_by_vector(&vectors[0], 1).await.unwrap();
                (results, self_hit, vectors.len())
            });

            prop_assert_eq!(results.len(), k.min(count));
            for pair in results.windows(2) {
                prop_assert!(pair[0].distance <= pair[1].distance);
            }
            if metric != DistanceMetric::InnerProduct {
                prop_assert!(self_hit[0].distance.abs() < 1e-5);
            }
        }
    }
}

fn arb_metric() -> impl Strategy<Value = DistanceMetric> {
    prop_oneof![
        Just(DistanceMetric::Cosine),
        Just(DistanceMetric::Euclidean),
        Just(DistanceMetric::InnerProduct),
    ]
}

/// Components on a 1/128 grid, so their decimal form is exact.
fn arb_grid_vector(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec((-256i32..256).prop_map(|n| n as f32 / 128.0), dim)
        .prop_filter("non-zero vector", |v| v.iter().any(|x| *x != 0.0))
}

fn arb_metadata_value() -> impl Strategy<Value = MetadataValue> {
    prop_oneof![
        any::<bool>().prop_map(MetadataValue::Bool),
        any::<i64>().prop_map(MetadataValue::Integer),
        (-1_000_000i32..1_000_000).prop_map(|n| MetadataValue::Float(f64::from(n) / 64.0)),
        "[a-z ]{0,12}".prop_map(MetadataValue::String),
    ]
}

fn arb_document() -> impl Strategy<Value = Document> {
    (
        "[a-zA-Z0-9 .]{0,24}",
        proptest::collection::btree_map("[a-z_]{1,8}", arb_metadata_value(), 0..4),
    )
        .prop_map(|(content, metadata): (String, Metadata)| Document::with_metadata(content, metadata))
}

/// **Persisting then loading changes nothing observable**
/// *For any* index (any metric, possibly empty, with scalar metadata of
/// every kind), `load(persist(index))` holds equal records in the same
/// order, keeps the metric and dimensionality, and answers every query
/// with the same ids in the same order at the same distances.
mod prop_persist_round_trip {
    use super::*;

    const DIM: usize = 6;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn load_after_persist_is_equivalent(
            entries in proptest::collection::vec((arb_document(), arb_grid_vector(DIM)), 0..12),
            query in arb_grid_vector(DIM),
            metric in arb_metric(),
        ) {
            let dir = tempfile::tempdir().unwrap();
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (index, loaded) = rt.block_on(async {
                let index = VectorIndex::new(metric);
                let (documents, vectors): (Vec<Document>, Vec<Vec<f32>>) = entries.into_iter().unzip();
                index.add_embedded(documents, vectors).await.unwrap();
                index.persist(dir.path()).await.unwrap();
                let loaded = VectorIndex::load(dir.path()).await.unwrap();
                (index, loaded)
            });

            let (records, loaded_records, dims, loaded_dims, before, after) = rt.block_on(async {
                let k = index.len().await + 1;
                (
                    index.records().await,
                    loaded.records().await,
                    index.dimensions().await,
                    loaded.dimensions().await,
                    index.similarity_search_by_vector(&query, k).await.unwrap(),
                    loaded.similarity_search_by_vector(&query, k).await.unwrap(),
                )
            });

            prop_assert_eq!(loaded.metric(), metric);
            prop_assert_eq!(loaded_dims, dims);
            prop_assert_eq!(&loaded_records, &records);
            prop_assert_eq!(before.len(), records.len());
            prop_assert_eq!(after.len(), before.len());
            for (b, a) in before.iter().zip(&after) {
                prop_assert_eq!(&b.id, &a.id);
                prop_assert_eq!(&b.document, &a.document);
                prop_assert!((b.distance - a.distance).abs() < 1e-6);
            }
        }
    }
}
