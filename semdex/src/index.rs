//! In-memory vector index with distance search and on-disk persistence.
//!
//! [`VectorIndex`] keeps its records in insertion order behind a
//! `tokio::sync::RwLock`. Writers (`add`, `delete`) take the write lock only
//! after all embedding work is done, so a failed or timed-out `add` never
//! leaves partial records behind, and readers see each `add` either entirely
//! or not at all.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::distance::DistanceMetric;
use crate::document::{Document, IndexedRecord, SearchResult};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};

/// File written inside the directory passed to [`VectorIndex::persist`].
pub const INDEX_FILE_NAME: &str = "index.json";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Default)]
struct IndexState {
    dimensions: Option<usize>,
    records: Vec<IndexedRecord>,
    ids: HashSet<String>,
}

/// An in-memory vector index searched by brute-force distance ranking.
///
/// The dimensionality is fixed by the first successful insertion and the
/// distance metric at construction; both are saved by
/// [`persist`](VectorIndex::persist) and restored by [`load`](VectorIndex::load).
/// Results come back nearest first, with ties going to the earlier insertion.
///
/// # Example
///
/// ```rust,ignore
/// use semdex::{CharNgramEmbedder, DistanceMetric, Document, VectorIndex};
///
/// let index = VectorIndex::new(DistanceMetric::Cosine);
/// let embedder = CharNgramEmbedder::default();
/// index.add(&[Document::new("public key cryptography")], &embedder).await?;
/// let hits = index.similarity_search_with_score("public keys", &embedder, 4).await?;
/// index.persist("indexes/crypto").await?;
/// ```
#[derive(Debug)]
pub struct VectorIndex {
    metric: DistanceMetric,
    state: RwLock<IndexState>,
    persist_lock: Mutex<()>,
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new(DistanceMetric::default())
    }
}

#[derive(Serialize)]
struct PersistedIndexRef<'a> {
    format_version: u32,
    dimensions: Option<usize>,
    metric: DistanceMetric,
    records: &'a [IndexedRecord],
}

#[derive(Deserialize)]
struct PersistedIndex {
    format_version: u32,
    dimensions: Option<usize>,
    metric: DistanceMetric,
    records: Vec<IndexedRecord>,
}

impl VectorIndex {
    /// Create an empty index ranking by `metric`.
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric, state: RwLock::new(IndexState::default()), persist_lock: Mutex::new(()) }
    }

    /// The distance metric this index ranks by.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// The established dimensionality, or `None` before the first insertion.
    pub async fn dimensions(&self) -> Option<usize> {
        self.state.read().await.dimensions
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Whether the index holds no records.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }

    /// Fetch a copy of one record.
    pub async fn get(&self, id: &str) -> Option<IndexedRecord> {
        self.state.read().await.records.iter().find(|r| r.id == id).cloned()
    }

    /// A copy of every record, in insertion order.
    pub async fn records(&self) -> Vec<IndexedRecord> {
        self.state.read().await.records.clone()
    }

    /// Embed and store documents under freshly generated ids.
    ///
    /// Returns the new ids in document order.
    ///
    /// # Errors
    ///
    /// - Any error from the embedder, propagated unchanged.
    /// - [`RagError::DimensionMismatch`] if the vectors disagree with each
    ///   other or with the index.
    /// - [`RagError::InvalidVector`] for vectors the metric cannot rank.
    /// - [`RagError::InvalidMetadata`] for NaN or infinite float metadata,
    ///   which could not be persisted and loaded back.
    ///
    /// On error the index is unchanged.
    pub async fn add(&self, documents: &[Document], embedder: &dyn Embedder) -> Result<Vec<String>> {
        let ids = documents.iter().map(|_| Uuid::new_v4().to_string()).collect();
        self.add_with_ids(documents, ids, embedder).await
    }

    /// Embed and store documents under caller-chosen ids.
    ///
    /// # Errors
    ///
    /// As [`add`](VectorIndex::add), plus [`RagError::Config`] when `ids` has
    /// the wrong length or repeats an id already present in the index or the
    /// batch.
    pub async fn add_with_ids(
        &self,
        documents: &[Document],
        ids: Vec<String>,
        embedder: &dyn Embedder,
    ) -> Result<Vec<String>> {
        if ids.len() != documents.len() {
            return Err(RagError::Config(format!(
                "got {} ids for {} documents",
                ids.len(),
                documents.len()
            )));
        }
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = documents.iter().map(Document::content).collect();
        let vectors = embedder.embed_documents(&texts).await.map_err(|e| {
            error!(provider = embedder.name(), document_count = documents.len(), error = %e, "embedding failed during add");
            e
        })?;
        if vectors.len() != documents.len() {
            return Err(RagError::EmbeddingProvider {
                provider: embedder.name().to_string(),
                message: format!(
                    "returned {} vectors for {} documents",
                    vectors.len(),
                    documents.len()
                ),
            });
        }

        let records = self.build_records(documents.to_vec(), ids, vectors)?;
        self.insert(records).await
    }

    /// Store documents whose vectors were computed elsewhere.
    ///
    /// The vectors must come from the same embedder configuration as the rest
    /// of the index. Returns the generated ids.
    ///
    /// # Errors
    ///
    /// As [`add`](VectorIndex::add), plus [`RagError::Config`] when the
    /// number of vectors differs from the number of documents.
    pub async fn add_embedded(
        &self,
        documents: Vec<Document>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Vec<String>> {
        if vectors.len() != documents.len() {
            return Err(RagError::Config(format!(
                "got {} vectors for {} documents",
                vectors.len(),
                documents.len()
            )));
        }
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let ids = documents.iter().map(|_| Uuid::new_v4().to_string()).collect();
        let records = self.build_records(documents, ids, vectors)?;
        self.insert(records).await
    }

    fn build_records(
        &self,
        documents: Vec<Document>,
        ids: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Vec<IndexedRecord>> {
        let batch_dimensions = vectors.first().map_or(0, Vec::len);
        documents
            .into_iter()
            .zip(ids)
            .zip(vectors)
            .enumerate()
            .map(|(position, ((document, id), vector))| {
                self.metric.check(&vector).map_err(|e| {
                    RagError::InvalidVector(format!("document {position} (id '{id}'): {e}"))
                })?;
                if let Some(key) = document.non_finite_entry() {
                    return Err(RagError::InvalidMetadata(format!(
                        "document {position} (id '{id}'): entry '{key}' is not a finite number"
                    )));
                }
                if vector.len() != batch_dimensions {
                    return Err(RagError::DimensionMismatch {
                        expected: batch_dimensions,
                        actual: vector.len(),
                    });
                }
                Ok(IndexedRecord { id, vector, document })
            })
            .collect()
    }

    async fn insert(&self, records: Vec<IndexedRecord>) -> Result<Vec<String>> {
        let Some(batch_dimensions) = records.first().map(|r| r.vector.len()) else {
            return Ok(Vec::new());
        };

        let mut state = self.state.write().await;
        if let Some(expected) = state.dimensions {
            if expected != batch_dimensions {
                error!(expected, actual = batch_dimensions, "dimension mismatch during add");
                return Err(RagError::DimensionMismatch { expected, actual: batch_dimensions });
            }
        }

        let mut batch_ids = HashSet::with_capacity(records.len());
        for record in &records {
            if state.ids.contains(&record.id) || !batch_ids.insert(record.id.as_str()) {
                return Err(RagError::Config(format!("duplicate record id '{}'", record.id)));
            }
        }

        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        state.dimensions = Some(batch_dimensions);
        for record in records {
            state.ids.insert(record.id.clone());
            state.records.push(record);
        }
        info!(added = ids.len(), record_count = state.records.len(), "added records to index");
        Ok(ids)
    }

    /// Remove records by id. Unknown ids are ignored.
    ///
    /// Returns the number of records removed. The dimensionality stays fixed
    /// even if the index becomes empty.
    pub async fn delete(&self, ids: &[&str]) -> usize {
        let mut state = self.state.write().await;
        let doomed: HashSet<&str> = ids.iter().copied().filter(|id| state.ids.contains(*id)).collect();
        if doomed.is_empty() {
            return 0;
        }
        state.records.retain(|r| !doomed.contains(r.id.as_str()));
        for id in &doomed {
            state.ids.remove(*id);
        }
        info!(removed = doomed.len(), record_count = state.records.len(), "deleted records from index");
        doomed.len()
    }

    /// Return the `k` documents nearest to `query`.
    ///
    /// See [`similarity_search_with_score`](VectorIndex::similarity_search_with_score).
    pub async fn similarity_search(
        &self,
        query: &str,
        embedder: &dyn Embedder,
        k: usize,
    ) -> Result<Vec<Document>> {
        let results = self.similarity_search_with_score(query, embedder, k).await?;
        Ok(results.into_iter().map(|r| r.document).collect())
    }

    /// Embed `query` and return the `min(k, len)` nearest records with their
    /// distances, nearest first.
    ///
    /// An empty index returns an empty result without calling the embedder.
    ///
    /// # Errors
    ///
    /// - Any error from the embedder.
    /// - [`RagError::DimensionMismatch`] if the query vector has the wrong length.
    /// - [`RagError::InvalidVector`] if the metric cannot rank the query vector.
    pub async fn similarity_search_with_score(
        &self,
        query: &str,
        embedder: &dyn Embedder,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        if k == 0 || self.is_empty().await {
            return Ok(Vec::new());
        }
        let vector = embedder.embed_query(query).await.map_err(|e| {
            error!(provider = embedder.name(), error = %e, "embedding failed during search");
            e
        })?;
        self.similarity_search_by_vector(&vector, k).await
    }

    /// Return the `min(k, len)` records nearest to `vector`, nearest first.
    pub async fn similarity_search_by_vector(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let state = self.state.read().await;
        if k == 0 || state.records.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = state.dimensions {
            if expected != vector.len() {
                return Err(RagError::DimensionMismatch { expected, actual: vector.len() });
            }
        }
        self.metric
            .check(vector)
            .map_err(|e| RagError::InvalidVector(format!("query vector: {e}")))?;

        let mut scored = state
            .records
            .iter()
            .enumerate()
            .map(|(position, record)| {
                self.metric.distance(vector, &record.vector).map(|distance| (position, distance))
            })
            .collect::<Result<Vec<(usize, f32)>>>()?;

        // Stable sort: equal distances keep insertion order.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);

        debug!(k, returned = scored.len(), record_count = state.records.len(), "similarity search");
        Ok(scored
            .into_iter()
            .map(|(position, distance)| {
                let record = &state.records[position];
                SearchResult { id: record.id.clone(), document: record.document.clone(), distance }
            })
            .collect())
    }

    /// Return up to `limit` records whose content equals `query` exactly, in
    /// insertion order, each with distance `0`.
    pub async fn exact_matches(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        self.state
            .read()
            .await
            .records
            .iter()
            .filter(|record| record.document.content() == query)
            .take(limit)
            .map(|record| SearchResult {
                id: record.id.clone(),
                document: record.document.clone(),
                distance: 0.0,
            })
            .collect()
    }

    /// Write a point-in-time snapshot of the index into directory `dir`.
    ///
    /// The snapshot is serialized under the read lock, written and synced to
    /// a uniquely named temporary file, then renamed over [`INDEX_FILE_NAME`],
    /// so a failure leaves any earlier snapshot intact. Persisting again
    /// overwrites it with the current state.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Persistence`] if the directory or file cannot be
    /// written.
    pub async fn persist(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        let _guard = self.persist_lock.lock().await;

        let (bytes, record_count) = {
            let state = self.state.read().await;
            let snapshot = PersistedIndexRef {
                format_version: FORMAT_VERSION,
                dimensions: state.dimensions,
                metric: self.metric,
                records: &state.records,
            };
            let bytes = serde_json::to_vec(&snapshot)
                .map_err(|e| persistence_error(dir, format!("failed to serialize index: {e}")))?;
            (bytes, state.records.len())
        };

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| persistence_error(dir, format!("failed to create directory: {e}")))?;

        let path = dir.join(INDEX_FILE_NAME);
        let tmp_path = dir.join(format!("{INDEX_FILE_NAME}.{}.tmp", Uuid::new_v4()));
        if let Err(e) = write_synced(&tmp_path, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            error!(path = %tmp_path.display(), error = %e, "failed to write snapshot");
            return Err(persistence_error(&tmp_path, format!("failed to write snapshot: {e}")));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            error!(path = %path.display(), error = %e, "failed to replace index file");
            return Err(persistence_error(&path, format!("failed to replace index file: {e}")));
        }

        info!(path = %path.display(), record_count, "persisted index");
        Ok(())
    }

    /// Reconstruct an index written by [`persist`](VectorIndex::persist).
    ///
    /// Stored vectors are trusted as-is; nothing is re-embedded. Queries and
    /// new documents must use an embedder configured like the one that built
    /// the index.
    ///
    /// # Errors
    ///
    /// - [`RagError::Persistence`] if the file is missing, unreadable, from an
    ///   unknown format version, or repeats a record id.
    /// - [`RagError::DimensionMismatch`] / [`RagError::InvalidVector`] for
    ///   corrupt vectors.
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(INDEX_FILE_NAME);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| persistence_error(&path, format!("failed to read index file: {e}")))?;
        let persisted: PersistedIndex = serde_json::from_slice(&bytes)
            .map_err(|e| persistence_error(&path, format!("malformed index file: {e}")))?;

        if persisted.format_version != FORMAT_VERSION {
            return Err(persistence_error(
                &path,
                format!("unsupported format version {}", persisted.format_version),
            ));
        }

        let metric = persisted.metric;
        let mut state = IndexState { dimensions: persisted.dimensions, ..IndexState::default() };
        if !persisted.records.is_empty() && state.dimensions.is_none() {
            return Err(persistence_error(&path, "records present but dimensions missing".into()));
        }
        for record in persisted.records {
            if let Some(expected) = state.dimensions {
                if record.vector.len() != expected {
                    return Err(RagError::DimensionMismatch { expected, actual: record.vector.len() });
                }
            }
            metric
                .check(&record.vector)
                .map_err(|e| RagError::InvalidVector(format!("record '{}': {e}", record.id)))?;
            if !state.ids.insert(record.id.clone()) {
                return Err(persistence_error(&path, format!("duplicate record id '{}'", record.id)));
            }
            state.records.push(record);
        }

        info!(path = %path.display(), record_count = state.records.len(), %metric, "loaded index");
        Ok(Self { metric, state: RwLock::new(state), persist_lock: Mutex::new(()) })
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

fn persistence_error(path: &Path, message: String) -> RagError {
    RagError::Persistence { path: path.display().to_string(), message }
}
