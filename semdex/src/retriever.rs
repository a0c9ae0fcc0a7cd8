//! Query-facing view over a vector index.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RetrieverConfig;
use crate::document::{Document, SearchResult};
use crate::embedding::Embedder;
use crate::error::Result;
use crate::index::VectorIndex;

/// How a retriever selects candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Rank every record by distance to the embedded query.
    #[default]
    Similarity,
    /// Return records whose content equals the query verbatim.
    ExactMatch,
}

/// Turns a query string into ranked results.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return results for `query`, most relevant first.
    async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>>;

    /// Return only the documents for `query`, most relevant first.
    async fn get_relevant_documents(&self, query: &str) -> Result<Vec<Document>> {
        Ok(self.retrieve(query).await?.into_iter().map(|r| r.document).collect())
    }
}

/// A [`Retriever`] over a shared [`VectorIndex`].
///
/// With [`SearchStrategy::Similarity`] it returns the `result_count` nearest
/// records, dropping any farther than `score_threshold` when one is set.
/// With [`SearchStrategy::ExactMatch`] it returns up to `result_count`
/// records whose content equals the query, in insertion order and with
/// distance `0`, and never calls the embedder.
#[derive(Clone)]
pub struct VectorIndexRetriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    config: RetrieverConfig,
}

impl VectorIndexRetriever {
    /// Create a retriever.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`](crate::RagError::Config) if `config` is invalid.
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        config: RetrieverConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { index, embedder, config })
    }

    /// The retriever's configuration.
    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// The index this retriever reads.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }
}

#[async_trait]
impl Retriever for VectorIndexRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        let k = self.config.result_count;
        let results = match self.config.strategy {
            SearchStrategy::ExactMatch => self.index.exact_matches(query, k).await,
            SearchStrategy::Similarity => {
                let mut results =
                    self.index.similarity_search_with_score(query, self.embedder.as_ref(), k).await?;
                if let Some(threshold) = self.config.score_threshold {
                    results.retain(|r| r.distance <= threshold);
                }
                results
            }
        };
        debug!(strategy = ?self.config.strategy, k, returned = results.len(), "retrieved documents");
        Ok(results)
    }
}
