//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the full ingest-and-query workflow by
//! composing a [`TextSplitter`], an [`Embedder`], a [`VectorIndex`], a
//! [`VectorIndexRetriever`] and an optional [`LanguageModel`].
//!
//! # Example
//!
//! ```rust,ignore
//! use semdex::{CharNgramEmbedder, Document, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::builder().chunk_size(500).chunk_overlap(50).build()?)
//!     .embedder(Arc::new(CharNgramEmbedder::default()))
//!     .language_model(Arc::new(my_model))
//!     .build()?;
//!
//! pipeline.ingest(&Document::new(text).with_entry("source", "notes.txt")).await?;
//! let results = pipeline.query("what changed?").await?;
//! let answer = pipeline.answer("what changed?").await?;
//! pipeline.persist("indexes/notes").await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, error, info};

use crate::config::RagConfig;
use crate::document::{Document, SearchResult};
use crate::embedding::{Embedder, TimeoutEmbedder};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::llm::{LanguageModel, TimeoutLanguageModel};
use crate::retriever::{Retriever, VectorIndexRetriever};
use crate::splitter::{RecursiveCharacterSplitter, TextSplitter};
use crate::synthesizer::{Answer, AnswerSynthesizer};

/// The RAG pipeline orchestrator.
///
/// Coordinates document ingestion (split → embed → index) and query
/// execution (embed → search → optionally answer). Construct one via
/// [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    splitter: Arc<dyn TextSplitter>,
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    retriever: Arc<VectorIndexRetriever>,
    synthesizer: Option<AnswerSynthesizer>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Load a persisted index from `dir` and build a pipeline around it.
    ///
    /// `builder` supplies everything except the index; the embedder must be
    /// configured like the one that built the index.
    ///
    /// # Errors
    ///
    /// Returns the error from [`VectorIndex::load`] or from
    /// [`RagPipelineBuilder::build`].
    pub async fn load(dir: impl AsRef<Path>, builder: RagPipelineBuilder) -> Result<Self> {
        let index = VectorIndex::load(dir).await?;
        builder.index(Arc::new(index)).build()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedder, including any timeout wrapper.
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Return a reference to the splitter.
    pub fn splitter(&self) -> &Arc<dyn TextSplitter> {
        &self.splitter
    }

    /// Return a reference to the vector index.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Return the retriever queries go through.
    pub fn retriever(&self) -> Arc<VectorIndexRetriever> {
        Arc::clone(&self.retriever)
    }

    /// Ingest a single document: split → embed → index.
    ///
    /// Returns the ids of the stored chunks.
    ///
    /// # Errors
    ///
    /// See [`ingest_batch`](RagPipeline::ingest_batch).
    pub async fn ingest(&self, document: &Document) -> Result<Vec<String>> {
        self.ingest_batch(std::slice::from_ref(document)).await
    }

    /// Ingest multiple documents as one atomic insertion.
    ///
    /// Every document is split, the chunks are embedded in batches of
    /// `embed_batch_size` issued concurrently, and all chunks are added to
    /// the index at once. If any batch fails, nothing is stored.
    ///
    /// # Errors
    ///
    /// Propagates embedding, timeout, dimension and vector errors unchanged.
    pub async fn ingest_batch(&self, documents: &[Document]) -> Result<Vec<String>> {
        let chunks = self.splitter.split_documents(documents);
        if chunks.is_empty() {
            info!(document_count = documents.len(), chunk_count = 0, "ingested documents (empty)");
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(Document::content).collect();
        let batches = texts.chunks(self.config.embed_batch_size);
        debug!(chunk_count = chunks.len(), batch_count = batches.len(), "embedding chunks");

        let embedded = try_join_all(batches.map(|batch| self.embedder.embed_documents(batch)))
            .await
            .map_err(|e| {
                error!(document_count = documents.len(), error = %e, "embedding failed during ingestion");
                e
            })?;
        let vectors: Vec<Vec<f32>> = embedded.into_iter().flatten().collect();
        if vectors.len() != chunks.len() {
            return Err(RagError::EmbeddingProvider {
                provider: self.embedder.name().to_string(),
                message: format!("returned {} vectors for {} chunks", vectors.len(), chunks.len()),
            });
        }

        let chunk_count = chunks.len();
        let ids = self.index.add_embedded(chunks, vectors).await.map_err(|e| {
            error!(document_count = documents.len(), error = %e, "indexing failed during ingestion");
            e
        })?;

        info!(document_count = documents.len(), chunk_count, "ingested documents");
        Ok(ids)
    }

    /// Query the pipeline through its retriever.
    ///
    /// Returns search results ordered nearest first.
    ///
    /// # Errors
    ///
    /// Propagates embedding and search errors unchanged.
    pub async fn query(&self, query: &str) -> Result<Vec<SearchResult>> {
        let results = self.retriever.retrieve(query).await?;
        info!(result_count = results.len(), "query completed");
        Ok(results)
    }

    /// Answer `query` from the retrieved chunks with the configured model.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if no language model was configured, and
    /// otherwise propagates retrieval and generation errors.
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        let synthesizer = self
            .synthesizer
            .as_ref()
            .ok_or_else(|| RagError::Config("no language model configured".to_string()))?;
        synthesizer.answer(query).await
    }

    /// Persist the index into directory `dir`.
    ///
    /// # Errors
    ///
    /// See [`VectorIndex::persist`].
    pub async fn persist(&self, dir: impl AsRef<Path>) -> Result<()> {
        self.index.persist(dir).await
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// Only the embedder is required. The config defaults to
/// [`RagConfig::default()`], the splitter to a [`RecursiveCharacterSplitter`]
/// built from the config, and the index to an empty one using the config's
/// metric. Call [`build()`](RagPipelineBuilder::build) to validate and
/// produce the pipeline.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    splitter: Option<Arc<dyn TextSplitter>>,
    embedder: Option<Arc<dyn Embedder>>,
    index: Option<Arc<VectorIndex>>,
    language_model: Option<Arc<dyn LanguageModel>>,
    source_key: Option<String>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the splitter, replacing the one built from the config.
    pub fn splitter(mut self, splitter: Arc<dyn TextSplitter>) -> Self {
        self.splitter = Some(splitter);
        self
    }

    /// Set the embedder.
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Use an existing index, for example one returned by [`VectorIndex::load`].
    pub fn index(mut self, index: Arc<VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the language model used by [`RagPipeline::answer`].
    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(model);
        self
    }

    /// Read answer source identifiers from this metadata key.
    pub fn source_key(mut self, key: impl Into<String>) -> Self {
        self.source_key = Some(key.into());
        self
    }

    /// Build the [`RagPipeline`], validating the configuration.
    ///
    /// When `request_timeout_ms` is set, the embedder and language model are
    /// wrapped so every call is bounded by it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the embedder is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let mut embedder =
            self.embedder.ok_or_else(|| RagError::Config("embedder is required".to_string()))?;
        let mut language_model = self.language_model;
        if let Some(timeout) = config.request_timeout() {
            embedder = Arc::new(TimeoutEmbedder::new(embedder, timeout));
            language_model = language_model
                .map(|m| Arc::new(TimeoutLanguageModel::new(m, timeout)) as Arc<dyn LanguageModel>);
        }

        let splitter = match self.splitter {
            Some(splitter) => splitter,
            None => Arc::new(RecursiveCharacterSplitter::from_config(config.splitter.clone())?),
        };
        let index = self.index.unwrap_or_else(|| Arc::new(VectorIndex::new(config.metric)));
        if index.metric() != config.metric {
            debug!(index_metric = %index.metric(), config_metric = %config.metric, "using the index's metric");
        }

        let retriever =
            Arc::new(VectorIndexRetriever::new(Arc::clone(&index), Arc::clone(&embedder), config.retriever)?);
        let synthesizer = language_model.map(|model| {
            let synthesizer = AnswerSynthesizer::new(retriever.clone(), model);
            match &self.source_key {
                Some(key) => synthesizer.with_source_key(key.clone()),
                None => synthesizer,
            }
        });

        Ok(RagPipeline { config, splitter, embedder, index, retriever, synthesizer })
    }
}
