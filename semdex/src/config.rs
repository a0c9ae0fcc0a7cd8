//! Configuration for splitting, retrieval, and the pipeline.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::error::{RagError, Result};
use crate::retriever::SearchStrategy;
use crate::splitter::KeepSeparator;

/// Default separators: paragraph break, line break, space, then anywhere.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Configuration for a [`RecursiveCharacterSplitter`](crate::RecursiveCharacterSplitter).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SplitterConfig {
    /// Maximum chunk size, measured by the splitter's length function.
    pub chunk_size: usize,
    /// Size of the content repeated between consecutive chunks.
    pub chunk_overlap: usize,
    /// Candidate separators, highest priority first. `""` splits anywhere.
    pub separators: Vec<String>,
    /// Which piece keeps a matched separator.
    pub keep_separator: KeepSeparator,
    /// Trim surrounding whitespace from every chunk.
    pub strip_whitespace: bool,
    /// Record each chunk's character offset as `start_index` metadata.
    pub add_start_index: bool,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            keep_separator: KeepSeparator::End,
            strip_whitespace: true,
            add_start_index: false,
        }
    }
}

impl SplitterConfig {
    /// Create a new builder for constructing a [`SplitterConfig`].
    pub fn builder() -> SplitterConfigBuilder {
        SplitterConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `separators` is empty
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.separators.is_empty() {
            return Err(RagError::Config("at least one separator is required".to_string()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`SplitterConfig`].
#[derive(Debug, Clone, Default)]
pub struct SplitterConfigBuilder {
    config: SplitterConfig,
}

impl SplitterConfigBuilder {
    /// Set the maximum chunk size.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Replace the separator priority list.
    pub fn separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Choose which piece keeps a matched separator.
    pub fn keep_separator(mut self, keep: KeepSeparator) -> Self {
        self.config.keep_separator = keep;
        self
    }

    /// Trim surrounding whitespace from chunks.
    pub fn strip_whitespace(mut self, strip: bool) -> Self {
        self.config.strip_whitespace = strip;
        self
    }

    /// Record each chunk's start offset in its metadata.
    pub fn add_start_index(mut self, add: bool) -> Self {
        self.config.add_start_index = add;
        self
    }

    /// Build the [`SplitterConfig`].
    ///
    /// # Errors
    ///
    /// See [`SplitterConfig::validate`].
    pub fn build(self) -> Result<SplitterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Query shape for a [`VectorIndexRetriever`](crate::VectorIndexRetriever).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Number of results returned per query.
    pub result_count: usize,
    /// How candidates are selected.
    pub strategy: SearchStrategy,
    /// Drop similarity results farther than this distance.
    pub score_threshold: Option<f32>,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self { result_count: 4, strategy: SearchStrategy::Similarity, score_threshold: None }
    }
}

impl RetrieverConfig {
    /// A similarity retriever returning `k` results.
    pub fn similarity(k: usize) -> Self {
        Self { result_count: k, ..Self::default() }
    }

    /// An exact-match retriever returning at most `k` results.
    pub fn exact_match(k: usize) -> Self {
        Self { result_count: k, strategy: SearchStrategy::ExactMatch, score_threshold: None }
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `result_count == 0` or the threshold
    /// is not a finite number.
    pub fn validate(&self) -> Result<()> {
        if self.result_count == 0 {
            return Err(RagError::Config("result_count must be greater than zero".to_string()));
        }
        if let Some(threshold) = self.score_threshold {
            if !threshold.is_finite() {
                return Err(RagError::Config(format!(
                    "score_threshold must be finite, got {threshold}"
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for the [`RagPipeline`](crate::RagPipeline).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// How documents are split before indexing.
    pub splitter: SplitterConfig,
    /// How queries are answered.
    pub retriever: RetrieverConfig,
    /// Distance metric for a freshly created index.
    pub metric: DistanceMetric,
    /// Number of texts sent per embedding request during ingestion.
    pub embed_batch_size: usize,
    /// Deadline for each embedding or language model call, in milliseconds.
    pub request_timeout_ms: Option<u64>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            splitter: SplitterConfig::default(),
            retriever: RetrieverConfig::default(),
            metric: DistanceMetric::Cosine,
            embed_batch_size: 64,
            request_timeout_ms: None,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// The per-call deadline, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Check every section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.splitter.validate()?;
        self.retriever.validate()?;
        if self.embed_batch_size == 0 {
            return Err(RagError::Config("embed_batch_size must be greater than zero".to_string()));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(RagError::Config("request_timeout_ms must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration document.
    ///
    /// Missing fields take their default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RagError::Config(format!("invalid configuration JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            RagError::Config(format!("cannot read configuration file {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.splitter.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.splitter.chunk_overlap = overlap;
        self
    }

    /// Replace the separator priority list.
    pub fn separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.splitter.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Record chunk start offsets in chunk metadata.
    pub fn add_start_index(mut self, add: bool) -> Self {
        self.config.splitter.add_start_index = add;
        self
    }

    /// Set the number of results returned per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.retriever.result_count = k;
        self
    }

    /// Set the retrieval strategy.
    pub fn strategy(mut self, strategy: SearchStrategy) -> Self {
        self.config.retriever.strategy = strategy;
        self
    }

    /// Drop results farther than `threshold` from the query.
    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.config.retriever.score_threshold = Some(threshold);
        self
    }

    /// Set the distance metric used for a new index.
    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.config.metric = metric;
        self
    }

    /// Set the number of texts per embedding request.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Bound every external call by `timeout`.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms =
            Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
