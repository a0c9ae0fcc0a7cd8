//! Embedding provider trait for generating vector embeddings from text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (hosted APIs, local
/// models) behind a unified async interface. All vectors produced by one
/// instance must share one dimensionality.
///
/// Implementations report failures as [`RagError::EmbeddingProvider`] and
/// never retry on their own.
///
/// # Example
///
/// ```rust,ignore
/// use semdex::Embedder;
///
/// let vectors = embedder.embed_documents(&["hola", "mundo"]).await?;
/// let query = embedder.embed_query("saludo").await?;
/// assert_eq!(query.len(), vectors[0].len());
/// ```
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate one embedding per input text, in input order.
    ///
    /// Prefer this over repeated [`embed_query`](Embedder::embed_query) calls
    /// for bulk ingestion, since backends batch the request.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Generate the embedding for a search query.
    ///
    /// The default implementation embeds the query as a one-element batch.
    /// Backends with asymmetric query/document models override it; the
    /// dimensionality must match [`embed_documents`](Embedder::embed_documents).
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text]).await?.into_iter().next().ok_or_else(|| {
            RagError::EmbeddingProvider {
                provider: self.name().to_string(),
                message: "provider returned no vector for the query".to_string(),
            }
        })
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A short provider name used in logs and errors.
    fn name(&self) -> &str {
        "embedder"
    }
}

/// A deterministic local embedder based on hashed character n-grams.
///
/// Each overlapping n-gram of the lower-cased text adds one to a bucket
/// chosen by an FNV-1a hash, so texts sharing many n-grams point in similar
/// directions. Texts shorter than `n` characters count as a single gram.
/// Useful offline and in tests; it captures spelling, not meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharNgramEmbedder {
    n: usize,
    dimensions: usize,
}

impl Default for CharNgramEmbedder {
    fn default() -> Self {
        Self { n: 2, dimensions: 256 }
    }
}

impl CharNgramEmbedder {
    /// Create an embedder hashing `n`-grams into `dimensions` buckets.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if either argument is zero.
    pub fn new(n: usize, dimensions: usize) -> Result<Self> {
        if n == 0 || dimensions == 0 {
            return Err(RagError::Config(format!(
                "n-gram size ({n}) and dimensions ({dimensions}) must be greater than zero"
            )));
        }
        Ok(Self { n, dimensions })
    }

    /// Embed a single text synchronously.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let chars: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();
        let mut vector = vec![0.0f32; self.dimensions];
        if chars.is_empty() {
            return vector;
        }
        let window = self.n.min(chars.len());
        for gram in chars.windows(window) {
            let bucket = fnv1a(gram) % self.dimensions as u64;
            vector[bucket as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for CharNgramEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "char-ngram"
    }
}

fn fnv1a(gram: &[char]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    let mut hash = OFFSET;
    let mut buf = [0u8; 4];
    for c in gram {
        for byte in c.encode_utf8(&mut buf).bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(PRIME);
        }
    }
    hash
}

/// Bounds every call to an inner [`Embedder`] by a deadline.
///
/// On expiry the call fails with [`RagError::Timeout`]; the in-flight request
/// is dropped.
#[derive(Clone)]
pub struct TimeoutEmbedder {
    inner: Arc<dyn Embedder>,
    timeout: Duration,
}

impl TimeoutEmbedder {
    /// Wrap `inner`, failing any call that takes longer than `timeout`.
    pub fn new(inner: Arc<dyn Embedder>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// The configured deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn expired(&self, operation: &str) -> RagError {
        warn!(
            provider = self.inner.name(),
            operation,
            timeout = ?self.timeout,
            "embedding call timed out"
        );
        RagError::Timeout { operation: operation.to_string(), timeout: self.timeout }
    }
}

#[async_trait]
impl Embedder for TimeoutEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        debug!(
            provider = self.inner.name(),
            batch_size = texts.len(),
            "embedding batch with deadline"
        );
        tokio::time::timeout(self.timeout, self.inner.embed_documents(texts))
            .await
            .map_err(|_| self.expired("embed_documents"))?
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        tokio::time::timeout(self.timeout, self.inner.embed_query(text))
            .await
            .map_err(|_| self.expired("embed_query"))?
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
