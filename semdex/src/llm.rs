//! Language model seam used by the answer synthesizer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{RagError, Result};

/// A text-completion model.
///
/// Implementations report failures as [`RagError::LanguageModel`] and never
/// retry on their own.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt` and return the generated text.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// A short provider name used in logs and errors.
    fn name(&self) -> &str {
        "language-model"
    }
}

/// Bounds every call to an inner [`LanguageModel`] by a deadline.
#[derive(Clone)]
pub struct TimeoutLanguageModel {
    inner: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl TimeoutLanguageModel {
    /// Wrap `inner`, failing any call that takes longer than `timeout`.
    pub fn new(inner: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl LanguageModel for TimeoutLanguageModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        tokio::time::timeout(self.timeout, self.inner.generate(prompt)).await.map_err(|_| {
            warn!(provider = self.inner.name(), timeout = ?self.timeout, "generation timed out");
            RagError::Timeout { operation: "generate".to_string(), timeout: self.timeout }
        })?
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
