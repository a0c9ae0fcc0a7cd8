//! Error types for the `semdex` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while splitting, embedding, indexing, or answering.
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration validation error, raised when a config is built.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A metadata value cannot be stored (currently: a NaN or infinite float).
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// An external embedding call failed.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingProvider {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A vector's length disagrees with the index's established dimensionality.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimensionality the index (or the batch) already uses.
        expected: usize,
        /// The dimensionality that was supplied.
        actual: usize,
    },

    /// A degenerate vector was encountered (empty, zero magnitude, non-finite).
    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    /// An external call exceeded its deadline.
    #[error("Timed out after {timeout:?} during {operation}")]
    Timeout {
        /// The operation that was cut off.
        operation: String,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// An external language model call failed.
    #[error("Language model error ({provider}): {message}")]
    LanguageModel {
        /// The model provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Writing or reading a persisted index failed.
    #[error("Persistence error at {path}: {message}")]
    Persistence {
        /// The location being written or read.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// A document loader could not produce documents.
    #[error("Loader error ({source_name}): {message}")]
    Loader {
        /// The file or source being loaded.
        source_name: String,
        /// A description of the failure.
        message: String,
    },

    /// An I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether the error came from an external service and may succeed on retry.
    ///
    /// Nothing in this crate retries on its own; callers use this to drive
    /// their own retry policy.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingProvider { .. } | Self::LanguageModel { .. } | Self::Timeout { .. }
        )
    }
}

/// A convenience result type for `semdex` operations.
pub type Result<T> = std::result::Result<T, RagError>;
