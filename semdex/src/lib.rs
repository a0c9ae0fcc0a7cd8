//! # semdex
//!
//! Semantic document retrieval: split documents into overlapping chunks,
//! embed them, keep the vectors in a persistent in-memory index, and answer
//! natural-language queries with the nearest chunks, optionally handing them
//! to a language model for an answer with cited sources.
//!
//! ## Features
//!
//! - **Recursive splitting**: [`RecursiveCharacterSplitter`] tries coarse
//!   separators first and falls back to finer ones, with configurable overlap,
//!   pluggable length functions, start offsets and a markdown preset
//! - **Vector index**: [`VectorIndex`] with cosine, euclidean or inner-product
//!   ranking, atomic batch insertion, and persistence that writes a synced
//!   temporary file before replacing the snapshot
//! - **Retrieval QA**: [`VectorIndexRetriever`] and [`AnswerSynthesizer`]
//! - **Providers**: the [`Embedder`] and [`LanguageModel`] traits, an offline
//!   [`CharNgramEmbedder`], deadline wrappers, and OpenAI-compatible HTTP
//!   providers behind the `openai` feature
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use semdex::{CharNgramEmbedder, Document, RagPipeline};
//!
//! #[tokio::main]
//! async fn main() -> semdex::Result<()> {
//!     semdex::telemetry::init_tracing("semdex=info");
//!
//!     let pipeline = RagPipeline::builder()
//!         .embedder(Arc::new(CharNgramEmbedder::default()))
//!         .build()?;
//!     pipeline.ingest(&Document::new("Rust has no garbage collector.")).await?;
//!
//!     for hit in pipeline.query("garbage collection").await? {
//!         println!("{:.3} {}", hit.distance, hit.document.content());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod distance;
pub mod document;
pub mod embedding;
pub mod error;
pub mod index;
pub mod llm;
pub mod loader;
pub mod pipeline;
pub mod retriever;
pub mod splitter;
pub mod synthesizer;
pub mod telemetry;

#[cfg(feature = "openai")]
pub mod openai;

pub use config::{RagConfig, RagConfigBuilder, RetrieverConfig, SplitterConfig, SplitterConfigBuilder};
pub use distance::DistanceMetric;
pub use document::{Document, IndexedRecord, Metadata, MetadataValue, SearchResult, TextChunk};
pub use embedding::{CharNgramEmbedder, Embedder, TimeoutEmbedder};
pub use error::{RagError, Result};
pub use index::VectorIndex;
pub use llm::{LanguageModel, TimeoutLanguageModel};
pub use loader::{DocumentLoader, JsonlLoader, TextFileLoader};
pub use pipeline::{RagPipeline, RagPipelineBuilder};
pub use retriever::{Retriever, SearchStrategy, VectorIndexRetriever};
pub use splitter::{
    CharCount, FnLength, KeepSeparator, LengthFunction, RecursiveCharacterSplitter, TextSplitter,
};
pub use synthesizer::{Answer, AnswerSynthesizer};
