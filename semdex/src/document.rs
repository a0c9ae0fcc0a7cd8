//! Data types for documents, chunks, indexed records, and search results.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar metadata value.
///
/// Metadata is open-schema but closed over these variants, so it always
/// round-trips through JSON unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// A boolean flag.
    Bool(bool),
    /// An integral number.
    Integer(i64),
    /// A floating point number.
    Float(f64),
    /// A text value.
    String(String),
}

impl MetadataValue {
    /// Return the value as a string slice, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value survives a JSON round trip. Only NaN and infinite
    /// floats do not.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(x) => x.is_finite(),
            _ => true,
        }
    }

    /// Return the value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        Self::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Key-value metadata attached to a [`Document`].
pub type Metadata = BTreeMap<String, MetadataValue>;

/// An immutable unit of text plus metadata.
///
/// Operations that derive new documents (splitting, tagging) return new
/// values; the original is never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    content: String,
    #[serde(default)]
    metadata: Metadata,
}

impl Document {
    /// Create a document with empty metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), metadata: Metadata::new() }
    }

    /// Create a document with the given metadata.
    pub fn with_metadata(content: impl Into<String>, metadata: Metadata) -> Self {
        Self { content: content.into(), metadata }
    }

    /// The text payload.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The metadata map.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Look up a single metadata entry.
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(key)
    }

    /// Return a copy of this document with one extra metadata entry.
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The first metadata key whose value is a NaN or infinite float.
    pub(crate) fn non_finite_entry(&self) -> Option<&str> {
        self.metadata.iter().find(|(_, value)| !value.is_finite()).map(|(key, _)| key.as_str())
    }

    /// Build a derived document that inherits a copy of this document's metadata.
    pub fn derive(&self, content: impl Into<String>) -> Self {
        Self { content: content.into(), metadata: self.metadata.clone() }
    }
}

/// A piece of text cut from a larger text, with its character offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The chunk text.
    pub text: String,
    /// Offset of the chunk's first character in the source text, in characters.
    pub start: usize,
}

/// A document stored in a [`VectorIndex`](crate::VectorIndex) with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    /// Unique identifier within the index.
    pub id: String,
    /// The embedding of the document content.
    pub vector: Vec<f32>,
    /// The stored document.
    pub document: Document,
}

/// A retrieved document paired with its distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The id of the matching record.
    pub id: String,
    /// The matching document.
    pub document: Document,
    /// Distance to the query (lower is more relevant).
    pub distance: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_documents_copy_metadata() {
        let parent = Document::new("full text").with_entry("fuente", "platzi");
        let child = parent.derive("full");
        let child = child.with_entry("start_index", 0usize);

        assert_eq!(child.get("fuente"), Some(&MetadataValue::from("platzi")));
        assert!(parent.get("start_index").is_none());
        assert_eq!(parent.content(), "full text");
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let doc = Document::new("x")
            .with_entry("title", "Intro")
            .with_entry("page", 17i64)
            .with_entry("weight", 0.5)
            .with_entry("draft", false);

        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.get("page").and_then(MetadataValue::as_i64), Some(17));
    }

    #[test]
    fn non_finite_floats_are_flagged() {
        let doc = Document::new("x").with_entry("weight", 0.5).with_entry("score", f64::NAN);
        assert_eq!(doc.non_finite_entry(), Some("score"));
        assert!(!MetadataValue::from(f64::INFINITY).is_finite());
        assert!(MetadataValue::from(-0.0).is_finite());
        assert_eq!(Document::new("y").with_entry("weight", 0.5).non_finite_entry(), None);
    }

    #[test]
    fn missing_metadata_deserializes_empty() {
        let doc: Document = serde_json::from_str(r#"{"content":"hola"}"#).unwrap();
        assert!(doc.metadata().is_empty());
    }
}
