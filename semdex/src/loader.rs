//! Document loaders that read files into [`Document`]s.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::document::{Document, MetadataValue};
use crate::error::{RagError, Result};

/// Metadata key holding the path a document was loaded from.
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding a document's 1-based line number in a JSON Lines file.
pub const SEQ_NUM_KEY: &str = "seq_num";

/// Produces documents from some source.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load every document, in source order.
    async fn load(&self) -> Result<Vec<Document>>;
}

/// Loads a whole UTF-8 text file as a single document.
#[derive(Debug, Clone)]
pub struct TextFileLoader {
    path: PathBuf,
}

impl TextFileLoader {
    /// Load the file at `path` as a single document.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DocumentLoader for TextFileLoader {
    async fn load(&self) -> Result<Vec<Document>> {
        let content = read_to_string(&self.path).await?;
        debug!(path = %self.path.display(), bytes = content.len(), "loaded text file");
        Ok(vec![Document::new(content).with_entry(SOURCE_KEY, self.path.display().to_string())])
    }
}

/// Loads one document per line of a JSON Lines file.
///
/// Each non-blank line must be a JSON object. The document content is the
/// value under `content_key` (default `"text"`); each of `metadata_keys` is
/// copied into metadata. Missing keys become empty strings, scalars keep
/// their type, and arrays or objects are stored as their JSON text. Every
/// document also gets `source` (the file path) and `seq_num` (the line
/// number).
#[derive(Debug, Clone)]
pub struct JsonlLoader {
    path: PathBuf,
    content_key: String,
    metadata_keys: Vec<String>,
}

impl JsonlLoader {
    /// Load `path` with content under `"text"` and no extra metadata keys.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), content_key: "text".to_string(), metadata_keys: Vec::new() }
    }

    /// Read document content from `key`.
    pub fn with_content_key(mut self, key: impl Into<String>) -> Self {
        self.content_key = key.into();
        self
    }

    /// Copy these keys into each document's metadata.
    pub fn with_metadata_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    fn parse_line(&self, line: &str, line_number: usize) -> Result<Document> {
        let value: Value = serde_json::from_str(line).map_err(|e| self.error(line_number, e.to_string()))?;
        let Value::Object(object) = value else {
            return Err(self.error(line_number, "expected a JSON object".to_string()));
        };

        let content = match object.get(&self.content_key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let mut document = Document::new(content)
            .with_entry(SOURCE_KEY, self.path.display().to_string())
            .with_entry(SEQ_NUM_KEY, line_number);
        for key in &self.metadata_keys {
            document = document.with_entry(key.as_str(), to_metadata(object.get(key)));
        }
        Ok(document)
    }

    fn error(&self, line_number: usize, message: String) -> RagError {
        RagError::Loader {
            source_name: self.path.display().to_string(),
            message: format!("line {line_number}: {message}"),
        }
    }
}

#[async_trait]
impl DocumentLoader for JsonlLoader {
    async fn load(&self) -> Result<Vec<Document>> {
        let content = read_to_string(&self.path).await?;
        let mut documents = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let document = self.parse_line(line, index + 1).inspect_err(|e| {
                warn!(path = %self.path.display(), error = %e, "malformed json line");
            })?;
            documents.push(document);
        }
        debug!(path = %self.path.display(), document_count = documents.len(), "loaded json lines file");
        Ok(documents)
    }
}

fn to_metadata(value: Option<&Value>) -> MetadataValue {
    match value {
        None | Some(Value::Null) => MetadataValue::String(String::new()),
        Some(Value::Bool(b)) => MetadataValue::Bool(*b),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => MetadataValue::Integer(i),
            None => MetadataValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Some(Value::String(s)) => MetadataValue::String(s.clone()),
        Some(other) => MetadataValue::String(other.to_string()),
    }
}

async fn read_to_string(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| RagError::Loader {
        source_name: path.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_file_is_one_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "first line\nsecond line\n").unwrap();

        let docs = TextFileLoader::new(&path).load().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content(), "first line\nsecond line\n");
        assert_eq!(docs[0].get(SOURCE_KEY).and_then(MetadataValue::as_str), Some(path.to_str().unwrap()));
    }

    #[tokio::test]
    async fn missing_file_is_a_loader_error() {
        let err = TextFileLoader::new("/definitely/not/here.txt").load().await.unwrap_err();
        assert!(matches!(err, RagError::Loader { .. }));
    }

    #[tokio::test]
    async fn jsonl_lines_become_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        std::fs::write(
            &path,
            "{\"body\": \"hola\", \"lang\": \"es\", \"stars\": 4}\n\n{\"lang\": \"en\", \"tags\": [\"x\"]}\n",
        )
        .unwrap();

        let docs = JsonlLoader::new(&path)
            .with_content_key("body")
            .with_metadata_keys(["lang", "stars", "tags"])
            .load()
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content(), "hola");
        assert_eq!(docs[0].get("stars"), Some(&MetadataValue::Integer(4)));
        assert_eq!(docs[0].get(SEQ_NUM_KEY), Some(&MetadataValue::Integer(1)));
        assert_eq!(docs[1].content(), "");
        assert_eq!(docs[1].get("stars"), Some(&MetadataValue::String(String::new())));
        assert_eq!(docs[1].get("tags"), Some(&MetadataValue::String("[\"x\"]".into())));
        assert_eq!(docs[1].get(SEQ_NUM_KEY), Some(&MetadataValue::Integer(3)));
    }

    #[tokio::test]
    async fn malformed_jsonl_names_the_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"text\": \"ok\"}\n{not json\n").unwrap();

        let err = JsonlLoader::new(&path).load().await.unwrap_err();
        assert!(matches!(err, RagError::Loader { .. }));
        assert!(err.to_string().contains("line 2"));
    }
}
