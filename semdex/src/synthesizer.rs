//! Retrieval question answering with source attribution.
//!
//! [`AnswerSynthesizer`] "stuffs" every retrieved chunk into a single prompt,
//! asks the language model once, and splits the completion at a `SOURCES:`
//! line into the answer and the identifiers it cites. Attribution is
//! best-effort: only identifiers of chunks that were actually retrieved are
//! reported.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::document::SearchResult;
use crate::error::Result;
use crate::llm::LanguageModel;
use crate::retriever::Retriever;

/// Metadata key read for a chunk's identifier unless overridden.
pub const DEFAULT_SOURCE_KEY: &str = "source";

const SOURCES_MARKER: &str = "sources:";

/// A synthesized answer and the sources it drew from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// The answer text, without the sources line.
    pub answer: String,
    /// Identifiers of the retrieved chunks the answer cites, in retrieval
    /// rank order, without duplicates.
    pub sources: Vec<String>,
}

/// Answers questions from retrieved chunks through a [`LanguageModel`].
///
/// A chunk's identifier is its `source` metadata entry (see
/// [`with_source_key`](AnswerSynthesizer::with_source_key)) or, when absent,
/// its record id.
#[derive(Clone)]
pub struct AnswerSynthesizer {
    retriever: Arc<dyn Retriever>,
    model: Arc<dyn LanguageModel>,
    source_key: String,
}

impl AnswerSynthesizer {
    /// Answer with `model` over chunks from `retriever`.
    pub fn new(retriever: Arc<dyn Retriever>, model: Arc<dyn LanguageModel>) -> Self {
        Self { retriever, model, source_key: DEFAULT_SOURCE_KEY.to_string() }
    }

    /// Read chunk identifiers from metadata `key` instead of `source`.
    pub fn with_source_key(mut self, key: impl Into<String>) -> Self {
        self.source_key = key.into();
        self
    }

    /// Retrieve chunks for `query`, call the model once, and parse its reply.
    ///
    /// # Errors
    ///
    /// Propagates retrieval errors and language model errors unchanged.
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        let results = self.retriever.retrieve(query).await?;
        let identifiers: Vec<String> = results.iter().map(|r| self.identifier(r)).collect();
        let prompt = build_prompt(query, &results, &identifiers);
        debug!(chunk_count = results.len(), prompt_len = prompt.len(), "built answer prompt");

        let completion = self.model.generate(&prompt).await.map_err(|e| {
            error!(provider = self.model.name(), error = %e, "answer generation failed");
            e
        })?;

        let answer = parse_completion(&completion, &identifiers);
        info!(source_count = answer.sources.len(), "synthesized answer");
        Ok(answer)
    }

    fn identifier(&self, result: &SearchResult) -> String {
        result
            .document
            .get(&self.source_key)
            .map(ToString::to_string)
            .unwrap_or_else(|| result.id.clone())
    }
}

fn build_prompt(query: &str, results: &[SearchResult], identifiers: &[String]) -> String {
    let mut prompt = String::from(
        "Answer the question using only the passages below. If the passages do not \
         contain the answer, say that you don't know. After the answer, add a line \
         beginning with \"SOURCES:\" that lists the sources of the passages you used, \
         separated by commas.\n\n",
    );
    for (result, identifier) in results.iter().zip(identifiers) {
        prompt.push_str("Content: ");
        prompt.push_str(result.document.content());
        prompt.push_str("\nSource: ");
        prompt.push_str(identifier);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Question: ");
    prompt.push_str(query);
    prompt.push_str("\nAnswer:");
    prompt
}

fn parse_completion(completion: &str, identifiers: &[String]) -> Answer {
    // ASCII lowercasing keeps byte offsets aligned with `completion`.
    let lowered = completion.to_ascii_lowercase();
    let (answer, cited) = match lowered.rfind(SOURCES_MARKER) {
        Some(pos) => {
            let listed: HashSet<&str> = completion[pos + SOURCES_MARKER.len()..]
                .split([',', '\n'])
                .map(|s| s.trim().trim_end_matches('.').trim())
                .filter(|s| !s.is_empty())
                .collect();
            let cited = select(identifiers, |id| listed.contains(id));
            (completion[..pos].trim(), cited)
        }
        None => (completion.trim(), select(identifiers, |id| completion.contains(id))),
    };
    Answer { answer: answer.to_string(), sources: cited }
}

fn select(identifiers: &[String], keep: impl Fn(&str) -> bool) -> Vec<String> {
    let mut selected: Vec<String> = Vec::new();
    for id in identifiers {
        if !id.is_empty() && keep(id) && !selected.contains(id) {
            selected.push(id.clone());
        }
    }
    selected
}
