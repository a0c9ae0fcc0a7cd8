//! Document splitting.
//!
//! This module provides the [`TextSplitter`] trait and
//! [`RecursiveCharacterSplitter`], which tries a priority list of separators
//! (paragraphs, lines, words, then anywhere), merges the resulting pieces
//! greedily up to `chunk_size`, and repeats the tail of each chunk at the
//! start of the next one.
//!
//! Sizes are measured by a pluggable [`LengthFunction`]; the default counts
//! Unicode scalar values.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::SplitterConfig;
use crate::document::{Document, TextChunk};
use crate::error::Result;

/// Metadata key holding a chunk's character offset in its parent document.
pub const START_INDEX_KEY: &str = "start_index";

/// Measures the size of a span of text.
pub trait LengthFunction: Send + Sync {
    /// Return the size of `text` in this function's units.
    fn length(&self, text: &str) -> usize;
}

/// Counts Unicode scalar values.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharCount;

impl LengthFunction for CharCount {
    fn length(&self, text: &str) -> usize {
        text.chars().count()
    }
}

/// Adapts any `Fn(&str) -> usize`, such as a tokenizer's token counter.
///
/// # Example
///
/// ```rust,ignore
/// use semdex::{FnLength, RecursiveCharacterSplitter};
///
/// let words = FnLength(|text: &str| text.split_whitespace().count());
/// let splitter = RecursiveCharacterSplitter::new(128, 16)?.with_length_function(words);
/// ```
pub struct FnLength<F>(pub F);

impl<F> LengthFunction for FnLength<F>
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn length(&self, text: &str) -> usize {
        (self.0)(text)
    }
}

/// Which side of a split a matched separator stays on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepSeparator {
    /// The separator ends the preceding piece (`"A. " | "B."`).
    #[default]
    End,
    /// The separator starts the following piece (`"intro" | "\n## Usage"`).
    Start,
}

/// A strategy for splitting documents into smaller documents.
///
/// Splitting is pure: the same input and configuration always produce the
/// same output, and implementations hold no mutable state, so one splitter
/// can serve many threads.
pub trait TextSplitter: Send + Sync {
    /// Split text into chunks, each with its character offset in `text`.
    ///
    /// Returns an empty `Vec` for empty text.
    fn split_text_with_offsets(&self, text: &str) -> Vec<TextChunk>;

    /// Split text into chunk strings.
    fn split_text(&self, text: &str) -> Vec<String> {
        self.split_text_with_offsets(text).into_iter().map(|chunk| chunk.text).collect()
    }

    /// Split a document. Every chunk carries a copy of the parent's metadata.
    fn split_document(&self, document: &Document) -> Vec<Document> {
        self.split_text_with_offsets(document.content())
            .into_iter()
            .map(|chunk| document.derive(chunk.text))
            .collect()
    }

    /// Split several documents, preserving document order.
    fn split_documents(&self, documents: &[Document]) -> Vec<Document> {
        documents.iter().flat_map(|document| self.split_document(document)).collect()
    }
}

/// Splits text hierarchically by a priority list of separators.
///
/// The first separator that occurs in the text cuts it into pieces. Pieces
/// that fit are merged greedily into chunks of at most `chunk_size`; each new
/// chunk starts with up to `chunk_overlap` units from the end of the previous
/// one. A piece that is too large on its own is split again with the
/// remaining separators, and once those run out it is cut character by
/// character.
///
/// With the default `strip_whitespace = true`, every chunk is trimmed and
/// whitespace-only chunks are dropped. A short document therefore comes back
/// as one chunk without its leading or trailing whitespace, and a blank
/// document yields no chunks. Turn stripping off to get a short document back
/// verbatim.
///
/// # Example
///
/// ```rust,ignore
/// use semdex::{RecursiveCharacterSplitter, TextSplitter};
///
/// let splitter = RecursiveCharacterSplitter::new(500, 50)?;
/// let chunks = splitter.split_documents(&documents);
/// ```
#[derive(Clone)]
pub struct RecursiveCharacterSplitter {
    config: SplitterConfig,
    length: Arc<dyn LengthFunction>,
}

impl fmt::Debug for RecursiveCharacterSplitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecursiveCharacterSplitter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Byte range into the text being split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

impl RecursiveCharacterSplitter {
    /// Create a splitter with the default separators.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`](crate::RagError::Config) if
    /// `chunk_overlap >= chunk_size` or `chunk_size == 0`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        Self::from_config(SplitterConfig { chunk_size, chunk_overlap, ..SplitterConfig::default() })
    }

    /// Create a splitter from a full configuration.
    ///
    /// # Errors
    ///
    /// See [`SplitterConfig::validate`].
    pub fn from_config(config: SplitterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, length: Arc::new(CharCount) })
    }

    /// A splitter that prefers Markdown structure: headers, code fences, and
    /// horizontal rules before paragraphs and lines.
    pub fn markdown(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        let separators = [
            "\n# ", "\n## ", "\n### ", "\n#### ", "\n##### ", "\n###### ", "\n```", "\n***\n",
            "\n---\n", "\n___\n", "\n\n", "\n", " ", "",
        ];
        Self::from_config(SplitterConfig {
            chunk_size,
            chunk_overlap,
            separators: separators.iter().map(|s| s.to_string()).collect(),
            keep_separator: KeepSeparator::Start,
            ..SplitterConfig::default()
        })
    }

    /// Measure chunk sizes with `length` instead of character count.
    pub fn with_length_function(mut self, length: impl LengthFunction + 'static) -> Self {
        self.length = Arc::new(length);
        self
    }

    /// Record each chunk's character offset as `start_index` metadata.
    pub fn with_start_index(mut self, add: bool) -> Self {
        self.config.add_start_index = add;
        self
    }

    /// The configuration this splitter runs with.
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    fn len(&self, text: &str) -> usize {
        self.length.length(text)
    }

    fn split_span(&self, text: &str, span: Span, separators: &[String], out: &mut Vec<Span>) {
        let piece = &text[span.start..span.end];
        let Some((index, separator)) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || piece.contains(sep.as_str()))
        else {
            self.merge(text, &char_spans(text, span), out);
            return;
        };
        let remaining = if separator.is_empty() { &[][..] } else { &separators[index + 1..] };

        let mut run: Vec<Span> = Vec::new();
        for part in split_keeping_separator(text, span, separator, self.config.keep_separator) {
            if self.len(&text[part.start..part.end]) <= self.config.chunk_size {
                run.push(part);
                continue;
            }
            if !run.is_empty() {
                self.merge(text, &run, out);
                run.clear();
            }
            if remaining.is_empty() {
                self.merge(text, &char_spans(text, part), out);
            } else {
                self.split_span(text, part, remaining, out);
            }
        }
        if !run.is_empty() {
            self.merge(text, &run, out);
        }
    }

    /// Merge contiguous pieces into chunks no larger than `chunk_size`.
    fn merge(&self, text: &str, pieces: &[Span], out: &mut Vec<Span>) {
        let chunk_size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let mut window: VecDeque<Span> = VecDeque::new();

        for &piece in pieces {
            if let (Some(&front), Some(&back)) = (window.front(), window.back()) {
                if self.len(&text[front.start..piece.end]) > chunk_size {
                    out.push(Span { start: front.start, end: back.end });
                    while let Some(&front) = window.front() {
                        let kept = self.len(&text[front.start..back.end]);
                        let with_next = self.len(&text[front.start..piece.end]);
                        if kept > overlap || with_next > chunk_size {
                            window.pop_front();
                        } else {
                            break;
                        }
                    }
                }
            }
            window.push_back(piece);
        }

        if let (Some(front), Some(back)) = (window.front(), window.back()) {
            out.push(Span { start: front.start, end: back.end });
        }
    }

    fn finish(&self, text: &str, spans: Vec<Span>) -> Vec<TextChunk> {
        let mut offsets = CharOffsets::default();
        spans
            .into_iter()
            .filter_map(|span| {
                let span = if self.config.strip_whitespace { trim_span(text, span) } else { span };
                if span.start == span.end {
                    return None;
                }
                Some(TextChunk {
                    text: text[span.start..span.end].to_string(),
                    start: offsets.char_offset(text, span.start),
                })
            })
            .collect()
    }
}

impl TextSplitter for RecursiveCharacterSplitter {
    fn split_text_with_offsets(&self, text: &str) -> Vec<TextChunk> {
        if text.is_empty() {
            return Vec::new();
        }
        let whole = Span { start: 0, end: text.len() };
        let mut spans = Vec::new();
        if self.len(text) <= self.config.chunk_size {
            spans.push(whole);
        } else {
            self.split_span(text, whole, &self.config.separators, &mut spans);
        }
        self.finish(text, spans)
    }

    fn split_document(&self, document: &Document) -> Vec<Document> {
        self.split_text_with_offsets(document.content())
            .into_iter()
            .map(|chunk| {
                let derived = document.derive(chunk.text);
                if self.config.add_start_index {
                    derived.with_entry(START_INDEX_KEY, chunk.start)
                } else {
                    derived
                }
            })
            .collect()
    }
}

/// Split `span` at every occurrence of a non-empty `separator`, or into
/// single characters when `separator` is empty.
fn split_keeping_separator(
    text: &str,
    span: Span,
    separator: &str,
    keep: KeepSeparator,
) -> Vec<Span> {
    if separator.is_empty() {
        return char_spans(text, span);
    }

    let mut parts = Vec::new();
    let mut cursor = span.start;
    for (offset, _) in text[span.start..span.end].match_indices(separator) {
        let at = span.start + offset;
        let cut = match keep {
            KeepSeparator::End => at + separator.len(),
            KeepSeparator::Start => at,
        };
        if cut > cursor {
            parts.push(Span { start: cursor, end: cut });
            cursor = cut;
        }
    }
    if cursor < span.end {
        parts.push(Span { start: cursor, end: span.end });
    }
    parts
}

fn char_spans(text: &str, span: Span) -> Vec<Span> {
    text[span.start..span.end]
        .char_indices()
        .map(|(offset, c)| {
            let start = span.start + offset;
            Span { start, end: start + c.len_utf8() }
        })
        .collect()
}

fn trim_span(text: &str, span: Span) -> Span {
    let piece = &text[span.start..span.end];
    let leading = piece.len() - piece.trim_start().len();
    let trailing = piece.len() - piece.trim_end().len();
    if leading == piece.len() {
        return Span { start: span.start, end: span.start };
    }
    Span { start: span.start + leading, end: span.end - trailing }
}

/// Converts byte offsets to character offsets, scanning forward from the
/// previous position.
#[derive(Default)]
struct CharOffsets {
    byte: usize,
    chars: usize,
}

impl CharOffsets {
    fn char_offset(&mut self, text: &str, byte: usize) -> usize {
        if byte < self.byte {
            *self = Self::default();
        }
        self.chars += text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}
