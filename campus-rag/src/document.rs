//! Data types for documents, chunks, and retrieval results.

use serde::{Deserialize, Serialize};

use crate::synthesis::Synthesis;

/// A unit of ingested knowledge: one plain-text file.
///
/// Identity is the `(source, doc_id)` pair, both derived from the file name,
/// so citations stay stable across rebuilds of the same file set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// The text content of the document.
    pub text: String,
    /// File name with extension, e.g. `leave_policy.txt`.
    pub source: String,
    /// File name without extension, e.g. `leave_policy`.
    pub doc_id: String,
}

impl Document {
    /// Create a document from its text and file name.
    pub fn from_file_name(file_name: &str, text: impl Into<String>) -> Self {
        let doc_id = match file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => file_name.to_string(),
        };
        Self { text: text.into(), source: file_name.to_string(), doc_id }
    }
}

/// A retrievable span of a [`Document`] with its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier, `{doc_id}_{chunk_index}`.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text. Empty until embedded.
    pub embedding: Vec<f32>,
    /// File name of the parent document.
    pub source: String,
    /// Stable identifier of the parent document.
    pub doc_id: String,
    /// Position of this chunk within its document.
    pub chunk_index: usize,
}

impl Chunk {
    /// Create an un-embedded chunk of `document`.
    pub fn of(document: &Document, chunk_index: usize, text: impl Into<String>) -> Self {
        Self {
            id: format!("{}_{chunk_index}", document.doc_id),
            text: text.into(),
            embedding: Vec::new(),
            source: document.source.clone(),
            doc_id: document.doc_id.clone(),
            chunk_index,
        }
    }
}

/// A retrieved [`Chunk`] paired with its similarity score and rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
    /// 1-based position in the result list.
    pub rank: usize,
}

/// The ordered outcome of one similarity search.
///
/// Results are ordered by descending similarity and never exceed the
/// requested `k`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    results: Vec<SearchResult>,
}

impl RetrievalResult {
    /// Wrap search results that are already ordered and ranked.
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self { results }
    }

    /// Number of retrieved chunks.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether nothing was retrieved.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterate over results in retrieval order.
    pub fn iter(&self) -> std::slice::Iter<'_, SearchResult> {
        self.results.iter()
    }

    /// The retrieved chunks in retrieval order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.results.iter().map(|r| &r.chunk)
    }

    /// The retrieved chunk texts in retrieval order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|r| r.chunk.text.as_str())
    }

    /// Consume the result, yielding the chunks in retrieval order.
    pub fn into_chunks(self) -> Vec<Chunk> {
        self.results.into_iter().map(|r| r.chunk).collect()
    }
}

impl IntoIterator for RetrievalResult {
    type Item = SearchResult;
    type IntoIter = std::vec::IntoIter<SearchResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// The orchestrator's output for a single query.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineAnswer {
    /// The chunks used as grounding, in retrieval order.
    pub retrieved: Vec<Chunk>,
    /// The assembled context handed to the generator.
    pub combined_context: String,
    /// The synthesized answer.
    pub answer: Synthesis,
}
