//! Request-facing knowledge-base API.
//!
//! [`KnowledgeService`] is what a transport (the HTTP server, a CLI) calls.
//! It obtains the index from the [`IndexProvider`], runs the
//! [`RagPipeline`], and shapes the result into a bounded response.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::RagConfig;
use crate::error::{RagError, Result};
use crate::pipeline::RagPipeline;
use crate::provider::IndexProvider;

/// A citation for one retrieved chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRef {
    /// File name of the source document.
    pub source: String,
    /// Stable identifier of the source document.
    pub doc_id: String,
    /// The start of the chunk text.
    pub content_preview: String,
}

/// The answer to one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerResponse {
    /// The question as asked.
    pub query: String,
    /// The answer, or `"Information not available in context."`.
    pub answer: String,
    /// Whether the answer came from the knowledge base.
    pub grounded: bool,
    /// The start of the context the answer was drawn from.
    #[serde(rename = "context")]
    pub combined_context: String,
    /// One citation per retrieved chunk, in retrieval order.
    pub sources: Vec<SourceRef>,
}

/// Liveness report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    /// Whether the index has been loaded or built.
    pub initialized: bool,
}

/// Answers questions over the knowledge base.
pub struct KnowledgeService {
    provider: Arc<IndexProvider>,
    pipeline: RagPipeline,
    config: RagConfig,
}

impl KnowledgeService {
    /// Create a service over an owned provider and pipeline.
    pub fn new(provider: Arc<IndexProvider>, pipeline: RagPipeline, config: RagConfig) -> Self {
        Self { provider, pipeline, config }
    }

    /// The index provider.
    pub fn provider(&self) -> &Arc<IndexProvider> {
        &self.provider
    }

    /// Answer `query` using `k` chunks, or the configured `top_k`.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidRequest`] for a blank query.
    /// - Any error from initializing the index or running the pipeline.
    #[instrument(skip(self))]
    pub async fn answer(&self, query: &str, k: Option<usize>) -> Result<AnswerResponse> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidRequest("query must not be empty".into()));
        }
        let k = k.unwrap_or(self.config.top_k);

        let index = self.provider.get().await?;
        let result = self.pipeline.answer_query(&index, query, k).await?;

        let sources = result
            .retrieved
            .iter()
            .map(|chunk| SourceRef {
                source: chunk.source.clone(),
                doc_id: chunk.doc_id.clone(),
                content_preview: truncate_chars(&chunk.text, self.config.source_preview_chars),
            })
            .collect();

        Ok(AnswerResponse {
            query: query.to_string(),
            answer: result.answer.as_text().to_string(),
            grounded: result.answer.is_grounded(),
            combined_context: truncate_chars(
                &result.combined_context,
                self.config.context_preview_chars,
            ),
            sources,
        })
    }

    /// Report whether the index is initialized, without initializing it.
    pub fn health(&self) -> HealthStatus {
        HealthStatus { initialized: self.provider.is_ready() }
    }
}

/// The first `max` characters of `text`.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::truncate_chars;

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("né–é", 3), "né–");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
