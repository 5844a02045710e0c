//! Query-time similarity retrieval.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::document::RetrievalResult;
use crate::embedding::{EmbeddingProvider, embed_within};
use crate::error::Result;
use crate::index::Index;

/// Embeds a question and returns the most similar chunks of an [`Index`].
///
/// The embedder must be the one the index was built with.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
}

impl Retriever {
    /// Create a retriever whose query embedding is bounded by `timeout`.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self { embedder, timeout }
    }

    /// Retrieve up to `k` chunks for `query`, most similar first.
    ///
    /// A `k` of zero returns an empty result without embedding the query.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`](crate::RagError::EmbeddingError)
    /// if the query cannot be embedded in time.
    pub async fn retrieve(&self, index: &Index, query: &str, k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Ok(RetrievalResult::default());
        }
        let embedding = embed_within(self.embedder.as_ref(), query, self.timeout).await?;
        let results = index.search(&embedding, k).await?;
        debug!(k, retrieved = results.len(), "retrieved chunks");
        Ok(RetrievalResult::new(results))
    }
}
