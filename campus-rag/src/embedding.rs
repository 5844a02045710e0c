//! Embedding provider trait for generating vector embeddings from text.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// The same provider (same [`model_id`](EmbeddingProvider::model_id) and
/// [`dimensions`](EmbeddingProvider::dimensions)) must be used to build an
/// index and to query it. The model identity is recorded alongside the
/// persisted index and checked when it is loaded.
///
/// The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use campus_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A stable identity for the embedding function, e.g. `gemini/text-embedding-004`.
    fn model_id(&self) -> &str;
}

/// Check that a provider returned one vector per input, each of the
/// advertised dimensionality.
fn validate_embeddings(
    provider: &dyn EmbeddingProvider,
    expected: usize,
    embeddings: &[Vec<f32>],
) -> Result<()> {
    if embeddings.len() != expected {
        return Err(RagError::EmbeddingError {
            provider: provider.model_id().to_string(),
            message: format!("expected {expected} embeddings, got {}", embeddings.len()),
        });
    }
    let dims = provider.dimensions();
    if let Some(bad) = embeddings.iter().position(|e| e.len() != dims) {
        return Err(RagError::EmbeddingError {
            provider: provider.model_id().to_string(),
            message: format!(
                "embedding {bad} has {} dimensions, expected {dims}",
                embeddings[bad].len()
            ),
        });
    }
    Ok(())
}

fn timed_out(provider: &dyn EmbeddingProvider, timeout: Duration) -> RagError {
    RagError::EmbeddingError {
        provider: provider.model_id().to_string(),
        message: format!("request timed out after {}s", timeout.as_secs_f32()),
    }
}

/// Embed a batch within `timeout`, validating the shape of the response.
pub(crate) async fn embed_batch_within(
    provider: &dyn EmbeddingProvider,
    texts: &[&str],
    timeout: Duration,
) -> Result<Vec<Vec<f32>>> {
    let embeddings = tokio::time::timeout(timeout, provider.embed_batch(texts))
        .await
        .map_err(|_| timed_out(provider, timeout))??;
    validate_embeddings(provider, texts.len(), &embeddings)?;
    Ok(embeddings)
}

/// Embed a single text within `timeout`, validating its dimensionality.
pub(crate) async fn embed_within(
    provider: &dyn EmbeddingProvider,
    text: &str,
    timeout: Duration,
) -> Result<Vec<f32>> {
    let embedding = tokio::time::timeout(timeout, provider.embed(text))
        .await
        .map_err(|_| timed_out(provider, timeout))??;
    validate_embeddings(provider, 1, std::slice::from_ref(&embedding))?;
    Ok(embedding)
}
