//! Generative capability used for answer synthesis and risk analysis.

use async_trait::async_trait;

use crate::error::Result;

/// A text-in, text-out generative model.
///
/// Implementations receive a fully assembled prompt and return the model's
/// raw text. Failures are reported as [`RagError::SynthesisError`](crate::RagError::SynthesisError).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// A stable identity for the model, e.g. `gemini/gemini-2.5-flash-lite`.
    fn model_id(&self) -> &str;
}
