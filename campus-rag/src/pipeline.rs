//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] answers one question against a ready [`Index`]:
//! retrieve the top-k chunks, assemble them into a context, and synthesize a
//! grounded answer.
//!
//! # Example
//!
//! ```rust,ignore
//! use campus_rag::{AnswerSynthesizer, RagPipeline, Retriever};
//!
//! let pipeline = RagPipeline::builder()
//!     .retriever(Retriever::new(embedder, Duration::from_secs(30)))
//!     .synthesizer(AnswerSynthesizer::new(generator, Duration::from_secs(60)))
//!     .build()?;
//!
//! let index = provider.get().await?;
//! let answer = pipeline.answer_query(&index, "How many leave days do I get?", 3).await?;
//! ```

use std::sync::Arc;

use tracing::{error, info};

use crate::config::RagConfig;
use crate::context;
use crate::document::PipelineAnswer;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::TextGenerator;
use crate::index::Index;
use crate::retriever::Retriever;
use crate::synthesis::AnswerSynthesizer;

/// The query-time pipeline. Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Wire a pipeline with the timeouts from `config`.
    pub fn from_config(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            retriever: Retriever::new(embedder, config.embed_timeout),
            synthesizer: AnswerSynthesizer::new(generator, config.generation_timeout),
        }
    }

    /// Answer `query` from the `k` most similar chunks of `index`.
    ///
    /// The stages run strictly in sequence and any failure is returned
    /// unchanged; nothing is retried.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmbeddingError`] if the query cannot be embedded.
    /// - [`RagError::SynthesisError`] or [`RagError::MalformedUpstreamOutput`]
    ///   if generation fails.
    pub async fn answer_query(&self, index: &Index, query: &str, k: usize) -> Result<PipelineAnswer> {
        let retrieved = self
            .retriever
            .retrieve(index, query, k)
            .await
            .inspect_err(|e| error!(error = %e, "retrieval failed"))?;

        let combined_context = context::assemble(&retrieved);
        let answer = self.synthesizer.synthesize(&combined_context, query).await?;

        info!(
            k,
            retrieved = retrieved.len(),
            grounded = answer.is_grounded(),
            "query answered"
        );

        Ok(PipelineAnswer { retrieved: retrieved.into_chunks(), combined_context, answer })
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// Both fields are required. Call [`build()`](RagPipelineBuilder::build)
/// to validate and produce the pipeline.
#[derive(Default)]
pub struct RagPipelineBuilder {
    retriever: Option<Retriever>,
    synthesizer: Option<AnswerSynthesizer>,
}

impl RagPipelineBuilder {
    /// Set the retriever.
    pub fn retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Set the answer synthesizer.
    pub fn synthesizer(mut self, synthesizer: AnswerSynthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing.
    pub fn build(self) -> Result<RagPipeline> {
        let retriever =
            self.retriever.ok_or_else(|| RagError::ConfigError("retriever is required".to_string()))?;
        let synthesizer = self
            .synthesizer
            .ok_or_else(|| RagError::ConfigError("synthesizer is required".to_string()))?;

        Ok(RagPipeline { retriever, synthesizer })
    }
}
