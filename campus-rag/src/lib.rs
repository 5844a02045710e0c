//! Grounded question answering over a private plain-text knowledge base.
//!
//! This crate provides:
//! - Loading `.txt` files into [`Document`]s and chunking them
//! - A persisted, embedded [`Index`] that is built once and reloaded thereafter
//! - A single-flight [`IndexProvider`] owning the index lifecycle
//! - Retrieval, context assembly, and grounded synthesis in a [`RagPipeline`]
//! - A request-facing [`KnowledgeService`] with bounded responses
//! - Questionnaire-based dropout risk analysis ([`RiskAnalyzer`])
//!
//! Embedding and generation are pluggable through [`EmbeddingProvider`] and
//! [`TextGenerator`]; Gemini (feature `gemini`, default) and OpenAI-compatible
//! (feature `openai`) backends are included.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use campus_rag::{IndexProvider, KnowledgeService, RagConfig, RagPipeline};
//! use campus_rag::gemini::{GeminiEmbeddingProvider, GeminiGenerator};
//!
//! let config = RagConfig::from_env()?;
//! let embedder = Arc::new(GeminiEmbeddingProvider::from_env()?);
//! let generator = Arc::new(GeminiGenerator::from_env()?);
//!
//! let provider = Arc::new(IndexProvider::from_config(&config, embedder.clone()));
//! let pipeline = RagPipeline::from_config(&config, embedder, generator);
//! let service = KnowledgeService::new(provider, pipeline, config);
//!
//! let response = service.answer("How many days of casual leave do students get?", None).await?;
//! println!("{} (grounded: {})", response.answer, response.grounded);
//! ```

pub mod chunking;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod inmemory;
pub mod loader;
pub mod pipeline;
pub mod provider;
pub mod retriever;
pub mod risk;
pub mod service;
pub mod store;
pub mod synthesis;
pub mod vectorstore;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{Chunker, FixedSizeChunker, RecursiveChunker, WholeDocumentChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use context::{CONTEXT_DELIMITER, assemble};
pub use document::{Chunk, Document, PipelineAnswer, RetrievalResult, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use generation::TextGenerator;
pub use index::{Index, IndexBuilder};
pub use inmemory::InMemoryVectorStore;
pub use loader::{DirectoryLoader, DocumentSource, load_text_documents};
pub use pipeline::{RagPipeline, RagPipelineBuilder};
pub use provider::{IndexProvider, ProviderState};
pub use retriever::Retriever;
pub use risk::{
    AnalysisOutcome, ConstructScores, DropoutAnalysis, RiskAnalyzer, RiskLevel, StudentOutcome,
};
pub use service::{AnswerResponse, HealthStatus, KnowledgeService, SourceRef};
pub use store::{IndexSnapshot, IndexStore, SNAPSHOT_FORMAT_VERSION};
pub use synthesis::{AnswerSynthesizer, NOT_FOUND_SENTINEL, Synthesis, build_prompt};
pub use vectorstore::VectorStore;
