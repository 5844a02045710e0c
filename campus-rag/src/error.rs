//! Error types for the `campus-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building, loading, or querying the knowledge base.
#[derive(Debug, Error)]
pub enum RagError {
    /// The ingestion directory contains no eligible text files.
    ///
    /// Fatal to the build attempt only: the index provider stays retryable.
    #[error(
        "No documents to index{}",
        dir.as_ref().map(|d| format!(" in {}", d.display())).unwrap_or_default()
    )]
    NoDocumentsFound {
        /// The directory that was scanned, when the documents came from one.
        dir: Option<PathBuf>,
    },

    /// A source file (or the source directory) could not be read.
    #[error("Failed to load {}: {source}", path.display())]
    LoadError {
        /// The path that failed to load.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The embedding capability failed or returned malformed output.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generative capability failed.
    #[error("Synthesis error ({provider}): {message}")]
    SynthesisError {
        /// The generator that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Generative output could not be interpreted as the expected shape.
    ///
    /// The raw output is carried as-is; nothing is guessed from it.
    #[error("Malformed upstream output: {message}")]
    MalformedUpstreamOutput {
        /// What was wrong with the output.
        message: String,
        /// The raw text returned by the generator.
        raw: String,
    },

    /// The persisted index was built with a different embedding function.
    #[error(
        "Persisted index was embedded with '{persisted}' ({persisted_dimensions} dims) \
         but the current provider is '{current}' ({current_dimensions} dims); \
         delete the index directory to rebuild"
    )]
    EmbeddingMismatch {
        /// Model identity recorded in the persisted index.
        persisted: String,
        /// Dimensionality recorded in the persisted index.
        persisted_dimensions: usize,
        /// Model identity of the configured provider.
        current: String,
        /// Dimensionality of the configured provider.
        current_dimensions: usize,
    },

    /// The persisted index could not be written or read back.
    #[error("Index store error ({}): {message}", path.display())]
    IndexStoreError {
        /// The location involved.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A background task stopped before it could finish.
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// The caller supplied an unusable request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// A convenience result type for knowledge-base operations.
pub type Result<T> = std::result::Result<T, RagError>;
