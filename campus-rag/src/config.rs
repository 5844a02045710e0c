//! Configuration for the knowledge-base pipeline.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration parameters for the knowledge-base pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Directory of `.txt` files indexed when no persisted index exists.
    pub kb_dir: PathBuf,
    /// Fixed location of the persisted index.
    pub persist_dir: PathBuf,
    /// Fixed collection name inside the persisted index.
    pub collection_name: String,
    /// Default number of chunks to retrieve per query.
    pub top_k: usize,
    /// Maximum chunk size in characters. `None` keeps each document whole.
    pub chunk_size: Option<usize>,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Upper bound on a single embedding call.
    pub embed_timeout: Duration,
    /// Upper bound on a single generation call.
    pub generation_timeout: Duration,
    /// Maximum characters of combined context returned to callers.
    pub context_preview_chars: usize,
    /// Maximum characters of each source preview returned to callers.
    pub source_preview_chars: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            kb_dir: PathBuf::from("./kb_texts"),
            persist_dir: PathBuf::from("./chroma_univ_kb"),
            collection_name: "university_kb".to_string(),
            top_k: 3,
            chunk_size: None,
            chunk_overlap: 0,
            embed_timeout: Duration::from_secs(30),
            generation_timeout: Duration::from_secs(60),
            context_preview_chars: 1000,
            source_preview_chars: 200,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Build a configuration from `CAMPUS_RAG_*` environment variables,
    /// falling back to defaults for anything unset.
    ///
    /// | Variable                          | Field                   |
    /// |-----------------------------------|-------------------------|
    /// | `CAMPUS_RAG_KB_DIR`               | `kb_dir`                |
    /// | `CAMPUS_RAG_PERSIST_DIR`          | `persist_dir`           |
    /// | `CAMPUS_RAG_COLLECTION`           | `collection_name`       |
    /// | `CAMPUS_RAG_TOP_K`                | `top_k`                 |
    /// | `CAMPUS_RAG_CHUNK_SIZE`           | `chunk_size`            |
    /// | `CAMPUS_RAG_CHUNK_OVERLAP`        | `chunk_overlap`         |
    /// | `CAMPUS_RAG_EMBED_TIMEOUT_SECS`   | `embed_timeout`         |
    /// | `CAMPUS_RAG_GENERATION_TIMEOUT_SECS` | `generation_timeout` |
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a numeric variable does not parse
    /// or the resulting configuration fails validation.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(dir) = lookup("CAMPUS_RAG_KB_DIR") {
            builder = builder.kb_dir(dir);
        }
        if let Some(dir) = lookup("CAMPUS_RAG_PERSIST_DIR") {
            builder = builder.persist_dir(dir);
        }
        if let Some(name) = lookup("CAMPUS_RAG_COLLECTION") {
            builder = builder.collection_name(name);
        }
        if let Some(k) = parse_var(&lookup, "CAMPUS_RAG_TOP_K")? {
            builder = builder.top_k(k);
        }
        if let Some(size) = parse_var(&lookup, "CAMPUS_RAG_CHUNK_SIZE")? {
            builder = builder.chunk_size(size);
        }
        if let Some(overlap) = parse_var(&lookup, "CAMPUS_RAG_CHUNK_OVERLAP")? {
            builder = builder.chunk_overlap(overlap);
        }
        if let Some(secs) = parse_var(&lookup, "CAMPUS_RAG_EMBED_TIMEOUT_SECS")? {
            builder = builder.embed_timeout(Duration::from_secs(secs as u64));
        }
        if let Some(secs) = parse_var(&lookup, "CAMPUS_RAG_GENERATION_TIMEOUT_SECS")? {
            builder = builder.generation_timeout(Duration::from_secs(secs as u64));
        }
        builder.build()
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<usize>> {
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<usize>().map_err(|e| {
                RagError::ConfigError(format!("{key} must be a non-negative integer: {e}"))
            })
        })
        .transpose()
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the source directory of `.txt` documents.
    pub fn kb_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.kb_dir = dir.into();
        self
    }

    /// Set the persisted index location.
    pub fn persist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.persist_dir = dir.into();
        self
    }

    /// Set the collection name.
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.config.collection_name = name.into();
        self
    }

    /// Set the default number of chunks to retrieve.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Split documents into chunks of at most `size` characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = Some(size);
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the embedding call timeout.
    pub fn embed_timeout(mut self, timeout: Duration) -> Self {
        self.config.embed_timeout = timeout;
        self
    }

    /// Set the generation call timeout.
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.config.generation_timeout = timeout;
        self
    }

    /// Set the maximum characters of combined context returned to callers.
    pub fn context_preview_chars(mut self, chars: usize) -> Self {
        self.config.context_preview_chars = chars;
        self
    }

    /// Set the maximum characters of each source preview.
    pub fn source_preview_chars(mut self, chars: usize) -> Self {
        self.config.source_preview_chars = chars;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size` is set and `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `collection_name` is empty
    /// - either timeout is zero
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        if let Some(size) = config.chunk_size {
            if config.chunk_overlap >= size {
                return Err(RagError::ConfigError(format!(
                    "chunk_overlap ({}) must be less than chunk_size ({size})",
                    config.chunk_overlap
                )));
            }
        }
        if config.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if config.collection_name.trim().is_empty() {
            return Err(RagError::ConfigError("collection_name must not be empty".to_string()));
        }
        if config.embed_timeout.is_zero() || config.generation_timeout.is_zero() {
            return Err(RagError::ConfigError("timeouts must be greater than zero".to_string()));
        }
        Ok(config)
    }
}
