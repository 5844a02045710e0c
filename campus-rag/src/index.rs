//! The queryable index and the builder that produces it.
//!
//! An [`Index`] is immutable once constructed: it is either built fresh
//! from documents by [`IndexBuilder::build`] or restored from a persisted
//! snapshot by [`IndexBuilder::load`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::chunking::Chunker;
use crate::document::{Chunk, Document, SearchResult};
use crate::embedding::{EmbeddingProvider, embed_batch_within};
use crate::error::{RagError, Result};
use crate::inmemory::InMemoryVectorStore;
use crate::store::{IndexSnapshot, IndexStore};
use crate::vectorstore::VectorStore;

/// A ready-to-query collection of embedded chunks.
#[derive(Debug)]
pub struct Index {
    collection: String,
    embedding_model: String,
    dimensions: usize,
    len: usize,
    vectors: InMemoryVectorStore,
}

impl Index {
    /// Materialize a snapshot into a searchable index.
    pub async fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self> {
        let vectors = InMemoryVectorStore::new();
        vectors.create_collection(&snapshot.collection, snapshot.dimensions).await?;
        vectors.upsert(&snapshot.collection, &snapshot.chunks).await?;
        let len = vectors.count(&snapshot.collection).await?;

        Ok(Self {
            collection: snapshot.collection,
            embedding_model: snapshot.embedding_model,
            dimensions: snapshot.dimensions,
            len,
            vectors,
        })
    }

    /// The collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Identity of the embedding function the index was built with.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Dimensionality of the stored vectors.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The `k` chunks most similar to `embedding`, best first.
    pub async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.vectors.search(&self.collection, embedding, k).await
    }
}

/// Turns documents into a persisted [`Index`].
///
/// # Example
///
/// ```rust,ignore
/// use campus_rag::{IndexBuilder, IndexStore, WholeDocumentChunker};
///
/// let builder = IndexBuilder::new(
///     Arc::new(embedder),
///     Arc::new(WholeDocumentChunker),
///     IndexStore::new("./chroma_univ_kb", "university_kb"),
/// );
/// let index = builder.build(&documents).await?;
/// ```
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Arc<dyn Chunker>,
    store: IndexStore,
    embed_timeout: Duration,
}

impl IndexBuilder {
    /// Create a builder that persists into `store`.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        chunker: Arc<dyn Chunker>,
        store: IndexStore,
    ) -> Self {
        Self { embedder, chunker, store, embed_timeout: Duration::from_secs(30) }
    }

    /// Bound the time spent embedding the whole document set.
    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    /// The store this builder persists into.
    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// The embedding provider used for indexing.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Build a new index from `documents` and persist it, replacing any
    /// index already at the store location.
    ///
    /// # Errors
    ///
    /// - [`RagError::NoDocumentsFound`] if there is nothing to index.
    /// - [`RagError::EmbeddingError`] if embedding fails or times out.
    /// - [`RagError::IndexStoreError`] if persisting fails; nothing is left
    ///   half-written at the store location.
    pub async fn build(&self, documents: &[Document]) -> Result<Index> {
        let mut chunks: Vec<Chunk> =
            documents.iter().flat_map(|document| self.chunker.chunk(document)).collect();
        if chunks.is_empty() {
            return Err(RagError::NoDocumentsFound { dir: None });
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = embed_batch_within(self.embedder.as_ref(), &texts, self.embed_timeout)
            .await
            .inspect_err(|e| error!(error = %e, "embedding failed during index build"))?;

        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }

        let snapshot = IndexSnapshot::new(
            self.store.collection(),
            self.embedder.model_id(),
            self.embedder.dimensions(),
            chunks,
        );
        self.store.save(&snapshot).await?;

        info!(
            collection = %snapshot.collection,
            document_count = documents.len(),
            chunk_count = snapshot.chunks.len(),
            "built index"
        );
        Index::from_snapshot(snapshot).await
    }

    /// Restore the persisted index without re-reading or re-embedding documents.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexStoreError`] if the snapshot cannot be read.
    /// - [`RagError::EmbeddingMismatch`] if the snapshot was embedded with a
    ///   different model or dimensionality than the configured provider.
    pub async fn load(&self) -> Result<Index> {
        let snapshot = self.store.load().await?;
        if snapshot.embedding_model != self.embedder.model_id()
            || snapshot.dimensions != self.embedder.dimensions()
        {
            return Err(RagError::EmbeddingMismatch {
                persisted: snapshot.embedding_model,
                persisted_dimensions: snapshot.dimensions,
                current: self.embedder.model_id().to_string(),
                current_dimensions: self.embedder.dimensions(),
            });
        }
        Index::from_snapshot(snapshot).await
    }
}
