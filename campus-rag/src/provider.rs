//! Lazy, single-flight access to the knowledge-base index.
//!
//! The first [`IndexProvider::get`] decides whether to load the persisted
//! index or build a new one. Concurrent first callers wait on the same
//! initialization; later callers get the cached handle without touching
//! storage.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::chunking::{Chunker, RecursiveChunker, WholeDocumentChunker};
use crate::config::RagConfig;
use crate::document::Document;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::{Index, IndexBuilder};
use crate::loader::{DirectoryLoader, DocumentSource};
use crate::store::IndexStore;

/// Lifecycle of an [`IndexProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProviderState {
    /// No index yet; the next `get` decides load versus build.
    Uninitialized = 0,
    /// Restoring the persisted index.
    Loading = 1,
    /// Reading documents and building a new index.
    Building = 2,
    /// The index is cached and served to every caller.
    Ready = 3,
}

impl ProviderState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Loading,
            2 => Self::Building,
            3 => Self::Ready,
            _ => Self::Uninitialized,
        }
    }
}

/// Owns the process's single index and its initialization.
pub struct IndexProvider {
    builder: IndexBuilder,
    source: Arc<dyn DocumentSource>,
    index: OnceCell<Arc<Index>>,
    state: AtomicU8,
}

impl IndexProvider {
    /// Create a provider that builds from `source` when nothing is persisted.
    pub fn new(builder: IndexBuilder, source: Arc<dyn DocumentSource>) -> Self {
        Self {
            builder,
            source,
            index: OnceCell::new(),
            state: AtomicU8::new(ProviderState::Uninitialized as u8),
        }
    }

    /// Wire a provider from configuration: a [`DirectoryLoader`] over
    /// `kb_dir`, an [`IndexStore`] at `persist_dir`, and whole-document
    /// chunks unless `chunk_size` is set.
    pub fn from_config(config: &RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let chunker: Arc<dyn Chunker> = match config.chunk_size {
            Some(size) => Arc::new(RecursiveChunker::new(size, config.chunk_overlap)),
            None => Arc::new(WholeDocumentChunker),
        };
        let store = IndexStore::new(&config.persist_dir, &config.collection_name);
        let builder =
            IndexBuilder::new(embedder, chunker, store).with_embed_timeout(config.embed_timeout);
        Self::new(builder, Arc::new(DirectoryLoader::new(&config.kb_dir)))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProviderState {
        ProviderState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether an index is cached.
    pub fn is_ready(&self) -> bool {
        self.index.initialized()
    }

    /// The index, loading or building it on first use.
    ///
    /// # Errors
    ///
    /// Any load or build failure. The provider then returns to
    /// [`ProviderState::Uninitialized`] and the next call tries again.
    pub async fn get(&self) -> Result<Arc<Index>> {
        if let Some(index) = self.index.get() {
            return Ok(Arc::clone(index));
        }
        self.index.get_or_try_init(|| self.initialize()).await.map(Arc::clone)
    }

    async fn initialize(&self) -> Result<Arc<Index>> {
        let mut guard = InitGuard { state: &self.state, armed: true };
        let result = if self.builder.store().exists().await {
            self.set_state(ProviderState::Loading);
            info!(path = %self.builder.store().dir().display(), "loading persisted index");
            self.builder.load().await
        } else {
            self.set_state(ProviderState::Building);
            info!(path = %self.builder.store().dir().display(), "no persisted index, building");
            match self.load_documents().await {
                Ok(documents) => self.builder.build(&documents).await,
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(index) => {
                guard.armed = false;
                self.set_state(ProviderState::Ready);
                info!(collection = %index.collection(), chunk_count = index.len(), "index ready");
                Ok(Arc::new(index))
            }
            Err(e) => {
                warn!(error = %e, "index initialization failed");
                Err(e)
            }
        }
    }

    /// Run the document source on the blocking pool.
    async fn load_documents(&self) -> Result<Vec<Document>> {
        let source = Arc::clone(&self.source);
        match tokio::task::spawn_blocking(move || source.load()).await {
            Ok(loaded) => loaded,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(RagError::Interrupted(format!("document loading: {e}"))),
        }
    }

    fn set_state(&self, state: ProviderState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Returns the provider to [`ProviderState::Uninitialized`] when an
/// initialization fails or its future is dropped part way.
struct InitGuard<'a> {
    state: &'a AtomicU8,
    armed: bool,
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.store(ProviderState::Uninitialized as u8, Ordering::Release);
        }
    }
}

impl std::fmt::Debug for IndexProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexProvider")
            .field("store", self.builder.store())
            .field("state", &self.state())
            .finish()
    }
}
