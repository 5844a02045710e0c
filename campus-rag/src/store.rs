//! Durable storage for a built index.
//!
//! An index is persisted as one JSON snapshot, `{persist_dir}/{collection}.json`.
//! Snapshots are written into a staging directory beside `persist_dir` and
//! renamed into place, so `persist_dir` only ever appears fully written.
//! Whether `persist_dir` exists is the sole signal for "load" versus "build".

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::document::Chunk;
use crate::error::{RagError, Result};

/// Version of the on-disk snapshot layout.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// The persisted form of an index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexSnapshot {
    /// Layout version, see [`SNAPSHOT_FORMAT_VERSION`].
    pub format_version: u32,
    /// Collection name the snapshot was built under.
    pub collection: String,
    /// Identity of the embedding function that produced the vectors.
    pub embedding_model: String,
    /// Dimensionality of every stored vector.
    pub dimensions: usize,
    /// When the snapshot was built.
    pub created_at: DateTime<Utc>,
    /// Every embedded chunk, in index order.
    pub chunks: Vec<Chunk>,
}

impl IndexSnapshot {
    /// Create a snapshot stamped with the current time.
    pub fn new(
        collection: impl Into<String>,
        embedding_model: impl Into<String>,
        dimensions: usize,
        chunks: Vec<Chunk>,
    ) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            collection: collection.into(),
            embedding_model: embedding_model.into(),
            dimensions,
            created_at: Utc::now(),
            chunks,
        }
    }
}

/// A fixed persistence location holding one named collection.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
    collection: String,
}

impl IndexStore {
    /// Create a store for `collection` under `dir`.
    pub fn new(dir: impl Into<PathBuf>, collection: impl Into<String>) -> Self {
        Self { dir: dir.into(), collection: collection.into() }
    }

    /// The persistence directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn snapshot_file_name(&self) -> String {
        format!("{}.json", self.collection)
    }

    /// Whether a persisted index is present.
    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.dir).await.unwrap_or(false)
    }

    /// Persist `snapshot`, fully replacing whatever is at the location.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexStoreError`] if the snapshot cannot be
    /// serialized, written, or moved into place. On failure the previous
    /// contents of the location are left as they were.
    pub async fn save(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot).map_err(|e| self.error(&self.dir, e))?;

        let name = self
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| self.error(&self.dir, "persist_dir must end in a directory name"))?;
        let parent = match self.dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).await.map_err(|e| self.error(&parent, e))?;

        let staging = parent.join(format!(".{name}.staging-{}", Uuid::new_v4()));
        if let Err(e) = self.write_staged(&staging, &bytes).await {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        if self.exists().await {
            let retired = parent.join(format!(".{name}.retired-{}", Uuid::new_v4()));
            fs::rename(&self.dir, &retired).await.map_err(|e| self.error(&self.dir, e))?;
            if let Err(e) = fs::rename(&staging, &self.dir).await {
                // Put the previous index back so the location is never left empty.
                let _ = fs::rename(&retired, &self.dir).await;
                let _ = fs::remove_dir_all(&staging).await;
                return Err(self.error(&self.dir, e));
            }
            if let Err(e) = fs::remove_dir_all(&retired).await {
                warn!(path = %retired.display(), error = %e, "failed to remove replaced index");
            }
        } else {
            fs::rename(&staging, &self.dir).await.map_err(|e| self.error(&self.dir, e))?;
        }

        info!(
            path = %self.dir.display(),
            collection = %self.collection,
            chunk_count = snapshot.chunks.len(),
            bytes = bytes.len(),
            "persisted index"
        );
        Ok(())
    }

    async fn write_staged(&self, staging: &Path, bytes: &[u8]) -> Result<()> {
        fs::create_dir(staging).await.map_err(|e| self.error(staging, e))?;
        let path = staging.join(self.snapshot_file_name());
        let mut file = fs::File::create(&path).await.map_err(|e| self.error(&path, e))?;
        file.write_all(bytes).await.map_err(|e| self.error(&path, e))?;
        file.sync_all().await.map_err(|e| self.error(&path, e))?;
        debug!(path = %path.display(), "wrote staged snapshot");
        Ok(())
    }

    /// Read the persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexStoreError`] if the snapshot is missing,
    /// unparsable, of an unknown layout version, or built under a different
    /// collection name.
    pub async fn load(&self) -> Result<IndexSnapshot> {
        let path = self.dir.join(self.snapshot_file_name());
        let raw = fs::read(&path).await.map_err(|e| self.error(&path, e))?;
        let snapshot: IndexSnapshot =
            serde_json::from_slice(&raw).map_err(|e| self.error(&path, e))?;

        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(self.error(
                &path,
                format!(
                    "unsupported snapshot format {} (expected {SNAPSHOT_FORMAT_VERSION})",
                    snapshot.format_version
                ),
            ));
        }
        if snapshot.collection != self.collection {
            return Err(self.error(
                &path,
                format!(
                    "snapshot holds collection '{}', expected '{}'",
                    snapshot.collection, self.collection
                ),
            ));
        }

        info!(
            path = %path.display(),
            chunk_count = snapshot.chunks.len(),
            embedding_model = %snapshot.embedding_model,
            "loaded persisted index"
        );
        Ok(snapshot)
    }

    fn error(&self, path: &Path, message: impl ToString) -> RagError {
        RagError::IndexStoreError { path: path.to_path_buf(), message: message.to_string() }
    }
}
