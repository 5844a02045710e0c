//! Document loading from a directory of plain-text files.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{RagError, Result};

/// A source of documents for building a fresh index.
///
/// The index provider only calls this when no persisted index exists.
pub trait DocumentSource: Send + Sync {
    /// Load every document, failing on the first unreadable file.
    fn load(&self) -> Result<Vec<Document>>;
}

/// Loads every `.txt` file directly inside a directory.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    dir: PathBuf,
}

impl DirectoryLoader {
    /// Create a loader for `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory this loader reads from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DocumentSource for DirectoryLoader {
    fn load(&self) -> Result<Vec<Document>> {
        load_text_documents(&self.dir)
    }
}

/// Load all `.txt` files directly inside `dir` (non-recursive), sorted by
/// file name. Symlinks are followed and named by the link, not the target.
///
/// # Errors
///
/// - [`RagError::NoDocumentsFound`] if the directory is missing or holds no
///   `.txt` files.
/// - [`RagError::LoadError`] if the directory cannot be listed, a link is
///   dangling, or any file cannot be read as UTF-8. No file is ever skipped.
pub fn load_text_documents(dir: impl AsRef<Path>) -> Result<Vec<Document>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Err(RagError::NoDocumentsFound { dir: Some(dir.to_path_buf()) });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            RagError::LoadError { path, source: e.into() }
        })?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "txt")
        {
            files.push(entry.into_path());
        }
    }

    if files.is_empty() {
        return Err(RagError::NoDocumentsFound { dir: Some(dir.to_path_buf()) });
    }
    files.sort();

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        let text = fs::read_to_string(&path)
            .map_err(|source| RagError::LoadError { path: path.clone(), source })?;
        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).ok_or_else(
            || RagError::LoadError {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
            },
        )?;
        debug!(source = %file_name, bytes = text.len(), "loaded document");
        documents.push(Document::from_file_name(&file_name, text));
    }

    info!(dir = %dir.display(), document_count = documents.len(), "loaded documents");
    Ok(documents)
}
