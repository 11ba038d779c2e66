//! Document loaders
//!
//! The analyzer never touches storage directly; it asks a [`DocumentLoader`]
//! for the text of a path.

use crate::error::AnalysisError;
use async_trait::async_trait;
use parking_lot::RwLock;
use polyweave_types::DocPath;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::trace;

/// Source of document text
#[async_trait]
pub trait DocumentLoader: Send + Sync + 'static {
    /// Whether this loader is responsible for `path` at all
    fn can_load(&self, path: &DocPath) -> bool;

    async fn load(&self, path: &DocPath) -> Result<String, AnalysisError>;
}

/// Loader over an in-memory map of documents, for editors and tests
#[derive(Debug, Default)]
pub struct InMemoryLoader {
    documents: RwLock<HashMap<DocPath, String>>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a loader from `(path, contents)` pairs
    pub fn with_documents<I, P, C>(documents: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<DocPath>,
        C: Into<String>,
    {
        let loader = Self::new();
        for (path, contents) in documents {
            loader.set(path, contents);
        }
        loader
    }

    /// Set or replace the contents of `path`
    pub fn set(&self, path: impl Into<DocPath>, contents: impl Into<String>) {
        self.documents.write().insert(path.into(), contents.into());
    }

    pub fn remove(&self, path: &DocPath) -> Option<String> {
        self.documents.write().remove(path)
    }

    pub fn contains(&self, path: &DocPath) -> bool {
        self.documents.read().contains_key(path)
    }
}

#[async_trait]
impl DocumentLoader for InMemoryLoader {
    fn can_load(&self, _path: &DocPath) -> bool {
        true
    }

    async fn load(&self, path: &DocPath) -> Result<String, AnalysisError> {
        self.documents
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| AnalysisError::Load {
                path: path.clone(),
                message: "no such document".to_string(),
            })
    }
}

/// Loader reading documents from a directory on disk
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of `path` on disk, or `None` if it would leave the root
    fn file_path(&self, path: &DocPath) -> Option<PathBuf> {
        let relative = Path::new(path.as_str());
        let inside = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        inside.then(|| self.root.join(relative))
    }
}

#[async_trait]
impl DocumentLoader for FsLoader {
    fn can_load(&self, path: &DocPath) -> bool {
        self.file_path(path).is_some()
    }

    async fn load(&self, path: &DocPath) -> Result<String, AnalysisError> {
        let file = self
            .file_path(path)
            .ok_or_else(|| AnalysisError::NoLoader { path: path.clone() })?;
        trace!(path = %path, file = %file.display(), "reading document");
        tokio::fs::read_to_string(&file)
            .await
            .map_err(|err| AnalysisError::Load {
                path: path.clone(),
                message: err.to_string(),
            })
    }
}
