//! Analysis errors
//!
//! One failure outcome is handed to every caller waiting on the same
//! document, so the error is `Clone` and carries messages rather than
//! source errors.

use polyweave_incremental::TaskAborted;
use polyweave_types::DocPath;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("no loader can load {path}")]
    NoLoader { path: DocPath },

    #[error("failed to load {path}: {message}")]
    Load { path: DocPath, message: String },

    #[error("unsupported document type: {path}")]
    UnsupportedDocument { path: DocPath },

    #[error("{path} imports {dependency}, which could not be loaded: {reason}")]
    MissingDependency {
        path: DocPath,
        dependency: DocPath,
        reason: String,
    },

    #[error(transparent)]
    Aborted(#[from] TaskAborted),
}

impl AnalysisError {
    /// The document this error is about
    pub fn path(&self) -> Option<&DocPath> {
        match self {
            AnalysisError::NoLoader { path }
            | AnalysisError::Load { path, .. }
            | AnalysisError::UnsupportedDocument { path }
            | AnalysisError::MissingDependency { path, .. } => Some(path),
            AnalysisError::Aborted(_) => None,
        }
    }
}
