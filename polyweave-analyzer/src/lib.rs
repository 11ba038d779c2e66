//! Polyweave analyzer
//!
//! Incremental import analysis for HTML and JavaScript documents, built on
//! the generational cache in `polyweave-incremental`.
//!
//! ```rust,ignore
//! use polyweave_analyzer::{Analyzer, AnalyzerConfig, FsLoader};
//!
//! let config = AnalyzerConfig::from_file("polyweave.yml")?;
//! let analyzer = Analyzer::new(config.clone(), FsLoader::new(config.root_dir()));
//!
//! let document = analyzer.analyze(&"index.html".into()).await?;
//! // after an edit
//! analyzer.files_changed(&["elements/card.html".into()]);
//! ```

#![warn(missing_debug_implementations)]

pub mod analyzer;
pub mod config;
pub mod document;
pub mod error;
pub mod loader;
pub mod scanner;

pub use analyzer::Analyzer;
pub use config::{AnalyzerConfig, ConfigError};
pub use document::{
    Document, DocumentKind, DocumentStages, ImportEdge, ParsedDocument, ResolvedImport,
    ScannedDocument, ScannedImport,
};
pub use error::AnalysisError;
pub use loader::{DocumentLoader, FsLoader, InMemoryLoader};
pub use polyweave_incremental::Generation;
pub use polyweave_types::{DocPath, ImportKind, Severity, Warning};
pub use scanner::{HtmlImportScanner, ImportScanner, JsImportScanner};

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber; `RUST_LOG` overrides `level`.
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
