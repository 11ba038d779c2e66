//! Per-stage document representations

use crate::error::AnalysisError;
use polyweave_incremental::Pipeline;
use polyweave_types::{DocPath, ImportKind, Warning};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Language of a document, decided from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Html,
    JavaScript,
}

impl DocumentKind {
    /// Classify `path` by extension, `None` for anything not analyzable
    pub fn from_path(path: &DocPath) -> Option<Self> {
        match path.extension()?.as_str() {
            "html" | "htm" => Some(DocumentKind::Html),
            "js" | "mjs" => Some(DocumentKind::JavaScript),
            _ => None,
        }
    }
}

/// A loaded document with its language decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub path: DocPath,
    pub kind: DocumentKind,
    pub contents: String,
}

/// One import found by a scanner, still as written in the source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScannedImport {
    pub url: String,
    pub kind: ImportKind,
    /// 1-based line of the import in its document
    pub line: Option<usize>,
}

impl ScannedImport {
    pub fn new(url: impl Into<String>, kind: ImportKind) -> Self {
        Self {
            url: url.into(),
            kind,
            line: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

/// An import edge of a scanned document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportEdge {
    pub target: DocPath,
    pub kind: ImportKind,
    pub line: Option<usize>,
}

/// An import resolved to a document path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedImport {
    pub url: DocPath,
    pub kind: ImportKind,
    /// Whether the imported document loaded and scanned successfully
    pub loaded: bool,
}

/// Result of scanning one document for its own imports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedDocument {
    pub path: DocPath,
    pub kind: DocumentKind,
    /// Resolved imports in source order, without duplicates
    pub imports: Vec<ImportEdge>,
    pub warnings: Vec<Warning>,
}

impl ScannedDocument {
    /// The paths this document depends on
    pub fn dependencies(&self) -> impl Iterator<Item = &DocPath> {
        self.imports.iter().map(|edge| &edge.target)
    }
}

/// Fully analyzed document: direct imports plus the transitive closure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub path: DocPath,
    pub kind: DocumentKind,
    pub imports: Vec<ResolvedImport>,
    /// Every document reachable through imports, excluding this one
    pub dependencies: BTreeSet<DocPath>,
    pub warnings: Vec<Warning>,
}

impl Document {
    pub fn depends_on(&self, path: &DocPath) -> bool {
        self.dependencies.contains(path)
    }

    /// Imports whose target failed to load
    pub fn missing_imports(&self) -> impl Iterator<Item = &ResolvedImport> {
        self.imports.iter().filter(|import| !import.loaded)
    }
}

/// Stage types of the document pipeline
#[derive(Debug)]
pub struct DocumentStages;

impl Pipeline for DocumentStages {
    type Parsed = Arc<ParsedDocument>;
    type Scanned = Arc<ScannedDocument>;
    type Analyzed = Arc<Document>;
    type Error = AnalysisError;
}
