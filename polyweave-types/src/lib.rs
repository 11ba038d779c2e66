//! Shared types for polyweave
//!
//! This crate provides the common vocabulary used across the polyweave
//! crates: document paths, import kinds and analysis warnings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical identifier of a document.
///
/// Paths are `/`-separated and relative to the analysis root, with no
/// leading slash and no `.` or `..` segments once produced by [`DocPath::resolve`]
/// or [`DocPath::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocPath(pub String);

impl DocPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalize a root-relative path, collapsing `.` and `..` segments.
    ///
    /// Returns `None` for external URLs and for paths that climb above the root.
    pub fn normalize(path: &str) -> Option<Self> {
        if is_external(path) {
            return None;
        }
        let path = strip_suffixes(path);
        let mut segments: Vec<&str> = Vec::new();
        push_segments(&mut segments, path)?;
        if segments.is_empty() {
            return None;
        }
        Some(Self(segments.join("/")))
    }

    /// Resolve an import specifier found inside this document.
    ///
    /// Relative specifiers are resolved against this document's directory,
    /// `/`-prefixed ones against the root. External URLs (`https://...`,
    /// `//cdn...`, `data:`) are not documents of this graph and yield `None`.
    pub fn resolve(&self, href: &str) -> Option<DocPath> {
        let href = href.trim();
        if href.is_empty() || is_external(href) {
            return None;
        }
        let href = strip_suffixes(href);
        if href.is_empty() {
            return None;
        }

        let mut segments: Vec<&str> = Vec::new();
        if !href.starts_with('/') {
            push_segments(&mut segments, self.directory())?;
        }
        push_segments(&mut segments, href)?;

        if segments.is_empty() {
            return None;
        }
        Some(DocPath(segments.join("/")))
    }

    /// The directory portion of the path, without a trailing slash.
    pub fn directory(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }

    /// The file extension, lowercased, if the final segment has one.
    pub fn extension(&self) -> Option<String> {
        let name = self.0.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocPath {
    fn from(path: &str) -> Self {
        DocPath::new(path)
    }
}

impl From<String> for DocPath {
    fn from(path: String) -> Self {
        DocPath(path)
    }
}

impl AsRef<str> for DocPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether `href` points outside the document graph (absolute URL, `data:` ...)
pub fn is_external(href: &str) -> bool {
    href.starts_with("//")
        || href.contains("://")
        || href.starts_with("data:")
        || href.starts_with("mailto:")
        || href.starts_with("javascript:")
}

fn strip_suffixes(href: &str) -> &str {
    let end = href.find(['?', '#']).unwrap_or(href.len());
    &href[..end]
}

/// Push the segments of `path` onto `stack`, applying `.` and `..`.
fn push_segments<'a>(stack: &mut Vec<&'a str>, path: &'a str) -> Option<()> {
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop()?;
            }
            other => stack.push(other),
        }
    }
    Some(())
}

/// How one document refers to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportKind {
    /// `<link rel="import" href="...">`
    HtmlImport,
    /// `<link rel="lazy-import" href="...">` or a configured lazy edge
    LazyHtmlImport,
    /// `<script src="...">`
    HtmlScript,
    /// `import ... from '...'` / `export ... from '...'`
    JsImport,
}

impl ImportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::HtmlImport => "html-import",
            ImportKind::LazyHtmlImport => "lazy-html-import",
            ImportKind::HtmlScript => "html-script",
            ImportKind::JsImport => "js-import",
        }
    }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warning severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A non-fatal problem attached to a scanned or analyzed document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Warning {
    /// Stable machine-readable code, e.g. `could-not-load`
    pub code: String,
    pub message: String,
    pub severity: Severity,
    /// 1-based line the warning refers to, when known
    #[serde(default)]
    pub line: Option<usize>,
}

impl Warning {
    pub fn new(code: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            severity,
            line: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "[{}] line {}: {}", self.code, line, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}
