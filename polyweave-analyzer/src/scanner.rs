//! Import scanners
//!
//! Scanners find the imports a document declares in its own text. They are
//! regex based and never look at other documents, so scanning a document
//! never waits on its dependencies.

use crate::document::{DocumentKind, ParsedDocument, ScannedImport};
use once_cell::sync::Lazy;
use polyweave_types::{is_external, ImportKind};
use regex::Regex;
use std::fmt::Debug;

/// Finds the imports declared by one kind of document
pub trait ImportScanner: Debug + Send + Sync + 'static {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn applies_to(&self, kind: DocumentKind) -> bool;

    /// Imports in source order, as written in the document
    fn scan(&self, document: &ParsedDocument) -> Vec<ScannedImport>;
}

/// Default scanner set: HTML imports and JavaScript module imports
pub fn default_scanners() -> Vec<Box<dyn ImportScanner>> {
    vec![Box::new(HtmlImportScanner), Box::new(JsImportScanner)]
}

static HTML_COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid html comment regex"));

static LINK_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<link\b[^>]*>").expect("valid link tag regex"));

static SCRIPT_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<script\b[^>]*>").expect("valid script tag regex"));

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
        .expect("valid attribute regex")
});

/// Scans `<link rel="import">`, `<link rel="lazy-import">` and `<script src>`
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlImportScanner;

impl ImportScanner for HtmlImportScanner {
    fn name(&self) -> &'static str {
        "html-imports"
    }

    fn applies_to(&self, kind: DocumentKind) -> bool {
        kind == DocumentKind::Html
    }

    fn scan(&self, document: &ParsedDocument) -> Vec<ScannedImport> {
        let source = blank_comments(&document.contents);
        let mut found: Vec<(usize, ScannedImport)> = Vec::new();

        for tag in LINK_TAG_RE.find_iter(&source) {
            let rel = attribute(tag.as_str(), "rel").unwrap_or_default();
            let rels: Vec<String> = rel
                .split_whitespace()
                .map(|value| value.to_ascii_lowercase())
                .collect();
            let is_import = rels.iter().any(|value| value == "import");
            let is_lazy = rels.iter().any(|value| value == "lazy-import");
            // `rel="import lazy-import"` is ambiguous, skip it
            if is_import == is_lazy {
                continue;
            }
            if attribute(tag.as_str(), "type").is_some_and(|ty| ty.eq_ignore_ascii_case("css")) {
                continue;
            }
            let Some(href) = attribute(tag.as_str(), "href") else {
                continue;
            };
            if href.is_empty() || is_external(&href) {
                continue;
            }
            let kind = if is_lazy {
                ImportKind::LazyHtmlImport
            } else {
                ImportKind::HtmlImport
            };
            found.push((
                tag.start(),
                ScannedImport::new(href, kind).at_line(line_of(&source, tag.start())),
            ));
        }

        for tag in SCRIPT_TAG_RE.find_iter(&source) {
            let Some(src) = attribute(tag.as_str(), "src") else {
                continue;
            };
            if src.is_empty() || is_external(&src) {
                continue;
            }
            found.push((
                tag.start(),
                ScannedImport::new(src, ImportKind::HtmlScript)
                    .at_line(line_of(&source, tag.start())),
            ));
        }

        found.sort_by_key(|(offset, _)| *offset);
        found.into_iter().map(|(_, import)| import).collect()
    }
}

static JS_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:import|export)\s*(?:[^'";]*?\bfrom\s*)?["']([^"'\r\n]+)["']"#)
        .expect("valid js import regex")
});

static JS_LINE_COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*//.*$").expect("valid js comment regex"));

/// Scans `import ... from '...'`, `import '...'` and `export ... from '...'`
///
/// Only relative (`./`, `../`) and root-relative (`/`) specifiers are
/// reported; bare module names belong to a package resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsImportScanner;

impl ImportScanner for JsImportScanner {
    fn name(&self) -> &'static str {
        "js-imports"
    }

    fn applies_to(&self, kind: DocumentKind) -> bool {
        kind == DocumentKind::JavaScript
    }

    fn scan(&self, document: &ParsedDocument) -> Vec<ScannedImport> {
        let source = blank_matches(&JS_LINE_COMMENT_RE, &document.contents);
        JS_IMPORT_RE
            .captures_iter(&source)
            .filter_map(|caps| {
                let specifier = caps.get(1)?;
                if !is_relative_specifier(specifier.as_str()) {
                    return None;
                }
                Some(
                    ScannedImport::new(specifier.as_str(), ImportKind::JsImport)
                        .at_line(line_of(&source, specifier.start())),
                )
            })
            .collect()
    }
}

fn is_relative_specifier(specifier: &str) -> bool {
    (specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/'))
        && !is_external(specifier)
}

/// Value of attribute `name` in a single start tag
fn attribute(tag: &str, name: &str) -> Option<String> {
    ATTR_RE.captures_iter(tag).find_map(|caps| {
        let key = caps.get(1)?;
        if !key.as_str().eq_ignore_ascii_case(name) {
            return None;
        }
        caps.get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|value| value.as_str().trim().to_string())
    })
}

fn blank_comments(source: &str) -> String {
    blank_matches(&HTML_COMMENT_RE, source)
}

/// Replace every match with spaces, keeping newlines so offsets and line
/// numbers still line up with the original text
fn blank_matches(re: &Regex, source: &str) -> String {
    re.replace_all(source, |caps: &regex::Captures<'_>| {
        caps[0]
            .chars()
            .map(|c| if c == '\n' { '\n' } else { ' ' })
            .collect::<String>()
    })
    .into_owned()
}

/// 1-based line number of byte `offset`
fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].bytes().filter(|b| *b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyweave_types::DocPath;

    fn html(contents: &str) -> ParsedDocument {
        ParsedDocument {
            path: DocPath::new("elements/app.html"),
            kind: DocumentKind::Html,
            contents: contents.to_string(),
        }
    }

    fn js(contents: &str) -> ParsedDocument {
        ParsedDocument {
            path: DocPath::new("src/app.js"),
            kind: DocumentKind::JavaScript,
            contents: contents.to_string(),
        }
    }

    fn urls(imports: &[ScannedImport]) -> Vec<(&str, ImportKind)> {
        imports
            .iter()
            .map(|import| (import.url.as_str(), import.kind))
            .collect()
    }

    #[test]
    fn test_html_links_and_scripts() {
        let doc = html(
            r#"<link rel="import" href="./button.html">
<link rel='lazy-import' href="../shared/dialog.html">
<link rel="stylesheet" href="app.css">
<link rel="import" type="css" href="theme.css">
<script src="app.js"></script>
<script>console.log('inline')</script>
<script src="https://cdn.example.com/lib.js"></script>"#,
        );
        let imports = HtmlImportScanner.scan(&doc);

        assert_eq!(
            urls(&imports),
            vec![
                ("./button.html", ImportKind::HtmlImport),
                ("../shared/dialog.html", ImportKind::LazyHtmlImport),
                ("app.js", ImportKind::HtmlScript),
            ]
        );
        assert_eq!(imports[0].line, Some(1));
        assert_eq!(imports[1].line, Some(2));
        assert_eq!(imports[2].line, Some(5));
    }

    #[test]
    fn test_html_commented_imports_are_ignored() {
        let doc = html(
            "<!--\n<link rel=\"import\" href=\"old.html\">\n-->\n<link href=new.html rel=import>",
        );
        let imports = HtmlImportScanner.scan(&doc);

        assert_eq!(urls(&imports), vec![("new.html", ImportKind::HtmlImport)]);
        assert_eq!(imports[0].line, Some(4));
    }

    #[test]
    fn test_js_import_forms() {
        let doc = js(r#"import { a, b } from './a.js';
import './side-effect.js';
export * from "../lib/b.js";
import lodash from 'lodash';
// import { gone } from './commented.js';
import {
  c,
} from '/root/c.mjs';
const s = "import nothing";
"#);
        let imports = JsImportScanner.scan(&doc);

        assert_eq!(
            imports
                .iter()
                .map(|import| import.url.as_str())
                .collect::<Vec<_>>(),
            vec!["./a.js", "./side-effect.js", "../lib/b.js", "/root/c.mjs"]
        );
        assert_eq!(imports[3].line, Some(8));
    }

    #[test]
    fn test_scanners_apply_by_kind() {
        assert!(HtmlImportScanner.applies_to(DocumentKind::Html));
        assert!(!HtmlImportScanner.applies_to(DocumentKind::JavaScript));
        assert!(JsImportScanner.applies_to(DocumentKind::JavaScript));
        assert_eq!(default_scanners().len(), 2);
    }
}
