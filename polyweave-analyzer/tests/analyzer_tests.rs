//! End-to-end tests for the analyzer over in-memory and on-disk documents

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use polyweave_analyzer::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// In-memory loader that counts loads per path
#[derive(Debug, Default)]
struct CountingLoader {
    documents: InMemoryLoader,
    loads: Mutex<HashMap<DocPath, usize>>,
}

impl CountingLoader {
    fn with_documents(documents: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(CountingLoader {
            documents: InMemoryLoader::with_documents(documents.iter().copied()),
            loads: Mutex::new(HashMap::new()),
        })
    }

    fn set(&self, path: &str, contents: &str) {
        self.documents.set(path, contents);
    }

    fn loads(&self, path: &str) -> usize {
        self.loads
            .lock()
            .get(&DocPath::new(path))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentLoader for CountingLoader {
    fn can_load(&self, path: &DocPath) -> bool {
        self.documents.can_load(path)
    }

    async fn load(&self, path: &DocPath) -> Result<String, AnalysisError> {
        *self.loads.lock().entry(path.clone()).or_insert(0) += 1;
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.documents.load(path).await
    }
}

fn analyzer_over(loader: &Arc<CountingLoader>) -> Analyzer {
    Analyzer::with_loader(AnalyzerConfig::default(), loader.clone())
}

fn path(name: &str) -> DocPath {
    DocPath::new(name)
}

fn paths(names: &[&str]) -> BTreeSet<DocPath> {
    names.iter().map(|name| path(name)).collect()
}

fn import(href: &str) -> String {
    format!("<link rel=\"import\" href=\"{href}\">\n")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_analyses_load_each_document_once() {
    let loader = CountingLoader::with_documents(&[
        ("index.html", (import("a.html") + &import("b.html")).as_str()),
        ("a.html", import("shared.html").as_str()),
        ("b.html", import("shared.html").as_str()),
        ("shared.html", "<template></template>"),
    ]);
    let analyzer = Arc::new(analyzer_over(&loader));

    let tasks = (0..16).map(|_| {
        let analyzer = Arc::clone(&analyzer);
        tokio::spawn(async move { analyzer.analyze(&path("index.html")).await })
    });
    let outcomes = join_all(tasks).await;

    for outcome in outcomes {
        let document = outcome.expect("task panicked").expect("analysis failed");
        assert_eq!(
            document.dependencies,
            paths(&["a.html", "b.html", "shared.html"])
        );
    }
    for name in ["index.html", "a.html", "b.html", "shared.html"] {
        assert_eq!(loader.loads(name), 1, "{name} loaded more than once");
    }
}

#[tokio::test]
async fn test_edit_reloads_only_the_edited_document() {
    let loader = CountingLoader::with_documents(&[
        ("root.html", import("mid.html").as_str()),
        ("mid.html", import("leaf.html").as_str()),
        ("leaf.html", ""),
        ("other.html", ""),
    ]);
    let analyzer = analyzer_over(&loader);

    let root_v0 = analyzer.analyze(&path("root.html")).await.unwrap();
    let other_v0 = analyzer.analyze(&path("other.html")).await.unwrap();
    assert_eq!(root_v0.dependencies, paths(&["mid.html", "leaf.html"]));

    loader.set("leaf.html", import("extra.html").as_str());
    loader.set("extra.html", "");
    assert_eq!(analyzer.files_changed(&[path("leaf.html")]), Generation(1));

    let root_v1 = analyzer.analyze(&path("root.html")).await.unwrap();
    let other_v1 = analyzer.analyze(&path("other.html")).await.unwrap();

    assert_eq!(
        root_v1.dependencies,
        paths(&["mid.html", "leaf.html", "extra.html"])
    );
    assert!(!Arc::ptr_eq(&root_v0, &root_v1));
    assert!(Arc::ptr_eq(&other_v0, &other_v1));

    assert_eq!(loader.loads("leaf.html"), 2);
    assert_eq!(loader.loads("root.html"), 1);
    assert_eq!(loader.loads("mid.html"), 1);
    assert_eq!(loader.loads("other.html"), 1);
}

#[tokio::test]
async fn test_repeated_edits_keep_cascading() {
    let loader = CountingLoader::with_documents(&[
        ("root.html", import("leaf.html").as_str()),
        ("leaf.html", ""),
        ("extra.html", ""),
    ]);
    let analyzer = analyzer_over(&loader);

    let first = analyzer.analyze(&path("root.html")).await.unwrap();
    assert_eq!(first.dependencies, paths(&["leaf.html"]));

    loader.set("leaf.html", import("extra.html").as_str());
    analyzer.files_changed(&[path("leaf.html")]);
    let second = analyzer.analyze(&path("root.html")).await.unwrap();
    assert_eq!(second.dependencies, paths(&["leaf.html", "extra.html"]));

    loader.set("leaf.html", "");
    analyzer.files_changed(&[path("leaf.html")]);
    let third = analyzer.analyze(&path("root.html")).await.unwrap();
    assert_eq!(third.dependencies, paths(&["leaf.html"]));

    // A transitive dependency edit reaches the root too
    loader.set("leaf.html", import("extra.html").as_str());
    analyzer.files_changed(&[path("leaf.html")]);
    let fourth = analyzer.analyze(&path("root.html")).await.unwrap();
    analyzer.files_changed(&[path("extra.html")]);
    let fifth = analyzer.analyze(&path("root.html")).await.unwrap();
    assert!(!Arc::ptr_eq(&fourth, &fifth));
    assert_eq!(analyzer.current_generation(), Generation(4));
}

#[tokio::test]
async fn test_import_cycle_resolves() {
    let loader = CountingLoader::with_documents(&[
        ("a.html", (import("b.html") + &import("c.html")).as_str()),
        ("b.html", import("a.html").as_str()),
        ("c.html", ""),
    ]);
    let analyzer = analyzer_over(&loader);

    let outcomes = analyzer
        .analyze_many(&[path("a.html"), path("b.html")])
        .await;
    let a = outcomes[0].as_ref().unwrap();
    let b = outcomes[1].as_ref().unwrap();

    assert_eq!(a.dependencies, paths(&["b.html", "c.html"]));
    assert_eq!(b.dependencies, paths(&["a.html", "c.html"]));
    assert!(a.warnings.is_empty());

    let dependants = analyzer
        .cache()
        .dependency_graph()
        .get_all_dependants_of(&path("c.html"));
    assert!(dependants.contains(&path("a.html")));
    assert!(dependants.contains(&path("b.html")));
}

#[tokio::test]
async fn test_missing_import_degrades_with_warning() {
    let loader = CountingLoader::with_documents(&[(
        "index.html",
        (import("present.html") + &import("missing.html")).as_str(),
    ), ("present.html", "")]);
    let analyzer = analyzer_over(&loader);

    let document = analyzer.analyze(&path("index.html")).await.unwrap();

    let missing: Vec<&DocPath> = document.missing_imports().map(|import| &import.url).collect();
    assert_eq!(missing, vec![&path("missing.html")]);
    assert_eq!(document.warnings.len(), 1);
    assert_eq!(document.warnings[0].code, "could-not-load");
    assert_eq!(document.warnings[0].severity, Severity::Error);
    assert_eq!(document.warnings[0].line, Some(2));
    assert!(analyzer
        .cache()
        .dependency_graph()
        .rejection(&path("missing.html"))
        .is_some());
}

#[tokio::test]
async fn test_strict_imports_fail_the_dependant() {
    let loader = CountingLoader::with_documents(&[("index.html", import("missing.html").as_str())]);
    let config = AnalyzerConfig {
        strict_imports: true,
        ..AnalyzerConfig::default()
    };
    let analyzer = Analyzer::with_loader(config, loader.clone());

    let err = analyzer.analyze(&path("index.html")).await.unwrap_err();
    match err {
        AnalysisError::MissingDependency {
            path: document,
            dependency,
            ..
        } => {
            assert_eq!(document, path("index.html"));
            assert_eq!(dependency, path("missing.html"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unknown_and_unsupported_documents_fail() {
    let loader = CountingLoader::with_documents(&[("notes.txt", "hello")]);
    let analyzer = analyzer_over(&loader);

    let unsupported = analyzer.analyze(&path("notes.txt")).await.unwrap_err();
    assert_eq!(
        unsupported,
        AnalysisError::UnsupportedDocument {
            path: path("notes.txt")
        }
    );

    let missing = analyzer.analyze(&path("nowhere.html")).await.unwrap_err();
    assert!(matches!(missing, AnalysisError::Load { .. }));
}

#[tokio::test]
async fn test_configured_lazy_edges_become_imports() {
    let config = AnalyzerConfig::from_yaml_str(
        r#"
lazy_edges:
  shell.html:
    - views/settings.html
"#,
    )
    .unwrap();
    let loader = CountingLoader::with_documents(&[
        ("shell.html", ""),
        ("views/settings.html", ""),
    ]);
    let analyzer = Analyzer::with_loader(config, loader.clone());

    let document = analyzer.analyze(&path("shell.html")).await.unwrap();
    assert_eq!(
        document.imports,
        vec![ResolvedImport {
            url: path("views/settings.html"),
            kind: ImportKind::LazyHtmlImport,
            loaded: true,
        }]
    );
}

#[tokio::test]
async fn test_javascript_module_graph() {
    let loader = CountingLoader::with_documents(&[
        ("index.html", "<script type=\"module\" src=\"src/main.js\"></script>"),
        (
            "src/main.js",
            "import { render } from './render.js';\nimport 'lit';\n",
        ),
        ("src/render.js", "export * from '../lib/dom.mjs';\n"),
        ("lib/dom.mjs", "export const x = 1;\n"),
    ]);
    let analyzer = analyzer_over(&loader);

    let document = analyzer.analyze(&path("index.html")).await.unwrap();
    assert_eq!(document.imports[0].kind, ImportKind::HtmlScript);
    assert_eq!(
        document.dependencies,
        paths(&["src/main.js", "src/render.js", "lib/dom.mjs"])
    );
}

/// Treats `#include <path>` lines in HTML as imports
#[derive(Debug)]
struct IncludeScanner;

impl ImportScanner for IncludeScanner {
    fn name(&self) -> &'static str {
        "includes"
    }

    fn applies_to(&self, kind: DocumentKind) -> bool {
        kind == DocumentKind::Html
    }

    fn scan(&self, document: &ParsedDocument) -> Vec<ScannedImport> {
        document
            .contents
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let target = line.trim().strip_prefix("#include ")?;
                Some(ScannedImport::new(target.trim(), ImportKind::HtmlImport).at_line(index + 1))
            })
            .collect()
    }
}

#[tokio::test]
async fn test_custom_scanner() {
    let loader = CountingLoader::with_documents(&[
        ("page.html", "#include partials/nav.html\n"),
        ("partials/nav.html", ""),
    ]);
    let analyzer = analyzer_over(&loader).with_scanner(IncludeScanner);

    let document = analyzer.analyze(&path("page.html")).await.unwrap();
    assert_eq!(document.dependencies, paths(&["partials/nav.html"]));
}

#[tokio::test]
async fn test_filesystem_round_trip_with_edit() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("elements")).unwrap();
    std::fs::write(
        root.join("index.html"),
        "<link rel=\"import\" href=\"elements/card.html\">",
    )
    .unwrap();
    std::fs::write(root.join("elements/card.html"), "<div></div>").unwrap();
    std::fs::write(root.join("elements/icon.html"), "<svg></svg>").unwrap();
    std::fs::write(root.join("polyweave.yml"), "root: .\nlog_level: debug\n").unwrap();

    let config = AnalyzerConfig::from_file(root.join("polyweave.yml")).unwrap();
    init_tracing(&config.log_level);
    let analyzer = Analyzer::new(config.clone(), FsLoader::new(config.root_dir()));

    let before = analyzer.analyze(&path("index.html")).await.unwrap();
    assert_eq!(before.dependencies, paths(&["elements/card.html"]));

    std::fs::write(
        root.join("elements/card.html"),
        "<link rel=\"import\" href=\"icon.html\">",
    )
    .unwrap();
    analyzer.files_changed(&[path("elements/card.html")]);

    let after = analyzer.analyze(&path("index.html")).await.unwrap();
    assert_eq!(
        after.dependencies,
        paths(&["elements/card.html", "elements/icon.html"])
    );

    let analyzed = analyzer
        .metrics()
        .into_iter()
        .find(|snapshot| snapshot.table_name == "analyzed")
        .unwrap();
    assert_eq!(analyzed.executions, 2);
}
