//! Analysis coordinator
//!
//! Drives each document through load, parse, scan and analyze, memoising
//! every stage in the current [`AnalysisCache`] generation. Edits go through
//! [`Analyzer::files_changed`], which swaps in the next generation.

use crate::config::AnalyzerConfig;
use crate::document::{
    Document, DocumentKind, DocumentStages, ImportEdge, ParsedDocument, ResolvedImport,
    ScannedDocument,
};
use crate::error::AnalysisError;
use crate::loader::DocumentLoader;
use crate::scanner::{default_scanners, ImportScanner};
use futures::future::join_all;
use parking_lot::RwLock;
use polyweave_incremental::{AnalysisCache, Generation, MetricsSnapshot, WorkHandle};
use polyweave_types::{DocPath, ImportKind, Severity, Warning};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

type Cache = AnalysisCache<DocumentStages>;
type ScanOutcome = Result<Arc<ScannedDocument>, AnalysisError>;

/// Everything a stage computation needs besides the cache
#[derive(Clone)]
struct Context {
    config: AnalyzerConfig,
    loader: Arc<dyn DocumentLoader>,
    scanners: Vec<Arc<dyn ImportScanner>>,
}

/// Incremental analyzer over a graph of importing documents
pub struct Analyzer {
    context: Arc<Context>,
    cache: RwLock<Arc<Cache>>,
}

impl Analyzer {
    /// Create an analyzer with the default HTML and JavaScript scanners
    pub fn new(config: AnalyzerConfig, loader: impl DocumentLoader) -> Self {
        Self::with_loader(config, Arc::new(loader))
    }

    /// Like [`Analyzer::new`], for a loader that is already shared
    pub fn with_loader(config: AnalyzerConfig, loader: Arc<dyn DocumentLoader>) -> Self {
        let scanners = default_scanners().into_iter().map(Arc::from).collect();
        Analyzer {
            context: Arc::new(Context {
                config,
                loader,
                scanners,
            }),
            cache: RwLock::new(Arc::new(Cache::new())),
        }
    }

    /// Add an import scanner
    pub fn with_scanner(mut self, scanner: impl ImportScanner) -> Self {
        Arc::make_mut(&mut self.context)
            .scanners
            .push(Arc::new(scanner));
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.context.config
    }

    /// The generation new requests are served from
    pub fn current_generation(&self) -> Generation {
        self.cache.read().generation()
    }

    /// Snapshot of the current generation
    pub fn cache(&self) -> Arc<AnalysisCache<DocumentStages>> {
        Arc::clone(&self.cache.read())
    }

    pub fn metrics(&self) -> Vec<MetricsSnapshot> {
        self.cache().metrics()
    }

    /// Analyze `path` against the current generation
    pub async fn analyze(&self, path: &DocPath) -> Result<Arc<Document>, AnalysisError> {
        let cache = self.cache();
        analyze(&self.context, &cache, path).await
    }

    /// Analyze several documents concurrently, in the same generation
    pub async fn analyze_many(
        &self,
        paths: &[DocPath],
    ) -> Vec<Result<Arc<Document>, AnalysisError>> {
        let cache = self.cache();
        join_all(paths.iter().map(|path| analyze(&self.context, &cache, path))).await
    }

    /// Scan `path` for its own imports without resolving them
    pub async fn scan(&self, path: &DocPath) -> ScanOutcome {
        let cache = self.cache();
        scan(&self.context, &cache, path).await
    }

    /// Forget `paths` and everything resolved through them.
    ///
    /// Requests already running keep the generation they started in.
    pub fn files_changed(&self, paths: &[DocPath]) -> Generation {
        let mut current = self.cache.write();
        let next = Arc::new(current.invalidate(paths));
        let generation = next.generation();
        *current = next;
        info!(generation = %generation, changed = paths.len(), "files changed");
        generation
    }

    /// Drop every cached result
    pub fn clear_caches(&self) -> Generation {
        let mut current = self.cache.write();
        let generation = current.generation().next();
        *current = Arc::new(Cache::at_generation(generation));
        info!(generation = %generation, "caches cleared");
        generation
    }
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer")
            .field("config", &self.context.config)
            .field("scanners", &self.context.scanners)
            .field("generation", &self.current_generation())
            .finish()
    }
}

fn parse(
    ctx: &Arc<Context>,
    cache: &Arc<Cache>,
    path: &DocPath,
) -> WorkHandle<Arc<ParsedDocument>, AnalysisError> {
    let ctx = Arc::clone(ctx);
    let key = path.clone();
    cache.parsed().get_or_compute(path.clone(), move || async move {
        if !ctx.loader.can_load(&key) {
            return Err(AnalysisError::NoLoader { path: key });
        }
        let contents = ctx.loader.load(&key).await?;
        let kind = DocumentKind::from_path(&key)
            .ok_or_else(|| AnalysisError::UnsupportedDocument { path: key.clone() })?;
        debug!(path = %key, ?kind, bytes = contents.len(), "parsed document");
        Ok(Arc::new(ParsedDocument {
            path: key,
            kind,
            contents,
        }))
    })
}

fn scan(
    ctx: &Arc<Context>,
    cache: &Arc<Cache>,
    path: &DocPath,
) -> WorkHandle<Arc<ScannedDocument>, AnalysisError> {
    let ctx = Arc::clone(ctx);
    let stage_cache = Arc::clone(cache);
    let key = path.clone();
    cache.scanned().get_or_compute(path.clone(), move || async move {
        let outcome = match parse(&ctx, &stage_cache, &key).await {
            Ok(parsed) => Ok(Arc::new(scan_document(&ctx, &parsed))),
            Err(err) => Err(err),
        };
        register_scan(&stage_cache, &key, &outcome);
        outcome
    })
}

/// Scan `path`, then start the same work for each of its imports.
///
/// The imports' work is not awaited, so import cycles cannot deadlock.
fn dependencies_scanned(
    ctx: &Arc<Context>,
    cache: &Arc<Cache>,
    path: &DocPath,
) -> WorkHandle<(), AnalysisError> {
    let ctx = Arc::clone(ctx);
    let stage_cache = Arc::clone(cache);
    let key = path.clone();
    cache
        .dependencies_scanned()
        .get_or_compute(path.clone(), move || async move {
            let scanned = scan(&ctx, &stage_cache, &key).await?;
            for dependency in scanned.dependencies() {
                let _ = dependencies_scanned(&ctx, &stage_cache, dependency);
            }
            Ok(())
        })
}

async fn analyze(
    ctx: &Arc<Context>,
    cache: &Arc<Cache>,
    path: &DocPath,
) -> Result<Arc<Document>, AnalysisError> {
    let stage_ctx = Arc::clone(ctx);
    let stage_cache = Arc::clone(cache);
    let key = path.clone();
    cache
        .analyzed()
        .get_or_compute(path.clone(), move || async move {
            dependencies_scanned(&stage_ctx, &stage_cache, &key).await?;
            let scanned = scan(&stage_ctx, &stage_cache, &key).await?;
            let closure = scan_closure(&stage_ctx, &stage_cache, &key).await;
            stage_cache.dependency_graph().when_ready(&key).await;

            let document = Arc::new(resolve_document(
                &stage_ctx,
                &stage_cache,
                &scanned,
                &closure,
            )?);
            stage_cache
                .analyzed_documents()
                .insert(key.clone(), Arc::clone(&document));
            debug!(
                path = %key,
                generation = %stage_cache.generation(),
                dependencies = document.dependencies.len(),
                "analyzed document"
            );
            Ok(document)
        })
        .await
}

/// Run every applicable scanner over `parsed` and resolve what they find
fn scan_document(ctx: &Context, parsed: &ParsedDocument) -> ScannedDocument {
    let mut imports: Vec<ImportEdge> = Vec::new();
    let mut seen: HashSet<DocPath> = HashSet::new();
    let mut warnings = Vec::new();

    for scanner in ctx.scanners.iter().filter(|s| s.applies_to(parsed.kind)) {
        let found = scanner.scan(parsed);
        trace!(path = %parsed.path, scanner = scanner.name(), found = found.len(), "scanned");
        for import in found {
            if import.kind == ImportKind::LazyHtmlImport && !ctx.config.lazy_imports {
                continue;
            }
            match parsed.path.resolve(&import.url) {
                Some(target) => {
                    if seen.insert(target.clone()) {
                        imports.push(ImportEdge {
                            target,
                            kind: import.kind,
                            line: import.line,
                        });
                    }
                }
                None => {
                    let mut warning = Warning::new(
                        "unresolvable-import",
                        format!("cannot resolve import '{}'", import.url),
                        Severity::Warning,
                    );
                    if let Some(line) = import.line {
                        warning = warning.at_line(line);
                    }
                    warnings.push(warning);
                }
            }
        }
    }

    for target in ctx.config.lazy_edges_for(&parsed.path) {
        if seen.insert(target.clone()) {
            imports.push(ImportEdge {
                target,
                kind: ImportKind::LazyHtmlImport,
                line: None,
            });
        }
    }

    ScannedDocument {
        path: parsed.path.clone(),
        kind: parsed.kind,
        imports,
        warnings,
    }
}

/// Record a scan outcome in `cache`'s graph.
///
/// Registration is repeated for every document an analysis reaches: a scan
/// shared from an older generation may have landed only in the older graph,
/// and a dependant's reverse edges are dropped when its import is forgotten.
fn register_scan(cache: &Cache, path: &DocPath, outcome: &ScanOutcome) {
    let graph = cache.dependency_graph();
    match outcome {
        Ok(scanned) => {
            cache
                .scanned_documents()
                .insert(path.clone(), Arc::clone(scanned));
            graph.add_document(path.clone(), scanned.dependencies().cloned());
        }
        Err(err) => {
            if graph.rejection(path).is_none() {
                trace!(path = %path, error = %err, "rejecting document");
                graph.reject_document(path.clone(), err.to_string());
            }
        }
    }
}

/// Await the scans of every document reachable from `root`, registering
/// each one in this generation's graph
async fn scan_closure(
    ctx: &Arc<Context>,
    cache: &Arc<Cache>,
    root: &DocPath,
) -> BTreeMap<DocPath, ScanOutcome> {
    let mut outcomes: BTreeMap<DocPath, ScanOutcome> = BTreeMap::new();
    let mut queued: HashSet<DocPath> = HashSet::from([root.clone()]);
    let mut frontier = vec![root.clone()];

    while !frontier.is_empty() {
        let results = join_all(frontier.iter().map(|path| scan(ctx, cache, path))).await;
        let mut next = Vec::new();
        for (path, outcome) in frontier.into_iter().zip(results) {
            register_scan(cache, &path, &outcome);
            if let Ok(scanned) = &outcome {
                for dependency in scanned.dependencies() {
                    if queued.insert(dependency.clone()) {
                        next.push(dependency.clone());
                    }
                }
            }
            outcomes.insert(path, outcome);
        }
        frontier = next;
    }

    outcomes
}

fn resolve_document(
    ctx: &Context,
    cache: &Cache,
    scanned: &ScannedDocument,
    closure: &BTreeMap<DocPath, ScanOutcome>,
) -> Result<Document, AnalysisError> {
    let mut warnings = scanned.warnings.clone();
    let mut imports = Vec::with_capacity(scanned.imports.len());

    for edge in &scanned.imports {
        let failure = match closure.get(&edge.target) {
            Some(Ok(_)) => None,
            Some(Err(err)) => Some(
                cache
                    .dependency_graph()
                    .rejection(&edge.target)
                    .unwrap_or_else(|| err.to_string()),
            ),
            None => Some("document was never scanned".to_string()),
        };

        if let Some(reason) = &failure {
            if ctx.config.strict_imports {
                return Err(AnalysisError::MissingDependency {
                    path: scanned.path.clone(),
                    dependency: edge.target.clone(),
                    reason: reason.clone(),
                });
            }
            warn!(path = %scanned.path, import = %edge.target, %reason, "import could not be loaded");
            let mut warning = Warning::new(
                "could-not-load",
                format!("unable to load import '{}': {}", edge.target, reason),
                Severity::Error,
            );
            if let Some(line) = edge.line {
                warning = warning.at_line(line);
            }
            warnings.push(warning);
        }

        imports.push(ResolvedImport {
            url: edge.target.clone(),
            kind: edge.kind,
            loaded: failure.is_none(),
        });
    }

    let dependencies: BTreeSet<DocPath> = closure
        .keys()
        .filter(|path| **path != scanned.path)
        .cloned()
        .collect();

    Ok(Document {
        path: scanned.path.clone(),
        kind: scanned.kind,
        imports,
        dependencies,
        warnings,
    })
}
