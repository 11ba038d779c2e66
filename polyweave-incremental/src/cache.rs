//! Layered analysis cache
//!
//! One [`AnalysisCache`] is one *generation*: four work tables (parsed,
//! scanned, analyzed, dependencies-scanned), two maps of settled results and
//! a dependency graph. Generations are only ever replaced, through
//! [`AnalysisCache::invalidate`], never rewritten by it.

use crate::error::TaskAborted;
use crate::graph::DependencyGraph;
use crate::memo::WorkTable;
use crate::metrics::MetricsSnapshot;
use dashmap::DashMap;
use polyweave_types::DocPath;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Generation number of a cache snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

impl Generation {
    pub const ZERO: Generation = Generation(0);

    pub fn next(self) -> Generation {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Value types produced by each pipeline stage
///
/// The cache is agnostic to what a parsed, scanned or analyzed document is;
/// the coordinator picks the types by implementing this trait on a marker.
pub trait Pipeline: Send + Sync + 'static {
    /// Output of the parse stage
    type Parsed: Clone + Send + Sync + 'static;

    /// Output of the scan stage
    type Scanned: Clone + Send + Sync + 'static;

    /// Output of the resolve/analyze stage
    type Analyzed: Clone + Send + Sync + 'static;

    /// Failure of any stage
    type Error: Clone + Send + Sync + From<TaskAborted> + 'static;
}

/// Plain map of settled per-document results
pub struct DocumentMap<V> {
    entries: DashMap<DocPath, V>,
}

impl<V: Clone> DocumentMap<V> {
    pub fn new() -> Self {
        DocumentMap {
            entries: DashMap::new(),
        }
    }

    fn fork(&self) -> Self {
        DocumentMap {
            entries: self
                .entries
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }

    pub fn get(&self, path: &DocPath) -> Option<V> {
        self.entries.get(path).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, path: DocPath, value: V) -> Option<V> {
        self.entries.insert(path, value)
    }

    pub fn remove(&self, path: &DocPath) -> Option<V> {
        self.entries.remove(path).map(|(_, value)| value)
    }

    pub fn contains_key(&self, path: &DocPath) -> bool {
        self.entries.contains_key(path)
    }

    /// Copy of every (path, value) pair
    pub fn entries(&self) -> Vec<(DocPath, V)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for DocumentMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for DocumentMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentMap")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// One generation of the analysis cache
pub struct AnalysisCache<P: Pipeline> {
    generation: Generation,
    parsed: WorkTable<DocPath, P::Parsed, P::Error>,
    scanned: WorkTable<DocPath, P::Scanned, P::Error>,
    analyzed: WorkTable<DocPath, P::Analyzed, P::Error>,
    dependencies_scanned: WorkTable<DocPath, (), P::Error>,
    scanned_documents: DocumentMap<P::Scanned>,
    analyzed_documents: DocumentMap<P::Analyzed>,
    dependency_graph: DependencyGraph,
}

impl<P: Pipeline> AnalysisCache<P> {
    /// Create an empty generation zero
    pub fn new() -> Self {
        Self::at_generation(Generation::ZERO)
    }

    /// Create an empty cache numbered `generation`
    pub fn at_generation(generation: Generation) -> Self {
        AnalysisCache {
            generation,
            parsed: WorkTable::new("parsed"),
            scanned: WorkTable::new("scanned"),
            analyzed: WorkTable::new("analyzed"),
            dependencies_scanned: WorkTable::new("dependencies-scanned"),
            scanned_documents: DocumentMap::new(),
            analyzed_documents: DocumentMap::new(),
            dependency_graph: DependencyGraph::new(),
        }
    }

    /// Copy every table and map from `self`, pairing them with `graph`
    fn fork_with_graph(&self, graph: DependencyGraph) -> Self {
        AnalysisCache {
            generation: self.generation.next(),
            parsed: self.parsed.fork(),
            scanned: self.scanned.fork(),
            analyzed: self.analyzed.fork(),
            dependencies_scanned: self.dependencies_scanned.fork(),
            scanned_documents: self.scanned_documents.fork(),
            analyzed_documents: self.analyzed_documents.fork(),
            dependency_graph: graph,
        }
    }

    /// Produce the next generation with `paths` and their dependants invalidated.
    ///
    /// Must be called whenever a document changes. The edited documents are
    /// forgotten entirely; documents that transitively import them keep their
    /// own parse and scan but lose their resolved analysis. The analyzed
    /// work table is rebuilt from the surviving settled analyses only, so no
    /// computation started against `self` can land in the new generation.
    pub fn invalidate(&self, paths: &[DocPath]) -> AnalysisCache<P> {
        // Dependants must come from this generation's graph, before forgetting.
        let mut dependants: HashSet<DocPath> = HashSet::new();
        for path in paths {
            dependants.extend(self.dependency_graph.get_all_dependants_of(path));
        }

        let graph = self.dependency_graph.invalidate_paths(paths);
        let next = self.fork_with_graph(graph);

        for path in paths {
            next.parsed.delete(path);
            next.scanned.delete(path);
            next.dependencies_scanned.delete(path);
            next.scanned_documents.remove(path);
            next.analyzed_documents.remove(path);
        }

        for dependant in &dependants {
            next.dependencies_scanned.delete(dependant);
            next.analyzed_documents.remove(dependant);
        }

        // In-flight analyses may read forgotten state; only drop them when
        // something was actually forgotten.
        if !paths.is_empty() {
            next.analyzed.clear();
            for (path, document) in next.analyzed_documents.entries() {
                next.analyzed.set(path, document);
            }
        }

        debug!(
            generation = %next.generation,
            invalidated = paths.len(),
            dependants = dependants.len(),
            surviving_analyses = next.analyzed.len(),
            "cache invalidated"
        );

        next
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn parsed(&self) -> &WorkTable<DocPath, P::Parsed, P::Error> {
        &self.parsed
    }

    pub fn scanned(&self) -> &WorkTable<DocPath, P::Scanned, P::Error> {
        &self.scanned
    }

    pub fn analyzed(&self) -> &WorkTable<DocPath, P::Analyzed, P::Error> {
        &self.analyzed
    }

    pub fn dependencies_scanned(&self) -> &WorkTable<DocPath, (), P::Error> {
        &self.dependencies_scanned
    }

    /// Settled scan results, filled in by the scan stage
    pub fn scanned_documents(&self) -> &DocumentMap<P::Scanned> {
        &self.scanned_documents
    }

    /// Settled analyses, filled in by the analyze stage
    pub fn analyzed_documents(&self) -> &DocumentMap<P::Analyzed> {
        &self.analyzed_documents
    }

    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.dependency_graph
    }

    /// One metrics snapshot per work table
    pub fn metrics(&self) -> Vec<MetricsSnapshot> {
        vec![
            self.parsed.metrics().snapshot(),
            self.scanned.metrics().snapshot(),
            self.dependencies_scanned.metrics().snapshot(),
            self.analyzed.metrics().snapshot(),
        ]
    }
}

impl<P: Pipeline> Default for AnalysisCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Pipeline> fmt::Debug for AnalysisCache<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisCache")
            .field("generation", &self.generation)
            .field("parsed", &self.parsed)
            .field("scanned", &self.scanned)
            .field("analyzed", &self.analyzed)
            .field("dependencies_scanned", &self.dependencies_scanned)
            .field("scanned_documents", &self.scanned_documents)
            .field("analyzed_documents", &self.analyzed_documents)
            .field("dependency_graph", &self.dependency_graph)
            .finish()
    }
}
