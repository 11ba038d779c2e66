//! Document dependency graph
//!
//! Tracks, per document, the documents it imports, plus the reverse index of
//! who imports whom. A document's dependency list is only known once it has
//! been scanned, so the graph distinguishes three states: *pending*
//! (mentioned as a dependency but not registered yet), *added* and
//! *rejected*. A missing node is never read as "no dependencies".
//!
//! Readiness is reachability over known edges: a document is ready when every
//! node reachable from it is added or rejected. Cycles therefore resolve as
//! soon as every member has been registered.

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use polyweave_types::DocPath;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Future returned by [`DependencyGraph::when_ready`]
pub type ReadyFuture = BoxFuture<'static, ()>;

/// Registration state of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentStatus {
    /// Referenced as a dependency, not registered yet
    Pending,
    /// Registered with its dependency list
    Added,
    /// Dependency resolution failed terminally
    Rejected(String),
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    status: DocumentStatus,
    dependencies: HashSet<DocPath>,
    dependants: HashSet<DocPath>,
}

impl DocumentRecord {
    fn pending() -> Self {
        DocumentRecord {
            status: DocumentStatus::Pending,
            dependencies: HashSet::new(),
            dependants: HashSet::new(),
        }
    }
}

/// A readiness future waiting for `path`'s closure.
///
/// Owned by the graph it was created on and judged only against that graph.
#[derive(Debug)]
struct Waiter {
    path: DocPath,
    signal: watch::Sender<bool>,
}

impl Waiter {
    fn is_resolved(&self) -> bool {
        *self.signal.borrow()
    }

    /// Every future listening on this waiter has been dropped
    fn is_abandoned(&self) -> bool {
        self.signal.is_closed()
    }
}

#[derive(Debug, Default)]
struct GraphState {
    documents: HashMap<DocPath, DocumentRecord>,
    waiters: Vec<Waiter>,
}

impl GraphState {
    fn record_mut(&mut self, path: &DocPath) -> &mut DocumentRecord {
        self.documents
            .entry(path.clone())
            .or_insert_with(DocumentRecord::pending)
    }

    /// Walk known edges from `path`; ready iff nothing reachable is pending or absent.
    fn closure_is_ready(&self, path: &DocPath) -> bool {
        let mut visited: HashSet<&DocPath> = HashSet::new();
        let mut stack = vec![path];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(record) = self.documents.get(current) else {
                return false;
            };
            match record.status {
                DocumentStatus::Pending => return false,
                DocumentStatus::Rejected(_) => {}
                DocumentStatus::Added => stack.extend(record.dependencies.iter()),
            }
        }

        true
    }

    /// Resolve every waiter whose closure became ready
    fn resolve_waiters(&mut self) {
        let waiters = std::mem::take(&mut self.waiters);
        let mut still_waiting = Vec::with_capacity(waiters.len());

        for waiter in waiters {
            if waiter.is_resolved() || waiter.is_abandoned() {
                continue;
            }
            if self.closure_is_ready(&waiter.path) {
                trace!(path = %waiter.path, "dependency closure ready");
                waiter.signal.send_replace(true);
            } else {
                still_waiting.push(waiter);
            }
        }

        self.waiters = still_waiting;
    }

    /// Copy the documents only; waiters stay with the graph that created them.
    fn fork(&self) -> GraphState {
        GraphState {
            documents: self.documents.clone(),
            waiters: Vec::new(),
        }
    }
}

/// Import graph for one cache generation
///
/// All mutation goes through one lock per graph, so registration and the
/// readiness bookkeeping it triggers are atomic with respect to each other.
pub struct DependencyGraph {
    state: Mutex<GraphState>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph {
            state: Mutex::new(GraphState::default()),
        }
    }

    /// Record that `path` depends on `dependencies`.
    ///
    /// Dependencies not registered yet become pending nodes. Re-adding a path
    /// replaces its dependency list and prunes reverse edges it no longer has.
    pub fn add_document<I>(&self, path: DocPath, dependencies: I)
    where
        I: IntoIterator<Item = DocPath>,
    {
        let dependencies: HashSet<DocPath> = dependencies.into_iter().collect();
        let mut state = self.state.lock();

        let record = state.record_mut(&path);
        record.status = DocumentStatus::Added;
        let previous = std::mem::replace(&mut record.dependencies, dependencies.clone());

        for stale in previous.difference(&dependencies) {
            if let Some(stale_record) = state.documents.get_mut(stale) {
                stale_record.dependants.remove(&path);
            }
        }
        for dependency in &dependencies {
            state.record_mut(dependency).dependants.insert(path.clone());
        }

        debug!(path = %path, dependencies = dependencies.len(), "document added to graph");
        state.resolve_waiters();
    }

    /// Mark `path` as terminally failed.
    ///
    /// A rejected document counts as resolved for every readiness future that
    /// reaches it; dependants are not failed.
    pub fn reject_document(&self, path: DocPath, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.state.lock();

        debug!(path = %path, reason = %reason, "document rejected in graph");
        state.record_mut(&path).status = DocumentStatus::Rejected(reason);
        state.resolve_waiters();
    }

    /// All documents that depend on `path`, directly or transitively.
    ///
    /// `path` itself is included only when it sits on a cycle.
    pub fn get_all_dependants_of(&self, path: &DocPath) -> HashSet<DocPath> {
        let state = self.state.lock();
        let mut result = HashSet::new();
        let mut visited: HashSet<&DocPath> = HashSet::new();
        let mut stack = vec![path];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(record) = state.documents.get(current) else {
                continue;
            };
            for dependant in &record.dependants {
                result.insert(dependant.clone());
                stack.push(dependant);
            }
        }

        result
    }

    /// Future that resolves once `path` and everything reachable from it have
    /// been added or rejected.
    ///
    /// Only registrations on this graph resolve the future; forks made by
    /// [`DependencyGraph::invalidate_paths`] do not. If this graph is dropped
    /// first, the future never resolves.
    pub fn when_ready(&self, path: &DocPath) -> ReadyFuture {
        let mut state = self.state.lock();
        if state.closure_is_ready(path) {
            return futures::future::ready(()).boxed();
        }

        state.waiters.retain(|waiter| !waiter.is_abandoned());
        let (signal, mut ready) = watch::channel(false);
        state.waiters.push(Waiter {
            path: path.clone(),
            signal,
        });
        trace!(path = %path, "waiting for dependency closure");

        async move {
            let resolved = ready.wait_for(|ready| *ready).await.is_ok();
            if !resolved {
                futures::future::pending::<()>().await;
            }
        }
        .boxed()
    }

    /// Synchronous form of [`DependencyGraph::when_ready`]
    pub fn is_ready(&self, path: &DocPath) -> bool {
        self.state.lock().closure_is_ready(path)
    }

    /// Return a new graph with `paths` forgotten.
    ///
    /// Each named path loses its record, its forward edges and the reverse
    /// edges pointing at it. Dependants that still list a forgotten path see
    /// it as absent (not ready) until it is added again. Cascading to
    /// dependants is the caller's job.
    pub fn invalidate_paths<'a, I>(&self, paths: I) -> DependencyGraph
    where
        I: IntoIterator<Item = &'a DocPath>,
    {
        let mut fork = self.state.lock().fork();

        for path in paths {
            let Some(record) = fork.documents.remove(path) else {
                continue;
            };
            for dependency in &record.dependencies {
                if let Some(dependency_record) = fork.documents.get_mut(dependency) {
                    dependency_record.dependants.remove(path);
                }
            }
        }

        DependencyGraph {
            state: Mutex::new(fork),
        }
    }

    pub fn status(&self, path: &DocPath) -> Option<DocumentStatus> {
        self.state
            .lock()
            .documents
            .get(path)
            .map(|record| record.status.clone())
    }

    /// Failure reason recorded by [`DependencyGraph::reject_document`]
    pub fn rejection(&self, path: &DocPath) -> Option<String> {
        match self.status(path)? {
            DocumentStatus::Rejected(reason) => Some(reason),
            _ => None,
        }
    }

    /// Direct dependencies of `path` as last registered
    pub fn dependencies_of(&self, path: &DocPath) -> HashSet<DocPath> {
        self.state
            .lock()
            .documents
            .get(path)
            .map(|record| record.dependencies.clone())
            .unwrap_or_default()
    }

    /// Number of known nodes, pending ones included
    pub fn len(&self) -> usize {
        self.state.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().documents.is_empty()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DependencyGraph")
            .field("documents", &state.documents.len())
            .field("waiters", &state.waiters.len())
            .finish()
    }
}
