//! Polyweave Incremental Caching Engine
//!
//! This crate provides the cache-coherence layer for analyzing a graph of
//! interdependent documents. Documents import one another (possibly in
//! cycles) and may be edited at any time; the engine recomputes only what
//! an edit invalidated and lets concurrent requests for the same document
//! share one computation.
//!
//! # Architecture
//!
//! The engine is built from three stateful pieces:
//!
//! - [`WorkTable`]: a single-flight memoization table for async work. At most
//!   one computation runs per key; late callers join the in-flight result.
//! - [`DependencyGraph`]: the import graph, with reverse-reachability queries
//!   and readiness futures that resolve once a document's whole dependency
//!   closure has been registered, cycles included.
//! - [`AnalysisCache`]: one cache *generation*, bundling four work tables,
//!   two settled-result maps and a dependency graph behind
//!   [`AnalysisCache::invalidate`].
//!
//! ## Generations
//!
//! ```text
//! g0 ──invalidate(edited)──▶ g1 ──invalidate(edited)──▶ g2 ...
//! ```
//!
//! A generation is never rewritten by invalidation. `invalidate` forks the
//! tables by reference and forgets exactly the entries the edit made stale:
//! the edited documents lose everything, their transitive dependants lose only
//! their resolved analysis.
//!
//! # Example
//!
//! ```rust,ignore
//! use polyweave_incremental::{AnalysisCache, DocPath};
//!
//! let g0 = AnalysisCache::<MyStages>::new();
//! g0.dependency_graph().add_document(DocPath::new("a.html"), [DocPath::new("b.html")]);
//! g0.dependency_graph().add_document(DocPath::new("b.html"), []);
//!
//! let g1 = g0.invalidate(&[DocPath::new("b.html")]);
//! assert_eq!(g1.generation().0, 1);
//! ```

#![warn(missing_debug_implementations)]

pub mod cache;
pub mod error;
pub mod graph;
pub mod memo;
pub mod metrics;

pub use cache::{AnalysisCache, DocumentMap, Generation, Pipeline};
pub use error::TaskAborted;
pub use graph::{DependencyGraph, DocumentStatus, ReadyFuture};
pub use memo::{WorkHandle, WorkTable};
pub use metrics::{MetricsSnapshot, TableMetrics};
pub use polyweave_types::DocPath;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{AnalysisCache, Generation, Pipeline};
    pub use crate::error::TaskAborted;
    pub use crate::graph::DependencyGraph;
    pub use crate::memo::WorkTable;
    pub use polyweave_types::DocPath;
}
