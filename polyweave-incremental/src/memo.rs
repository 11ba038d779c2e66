//! Single-flight memoization for asynchronous work
//!
//! A [`WorkTable`] maps a key to the one computation that produces its
//! outcome. The first request for a key starts the computation; every later
//! request joins it. Outcomes, failures included, are stored and never
//! retried automatically.

use crate::error::TaskAborted;
use crate::metrics::TableMetrics;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Shared handle to a pending or completed outcome.
///
/// Cloning the handle is cheap; every clone resolves to the same outcome.
pub type WorkHandle<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

/// Memoization table for one pipeline stage
///
/// Entries are created atomically (check-and-set through the map's entry
/// API), so concurrent requests for a key never start two computations.
/// Computations are spawned onto the tokio runtime and always run to
/// completion, even if every caller stops waiting; starting one outside a
/// runtime panics.
pub struct WorkTable<K, V, E>
where
    K: Eq + Hash,
{
    /// Table name, used in logs, metrics and [`TaskAborted`]
    name: &'static str,

    /// Map from key to its (possibly still pending) outcome
    entries: DashMap<K, WorkHandle<V, E>>,

    /// Counters shared with every table forked from this one
    metrics: Arc<TableMetrics>,
}

impl<K, V, E> WorkTable<K, V, E>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<TaskAborted> + 'static,
{
    /// Create an empty table
    pub fn new(name: &'static str) -> Self {
        WorkTable {
            name,
            entries: DashMap::new(),
            metrics: Arc::new(TableMetrics::new(name)),
        }
    }

    /// Copy-construct a table for a new generation.
    ///
    /// Every entry, pending or completed, is shared by reference with the
    /// parent. Later inserts and removals on either table are not visible
    /// to the other.
    pub fn fork(&self) -> Self {
        let entries: DashMap<K, WorkHandle<V, E>> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        WorkTable {
            name: self.name,
            entries,
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Return the entry for `key`, starting `compute` if there is none.
    ///
    /// The computation is started before this returns; the handle only needs
    /// to be awaited by callers interested in the outcome, and dropping it
    /// does not cancel anything. `compute` is called at most once per key per
    /// table, and never while the table is locked, so it may itself use this
    /// table.
    pub fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> WorkHandle<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel::<Result<V, E>>();

        let handle = match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => {
                self.metrics.record_hit();
                trace!(table = self.name, key = ?key, "joining existing entry");
                return entry.get().clone();
            }
            Entry::Vacant(entry) => {
                let aborted = TaskAborted::new(self.name, format!("{key:?}"));
                let handle = async move {
                    match receiver.await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(E::from(aborted)),
                    }
                }
                .boxed()
                .shared();
                entry.insert(handle.clone());
                handle
            }
        };

        self.metrics.record_miss();
        debug!(table = self.name, key = ?key, "starting computation");

        let work = compute();
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = work.await;
            metrics.record_execution(started.elapsed(), outcome.is_ok());
            // The receiver is gone only if the entry was deleted and nobody waits.
            let _ = sender.send(outcome);
        });

        handle
    }

    /// Get the handle for `key` without starting anything
    pub fn get(&self, key: &K) -> Option<WorkHandle<V, E>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Get the outcome for `key` if its computation has completed
    pub fn peek(&self, key: &K) -> Option<Result<V, E>> {
        let handle = self.get(key)?;
        handle.now_or_never()
    }

    /// Seed `key` with a known value without computing it
    pub fn set(&self, key: K, value: V) {
        self.set_outcome(key, Ok(value));
    }

    /// Seed `key` with a known outcome, replacing any existing entry
    pub fn set_outcome(&self, key: K, outcome: Result<V, E>) {
        self.metrics.record_seed();
        self.entries
            .insert(key, futures::future::ready(outcome).boxed().shared());
    }

    /// Remove the entry for `key`.
    ///
    /// Callers already holding the entry's handle still receive its outcome.
    pub fn delete(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Get all keys currently present, pending or completed
    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn metrics(&self) -> &TableMetrics {
        &self.metrics
    }
}

impl<K, V, E> fmt::Debug for WorkTable<K, V, E>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkTable")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .finish()
    }
}
