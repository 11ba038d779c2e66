//! Errors raised by the cache layer itself
//!
//! Computation failures belong to the stage that produced them and are stored
//! as that key's outcome. The only failure the cache layer originates is a
//! computation whose task never reported back.

use thiserror::Error;

/// A spawned computation ended without producing an outcome.
///
/// This happens when the computation panics or when the runtime shuts down
/// while it is still in flight. Stage error types convert from this through
/// `From<TaskAborted>` so every waiter still receives a stage error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("computation for {key} in table `{table}` ended without an outcome")]
pub struct TaskAborted {
    /// Table the computation was registered in
    pub table: &'static str,

    /// Debug rendering of the key
    pub key: String,
}

impl TaskAborted {
    pub fn new(table: &'static str, key: impl Into<String>) -> Self {
        TaskAborted {
            table,
            key: key.into(),
        }
    }
}
