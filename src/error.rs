//! Typed error kinds for the allocator/GC core (spec §7). These are never
//! threaded back through `alloc`/`realloc` as a `Result` — those keep
//! returning `None` on failure exactly as the spec's "errors never
//! propagate as exceptions" rule demands. `MemError` is instead the value
//! passed to the installed [`crate::policy::MemNotifier`] and is returned
//! by administrative entry points where a `Result` is the natural shape
//! (e.g. [`crate::heap::Heap::set_mem_limits`]).

use thiserror::Error;

/// The policy action a [`MemError`] should drive, independent of which
/// kind of error occurred (spec §7 "Propagation policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAction {
    /// Return null to the caller; nothing else happens.
    ReturnNull,
    /// Ask the host to prune caches, then retry or return null.
    PruneCache,
    /// Request a graceful restart of the process.
    Restart,
    /// Request a normal, timed exit.
    Exit,
    /// Abort immediately; the condition is unrecoverable.
    Abort,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    /// The underlying VM reservation failed (OS refused the mapping).
    #[error("virtual memory allocation failed for {requested} bytes")]
    Fail { requested: usize },

    /// The request exceeds `MAX_BLOCK` or the region size ceiling.
    #[error("requested size {requested} exceeds the maximum single allocation size")]
    TooBig { requested: usize },

    /// Satisfying the request would push the heap past `maxHeap`.
    #[error("heap would exceed the {limit}-byte hard limit (currently {used} bytes used)")]
    Limit { limit: usize, used: usize },

    /// Satisfying the request would push the heap past `warnHeap` (soft).
    #[error("heap exceeds the {limit}-byte soft limit (currently {used} bytes used)")]
    Warning { limit: usize, used: usize },

    /// Not all mutators reached a safepoint before the sync timeout; the
    /// GC cycle was abandoned.
    #[error("GC sync timeout after {waited_ms}ms; cycle aborted")]
    SyncTimeout { waited_ms: u64 },
}

impl MemError {
    /// Requested byte count relevant to this error, for notifier/logging.
    pub fn requested(&self) -> usize {
        match *self {
            MemError::Fail { requested } => requested,
            MemError::TooBig { requested } => requested,
            MemError::Limit { used, .. } => used,
            MemError::Warning { used, .. } => used,
            MemError::SyncTimeout { .. } => 0,
        }
    }

    /// Whether this condition is fatal on its own, independent of any
    /// installed [`crate::policy::MemNotifier`] (spec §7: `TOO_BIG`/`FAIL`
    /// are always an immediate abort).
    pub fn is_always_fatal(&self) -> bool {
        matches!(self, MemError::Fail { .. } | MemError::TooBig { .. })
    }
}
