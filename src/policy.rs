//! Memory limits and the notifier callback that lets a host react to
//! pressure and fatal conditions (spec §7 "Propagation policy").
//!
//! Grounded on the teacher's `util::options::Options` for the "plain
//! atomics behind a small typed wrapper, overridable at runtime" shape,
//! though unlike `Options` these three limits are mutable after startup
//! (spec §6 `set_mem_limits`), so each is its own `AtomicUsize` rather
//! than a value baked in at build time.

use crate::error::{MemAction, MemError};
use std::sync::atomic::{AtomicUsize, Ordering};

/// `0` means "no limit" for every field here, matching spec §6's
/// "a zero value disables that threshold" convention.
pub struct MemLimits {
    max_heap: AtomicUsize,
    warn_heap: AtomicUsize,
    cache_heap: AtomicUsize,
}

impl MemLimits {
    pub fn new(max_heap: usize, warn_heap: usize, cache_heap: usize) -> MemLimits {
        MemLimits {
            max_heap: AtomicUsize::new(max_heap),
            warn_heap: AtomicUsize::new(warn_heap),
            cache_heap: AtomicUsize::new(cache_heap),
        }
    }

    pub fn max_heap(&self) -> usize {
        self.max_heap.load(Ordering::Relaxed)
    }
    pub fn warn_heap(&self) -> usize {
        self.warn_heap.load(Ordering::Relaxed)
    }
    pub fn cache_heap(&self) -> usize {
        self.cache_heap.load(Ordering::Relaxed)
    }

    pub fn set(&self, max_heap: usize, warn_heap: usize, cache_heap: usize) {
        self.max_heap.store(max_heap, Ordering::Relaxed);
        self.warn_heap.store(warn_heap, Ordering::Relaxed);
        self.cache_heap.store(cache_heap, Ordering::Relaxed);
    }

    /// Check `used` bytes against the configured thresholds, returning
    /// the most severe condition that applies (`Limit` outranks
    /// `Warning`). Called after every successful allocation that grows
    /// the heap (spec §7).
    pub fn check(&self, used: usize) -> Option<MemError> {
        let max_heap = self.max_heap();
        if max_heap != 0 && used > max_heap {
            return Some(MemError::Limit { limit: max_heap, used });
        }
        let warn_heap = self.warn_heap();
        if warn_heap != 0 && used > warn_heap {
            return Some(MemError::Warning { limit: warn_heap, used });
        }
        None
    }
}

impl Default for MemLimits {
    fn default() -> MemLimits {
        MemLimits::new(0, 0, 0)
    }
}

/// A host-installed callback, invoked whenever a [`MemError`] condition
/// is detected. `default_action` is what the allocator would do absent
/// any notifier; the notifier may override it by returning a different
/// [`MemAction`] (spec §7: notifiers can escalate or downgrade the
/// default response, except for the always-fatal kinds).
pub type MemNotifier = fn(error: MemError, default_action: MemAction) -> MemAction;

/// The action the allocator takes absent a notifier, or when a notifier
/// is installed but the condition is always-fatal (spec §7).
pub fn default_action(error: &MemError) -> MemAction {
    match error {
        MemError::Fail { .. } | MemError::TooBig { .. } => MemAction::Abort,
        MemError::Limit { .. } => MemAction::PruneCache,
        MemError::Warning { .. } => MemAction::ReturnNull,
        // Non-fatal by definition (spec §7 "SYNC_TIMEOUT is non-fatal:
        // the cycle is aborted; yielded threads are released"): the
        // collector has already abandoned the cycle by the time this
        // fires, so there is no allocation to retry or refuse.
        MemError::SyncTimeout { .. } => MemAction::ReturnNull,
    }
}

/// Resolve the action to take for `error`, consulting `notifier` if one
/// is installed. Always-fatal kinds bypass the notifier entirely.
pub fn resolve_action(error: MemError, notifier: Option<MemNotifier>) -> MemAction {
    let fallback = default_action(&error);
    if error.is_always_fatal() {
        return fallback;
    }
    match notifier {
        Some(f) => f(error, fallback),
        None => fallback,
    }
}
