//! Mutator thread registration (spec §5 "Threads").
//!
//! Every application thread that allocates or touches GC-managed memory
//! registers once and keeps its [`Mutator`] handle for the thread's
//! lifetime. The [`MutatorRegistry`] is how [`crate::gc::yield_point`]
//! knows how many threads it is waiting on, the same way the teacher's
//! `WorkerMonitor` knows `worker_count` up front — except mutators
//! register and unregister dynamically, so the count is tracked instead
//! of fixed at construction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative yield state for one mutator thread. All fields are
/// independent atomics rather than one bitset: each is flipped by a
/// different party (the mutator itself, or the GC scheduler) and none
/// need to change atomically with another.
pub struct MutatorState {
    /// Set by the mutator when it reaches a safepoint and checks in.
    yielded: AtomicBool,
    /// Set by the GC scheduler: once true, this mutator must keep
    /// re-checking in at every safepoint until the cycle completes,
    /// rather than resuming after a single check-in (spec §4.8 "sticky
    /// yield", used while the sweeper still needs the world stopped).
    sticky_yield: AtomicBool,
    /// True while this thread is blocked inside `yield_at_safepoint`.
    waiting: AtomicBool,
    /// Set when this mutator must additionally wait for the parallel
    /// sweeper to finish before resuming (spec §4.9 "complete yield").
    wait_for_sweeper: AtomicBool,
}

impl MutatorState {
    fn new() -> MutatorState {
        MutatorState {
            yielded: AtomicBool::new(false),
            sticky_yield: AtomicBool::new(false),
            waiting: AtomicBool::new(false),
            wait_for_sweeper: AtomicBool::new(false),
        }
    }

    pub fn is_yielded(&self) -> bool {
        self.yielded.load(Ordering::Acquire)
    }
    pub fn set_yielded(&self, v: bool) {
        self.yielded.store(v, Ordering::Release);
    }

    pub fn is_sticky_yield(&self) -> bool {
        self.sticky_yield.load(Ordering::Acquire)
    }
    pub fn set_sticky_yield(&self, v: bool) {
        self.sticky_yield.store(v, Ordering::Release);
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::Acquire)
    }
    pub fn set_waiting(&self, v: bool) {
        self.waiting.store(v, Ordering::Release);
    }

    pub fn wait_for_sweeper(&self) -> bool {
        self.wait_for_sweeper.load(Ordering::Acquire)
    }
    pub fn set_wait_for_sweeper(&self, v: bool) {
        self.wait_for_sweeper.store(v, Ordering::Release);
    }
}

/// A registered mutator thread's handle. Cloning is cheap (an `Arc`
/// bump) and intentional: a host may want to stash a clone in
/// thread-local storage while also holding one to pass around
/// explicitly.
#[derive(Clone)]
pub struct Mutator(Arc<MutatorState>);

impl Mutator {
    pub fn state(&self) -> &MutatorState {
        &self.0
    }
}

impl PartialEq for Mutator {
    fn eq(&self, other: &Mutator) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// The set of currently registered mutators. Owned by
/// [`crate::heap::Heap`].
pub struct MutatorRegistry {
    mutators: spin::Mutex<Vec<Arc<MutatorState>>>,
}

impl MutatorRegistry {
    pub const fn new() -> MutatorRegistry {
        MutatorRegistry {
            mutators: spin::Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self) -> Mutator {
        let state = Arc::new(MutatorState::new());
        self.mutators.lock().push(state.clone());
        Mutator(state)
    }

    pub fn unregister(&self, mutator: &Mutator) {
        self.mutators.lock().retain(|s| !Arc::ptr_eq(s, &mutator.0));
    }

    pub fn count(&self) -> usize {
        self.mutators.lock().len()
    }

    /// True once every registered mutator has checked in at a safepoint.
    pub fn all_yielded(&self) -> bool {
        self.mutators.lock().iter().all(|s| s.is_yielded())
    }

    pub fn clear_all_yielded(&self) {
        for s in self.mutators.lock().iter() {
            s.set_yielded(false);
        }
    }

    pub fn set_all_sticky(&self, sticky: bool) {
        for s in self.mutators.lock().iter() {
            s.set_sticky_yield(sticky);
        }
    }

    pub fn set_all_wait_for_sweeper(&self, wait: bool) {
        for s in self.mutators.lock().iter() {
            s.set_wait_for_sweeper(wait);
        }
    }
}

impl Default for MutatorRegistry {
    fn default() -> MutatorRegistry {
        MutatorRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_yielded_requires_every_mutator() {
        let registry = MutatorRegistry::new();
        let a = registry.register();
        let b = registry.register();
        assert!(!registry.all_yielded());
        a.state().set_yielded(true);
        assert!(!registry.all_yielded());
        b.state().set_yielded(true);
        assert!(registry.all_yielded());
    }

    #[test]
    fn unregister_removes_from_count() {
        let registry = MutatorRegistry::new();
        let a = registry.register();
        let _b = registry.register();
        assert_eq!(registry.count(), 2);
        registry.unregister(&a);
        assert_eq!(registry.count(), 1);
    }
}
