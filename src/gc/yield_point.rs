//! The cooperative safepoint protocol (spec §4.8).
//!
//! Grounded directly on the teacher's `scheduler::worker_monitor`: there,
//! GC workers park on a `Condvar` guarded by a `Mutex`, and the last
//! parked worker takes action. Here the roles are inverted — mutators
//! are the ones that park at a safepoint, and the *scheduler* thread is
//! the one waiting for the last of them to check in — but the same
//! "mutex-guarded counter plus condvar" shape applies, generalized with
//! a timeout for the scheduler's wait (spec §4.8: `MPR_GC_SYNC_TIMEOUT_MS`,
//! surfaced as [`crate::error::MemError::SyncTimeout`] if it is not met).

use crate::error::MemError;
use crate::mutator::{Mutator, MutatorRegistry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Owned by [`crate::heap::Heap`]; coordinates mutators checking in at
/// safepoints with the scheduler thread waiting for all of them to do
/// so.
pub struct YieldCoordinator {
    /// Set by the scheduler to request every mutator pause at its next
    /// safepoint. Checked by mutators on the hot path, so it is a bare
    /// atomic rather than anything behind the mutex below.
    requested: AtomicBool,
    /// Guards nothing but the two condvars below; mutators and the
    /// scheduler each hold it only for the instant they check a
    /// condition or get woken.
    gate: Mutex<()>,
    /// Mutators wait here between checking in and being resumed.
    resumed: Condvar,
    /// The scheduler waits here for the last mutator to check in.
    all_parked: Condvar,
    /// Whether GC is administratively paused. While set,
    /// [`YieldCoordinator::need_yield`] never reports true. The nesting
    /// count for [`crate::heap::Heap::pause_gc`]/`resume_gc` lives in
    /// `Heap` itself; this is just the resulting on/off state (spec §6
    /// `pauseGC`/`resumeGC`).
    pause_depth: AtomicBool,
}

impl YieldCoordinator {
    pub const fn new() -> YieldCoordinator {
        YieldCoordinator {
            requested: AtomicBool::new(false),
            gate: Mutex::new(()),
            resumed: Condvar::new(),
            all_parked: Condvar::new(),
            pause_depth: AtomicBool::new(false),
        }
    }

    /// Fast-path check a mutator makes at every safepoint: has a cycle
    /// been requested? (spec §6 `needYield`).
    pub fn need_yield(&self) -> bool {
        self.requested.load(Ordering::Acquire) && !self.pause_depth.load(Ordering::Acquire)
    }

    pub fn gc_paused(&self) -> bool {
        self.pause_depth.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.pause_depth.store(paused, Ordering::Release);
    }

    /// A mutator reaching a safepoint calls this. If no cycle has been
    /// requested it returns immediately; otherwise it checks in, wakes
    /// the scheduler if it was the last one needed, and blocks until
    /// resumed. Under "sticky yield" (spec §4.8) it re-checks the
    /// request after waking and parks again if the scheduler still
    /// needs the world stopped (e.g. the parallel sweeper in
    /// [`crate::gc::sweep`] has not finished yet).
    pub fn yield_at_safepoint(&self, registry: &MutatorRegistry, mutator: &Mutator) {
        if !self.need_yield() {
            return;
        }
        let mut guard = self.gate.lock().unwrap();
        let state = mutator.state();
        state.set_waiting(true);
        state.set_yielded(true);
        if registry.all_yielded() {
            self.all_parked.notify_all();
        }
        loop {
            guard = self.resumed.wait(guard).unwrap();
            let should_keep_waiting =
                self.requested.load(Ordering::Acquire) && state.is_sticky_yield();
            if !should_keep_waiting {
                break;
            }
        }
        state.set_waiting(false);
        state.set_yielded(false);
        drop(guard);
    }

    /// Scheduler side: request every mutator stop at its next safepoint,
    /// and wait up to `timeout` for all currently registered mutators to
    /// check in. Returns `Err(MemError::SyncTimeout)` if the deadline
    /// passes first, in which case the caller must call [`Self::resume`]
    /// to release whichever mutators did check in before abandoning the
    /// cycle (spec §7: sync timeouts never leave mutators parked
    /// forever).
    pub fn request_and_wait(
        &self,
        registry: &MutatorRegistry,
        timeout: Duration,
    ) -> Result<(), MemError> {
        self.requested.store(true, Ordering::Release);
        let guard = self.gate.lock().unwrap();
        if registry.count() == 0 || registry.all_yielded() {
            return Ok(());
        }
        let (_guard, result) = self
            .all_parked
            .wait_timeout_while(guard, timeout, |_| !registry.all_yielded())
            .unwrap();
        if result.timed_out() {
            return Err(MemError::SyncTimeout {
                waited_ms: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    /// Release every mutator currently parked at a safepoint. Clears
    /// sticky yield first so parked mutators actually wake for good.
    pub fn resume(&self, registry: &MutatorRegistry) {
        registry.set_all_sticky(false);
        self.requested.store(false, Ordering::Release);
        let _guard = self.gate.lock().unwrap();
        self.resumed.notify_all();
    }
}

impl Default for YieldCoordinator {
    fn default() -> YieldCoordinator {
        YieldCoordinator::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn mutator_not_yielding_returns_immediately() {
        let registry = MutatorRegistry::new();
        let coordinator = YieldCoordinator::new();
        let mutator = registry.register();
        coordinator.yield_at_safepoint(&registry, &mutator);
        assert!(!mutator.state().is_yielded());
    }

    #[test]
    fn scheduler_waits_for_all_mutators_then_resumes() {
        let registry = Arc::new(MutatorRegistry::new());
        let coordinator = Arc::new(YieldCoordinator::new());
        let m1 = registry.register();
        let m2 = registry.register();
        let stop = Arc::new(AtomicBool::new(false));

        // Each mutator thread loops polling the safepoint, exactly as a
        // real embedding would interleave `yield_at_safepoint` calls
        // with its own work.
        let spawn_mutator = |mutator: Mutator| {
            let registry = registry.clone();
            let coordinator = coordinator.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    coordinator.yield_at_safepoint(&registry, &mutator);
                    thread::sleep(Duration::from_millis(1));
                }
            })
        };
        let t1 = spawn_mutator(m1);
        let t2 = spawn_mutator(m2);

        let result = coordinator.request_and_wait(&registry, Duration::from_secs(5));
        assert!(result.is_ok());
        coordinator.resume(&registry);

        stop.store(true, Ordering::Relaxed);
        t1.join().unwrap();
        t2.join().unwrap();
    }

    #[test]
    fn sync_timeout_reports_when_a_mutator_never_checks_in() {
        let registry = MutatorRegistry::new();
        let coordinator = YieldCoordinator::new();
        let _stuck = registry.register();
        let result = coordinator.request_and_wait(&registry, Duration::from_millis(30));
        assert!(matches!(result, Err(MemError::SyncTimeout { .. })));
    }
}
