//! GC cycle orchestration (spec §4.7 "When a collection runs").
//!
//! Ties [`crate::gc::yield_point`], [`crate::gc::mark`] and
//! [`crate::gc::sweep`] together into one collection: stop every
//! mutator at a safepoint, mark from roots, resume mutators (sweeping
//! does not depend on the world staying stopped — see
//! [`crate::gc::sweep`]'s module docs), then sweep every region in
//! parallel. Grounded on the teacher's `scheduler::controller`, which
//! plays the same "request a goal, wait for workers, run the phase"
//! role for MMTk's own GC plans.

use crate::error::MemError;
use crate::gc::{mark, sweep};
use crate::heap::Heap;

/// Run one full collection cycle against `heap`. Returns
/// `Err(MemError::SyncTimeout)` if not every mutator reached a safepoint
/// in time — the cycle is abandoned in that case (no sweep runs) and the
/// heap's mark color is left as it was, so the next attempt starts
/// clean.
pub fn collect(heap: &Heap) -> Result<(), MemError> {
    let new_color = heap.next_mark_color();

    heap.yield_coordinator()
        .request_and_wait(heap.mutators(), heap.gc_sync_timeout())?;

    // Toggle the heap's mark color atomically with entering the mark
    // phase (spec §4.9), *before* resuming anyone: a mutator released
    // before this commit could read the stale color in `crate::alloc`
    // and tag a fresh block with it, which the sweep below (keyed on
    // `new_color`) would then mistake for this cycle's garbage.
    heap.commit_mark_color(new_color);
    heap.roots().for_each(|block| mark::mark_block(block, new_color));

    // The mark phase has computed the complete live set under a stopped
    // world; sweeping it is safe with mutators running again, and any
    // object a mutator allocates from this point on is born with
    // `new_color` already set (see `crate::alloc`), so it cannot be
    // mistaken for garbage by this cycle's sweep.
    heap.yield_coordinator().resume(heap.mutators());

    sweep::sweep_all(
        heap.regions(),
        heap.queues(),
        heap.stats(),
        new_color,
        heap.limits().cache_heap(),
    );
    heap.stats().record_collection();
    Ok(())
}

/// Whether cumulative allocation since the last cycle has crossed the
/// heap's GC trigger threshold (spec §4.7 "work quota"). A pure
/// function so [`crate::alloc`] can call it on every allocation without
/// needing a `Heap` borrow beyond the two counters involved.
pub fn should_collect(bytes_since_last_gc: usize, threshold: usize) -> bool {
    threshold != 0 && bytes_since_last_gc >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_of_zero_disables_triggering() {
        assert!(!should_collect(usize::MAX, 0));
    }

    #[test]
    fn crossing_threshold_triggers() {
        assert!(!should_collect(100, 1000));
        assert!(should_collect(1000, 1000));
        assert!(should_collect(1500, 1000));
    }
}
