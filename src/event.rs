//! Outside-event hook (spec §6 `createEventOutside`).
//!
//! Lets a thread the heap never registered as a mutator — a signal
//! handler, a callback from a foreign library, anything that cannot
//! call [`crate::heap::Heap::register_mutator`] — safely run a short
//! callback against the heap: GC is paused for the callback's duration,
//! so no collection can start underneath it, and resumed again
//! afterwards even if the callback panics. Grounded on the teacher's
//! `scheduler::controller::GCController::run` pause/dispatch/resume
//! shape, collapsed here into one synchronous call: this crate has no
//! event-loop or dispatcher of its own (out of scope per spec §1), so
//! "schedules it on the dispatcher" is realized as a direct call to
//! `proc` rather than a queued handoff.
//!
//! The at-most-one-simultaneous-invocation-per-foreign-thread guarantee
//! (spec §6) is enforced with a thread-local re-entrancy guard: a nested
//! call from the same thread (e.g. `proc` itself calling back in) is a
//! programming error and panics rather than silently double-pausing GC.

use crate::heap::Heap;
use std::cell::Cell;

thread_local! {
    static IN_EVENT: Cell<bool> = const { Cell::new(false) };
}

/// Flags for [`create_event_outside`]. Spec §6 names a `BLOCK` flag for
/// the common case of waiting for `proc` to finish before returning;
/// this crate has no async dispatcher to return early from, so `BLOCK`
/// is the only supported mode and `NONE` behaves identically.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct EventFlags(u32);

impl EventFlags {
    pub const NONE: EventFlags = EventFlags(0);
    pub const BLOCK: EventFlags = EventFlags(1 << 0);
}

/// Run `proc(data)` with GC paused, safe to call from a thread the heap
/// has no other knowledge of.
///
/// # Panics
/// If called re-entrantly from within another `create_event_outside`
/// call on the same thread.
pub fn create_event_outside(heap: &Heap, name: &str, proc: fn(*mut u8), data: *mut u8, _flags: EventFlags) {
    IN_EVENT.with(|in_event| {
        assert!(
            !in_event.get(),
            "create_event_outside called re-entrantly on the same thread (event {name:?})"
        );
        in_event.set(true);
    });
    log::trace!("outside event {name:?} dispatched");
    heap.pause_gc();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| proc(data)));
    heap.resume_gc();
    IN_EVENT.with(|in_event| in_event.set(false));
    if let Err(payload) = result {
        std::panic::resume_unwind(payload);
    }
}
