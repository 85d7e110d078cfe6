//! Cooperative mark-and-sweep collector (spec §4.7–§4.9).
//!
//! Split the way the teacher splits its own GC into `scheduler` (when a
//! cycle runs and how mutators are stopped and resumed),
//! `yield_point` (the safepoint protocol mutators cooperate through),
//! `mark` (precise marking via manager callbacks) and `sweep` (parallel
//! reclamation back into the free queues).

pub mod mark;
pub mod scheduler;
pub mod sweep;
pub mod yield_point;
