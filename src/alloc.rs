//! C5: Allocator API (spec §4.5, §4.6).
//!
//! The hot path: Good-Fit search of the size-classed free queues
//! ([`crate::freelist`]), falling back to reserving a new region
//! ([`crate::region::grow`]) when no queue holds anything big enough.
//! Every successful allocation is born already tagged with the heap's
//! current mark color, which is what lets [`crate::gc::scheduler`]
//! resume mutators before sweep finishes (spec §4.9): a block allocated
//! mid-sweep can never be mistaken for unswept garbage.
//!
//! Grounded on the teacher's `util::alloc::allocator` trait family for
//! the overall "search a free structure, else ask the global page
//! allocator for more space" shape, generalized here to this crate's
//! single concrete `Heap` rather than MMTk's per-policy allocator types.

use crate::block::Block;
use crate::error::MemError;
use crate::gc::scheduler;
use crate::heap::Heap;
use crate::manager::{ManageFlags, Manager};
use crate::region;
use crate::util::constants::{MAX_BLOCK, MIN_SPLIT};
use crate::util::{conversions, Address};
use std::mem::size_of;

/// Total on-heap footprint (header, payload rounded up, optional
/// trailing manager slot) for a request of `size` bytes with `manager`.
fn total_block_size(size: usize, manager: Option<Manager>) -> usize {
    let slot = if manager.is_some() { size_of::<usize>() } else { 0 };
    let raw = crate::block::header_size() + size.max(1) + slot;
    conversions::align_up_default(raw)
}

/// Allocate at least `size` bytes, optionally installing `manager` as
/// the block's mark/finalize callback. Returns `None` on any
/// recoverable failure (spec §4.6: allocation failure is never an
/// exception); an unrecoverable condition (request too large, or the OS
/// refusing more memory with no notifier override) aborts the process
/// from inside [`Heap::handle_error`] instead of returning.
pub fn alloc(heap: &Heap, size: usize, manager: Option<Manager>) -> Option<Address> {
    let total = total_block_size(size, manager);
    if total > MAX_BLOCK {
        heap.handle_error(MemError::TooBig { requested: size });
        return None;
    }

    let block = match heap.queues().take_good_fit(total) {
        Some(block) => {
            heap.stats().dequeued(block.size());
            block
        }
        None => grow_and_take(heap, total)?,
    };

    split_if_worthwhile(heap, block, total);
    block.set_free(false);
    block.set_mark(heap.mark_color());
    block.set_manager(manager);

    heap.stats().record_alloc(block.size());
    heap.note_allocation(block.size());

    if let Some(err) = heap.limits().check(heap.stats().bytes_allocated()) {
        heap.handle_error(err);
    }

    if scheduler::should_collect(heap.bytes_since_gc(), heap.gc_threshold()) && !heap.gc_paused() {
        let _ = heap.collect();
    }

    Some(block.ptr())
}

/// Convenience wrapper for the common case of no manager callback.
pub fn alloc_fast(heap: &Heap, size: usize) -> Option<Address> {
    alloc(heap, size, None)
}

fn grow_and_take(heap: &Heap, total: usize) -> Option<Block> {
    let grown = region::grow(heap.regions(), total, heap.mark_color())?;
    heap.stats().record_region_grown(
        grown.required.size() + grown.spare.map(Block::size).unwrap_or(0),
    );
    if let Some(spare) = grown.spare {
        heap.stats().queued(spare.size());
        heap.queues().link_spare_block(spare);
    }
    Some(grown.required)
}

/// If a block taken off a free queue is significantly bigger than the
/// request, split off the remainder as a spare block rather than
/// handing out the slack (spec §4.5).
fn split_if_worthwhile(heap: &Heap, block: Block, needed: usize) {
    debug_assert!(block.size() >= needed, "a Good-Fit block must never be smaller than the request");
    let leftover = match block.size().checked_sub(needed) {
        Some(leftover) if leftover >= MIN_SPLIT => leftover,
        _ => return,
    };
    let spare_addr = block.addr() + needed;
    block.set_size(needed);
    let spare = unsafe { Block::init(spare_addr, leftover, false, false, heap.mark_color()) };
    heap.stats().queued(spare.size());
    heap.queues().link_spare_block(spare);
}

/// Release `block` back to the free queues immediately, outside of a GC
/// cycle (used by [`realloc`] and [`free`], which know their block is
/// unreachable right now rather than waiting for the next collection to
/// discover it).
fn reclaim_immediately(heap: &Heap, block: Block) {
    if let Some(manager) = block.manager() {
        manager(block.ptr().to_mut_ptr(), ManageFlags::FREE);
    }
    heap.stats().record_free(block.size());
    heap.stats().queued(block.size());
    heap.queues().link_block(block);
}

/// Explicitly release a block before the collector would otherwise
/// discover it unreachable. Optional from the collector's point of view
/// (an un-freed, now-garbage block is still reclaimed by the next
/// cycle) but lets a caller that tracks its own lifetimes skip waiting
/// on GC entirely (spec §4.6 "early release").
///
/// # Safety
/// `ptr` must be a still-live pointer previously returned by [`alloc`],
/// [`realloc`] or [`memdup`], not already freed and not rooted.
pub unsafe fn free(heap: &Heap, ptr: Address) {
    let block = Block::from_ptr(ptr);
    reclaim_immediately(heap, block);
}

/// Resize the allocation at `ptr` to at least `new_size` bytes,
/// preserving its contents up to `min(old, new)` bytes. Returns a new
/// pointer (which may equal `ptr` if the existing block already has
/// enough room) or `None` on failure, in which case `ptr` is left
/// untouched and still valid (standard `realloc` semantics).
///
/// # Safety
/// `ptr` must be a still-live pointer previously returned by [`alloc`],
/// [`realloc`] or [`memdup`].
pub unsafe fn realloc(heap: &Heap, ptr: Address, new_size: usize) -> Option<Address> {
    let old_block = Block::from_ptr(ptr);
    if new_size <= old_block.usable_size() {
        return Some(ptr);
    }
    let manager = old_block.manager();
    let new_ptr = alloc(heap, new_size, manager)?;
    std::ptr::copy_nonoverlapping(
        ptr.to_ptr::<u8>(),
        new_ptr.to_mut_ptr::<u8>(),
        old_block.usable_size(),
    );
    // The old block is deliberately left alone rather than reclaimed here
    // (spec §4.6): a mark traversal already in flight may still hold
    // `ptr`, and unlinking the block out from under it would race. It
    // keeps this cycle's mark color and its manager, so the next sweep
    // finds it unreached, finalizes it and requeues it exactly as it
    // would any other garbage block.
    Some(new_ptr)
}

/// Allocate a fresh block and copy `ptr`'s contents into it, carrying
/// its manager callback over unless `manager` overrides it.
///
/// # Safety
/// `ptr` must be a still-live pointer previously returned by [`alloc`],
/// [`realloc`] or [`memdup`].
pub unsafe fn memdup(heap: &Heap, ptr: Address, manager: Option<Manager>) -> Option<Address> {
    let block = Block::from_ptr(ptr);
    let usable = block.usable_size();
    let new_ptr = alloc(heap, usable, manager.or_else(|| block.manager()))?;
    std::ptr::copy_nonoverlapping(ptr.to_ptr::<u8>(), new_ptr.to_mut_ptr::<u8>(), usable);
    Some(new_ptr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HeapBuilder;

    #[test]
    fn alloc_then_free_reuses_the_block() {
        let heap = HeapBuilder::new().build();
        let a = alloc_fast(&heap, 64).expect("alloc should succeed");
        unsafe { free(&heap, a) };
        let b = alloc_fast(&heap, 64).expect("alloc should succeed");
        assert_eq!(a, b, "the freed block should be reused for an equal-sized request");
    }

    #[test]
    fn realloc_grows_and_preserves_contents() {
        let heap = HeapBuilder::new().build();
        let a = alloc_fast(&heap, 16).unwrap();
        unsafe {
            a.to_mut_ptr::<u8>().write_bytes(0xAB, 16);
            let b = realloc(&heap, a, 256).expect("realloc should succeed");
            let slice = std::slice::from_raw_parts(b.to_ptr::<u8>(), 16);
            assert!(slice.iter().all(|&byte| byte == 0xAB));
        }
    }

    #[test]
    fn realloc_within_usable_size_is_a_no_op() {
        let heap = HeapBuilder::new().build();
        let a = alloc_fast(&heap, 200).unwrap();
        let b = unsafe { realloc(&heap, a, 10) }.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn memdup_copies_into_a_new_block() {
        let heap = HeapBuilder::new().build();
        let a = alloc_fast(&heap, 32).unwrap();
        unsafe {
            a.to_mut_ptr::<u8>().write_bytes(0x7A, 32);
            let b = memdup(&heap, a, None).expect("memdup should succeed");
            assert_ne!(a, b);
            let slice = std::slice::from_raw_parts(b.to_ptr::<u8>(), 32);
            assert!(slice.iter().all(|&byte| byte == 0x7A));
        }
    }

    #[test]
    fn oversized_request_is_rejected() {
        let heap = HeapBuilder::new().build();
        assert!(alloc_fast(&heap, MAX_BLOCK + 1).is_none());
    }

    #[test]
    fn allocation_survives_a_collection_with_a_live_manager() {
        static mut MARK_SEEN: bool = false;
        fn manager(_ptr: *mut u8, flags: ManageFlags) {
            if flags.contains(ManageFlags::MARK) {
                unsafe { MARK_SEEN = true };
            }
        }
        let heap = HeapBuilder::new().build();
        let ptr = alloc(&heap, 64, Some(manager)).unwrap();
        let block = unsafe { Block::from_ptr(ptr) };
        heap.roots().add(block);
        heap.collect().expect("collection should succeed with no other mutators");
        assert!(unsafe { MARK_SEEN });
        assert!(!block.is_free(), "a held root must survive its own collection");
    }
}
