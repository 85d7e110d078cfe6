//! Two related-but-distinct root mechanisms (spec §6, §4.12):
//!
//! - [`RootList`] backs `addRoot`/`removeRoot`: a list of blocks whose
//!   manager is invoked with [`ManageFlags::MARK`] at the start of every
//!   collection, the entry point for composite structures that need
//!   custom traversal.
//! - [`hold`]/[`release`] back `mprHold`/`mprRelease`: they just flip a
//!   block's `eternal` flag directly. Cheaper than a root-list entry
//!   (no list bookkeeping, no manager call needed) and the natural
//!   choice for a single persistent object with no children to trace.
//!
//! A plain `spin::Mutex`-guarded `Vec` is enough for the root list: root
//! registration is orders of magnitude rarer than allocation, so there
//! is no need for the lock-free bitmap trick [`crate::freelist`] uses on
//! its hot path.

use crate::block::Block;
use crate::util::Address;
use spin::Mutex;

pub struct RootList {
    roots: Mutex<Vec<Block>>,
}

impl RootList {
    pub const fn new() -> RootList {
        RootList {
            roots: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, block: Block) {
        self.roots.lock().push(block);
    }

    pub fn remove(&self, block: Block) {
        self.roots.lock().retain(|b| *b != block);
    }

    /// Visit every currently-registered root. Called by the marker
    /// ([`crate::gc::mark`]) at the start of each collection; takes a
    /// snapshot under the lock so the visitor can run without holding it.
    pub fn for_each(&self, mut visit: impl FnMut(Block)) {
        let snapshot: Vec<Block> = self.roots.lock().clone();
        for block in snapshot {
            visit(block);
        }
    }

    pub fn len(&self) -> usize {
        self.roots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RootList {
    fn default() -> RootList {
        RootList::new()
    }
}

/// Pin the block behind `ptr` so the sweeper never reclaims it,
/// regardless of mark state (spec §4.12). Idempotent: holding an
/// already-held block is a no-op, and a single `release` always clears
/// it rather than needing a matching count.
///
/// # Safety
/// `ptr` must be a still-live pointer previously returned by
/// [`crate::alloc::alloc`], [`crate::alloc::realloc`] or
/// [`crate::alloc::memdup`].
pub unsafe fn hold(ptr: Address) {
    Block::from_ptr(ptr).set_eternal(true);
}

/// # Safety
/// See [`hold`].
pub unsafe fn release(ptr: Address) {
    Block::from_ptr(ptr).set_eternal(false);
}

/// # Safety
/// Every pointer in `ptrs` must meet [`hold`]'s safety requirement.
pub unsafe fn hold_blocks(ptrs: &[Address]) {
    for &ptr in ptrs {
        hold(ptr);
    }
}

/// # Safety
/// Every pointer in `ptrs` must meet [`hold`]'s safety requirement.
pub unsafe fn release_blocks(ptrs: &[Address]) {
    for &ptr in ptrs {
        release(ptr);
    }
}
