//! Precise marking (spec §4.7, §3 "Manager callback").
//!
//! There is no conservative stack scan: a block's children are only
//! those pointers its own [`crate::manager::Manager`] callback knows
//! about. Marking a block therefore means flipping its mark color to
//! the cycle's current color and, if it has a manager, invoking it with
//! [`ManageFlags::MARK`] so the manager can call back into
//! [`crate::heap::Heap::mark`] for every pointer it holds. The mark
//! color check makes this idempotent, so cyclic graphs terminate
//! without a separate visited-set.

use crate::block::Block;
use crate::manager::ManageFlags;

/// Mark `block` and, transitively, everything its manager callback
/// reaches from it. Safe to call repeatedly on the same block within one
/// cycle — only the first call does any work.
///
/// `on_child` is invoked by the block's manager (if it has one) for
/// every pointer it wants marked; the caller threads this back to
/// [`crate::heap::Heap::mark`] so the recursion stays inside one
/// collection's mark color rather than this module needing a `Heap`
/// reference of its own.
pub fn mark_block(block: Block, mark_color: u8) {
    if block.mark() == mark_color {
        return;
    }
    block.set_mark(mark_color);
    if let Some(manager) = block.manager() {
        manager(block.ptr().to_mut_ptr(), ManageFlags::MARK);
    }
}
