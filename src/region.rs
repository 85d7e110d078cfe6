//! C2: Region Manager.
//!
//! A region is one coarse `vmalloc` reservation, carved into blocks. The
//! first block in every region carries `FLAG_FIRST`/`FLAG_FULL_REGION`
//! metadata (see [`crate::block`]) so a block can find its owning region
//! without a back-pointer of its own: regions are rare (megabytes) and
//! blocks are common (as small as 64 bytes), so the extra pointer would
//! cost more header space than it saves in lookups.
//!
//! Grounded on the teacher's `util::heap::layout::map` region-table, which
//! prepends newly mapped chunks onto a lock-free singly linked list the
//! same way.

use crate::block::{self, Block};
use crate::util::constants::{ALIGN, DEFAULT_REGION_SIZE, MIN_SPLIT};
use crate::util::{conversions, Address};
use crate::vm_backend::{self, VmMode};
use std::mem::size_of;
use std::sync::atomic::{AtomicUsize, Ordering};

#[repr(C)]
struct RegionHeader {
    /// Total bytes reserved for this region, including this header.
    size: usize,
    /// Next region in the heap's region list, encoded as an address (0 =
    /// none). Written once at region creation and never mutated after,
    /// so no atomic is needed beyond the list head itself.
    next: usize,
}

pub(crate) fn header_size() -> usize {
    conversions::align_up(size_of::<RegionHeader>(), ALIGN)
}

/// A handle to one region. Cheap to copy.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Region(Address);

impl Region {
    fn header(self) -> &'static RegionHeader {
        unsafe { &*self.0.to_ptr::<RegionHeader>() }
    }

    pub fn addr(self) -> Address {
        self.0
    }

    pub fn size(self) -> usize {
        self.header().size
    }

    /// The region's first block (address-order head). A region is
    /// carved into blocks once at `grow` time and never re-split at its
    /// start, so this is always valid for the region's whole lifetime.
    pub fn first_block(self) -> Block {
        unsafe { Block::from_addr(self.0 + header_size()) }
    }

    /// One past the last byte belonging to this region; the bound a
    /// block-walking sweep stops at.
    pub fn end(self) -> Address {
        self.0 + self.size()
    }

    /// The region owning `block`, found by walking `FLAG_FIRST` blocks
    /// backwards would require a scan; instead every first block's
    /// address minus `header_size()` directly yields its region, since a
    /// region never holds more than one first block.
    ///
    /// # Safety
    /// `block` must have `is_first()` set.
    pub unsafe fn of_first_block(block: Block) -> Region {
        debug_assert!(block.is_first());
        Region(block.addr() - header_size())
    }
}

/// Lock-free, insert-only-by-default list of every region the heap has
/// reserved. Prepend is a pure CAS loop (spec §4.2 "atomic: lock-free
/// list prepend using CAS"); removal (spec §4.11 "regions with
/// freeable=1 are unlinked... using CAS on the head, or a linear relink
/// otherwise") is rare enough — one call per region reclaimed by a
/// sweep, not per allocation — that it takes a short-lived spinlock
/// instead of a second lock-free scheme, the same trade the teacher
/// makes for its own rarely-mutated region/chunk tables.
pub struct RegionList {
    head: AtomicUsize,
    remove_lock: spin::Mutex<()>,
}

impl RegionList {
    pub const fn new() -> RegionList {
        RegionList {
            head: AtomicUsize::new(0),
            remove_lock: spin::Mutex::new(()),
        }
    }

    fn prepend(&self, region: Region) {
        let header = region.0.to_mut_ptr::<RegionHeader>();
        let mut cur = self.head.load(Ordering::Acquire);
        loop {
            // Safety: `next` is private to this module and only ever
            // written here, before the region is published via the CAS
            // below.
            unsafe {
                (*header).next = cur;
            }
            match self.head.compare_exchange_weak(
                cur,
                region.0.as_usize(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => cur = observed,
            }
        }
    }

    /// Unlink `region` from the list. Serialized against other removals
    /// (and against `prepend`'s CAS) by `remove_lock`, since splicing out
    /// an interior node needs the *previous* node's `next` to still be
    /// valid while we rewrite it — a plain CAS on the head alone can't
    /// express that for a non-head removal.
    fn unlink(&self, region: Region) {
        let _guard = self.remove_lock.lock();
        let target = region.0.as_usize();
        let next = region.header().next;
        // Retry the head CAS rather than a plain store: a concurrent
        // `prepend` may have raced us between the load and here, and a
        // blind store would silently drop its new head node.
        let mut cur = self.head.load(Ordering::Acquire);
        while cur == target {
            match self.head.compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return,
                Err(observed) => cur = observed,
            }
        }
        while cur != 0 {
            let node = Region(unsafe { Address::from_usize(cur) });
            let node_next = node.header().next;
            if node_next == target {
                unsafe {
                    (*node.0.to_mut_ptr::<RegionHeader>()).next = next;
                }
                return;
            }
            cur = node_next;
        }
    }

    /// Unlink `region` and hand its VM reservation back to the OS (spec
    /// §4.11 "released as a whole", §9 "VM reservations released on
    /// either sweep or destroy"). After this call `region` is dangling;
    /// the caller must not touch it or anything inside it again.
    pub fn release(&self, region: Region) {
        self.unlink(region);
        vm_backend::vmfree(region.addr(), region.size());
    }

    /// Iterate every region currently in the heap, oldest-insertion-last.
    pub fn iter(&self) -> RegionIter {
        RegionIter {
            cur: self.head.load(Ordering::Acquire),
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.iter().map(Region::size).sum()
    }

    /// Release every remaining region's VM back to the OS (spec §6
    /// `destroyMemService`). Called once, at heap teardown.
    pub fn release_all(&self) {
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head == 0 {
                return;
            }
            let region = Region(unsafe { Address::from_usize(head) });
            self.release(region);
        }
    }
}

pub struct RegionIter {
    cur: usize,
}

impl Iterator for RegionIter {
    type Item = Region;
    fn next(&mut self) -> Option<Region> {
        if self.cur == 0 {
            return None;
        }
        let region = Region(unsafe { Address::from_usize(self.cur) });
        self.cur = region.header().next;
        Some(region)
    }
}

/// Result of growing the heap by one region: the block sized to satisfy
/// the triggering request, and (if the leftover space clears
/// [`MIN_SPLIT`]) a second, spare block ready to be linked into a free
/// queue by the caller.
pub struct Grown {
    pub required: Block,
    pub spare: Option<Block>,
}

/// Reserve a new region large enough to carve out a block of at least
/// `required_size` bytes (header included), map it, and split it into
/// the satisfying block plus a spare if room remains. `mark` is the
/// heap's current mark color, so the fresh block is born already "live".
///
/// Returns `None` if the OS refuses the underlying `vmalloc` (spec §7
/// `MEM_FAIL`).
pub fn grow(region_list: &RegionList, required_size: usize, mark: u8) -> Option<Grown> {
    debug_assert!(conversions::is_aligned(required_size, ALIGN));
    let wanted = header_size() + required_size;
    let region_size = conversions::page_align_up(wanted.max(DEFAULT_REGION_SIZE), vm_backend::page_size());
    let base = vm_backend::vmalloc(region_size, VmMode::ReadWrite)?;

    unsafe {
        (base.to_mut_ptr::<RegionHeader>()).write(RegionHeader {
            size: region_size,
            next: 0,
        });
    }
    let region = Region(base);
    region_list.prepend(region);

    let block_space = region_size - header_size();
    let spare_size = block_space - required_size;

    if spare_size >= MIN_SPLIT {
        let required = unsafe { Block::init(base + header_size(), required_size, true, false, mark) };
        let spare = unsafe {
            Block::init(
                required.next_in_region(),
                spare_size,
                false,
                false,
                mark,
            )
        };
        Some(Grown {
            required,
            spare: Some(spare),
        })
    } else {
        let required = unsafe { Block::init(base + header_size(), block_space, true, true, mark) };
        Some(Grown {
            required,
            spare: None,
        })
    }
}
