//! C3: Block Header & Layout.
//!
//! Every allocation is backed by a header-prefixed region of memory laid
//! out as `[BlockHeader][payload...][manager slot?]`. Pointer arithmetic
//! on this layout is confined to this module and [`crate::region`], per
//! the "narrowly-scoped unsafe module" design note: everything outside
//! these two files talks in terms of [`Block`] handles and byte counts,
//! never raw addresses.

use crate::manager::Manager;
use crate::util::constants::ALIGN;
use crate::util::{conversions, Address};
use std::mem::size_of;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};

const FLAG_FIRST: u8 = 1 << 0;
const FLAG_FULL_REGION: u8 = 1 << 1;
const FLAG_FREE: u8 = 1 << 2;
const FLAG_HAS_MANAGER: u8 = 1 << 3;
const FLAG_ETERNAL: u8 = 1 << 4;

/// Per-block metadata. Kept deliberately small: everything here is either
/// a single atomic flags/mark byte, or a field read-modify-written only
/// while the owning free queue's lock is held (free-list links, qindex).
#[repr(C)]
pub struct BlockHeader {
    /// Total size in bytes, including this header and any manager slot.
    size: AtomicUsize,
    flags: AtomicU8,
    /// Mark color, compared against the heap's current mark color.
    mark: AtomicU8,
    /// Size-class index while free; 0 while live.
    qindex: AtomicU32,
    /// Free-list links. Only meaningful while `FLAG_FREE` is set, and
    /// only ever touched by a thread holding the owning queue's lock.
    free_prev: AtomicUsize,
    free_next: AtomicUsize,
    #[cfg(feature = "debug_mem")]
    magic: u32,
    #[cfg(feature = "debug_mem")]
    pub(crate) seqno: u64,
}

/// Size of [`BlockHeader`] rounded up to [`ALIGN`]; the payload for every
/// block starts exactly this many bytes after the block's address.
pub fn header_size() -> usize {
    conversions::align_up(size_of::<BlockHeader>(), ALIGN)
}

/// A handle to a live or free block. Cheap to copy; all mutation goes
/// through atomics on the underlying [`BlockHeader`], so `Block` is
/// `Send + Sync` even though it wraps a raw pointer.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct Block(NonNull<BlockHeader>);

unsafe impl Send for Block {}
unsafe impl Sync for Block {}

impl Block {
    /// # Safety
    /// `addr` must point at a live, initialized `BlockHeader`.
    pub unsafe fn from_addr(addr: Address) -> Block {
        Block(NonNull::new_unchecked(addr.to_mut_ptr()))
    }

    pub fn addr(self) -> Address {
        Address::from_mut_ptr(self.0.as_ptr())
    }

    fn header(self) -> &'static BlockHeader {
        unsafe { self.0.as_ref() }
    }

    /// GET_MEM(ptr): the block header that precedes a user pointer.
    ///
    /// # Safety
    /// `ptr` must have been returned by this allocator (directly, or via
    /// [`Block::ptr`]) and still be within its block's lifetime.
    pub unsafe fn from_ptr(ptr: Address) -> Block {
        Block::from_addr(ptr - header_size())
    }

    /// GET_PTR(block): the address handed to the user.
    pub fn ptr(self) -> Address {
        self.addr() + header_size()
    }

    /// GET_NEXT(block): the next block in address order within the same
    /// region. Only meaningful while the block has not yet been
    /// coalesced away; the caller is responsible for staying within the
    /// owning region's bounds.
    pub fn next_in_region(self) -> Address {
        self.addr() + self.size()
    }

    pub fn size(self) -> usize {
        self.header().size.load(Ordering::Acquire)
    }

    /// Shrink this block to `new_size` after splitting a spare block off
    /// its tail. Must only be called by the thread that currently owns
    /// this block exclusively (just unlinked from a free queue, or
    /// freshly carved from a region).
    pub(crate) fn set_size(self, new_size: usize) {
        self.header().size.store(new_size, Ordering::Release);
    }

    /// GET_USIZE(block): bytes available to the user.
    pub fn usable_size(self) -> usize {
        self.size() - header_size() - if self.has_manager() { size_of::<usize>() } else { 0 }
    }

    fn flags(self) -> u8 {
        self.header().flags.load(Ordering::Acquire)
    }

    fn set_flag(self, bit: u8, value: bool) {
        let h = self.header();
        if value {
            h.flags.fetch_or(bit, Ordering::AcqRel);
        } else {
            h.flags.fetch_and(!bit, Ordering::AcqRel);
        }
    }

    pub fn is_first(self) -> bool {
        self.flags() & FLAG_FIRST != 0
    }
    pub(crate) fn set_first(self, v: bool) {
        self.set_flag(FLAG_FIRST, v)
    }

    pub fn is_full_region(self) -> bool {
        self.flags() & FLAG_FULL_REGION != 0
    }
    pub(crate) fn set_full_region(self, v: bool) {
        self.set_flag(FLAG_FULL_REGION, v)
    }

    pub fn is_free(self) -> bool {
        self.flags() & FLAG_FREE != 0
    }
    pub(crate) fn set_free(self, v: bool) {
        self.set_flag(FLAG_FREE, v)
    }

    pub fn has_manager(self) -> bool {
        self.flags() & FLAG_HAS_MANAGER != 0
    }
    pub(crate) fn set_has_manager(self, v: bool) {
        self.set_flag(FLAG_HAS_MANAGER, v)
    }

    pub fn is_eternal(self) -> bool {
        self.flags() & FLAG_ETERNAL != 0
    }
    pub fn set_eternal(self, v: bool) {
        self.set_flag(FLAG_ETERNAL, v)
    }

    pub fn mark(self) -> u8 {
        self.header().mark.load(Ordering::Acquire)
    }
    pub fn set_mark(self, color: u8) {
        self.header().mark.store(color, Ordering::Release);
    }
    pub fn is_live(self, heap_mark: u8) -> bool {
        self.is_eternal() || self.mark() == heap_mark
    }

    pub fn qindex(self) -> usize {
        self.header().qindex.load(Ordering::Acquire) as usize
    }
    pub(crate) fn set_qindex(self, q: usize) {
        self.header().qindex.store(q as u32, Ordering::Release);
    }

    pub(crate) fn free_prev(self) -> Option<Block> {
        Self::decode_link(self.header().free_prev.load(Ordering::Acquire))
    }
    pub(crate) fn free_next(self) -> Option<Block> {
        Self::decode_link(self.header().free_next.load(Ordering::Acquire))
    }
    pub(crate) fn set_free_prev(self, b: Option<Block>) {
        self.header()
            .free_prev
            .store(Self::encode_link(b), Ordering::Release);
    }
    pub(crate) fn set_free_next(self, b: Option<Block>) {
        self.header()
            .free_next
            .store(Self::encode_link(b), Ordering::Release);
    }

    fn encode_link(b: Option<Block>) -> usize {
        b.map(|b| b.addr().as_usize()).unwrap_or(0)
    }
    fn decode_link(raw: usize) -> Option<Block> {
        if raw == 0 {
            None
        } else {
            Some(unsafe { Block::from_addr(Address::from_usize(raw)) })
        }
    }

    /// Address of the trailing manager-pointer slot. Only valid when
    /// `has_manager()` is true.
    fn manager_slot(self) -> Address {
        self.addr() + self.size() - size_of::<usize>()
    }

    pub fn manager(self) -> Option<Manager> {
        if !self.has_manager() {
            return None;
        }
        let raw = unsafe { self.manager_slot().atomic_load_usize(Ordering::Acquire) };
        if raw == 0 {
            None
        } else {
            // Safety: only ever written by `set_manager` with a value
            // produced from a real `Manager` function pointer.
            Some(unsafe { std::mem::transmute::<usize, Manager>(raw) })
        }
    }

    pub fn set_manager(self, manager: Option<Manager>) {
        match manager {
            Some(m) => {
                self.set_has_manager(true);
                let raw = m as usize;
                unsafe {
                    self.manager_slot().atomic_store_usize(raw, Ordering::Release);
                }
            }
            None => {
                if self.has_manager() {
                    unsafe {
                        self.manager_slot().atomic_store_usize(0, Ordering::Release);
                    }
                }
                self.set_has_manager(false);
            }
        }
    }

    /// Initialize a freshly carved block's header in place. `size` is the
    /// block's total size in bytes, including header and any manager
    /// slot; it is the caller's job to have already reserved space for
    /// one if `with_manager_slot` is set.
    ///
    /// # Safety
    /// `addr` must designate `size` bytes of writable memory not
    /// currently aliased by any other `Block`.
    pub unsafe fn init(addr: Address, size: usize, first: bool, full_region: bool, mark: u8) -> Block {
        debug_assert!(conversions::is_aligned(size, ALIGN));
        debug_assert!(size >= header_size());
        let header = addr.to_mut_ptr::<BlockHeader>();
        header.write(BlockHeader {
            size: AtomicUsize::new(size),
            flags: AtomicU8::new(if first { FLAG_FIRST } else { 0 } | if full_region { FLAG_FULL_REGION } else { 0 }),
            mark: AtomicU8::new(mark),
            qindex: AtomicU32::new(0),
            free_prev: AtomicUsize::new(0),
            free_next: AtomicUsize::new(0),
            #[cfg(feature = "debug_mem")]
            magic: crate::util::constants::BLOCK_MAGIC,
            #[cfg(feature = "debug_mem")]
            seqno: 0,
        });
        Block(NonNull::new_unchecked(header))
    }

    #[cfg(feature = "debug_mem")]
    pub fn verify_magic(self) {
        assert_eq!(
            self.header().magic,
            crate::util::constants::BLOCK_MAGIC,
            "corrupt block header at {:?}",
            self.addr()
        );
    }
    #[cfg(not(feature = "debug_mem"))]
    pub fn verify_magic(self) {}

    /// Fill freed payload with the debug scribble pattern
    /// (`MPR_SCRIBBLE_MEM`). No-op unless the `debug_mem` feature is on.
    #[cfg(feature = "debug_mem")]
    pub fn scribble(self) {
        let len = self.size() - header_size();
        unsafe {
            std::ptr::write_bytes(
                self.ptr().to_mut_ptr::<u8>(),
                crate::util::constants::SCRIBBLE_BYTE,
                len,
            );
        }
    }
    #[cfg(not(feature = "debug_mem"))]
    pub fn scribble(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_block(buf: &mut [u8], size: usize) -> Block {
        let addr = Address::from_mut_ptr(buf.as_mut_ptr());
        unsafe { Block::init(addr, size, true, false, 0) }
    }

    #[test]
    fn header_roundtrips_fields() {
        let mut buf = vec![0u8; 256];
        let b = make_block(&mut buf, 256);
        assert_eq!(b.size(), 256);
        assert!(b.is_first());
        assert!(!b.is_free());
        assert_eq!(b.qindex(), 0);
        b.set_free(true);
        b.set_qindex(7);
        assert!(b.is_free());
        assert_eq!(b.qindex(), 7);
        assert_eq!(b.ptr(), b.addr() + header_size());
        assert_eq!(b.next_in_region(), b.addr() + 256);
    }

    #[test]
    fn manager_slot_roundtrips() {
        fn dummy_manager(_ptr: *mut u8, _flags: crate::manager::ManageFlags) {}
        let mut buf = vec![0u8; 256];
        let b = make_block(&mut buf, 256);
        assert!(b.manager().is_none());
        b.set_manager(Some(dummy_manager));
        assert!(b.has_manager());
        let got = b.manager().expect("manager should round-trip");
        assert_eq!(got as usize, dummy_manager as usize);
        let usable_with_manager = b.usable_size();
        b.set_manager(None);
        assert!(!b.has_manager());
        assert_eq!(b.usable_size(), usable_with_manager + size_of::<usize>());
    }

    #[test]
    fn free_list_links_roundtrip() {
        let mut buf_a = vec![0u8; 256];
        let mut buf_b = vec![0u8; 256];
        let a = make_block(&mut buf_a, 256);
        let b = make_block(&mut buf_b, 256);
        assert!(a.free_next().is_none());
        a.set_free_next(Some(b));
        b.set_free_prev(Some(a));
        assert_eq!(a.free_next(), Some(b));
        assert_eq!(b.free_prev(), Some(a));
    }
}
