//! C4: Size-Classed Free Queues.
//!
//! Free blocks are binned into [`NUM_QUEUES`] size classes using a
//! log-linear (exponent/mantissa) encoding: classes below [`NUM_QBITS`]
//! units map directly to their unit count, and every class above that
//! doubles its granularity every [`NUM_QBITS`] classes, the same way a
//! floating-point mantissa/exponent pair covers a wide range with
//! bounded relative error. This keeps worst-case internal
//! fragmentation per class under roughly `1 / NUM_QBITS`.
//!
//! A bitmap tracks which queues are currently non-empty so a Good-Fit
//! search for "smallest free block at least this big" costs a handful of
//! word scans rather than walking every class. Grounded on the teacher's
//! `util::freelist` chunk lists and its `VMSpace`-level use of
//! `crossbeam`'s lock-free primitives for the bitmap words; per-queue
//! mutual exclusion is a plain `spin::Mutex` (the teacher's own
//! `policy::sss::ProbabilisticSamplingPolicy` and friends reach for
//! `spin` the same way for short, uncontended critical sections).

use crate::block::Block;
use crate::util::constants::{ALIGN, ALIGN_SHIFT, MAX_BLOCK, NUM_QBITS, NUM_QBITS_SHIFT, NUM_QUEUES};
use spin::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

const WORD_BITS: usize = usize::BITS as usize;

/// Size class a free block of exactly `size_bytes` total size is binned
/// into (spec §4.4): the *floor* of the exponent/mantissa encoding, so
/// every block queued at class `q` satisfies
/// `q_to_size(q) <= block.size() < q_to_size(q + 1)`. This is the
/// inverse of [`q_to_size`]: `size_to_q(q_to_size(q)) == q`.
///
/// Only for binning an already-known block size
/// ([`FreeQueues::link_block`]). An allocation *request* must not use
/// this directly — a class's blocks can be as small as its own nominal
/// size, which may be smaller than the request — use [`request_to_q`]
/// instead (mirrors the original's `sizetoq(size, roundup)` taking a
/// `roundup` flag rather than overloading one function for both roles).
///
/// # Panics
/// In debug builds, if `size_bytes` exceeds [`MAX_BLOCK`] — callers must
/// route oversized requests straight to [`crate::region::grow`] instead.
pub fn size_to_q(size_bytes: usize) -> usize {
    debug_assert!(size_bytes <= MAX_BLOCK, "{size_bytes} exceeds MAX_BLOCK");
    let units = size_bytes >> ALIGN_SHIFT;
    if units < NUM_QBITS {
        return units;
    }
    let bits = usize::BITS - units.leading_zeros();
    let shift = bits - (NUM_QBITS_SHIFT + 1);
    let high = shift + 1;
    let mantissa = units >> shift;
    let low = mantissa - NUM_QBITS;
    (high as usize) * NUM_QBITS + low
}

/// The size class to start a Good-Fit search at for an allocation of at
/// least `size_bytes` (spec §4.5 step 2: "qindex = sizetoq(size); if
/// request exceeds the queue's minSize, advance to qindex+1"). Unlike
/// [`size_to_q`], guarantees `q_to_size(request_to_q(n)) >= n`, so every
/// block on the returned class (and any class above it) is big enough.
pub fn request_to_q(size_bytes: usize) -> usize {
    let q = size_to_q(size_bytes);
    if size_bytes > q_to_size(q) {
        q + 1
    } else {
        q
    }
}

/// The nominal (minimum) size in bytes of every block queued at `q`.
/// Inverse of [`size_to_q`]'s floor rounding: `q_to_size(size_to_q(n)) <= n`.
pub fn q_to_size(q: usize) -> usize {
    let high = q / NUM_QBITS;
    let low = q % NUM_QBITS;
    let units = if high == 0 {
        low
    } else {
        (NUM_QBITS + low) << (high - 1)
    };
    units << ALIGN_SHIFT
}

/// All of the heap's size-classed free queues, plus the non-empty bitmap
/// that makes a Good-Fit search cheap.
pub struct FreeQueues {
    heads: Vec<Mutex<Option<Block>>>,
    bitmap: Vec<AtomicUsize>,
}

impl FreeQueues {
    pub fn new() -> FreeQueues {
        let words = (NUM_QUEUES + WORD_BITS - 1) / WORD_BITS;
        FreeQueues {
            heads: (0..NUM_QUEUES).map(|_| Mutex::new(None)).collect(),
            bitmap: (0..words).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    fn mark_nonempty(&self, q: usize) {
        self.bitmap[q / WORD_BITS].fetch_or(1 << (q % WORD_BITS), Ordering::AcqRel);
    }

    fn mark_empty(&self, q: usize) {
        self.bitmap[q / WORD_BITS].fetch_and(!(1 << (q % WORD_BITS)), Ordering::AcqRel);
    }

    /// Push `block` onto its size class's free list. The block's
    /// `qindex` and `free` flag must already reflect where it belongs
    /// (see [`crate::block::Block::set_qindex`]); callers normally reach
    /// this via [`FreeQueues::link_block`] instead.
    fn push(&self, q: usize, block: Block) {
        let mut head = self.heads[q].lock();
        block.set_free_prev(None);
        block.set_free_next(*head);
        if let Some(old_head) = *head {
            old_head.set_free_prev(Some(block));
        } else {
            self.mark_nonempty(q);
        }
        *head = Some(block);
    }

    /// Remove `block` from the free list it currently sits on. The
    /// caller must know which class it is on (its own `qindex`).
    fn remove(&self, q: usize, block: Block) {
        let mut head = self.heads[q].lock();
        let prev = block.free_prev();
        let next = block.free_next();
        match prev {
            Some(p) => p.set_free_next(next),
            None => *head = next,
        }
        if let Some(n) = next {
            n.set_free_prev(prev);
        }
        block.set_free_prev(None);
        block.set_free_next(None);
        if head.is_none() {
            self.mark_empty(q);
        }
    }

    /// Queue a block that is ready to satisfy future allocations: mark it
    /// free, compute its size class, and link it in.
    pub fn link_block(&self, block: Block) {
        let q = size_to_q(block.size());
        block.set_qindex(q);
        block.set_free(true);
        block.scribble();
        self.push(q, block);
    }

    /// Queue the spare remainder of a split ([`crate::region::grow`],
    /// [`crate::alloc`]'s split-on-allocate path). Identical to
    /// [`FreeQueues::link_block`]; kept as a separate name because the
    /// two call sites read better distinguished (spec §4.3 "spare
    /// block" vs. §4.6 "returned block").
    pub fn link_spare_block(&self, block: Block) {
        self.link_block(block);
    }

    /// Remove `block` from the free queues, e.g. because it is about to
    /// be handed out or coalesced into a neighbor.
    pub fn unlink_block(&self, block: Block) {
        let q = block.qindex();
        self.remove(q, block);
        block.set_qindex(0);
        block.set_free(false);
    }

    /// Good-Fit search: find and remove the smallest free block at least
    /// `min_size` bytes, scanning from [`request_to_q`]'s class upward
    /// via the bitmap. Returns `None` if no queue at or above that class
    /// holds anything.
    pub fn take_good_fit(&self, min_size: usize) -> Option<Block> {
        let start_q = request_to_q(min_size);
        let mut word_idx = start_q / WORD_BITS;
        let mut mask_from = start_q % WORD_BITS;
        while word_idx < self.bitmap.len() {
            let word = self.bitmap[word_idx].load(Ordering::Acquire) & !((1usize << mask_from) - 1);
            if word == 0 {
                word_idx += 1;
                mask_from = 0;
                continue;
            }
            let bit = word.trailing_zeros() as usize;
            let q = word_idx * WORD_BITS + bit;
            if q >= NUM_QUEUES {
                return None;
            }
            let mut head = self.heads[q].lock();
            if let Some(block) = *head {
                let next = block.free_next();
                *head = next;
                if let Some(n) = next {
                    n.set_free_prev(None);
                }
                block.set_free_prev(None);
                block.set_free_next(None);
                if head.is_none() {
                    drop(head);
                    self.mark_empty(q);
                } else {
                    drop(head);
                }
                block.set_qindex(0);
                block.set_free(false);
                debug_assert!(block.size() >= min_size, "take_good_fit returned an undersized block");
                return Some(block);
            }
            // Another thread drained this class between the bitmap read
            // and the lock; clear the (stale) bit and keep scanning.
            drop(head);
            self.mark_empty(q);
            if bit + 1 >= WORD_BITS {
                word_idx += 1;
                mask_from = 0;
            } else {
                mask_from = bit + 1;
            }
        }
        None
    }
}

impl Default for FreeQueues {
    fn default() -> FreeQueues {
        FreeQueues::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Address;

    #[test]
    fn size_to_q_is_monotonic_and_gapless() {
        // Every class boundary should round-trip exactly, and consecutive
        // classes should tile with no gap: the byte just below a class's
        // nominal size must resolve to the previous class.
        let mut prev_size = 0;
        for q in 0..NUM_QUEUES {
            let size = q_to_size(q);
            assert_eq!(size_to_q(size), q, "class {q}'s own nominal size should map back to it");
            if q > 0 {
                assert!(size > prev_size, "class sizes must strictly increase with qindex");
                assert_eq!(
                    size_to_q(size - ALIGN),
                    q - 1,
                    "the byte below class {q} should fall in class {}",
                    q - 1
                );
            }
            prev_size = size;
        }
    }

    #[test]
    fn small_sizes_map_one_to_one() {
        for units in 0..NUM_QBITS {
            assert_eq!(size_to_q(units << ALIGN_SHIFT), units);
        }
    }

    #[test]
    fn link_and_take_good_fit_roundtrip() {
        let queues = FreeQueues::new();
        let mut buf = vec![0u8; 4096];
        let addr = Address::from_mut_ptr(buf.as_mut_ptr());
        let block = unsafe { Block::init(addr, 256, true, false, 0) };
        queues.link_block(block);
        assert!(block.is_free());
        let found = queues.take_good_fit(128).expect("should find the linked block");
        assert_eq!(found, block);
        assert!(!found.is_free());
        assert!(queues.take_good_fit(128).is_none());
    }

    #[test]
    fn take_good_fit_never_returns_a_block_smaller_than_requested() {
        // A 528-byte block floor-bins into class 32 (q_to_size(32) ==
        // 512), one class below where a 544-byte request starts
        // searching (q_to_size(33) == 544). Regression test for binning
        // and searching having once shared a single ceil-rounded class
        // mapping, which let this request return the 528-byte block.
        let queues = FreeQueues::new();
        let mut buf = vec![0u8; 1024];
        let block = unsafe { Block::init(Address::from_mut_ptr(buf.as_mut_ptr()), 528, true, false, 0) };
        assert_eq!(size_to_q(528), 32);
        queues.link_block(block);
        assert!(queues.take_good_fit(544).is_none(), "the only queued block is smaller than requested");
    }

    #[test]
    fn take_good_fit_skips_smaller_classes() {
        let queues = FreeQueues::new();
        let mut small_buf = vec![0u8; 256];
        let mut big_buf = vec![0u8; 4096];
        let small = unsafe { Block::init(Address::from_mut_ptr(small_buf.as_mut_ptr()), 64, true, false, 0) };
        let big = unsafe { Block::init(Address::from_mut_ptr(big_buf.as_mut_ptr()), 2048, true, false, 0) };
        queues.link_block(small);
        queues.link_block(big);
        let found = queues.take_good_fit(1024).expect("should skip the too-small block");
        assert_eq!(found, big);
    }
}
