//! Size and layout constants shared by the allocator, free-queue mapping,
//! and GC. Grounded on the teacher's `util::constants` module, trimmed to
//! the handful of constants this single-heap design actually needs.

/// log2 of the number of bytes in a kilobyte.
pub const LOG_BYTES_IN_KBYTE: u8 = 10;
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;
pub const BYTES_IN_MBYTE: usize = 1 << 20;

/// All blocks and region headers are aligned to this many bytes. 16 bytes
/// keeps any trailing manager-pointer slot naturally aligned on both 32-
/// and 64-bit targets.
pub const ALIGN_SHIFT: u32 = 4;
pub const ALIGN: usize = 1 << ALIGN_SHIFT;

/// Mantissa width of the size-class encoding (see [`crate::freelist`]).
pub const NUM_QBITS_SHIFT: u32 = 4;
pub const NUM_QBITS: usize = 1 << NUM_QBITS_SHIFT;

/// Largest exponent a size class can carry. Requests that would need a
/// larger exponent skip the free queues entirely and go straight to
/// [`crate::region::grow`].
pub const MAX_EXPONENT: u32 = 22;

/// Total number of size-classed free queues.
pub const NUM_QUEUES: usize = (MAX_EXPONENT as usize + 1) * NUM_QBITS;

/// Smallest block MPR will ever hand out: large enough to hold a header
/// plus two free-list pointers once it is back on a queue.
pub const MIN_BLOCK: usize = ALIGN * 4;

/// A free fragment is only worth splitting off and queueing if it can
/// hold at least this many bytes; otherwise it is donated to the block
/// being allocated instead of fragmenting the heap further.
pub const MIN_SPLIT: usize = ALIGN * 4;

/// Largest block size representable by the free-queue size classes.
/// Anything bigger is always `first=1, fullRegion=1` and never split.
pub const MAX_BLOCK: usize = {
    let high = MAX_EXPONENT;
    let low = NUM_QBITS - 1;
    ((NUM_QBITS + low) << (high - 1)) << ALIGN_SHIFT
};

/// Default size of a freshly reserved region when no larger size is
/// demanded by the triggering allocation.
pub const DEFAULT_REGION_SIZE: usize = 4 * BYTES_IN_MBYTE;

/// Default timeout the sweeper waits for every mutator to reach a
/// safepoint before abandoning a GC cycle (spec §4.9).
pub const DEFAULT_GC_SYNC_TIMEOUT_MS: u64 = 100;

/// Debug-only fill byte for scrubbed memory (`MPR_SCRIBBLE_MEM`).
pub const SCRIBBLE_BYTE: u8 = 0xFE;

/// Debug-only block header magic number (`MPR_VERIFY_MEM`).
pub const BLOCK_MAGIC: u32 = 0xe8ab_cdef;

// Compile-time checks of the invariants spec §3/§4.4 depend on, grounded
// on the teacher's own sprinkling of `static_assertions::const_assert!`
// across `util::constants`/`util::conversions` to catch a broken layout
// constant at compile time rather than the first failing test run.
static_assertions::const_assert!(ALIGN.is_power_of_two());
static_assertions::const_assert!(NUM_QBITS.is_power_of_two());
static_assertions::const_assert!(MIN_BLOCK % ALIGN == 0);
static_assertions::const_assert!(MIN_SPLIT % ALIGN == 0);
static_assertions::const_assert!(MIN_BLOCK < MAX_BLOCK);
static_assertions::const_assert!(DEFAULT_REGION_SIZE > MAX_BLOCK);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_block_below_max_block() {
        assert!(MIN_BLOCK < MAX_BLOCK);
        assert_eq!(MIN_BLOCK % ALIGN, 0);
        assert_eq!(MAX_BLOCK % ALIGN, 0);
    }
}
