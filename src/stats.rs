//! Heap statistics snapshot (spec §6 `MemStats`, §9 diagnostics).
//!
//! Grounded on the teacher's [`crate`]-wide `GlobalState`: a handful of
//! plain atomics updated on the hot allocation path, read out into an
//! immutable snapshot struct on request rather than locked as a whole.

use crate::vm_backend;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Live counters updated by the allocator and collector. Part of
/// [`crate::heap::Heap`]; never constructed standalone.
pub struct StatsCounters {
    bytes_allocated: AtomicUsize,
    bytes_allocated_peak: AtomicUsize,
    bytes_in_regions: AtomicUsize,
    /// Bytes currently sitting on a free queue, available for reuse
    /// without growing the heap (spec §3 Heap "bytesFree"). Distinct
    /// from `bytes_in_regions - bytes_allocated`: the latter also counts
    /// region-header overhead and any not-yet-carved slack, whereas this
    /// is exactly what `FreeQueues::take_good_fit` could satisfy right
    /// now.
    bytes_free: AtomicUsize,
    num_allocs: AtomicUsize,
    num_collections: AtomicUsize,
    num_regions_released: AtomicUsize,
    /// Count of blocks the sweeper has found unreachable and reclaimed,
    /// cumulative across the heap's lifetime. [`crate::heap::Heap::gc`]
    /// reports the delta of this counter across one call rather than
    /// deriving a count from bytes freed (spec §6 "Returns count of
    /// freed blocks") — a byte-based estimate would overcount whenever a
    /// reclaimed block is bigger than `MIN_BLOCK`.
    blocks_reclaimed: AtomicUsize,
}

impl StatsCounters {
    pub const fn new() -> StatsCounters {
        StatsCounters {
            bytes_allocated: AtomicUsize::new(0),
            bytes_allocated_peak: AtomicUsize::new(0),
            bytes_in_regions: AtomicUsize::new(0),
            bytes_free: AtomicUsize::new(0),
            num_allocs: AtomicUsize::new(0),
            num_collections: AtomicUsize::new(0),
            num_regions_released: AtomicUsize::new(0),
            blocks_reclaimed: AtomicUsize::new(0),
        }
    }

    pub(crate) fn record_alloc(&self, size: usize) {
        let now = self.bytes_allocated.fetch_add(size, Ordering::Relaxed) + size;
        self.num_allocs.fetch_add(1, Ordering::Relaxed);
        self.bytes_allocated_peak.fetch_max(now, Ordering::Relaxed);
    }

    pub(crate) fn record_free(&self, size: usize) {
        self.bytes_allocated.fetch_sub(size, Ordering::Relaxed);
    }

    /// One more block was found unreachable and reclaimed by the sweeper
    /// (spec §6 `gc` return value). Not called for blocks freed
    /// explicitly via [`crate::heap::Heap::free`] — those never needed a
    /// collection in the first place.
    pub(crate) fn record_block_reclaimed(&self) {
        self.blocks_reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn blocks_reclaimed(&self) -> usize {
        self.blocks_reclaimed.load(Ordering::Relaxed)
    }

    pub(crate) fn record_region_grown(&self, size: usize) {
        self.bytes_in_regions.fetch_add(size, Ordering::Relaxed);
    }

    /// A region was handed back to the OS whole (spec §4.11): its bytes
    /// leave `bytes_in_regions` entirely, never having been counted in
    /// `bytes_free` (see [`StatsCounters::queued`]'s doc).
    pub(crate) fn record_region_released(&self, size: usize) {
        self.bytes_in_regions.fetch_sub(size, Ordering::Relaxed);
        self.num_regions_released.fetch_add(1, Ordering::Relaxed);
    }

    /// A block was linked onto a free queue (reclaimed by sweep, or
    /// split off as a spare during `alloc`/`grow`).
    pub(crate) fn queued(&self, size: usize) {
        self.bytes_free.fetch_add(size, Ordering::Relaxed);
    }

    /// A block was taken off a free queue to satisfy an allocation.
    pub(crate) fn dequeued(&self, size: usize) {
        self.bytes_free.fetch_sub(size, Ordering::Relaxed);
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated.load(Ordering::Relaxed)
    }

    pub fn bytes_free(&self) -> usize {
        self.bytes_free.load(Ordering::Relaxed)
    }

    pub(crate) fn record_collection(&self) {
        self.num_collections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, max_heap: usize, warn_heap: usize, cache_heap: usize) -> MemStats {
        MemStats {
            bytes_allocated: self.bytes_allocated.load(Ordering::Relaxed),
            bytes_allocated_peak: self.bytes_allocated_peak.load(Ordering::Relaxed),
            bytes_in_regions: self.bytes_in_regions.load(Ordering::Relaxed),
            bytes_free: self.bytes_free.load(Ordering::Relaxed),
            num_allocs: self.num_allocs.load(Ordering::Relaxed),
            num_collections: self.num_collections.load(Ordering::Relaxed),
            num_regions_released: self.num_regions_released.load(Ordering::Relaxed),
            max_heap,
            warn_heap,
            cache_heap,
            cpu_cores: num_cpus::get(),
            page_size: vm_backend::page_size(),
        }
    }
}

impl Default for StatsCounters {
    fn default() -> StatsCounters {
        StatsCounters::new()
    }
}

/// Point-in-time heap statistics, returned by
/// [`crate::heap::Heap::mem_stats`] (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemStats {
    pub bytes_allocated: usize,
    pub bytes_allocated_peak: usize,
    pub bytes_in_regions: usize,
    pub bytes_free: usize,
    pub num_allocs: usize,
    pub num_collections: usize,
    pub num_regions_released: usize,
    pub max_heap: usize,
    pub warn_heap: usize,
    pub cache_heap: usize,
    pub cpu_cores: usize,
    pub page_size: usize,
}
