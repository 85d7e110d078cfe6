//! Parallel sweep (spec §4.9).
//!
//! Each region is swept independently of every other, so one thread per
//! region is a natural unit of parallelism — grounded on the teacher's
//! use of `crossbeam`'s scoped threads in its worker pool
//! (`scheduler::worker`) to fan work out and join it back deterministically.
//! Sweeping a region walks its blocks in address order, coalescing every
//! run of adjacent dead or already-free blocks into one block before
//! relinking it, which is how fragmentation from short-lived allocations
//! gets undone.
//!
//! Mutators may already be running again by the time a given region's
//! sweep completes (non-sticky yield, spec §4.8): nothing here touches a
//! live block's payload, only the header fields owned by the collector,
//! so this is safe to run concurrently with mutators that are busy in
//! other regions or other already-swept parts of the heap.

use crate::block::Block;
use crate::freelist::FreeQueues;
use crate::manager::ManageFlags;
use crate::region::{Region, RegionList};
use crate::stats::StatsCounters;

/// Sweep every region in `regions`, relinking reclaimed space into
/// `queues`. `mark_color` is the color that denotes "survived this
/// cycle"; anything else (and anything already free) is reclaimed.
/// `cache_heap` is the spec §4.11 "cache pressure" target: a region that
/// has become entirely garbage is handed back to the OS only if doing
/// so still leaves at least that many bytes on the free queues
/// afterwards, rather than unconditionally — see [`flush_run`].
pub fn sweep_all(
    regions: &RegionList,
    queues: &FreeQueues,
    stats: &StatsCounters,
    mark_color: u8,
    cache_heap: usize,
) {
    let region_list: Vec<Region> = regions.iter().collect();
    crossbeam::scope(|scope| {
        for region in region_list {
            scope.spawn(move |_| sweep_region(region, regions, queues, stats, mark_color, cache_heap));
        }
    })
    .expect("a sweep worker thread panicked");
}

fn sweep_region(
    region: Region,
    regions: &RegionList,
    queues: &FreeQueues,
    stats: &StatsCounters,
    mark_color: u8,
    cache_heap: usize,
) {
    let end = region.end();
    let region_start = region.first_block().addr();
    let mut addr = region_start;

    let mut run_start = None;
    let mut run_size: usize = 0;

    while addr < end {
        let block = unsafe { Block::from_addr(addr) };
        block.verify_magic();
        let next_addr = block.next_in_region();
        let already_free = block.is_free();
        let reclaim = already_free || !block.is_live(mark_color);

        if reclaim {
            if already_free {
                queues.unlink_block(block);
                stats.dequeued(block.size());
            } else {
                if let Some(manager) = block.manager() {
                    manager(block.ptr().to_mut_ptr(), ManageFlags::FREE);
                }
                block.scribble();
                stats.record_free(block.size());
                stats.record_block_reclaimed();
            }
            match run_start {
                Some(_) => run_size += block.size(),
                None => {
                    run_start = Some(block);
                    run_size = block.size();
                }
            }
        } else {
            flush_run(
                &mut run_start, &mut run_size, region, regions, queues, stats, region_start, end, mark_color,
                cache_heap,
            );
        }

        addr = next_addr;
    }
    flush_run(
        &mut run_start, &mut run_size, region, regions, queues, stats, region_start, end, mark_color, cache_heap,
    );
}

/// Turn an accumulated run of reclaimed blocks into one coalesced free
/// block and queue it, if there was a run to flush. If the run spans
/// the region start-to-end (every block in it died this cycle) and the
/// heap already has more than `cache_heap` bytes of slack elsewhere, the
/// whole region is released to the OS instead of being requeued (spec
/// §4.11 "mark its region freeable... and cache pressure permits").
#[allow(clippy::too_many_arguments)]
fn flush_run(
    run_start: &mut Option<Block>,
    run_size: &mut usize,
    region: Region,
    regions: &RegionList,
    queues: &FreeQueues,
    stats: &StatsCounters,
    region_start: crate::util::Address,
    region_end: crate::util::Address,
    mark_color: u8,
    cache_heap: usize,
) {
    let Some(start_block) = run_start.take() else {
        return;
    };
    let size = *run_size;
    *run_size = 0;
    let start_addr = start_block.addr();
    let is_first = start_addr == region_start;
    let is_full_region = is_first && start_addr + size == region_end;

    if is_full_region && stats.bytes_free() > cache_heap {
        stats.record_region_released(region.size());
        regions.release(region);
        return;
    }

    let merged = unsafe { Block::init(start_addr, size, is_first, is_full_region, mark_color) };
    stats.queued(size);
    queues.link_block(merged);
}
