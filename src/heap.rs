//! Heap singleton / bootstrap (spec §6 "Creation / teardown").
//!
//! Grounded on the teacher's `MMTKBuilder`/`MMTK<VM>` split: a builder
//! collects defaults, overlays `MPR_*` environment variables, then
//! `.build()` produces the single heap instance a process runs against.
//! Where the teacher's `MMTK<VM>` is generic over a VM binding trait,
//! `Heap` here is a single concrete struct — the manager callback is a
//! plain function pointer (spec §6), not a per-binding trait object, so
//! there is no type parameter to carry.

use crate::alloc;
use crate::block::Block;
use crate::error::{MemAction, MemError};
use crate::freelist::FreeQueues;
use crate::gc::{mark, scheduler};
use crate::gc::yield_point::YieldCoordinator;
use crate::manager::Manager;
use crate::mutator::{Mutator, MutatorRegistry};
use crate::policy::{self, MemLimits, MemNotifier};
use crate::region::RegionList;
use crate::roots::{self, RootList};
use crate::stats::{MemStats, StatsCounters};
use crate::util::constants::DEFAULT_GC_SYNC_TIMEOUT_MS;
use crate::util::rust_util::WarnOnce;
use crate::util::Address;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

fn read_env_usize(name: &str, default: usize) -> usize {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("{name}={raw:?} is not a valid number, using default {default}");
            default
        }),
        Err(_) => default,
    }
}

fn read_env_bool(name: &str) -> bool {
    std::env::var(name).map(|v| v.trim() == "1").unwrap_or(false)
}

/// A sane default `maxHeap` ceiling when a host never calls
/// [`HeapBuilder::max_heap`] / sets `MPR_MAX_HEAP` explicitly: half of
/// physical RAM (spec SPEC_FULL §C "system total memory probing for
/// heap policy defaults"). `0` (no limit) if the probe fails, which
/// matches this crate's existing "zero disables the threshold"
/// convention rather than inventing a new sentinel.
fn default_max_heap() -> usize {
    use sysinfo::System;
    let mut system = System::new();
    system.refresh_memory();
    (system.total_memory() / 2) as usize
}

/// Collects heap configuration before construction, overlaying `MPR_*`
/// environment variables (spec §6 "Environment variables") on top of
/// built-in defaults (spec SPEC_FULL §B.3).
pub struct HeapBuilder {
    max_heap: usize,
    warn_heap: usize,
    cache_heap: usize,
    gc_sync_timeout_ms: u64,
    gc_threshold: usize,
    gc_enabled: bool,
}

impl HeapBuilder {
    /// Defaults only, ignoring the environment — used by tests that want
    /// a deterministic heap regardless of the process's env vars.
    pub fn new_no_env_vars() -> HeapBuilder {
        HeapBuilder {
            max_heap: 0,
            warn_heap: 0,
            cache_heap: 0,
            gc_sync_timeout_ms: DEFAULT_GC_SYNC_TIMEOUT_MS,
            gc_threshold: crate::util::constants::DEFAULT_REGION_SIZE,
            gc_enabled: true,
        }
    }

    /// Defaults overlaid with `MPR_*` environment variables.
    pub fn new() -> HeapBuilder {
        let mut builder = HeapBuilder::new_no_env_vars();
        builder.max_heap = read_env_usize("MPR_MAX_HEAP", default_max_heap());
        builder.warn_heap = read_env_usize("MPR_WARN_HEAP", builder.warn_heap);
        builder.cache_heap = read_env_usize("MPR_CACHE_HEAP", builder.cache_heap);
        builder.gc_sync_timeout_ms =
            read_env_usize("MPR_GC_SYNC_TIMEOUT_MS", builder.gc_sync_timeout_ms as usize) as u64;
        if read_env_bool("MPR_DISABLE_GC") {
            builder.gc_enabled = false;
        }
        builder
    }

    pub fn max_heap(mut self, bytes: usize) -> HeapBuilder {
        self.max_heap = bytes;
        self
    }
    pub fn warn_heap(mut self, bytes: usize) -> HeapBuilder {
        self.warn_heap = bytes;
        self
    }
    pub fn cache_heap(mut self, bytes: usize) -> HeapBuilder {
        self.cache_heap = bytes;
        self
    }
    pub fn gc_threshold(mut self, bytes: usize) -> HeapBuilder {
        self.gc_threshold = bytes;
        self
    }
    pub fn gc_enabled(mut self, enabled: bool) -> HeapBuilder {
        self.gc_enabled = enabled;
        self
    }

    /// Boot the heap: install defaults, no regions reserved yet (the
    /// first allocation grows one on demand). Mirrors `createMemService`
    /// minus the manager/flags arguments, which travel per-call on
    /// [`Heap::alloc`] instead of being fixed at boot (spec §6).
    pub fn build(self) -> Heap {
        crate::logger::try_init();
        Heap {
            regions: RegionList::new(),
            queues: FreeQueues::new(),
            stats: StatsCounters::new(),
            limits: MemLimits::new(self.max_heap, self.warn_heap, self.cache_heap),
            mutators: MutatorRegistry::new(),
            yield_coordinator: YieldCoordinator::new(),
            roots: RootList::new(),
            mark_color: AtomicU8::new(0),
            gc_enabled: AtomicBool::new(self.gc_enabled),
            gc_pause_depth: AtomicUsize::new(0),
            gc_sync_timeout_ms: AtomicU64::new(self.gc_sync_timeout_ms),
            gc_threshold: AtomicUsize::new(self.gc_threshold),
            bytes_since_gc: AtomicUsize::new(0),
            notifier: spin::Mutex::new(None),
            warn_limit: WarnOnce::new(),
            warn_sync_timeout: WarnOnce::new(),
        }
    }
}

impl Default for HeapBuilder {
    fn default() -> HeapBuilder {
        HeapBuilder::new()
    }
}

/// The process-wide heap (spec §9 "global mutable singleton... model as a
/// process-wide service initialized once; access through a small set of
/// accessors"). A host typically keeps one `Heap` behind a
/// `once_cell`/`lazy_static` of its own; teardown is terminal, matching
/// spec §9's note that reinitialization is out of scope.
pub struct Heap {
    regions: RegionList,
    queues: FreeQueues,
    stats: StatsCounters,
    limits: MemLimits,
    mutators: MutatorRegistry,
    yield_coordinator: YieldCoordinator,
    roots: RootList,
    mark_color: AtomicU8,
    gc_enabled: AtomicBool,
    /// Nesting depth for `pauseGC`/`resumeGC` (spec §6, §9 "depends on
    /// `pauseGC > 0` being maintained balanced"). Distinct from
    /// [`YieldCoordinator`]'s on/off `pause_depth` bool, which is just
    /// the resulting gate a mutator checks at its safepoint.
    gc_pause_depth: AtomicUsize,
    gc_sync_timeout_ms: AtomicU64,
    gc_threshold: AtomicUsize,
    bytes_since_gc: AtomicUsize,
    notifier: spin::Mutex<Option<MemNotifier>>,
    warn_limit: WarnOnce,
    warn_sync_timeout: WarnOnce,
}

/// Flags for [`Heap::alloc`] (spec §6 `alloc(usize, flags)`).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct AllocFlags(u32);

impl AllocFlags {
    pub const NONE: AllocFlags = AllocFlags(0);
    pub const ZERO: AllocFlags = AllocFlags(1 << 0);
    pub const MANAGER: AllocFlags = AllocFlags(1 << 1);

    pub const fn contains(self, other: AllocFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for AllocFlags {
    type Output = AllocFlags;
    fn bitor(self, rhs: AllocFlags) -> AllocFlags {
        AllocFlags(self.0 | rhs.0)
    }
}

/// Flags for [`Heap::gc`] (spec §6 `gc(flags)`).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct GcFlags(u32);

impl GcFlags {
    pub const DEFAULT: GcFlags = GcFlags(0);
    pub const FORCE: GcFlags = GcFlags(1 << 0);
    pub const NO_BLOCK: GcFlags = GcFlags(1 << 1);
    pub const COMPLETE: GcFlags = GcFlags(1 << 2);

    pub const fn contains(self, other: GcFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for GcFlags {
    type Output = GcFlags;
    fn bitor(self, rhs: GcFlags) -> GcFlags {
        GcFlags(self.0 | rhs.0)
    }
}

/// Policy for how `alloc`/`gc` respond to a `MEM_LIMIT` condition (spec
/// §6 `setMemPolicy`, §7 "On MEM_LIMIT...").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemPolicy {
    NoMem,
    Restart,
    Exit,
}

impl Heap {
    // --- accessors used by crate::alloc / crate::gc ---

    pub(crate) fn regions(&self) -> &RegionList {
        &self.regions
    }
    pub(crate) fn queues(&self) -> &FreeQueues {
        &self.queues
    }
    pub(crate) fn stats(&self) -> &StatsCounters {
        &self.stats
    }
    pub(crate) fn limits(&self) -> &MemLimits {
        &self.limits
    }
    pub(crate) fn mutators(&self) -> &MutatorRegistry {
        &self.mutators
    }
    pub(crate) fn yield_coordinator(&self) -> &YieldCoordinator {
        &self.yield_coordinator
    }
    pub(crate) fn roots(&self) -> &RootList {
        &self.roots
    }

    pub(crate) fn mark_color(&self) -> u8 {
        self.mark_color.load(Ordering::Acquire)
    }

    /// The color the *next* cycle will mark survivors with, without
    /// committing it — the scheduler only commits once marking has
    /// actually finished (spec §4.13 "state machine").
    pub(crate) fn next_mark_color(&self) -> u8 {
        1 - self.mark_color()
    }

    pub(crate) fn commit_mark_color(&self, color: u8) {
        self.mark_color.store(color, Ordering::Release);
    }

    pub(crate) fn gc_sync_timeout(&self) -> Duration {
        Duration::from_millis(self.gc_sync_timeout_ms.load(Ordering::Relaxed))
    }

    pub(crate) fn gc_threshold(&self) -> usize {
        self.gc_threshold.load(Ordering::Relaxed)
    }

    pub(crate) fn bytes_since_gc(&self) -> usize {
        self.bytes_since_gc.load(Ordering::Relaxed)
    }

    pub(crate) fn note_allocation(&self, size: usize) {
        self.bytes_since_gc.fetch_add(size, Ordering::Relaxed);
    }

    /// Whether GC is currently suppressed, either administratively
    /// (`enableGC(false)`) or by an active `pauseGC` nesting
    /// (spec §6 `gcPaused`).
    pub fn gc_paused(&self) -> bool {
        !self.gc_enabled.load(Ordering::Acquire) || self.gc_pause_depth.load(Ordering::Acquire) > 0
    }

    /// Resolve `err` against the installed notifier (if any) and act on
    /// the resulting [`MemAction`] (spec §7 "Propagation policy"). Always
    /// logged once per condition kind on its first occurrence.
    pub(crate) fn handle_error(&self, err: MemError) -> MemAction {
        match &err {
            MemError::SyncTimeout { waited_ms } => {
                let waited_ms = *waited_ms;
                self.warn_sync_timeout
                    .fire(|| log::warn!("GC cycle aborted: not all mutators yielded within {waited_ms}ms"));
            }
            MemError::Limit { limit, used } | MemError::Warning { limit, used } => {
                let (limit, used) = (*limit, *used);
                self.warn_limit
                    .fire(|| log::warn!("heap usage {used} crossed threshold {limit}"));
            }
            MemError::Fail { requested } | MemError::TooBig { requested } => {
                log::error!("fatal allocation failure for {requested} bytes: {err}");
            }
        }
        let notifier = *self.notifier.lock();
        let action = policy::resolve_action(err, notifier);
        match action {
            MemAction::Abort => {
                log::error!("aborting process per memory policy");
                std::process::abort();
            }
            MemAction::Exit => std::process::exit(1),
            MemAction::Restart | MemAction::PruneCache | MemAction::ReturnNull => {}
        }
        action
    }

    // --- public API surface (spec §6) ---

    /// Register the calling thread as a mutator (spec §5 "Threads").
    /// Must be called once per thread before it allocates or touches
    /// GC-managed memory; the returned handle should be kept for the
    /// thread's lifetime and passed to [`Heap::yield_now`].
    pub fn register_mutator(&self) -> Mutator {
        self.mutators.register()
    }

    pub fn unregister_mutator(&self, mutator: &Mutator) {
        self.mutators.unregister(mutator);
    }

    /// `alloc(usize, flags)` (spec §6). `ZERO` zeroes the returned
    /// payload; `MANAGER` installs `manager` as the block's callback
    /// (absent that flag, `manager` is ignored even if `Some`).
    pub fn alloc(&self, size: usize, flags: AllocFlags, manager: Option<Manager>) -> Option<Address> {
        let manager = if flags.contains(AllocFlags::MANAGER) { manager } else { None };
        let ptr = alloc::alloc(self, size, manager)?;
        if flags.contains(AllocFlags::ZERO) {
            let usable = unsafe { Block::from_ptr(ptr) }.usable_size();
            unsafe { ptr.to_mut_ptr::<u8>().write_bytes(0, usable) };
        }
        Some(ptr)
    }

    /// `allocFast(usize)` (spec §6): no manager, no zeroing.
    pub fn alloc_fast(&self, size: usize) -> Option<Address> {
        alloc::alloc_fast(self, size)
    }

    /// # Safety
    /// See [`alloc::realloc`].
    pub unsafe fn realloc(&self, ptr: Address, new_size: usize) -> Option<Address> {
        alloc::realloc(self, ptr, new_size)
    }

    /// # Safety
    /// See [`alloc::memdup`].
    pub unsafe fn memdup(&self, ptr: Address, manager: Option<Manager>) -> Option<Address> {
        alloc::memdup(self, ptr, manager)
    }

    /// # Safety
    /// See [`alloc::free`].
    pub unsafe fn free(&self, ptr: Address) {
        alloc::free(self, ptr)
    }

    /// `gc(flags)` (spec §6). Runs a collection and returns the number of
    /// blocks freed by it. `FORCE` ignores the work-quota trigger and
    /// collects unconditionally; `NO_BLOCK` is honored only insofar as
    /// this crate's sweep always runs concurrently with mutators already
    /// (spec §4.9) — there is no separate blocking variant to skip.
    /// `COMPLETE` additionally waits for the sweep to finish before
    /// returning, rather than just the mark phase.
    pub fn gc(&self, flags: GcFlags) -> Result<usize, MemError> {
        if self.gc_paused() && !flags.contains(GcFlags::FORCE) {
            return Ok(0);
        }
        let before = self.stats.blocks_reclaimed();
        if flags.contains(GcFlags::COMPLETE) {
            self.mutators.set_all_wait_for_sweeper(true);
        }
        let result = self.collect();
        if flags.contains(GcFlags::COMPLETE) {
            self.mutators.set_all_wait_for_sweeper(false);
        }
        result?;
        let after = self.stats.blocks_reclaimed();
        Ok(after - before)
    }

    pub(crate) fn collect(&self) -> Result<(), MemError> {
        self.bytes_since_gc.store(0, Ordering::Relaxed);
        match scheduler::collect(self) {
            Ok(()) => Ok(()),
            Err(err) => {
                // A sync timeout never leaves mutators parked forever
                // (spec §7): release whichever did check in, report the
                // condition, and abandon this cycle.
                self.yield_coordinator.resume(&self.mutators);
                self.handle_error(err.clone());
                Err(err)
            }
        }
    }

    /// `yield(flags)` (spec §6): the calling mutator's safepoint check-in.
    pub fn yield_now(&self, mutator: &Mutator) {
        self.yield_coordinator.yield_at_safepoint(&self.mutators, mutator);
    }

    /// `resetYield()`: clear sticky yield for one mutator, letting it
    /// resume touching the heap (spec §4.9).
    pub fn reset_yield(&self, mutator: &Mutator) {
        mutator.state().set_sticky_yield(false);
        mutator.state().set_yielded(false);
    }

    pub fn need_yield(&self) -> bool {
        self.yield_coordinator.need_yield()
    }

    /// `pauseGC()` (spec §6): increments the pause nesting counter.
    /// Balanced with [`Heap::resume_gc`]; spec §9 leaves behavior on an
    /// unbalanced sequence undefined, so this saturates rather than
    /// underflowing on a stray extra `resume_gc`.
    pub fn pause_gc(&self) {
        self.gc_pause_depth.fetch_add(1, Ordering::AcqRel);
        self.yield_coordinator.set_paused(true);
    }

    pub fn resume_gc(&self) {
        let prev = self.gc_pause_depth.fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| {
            Some(d.saturating_sub(1))
        });
        if prev == Ok(1) || prev == Ok(0) {
            self.yield_coordinator.set_paused(false);
        }
    }

    pub fn enable_gc(&self, enabled: bool) {
        self.gc_enabled.store(enabled, Ordering::Release);
    }

    /// `markBlock` (spec §4.10): mark `ptr`'s block reachable and, if it
    /// carries a manager, recursively invoke that manager with
    /// `MANAGE_MARK`. This is the call a user-supplied [`Manager`]
    /// callback makes for every child pointer it owns while the
    /// collector is marking from a root — it is how the mark phase's
    /// transitive closure actually gets computed, since this crate never
    /// walks an object graph on its own. Idempotent within one cycle: a
    /// block already carrying the current mark color returns without
    /// recursing again, which is what makes cyclic graphs terminate.
    ///
    /// A manager function is a bare `fn` pointer with no closure state,
    /// so it reaches this through whatever process-wide handle the host
    /// keeps its [`Heap`] behind (spec §9 "global mutable singleton...
    /// access through a small set of accessors").
    ///
    /// # Safety
    /// `ptr` must be a still-live pointer previously returned by this
    /// heap's allocation functions. Calling this outside of a manager
    /// callback invoked during this heap's own mark phase marks the
    /// block with whatever color happens to be current, which is
    /// harmless but pointless outside that context.
    pub unsafe fn mark(&self, ptr: Address) {
        mark::mark_block(Block::from_ptr(ptr), self.mark_color());
    }

    pub fn add_root(&self, ptr: Address) {
        self.roots.add(unsafe { Block::from_ptr(ptr) });
    }

    pub fn remove_root(&self, ptr: Address) {
        self.roots.remove(unsafe { Block::from_ptr(ptr) });
    }

    /// # Safety
    /// See [`roots::hold`].
    pub unsafe fn hold(&self, ptr: Address) {
        roots::hold(ptr);
    }

    /// # Safety
    /// See [`roots::release`].
    pub unsafe fn release(&self, ptr: Address) {
        roots::release(ptr);
    }

    /// # Safety
    /// See [`roots::hold_blocks`].
    pub unsafe fn hold_blocks(&self, ptrs: &[Address]) {
        roots::hold_blocks(ptrs);
    }

    /// # Safety
    /// See [`roots::release_blocks`].
    pub unsafe fn release_blocks(&self, ptrs: &[Address]) {
        roots::release_blocks(ptrs);
    }

    /// # Safety
    /// `ptr` must be a still-live pointer returned by this heap's
    /// allocation functions.
    pub unsafe fn set_manager(&self, ptr: Address, manager: Option<Manager>) {
        Block::from_ptr(ptr).set_manager(manager);
    }

    /// # Safety
    /// See [`Heap::set_manager`].
    pub unsafe fn get_manager(&self, ptr: Address) -> Option<Manager> {
        Block::from_ptr(ptr).manager()
    }

    pub fn set_mem_limits(&self, max_heap: usize, warn_heap: usize, cache_heap: usize) {
        self.limits.set(max_heap, warn_heap, cache_heap);
    }

    pub fn set_mem_notifier(&self, notifier: Option<MemNotifier>) {
        *self.notifier.lock() = notifier;
    }

    pub fn mem_stats(&self) -> MemStats {
        self.stats
            .snapshot(self.limits.max_heap(), self.limits.warn_heap(), self.limits.cache_heap())
    }

    /// `destroyMemService()` (spec §6): release every region's VM back
    /// to the OS right now, rather than waiting for `Drop`. Idempotent —
    /// safe to call more than once, and safe to skip entirely (the
    /// `Drop` impl below does the same work), but calling it explicitly
    /// gives a host a deterministic point to reclaim VM ahead of process
    /// exit. Spec §9 "teardown is terminal": nothing in this crate
    /// supports allocating from a `Heap` again afterwards.
    pub fn destroy_mem_service(&self) {
        self.regions.release_all();
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        self.regions.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_heap_reports_no_allocations() {
        let heap = HeapBuilder::new_no_env_vars().build();
        let stats = heap.mem_stats();
        assert_eq!(stats.bytes_allocated, 0);
        assert_eq!(stats.num_allocs, 0);
    }

    #[test]
    fn destroy_mem_service_releases_every_region() {
        let heap = HeapBuilder::new_no_env_vars().build();
        let _ = heap.alloc_fast(64).expect("alloc should succeed");
        assert!(heap.regions().iter().count() >= 1);
        heap.destroy_mem_service();
        assert_eq!(heap.regions().iter().count(), 0);
    }

    #[test]
    fn alloc_zero_flag_zeroes_payload() {
        let heap = HeapBuilder::new_no_env_vars().build();
        let ptr = heap.alloc(64, AllocFlags::ZERO, None).expect("alloc should succeed");
        let slice = unsafe { std::slice::from_raw_parts(ptr.to_ptr::<u8>(), 64) };
        assert!(slice.iter().all(|&b| b == 0));
    }

    #[test]
    fn pause_and_resume_gc_is_balanced() {
        let heap = HeapBuilder::new_no_env_vars().build();
        assert!(!heap.gc_paused());
        heap.pause_gc();
        heap.pause_gc();
        assert!(heap.gc_paused());
        heap.resume_gc();
        assert!(heap.gc_paused());
        heap.resume_gc();
        assert!(!heap.gc_paused());
    }

    #[test]
    fn disabling_gc_overrides_pause_state() {
        let heap = HeapBuilder::new_no_env_vars().build();
        heap.enable_gc(false);
        assert!(heap.gc_paused());
        heap.enable_gc(true);
        assert!(!heap.gc_paused());
    }

    #[test]
    fn force_gc_reclaims_an_unreferenced_allocation() {
        let heap = HeapBuilder::new_no_env_vars().build();
        let _ptr = heap.alloc_fast(64).expect("alloc should succeed");
        let freed = heap.gc(GcFlags::FORCE | GcFlags::COMPLETE).expect("gc should succeed");
        assert!(freed >= 1);
    }

    // A manager `fn` pointer has no closure state, so it reaches the
    // heap it was installed on the same way a real host would: through a
    // process-wide handle. This static stands in for that handle.
    static PARENT_HEAP: AtomicUsize = AtomicUsize::new(0);

    fn parent_manager(ptr: *mut u8, flags: crate::manager::ManageFlags) {
        if !flags.contains(crate::manager::ManageFlags::MARK) {
            return;
        }
        let heap = unsafe { &*(PARENT_HEAP.load(Ordering::Acquire) as *const Heap) };
        let child_ptr = unsafe { (ptr as *const Address).read() };
        unsafe { heap.mark(child_ptr) };
    }

    #[test]
    fn manager_mark_reaches_transitively_held_child() {
        let heap = HeapBuilder::new_no_env_vars().build();
        PARENT_HEAP.store(&heap as *const Heap as usize, Ordering::Release);

        let child = heap.alloc_fast(64).expect("child alloc should succeed");
        let parent = heap
            .alloc(std::mem::size_of::<Address>(), AllocFlags::MANAGER, Some(parent_manager))
            .expect("parent alloc should succeed");
        unsafe { (parent.to_mut_ptr::<Address>()).write(child) };
        heap.add_root(parent);

        heap.gc(GcFlags::FORCE | GcFlags::COMPLETE).expect("gc should succeed");

        // Both the parent (a direct root) and the child (reached only
        // through the manager's `heap.mark` call) must have survived.
        let child_block = unsafe { Block::from_ptr(child) };
        assert!(!child_block.is_free(), "child reached via manager.mark() must survive collection");

        heap.remove_root(parent);
        let freed = heap.gc(GcFlags::FORCE | GcFlags::COMPLETE).expect("gc should succeed");
        assert!(freed >= 2, "removing the root should make both parent and child collectible");
    }
}
