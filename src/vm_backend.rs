//! C1: Virtual Memory Backend.
//!
//! Page-aligned reserve/release from the OS, always handed back
//! zero-filled. Grounded on the teacher's `util::heap::layout::byte_map_mmapper`
//! and `util::os::memory` modules, which reach for raw `libc::mmap` the
//! same way.

use crate::util::Address;
use std::io;

/// How a VM reservation should be mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmMode {
    /// Ordinary anonymous, read/write memory (the only mode this crate's
    /// allocator uses; kept as an enum so a host embedding this crate can
    /// extend it without changing the `vmalloc` signature).
    ReadWrite,
}

/// Returns the platform page size, queried once and cached.
pub fn page_size() -> usize {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static CACHED: AtomicUsize = AtomicUsize::new(0);
    let cached = CACHED.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }
    let size = platform::query_page_size();
    CACHED.store(size, Ordering::Relaxed);
    size
}

/// Reserve at least `size` bytes of zero-filled, page-aligned memory.
/// `size` is rounded up to a whole number of pages before mapping.
///
/// Returns `None` if the OS refuses the mapping (the caller translates
/// this into the policy-driven exception path of spec §7).
pub fn vmalloc(size: usize, mode: VmMode) -> Option<Address> {
    let page = page_size();
    let aligned = crate::util::conversions::align_up(size.max(1), page);
    platform::map(aligned, mode).map(Address::from_mut_ptr)
}

/// Release a region previously obtained from [`vmalloc`]. `size` must be
/// the same (page-rounded) size that was passed to `vmalloc`.
pub fn vmfree(addr: Address, size: usize) {
    let page = page_size();
    let aligned = crate::util::conversions::align_up(size.max(1), page);
    platform::unmap(addr, aligned);
}

// Grounded on the teacher's own use of `cfg_if!` to pick between POSIX and
// fallback implementations of a platform-dependent module in one place
// (mmtk-core reaches for it the same way across `util::memory`/`util::raw_memory_freelist`
// rather than two separately-attributed module declarations).
cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod platform {
            use super::*;

            pub fn query_page_size() -> usize {
                let ret = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
                if ret > 0 {
                    ret as usize
                } else {
                    4096
                }
            }

            pub fn map(size: usize, _mode: VmMode) -> Option<*mut u8> {
                let ptr = unsafe {
                    libc::mmap(
                        std::ptr::null_mut(),
                        size,
                        libc::PROT_READ | libc::PROT_WRITE,
                        libc::MAP_PRIVATE | libc::MAP_ANON,
                        -1,
                        0,
                    )
                };
                if ptr == libc::MAP_FAILED {
                    let err = io::Error::last_os_error();
                    log::warn!("mmap({} bytes) failed: {}", size, err);
                    None
                } else {
                    // MAP_ANON guarantees zero-filled pages on every POSIX platform
                    // we target; no explicit zeroing needed.
                    Some(ptr as *mut u8)
                }
            }

            pub fn unmap(addr: Address, size: usize) {
                let rc = unsafe { libc::munmap(addr.to_mut_ptr::<u8>() as *mut libc::c_void, size) };
                if rc != 0 {
                    log::warn!(
                        "munmap({:?}, {} bytes) failed: {}",
                        addr,
                        size,
                        io::Error::last_os_error()
                    );
                }
            }
        }
    } else {
        // No `libc::mmap` on this target. Fall back to the global allocator
        // and zero explicitly, exactly as spec §4.1 describes for
        // "unsupported platforms". This loses the ability to `munmap` a
        // sub-range independently of its neighbors, which is fine here
        // because regions are always released as a whole.
        mod platform {
            use super::*;
            use std::alloc::{alloc_zeroed, dealloc, Layout};

            pub fn query_page_size() -> usize {
                4096
            }

            fn layout(size: usize) -> Layout {
                Layout::from_size_align(size, super::page_size()).expect("invalid VM reservation size")
            }

            pub fn map(size: usize, _mode: VmMode) -> Option<*mut u8> {
                let ptr = unsafe { alloc_zeroed(layout(size)) };
                if ptr.is_null() {
                    None
                } else {
                    Some(ptr)
                }
            }

            pub fn unmap(addr: Address, size: usize) {
                unsafe { dealloc(addr.to_mut_ptr::<u8>(), layout(size)) }
            }
        }
    }
}
