use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::sync::atomic::{AtomicUsize, Ordering};

/// An arbitrary memory address, represented as a transparent `usize`.
///
/// `Address` exists so that pointer arithmetic on raw block and region
/// headers reads as ordinary integer arithmetic instead of a thicket of
/// `as *mut u8` casts, while keeping every unsafe dereference localized to
/// a handful of methods here and in [`crate::block`] / [`crate::region`].
#[repr(transparent)]
#[derive(Copy, Clone, Eq, Hash, PartialOrd, Ord, PartialEq)]
pub struct Address(usize);

impl Address {
    pub const ZERO: Self = Address(0);

    pub fn from_ptr<T>(ptr: *const T) -> Address {
        Address(ptr as usize)
    }

    pub fn from_mut_ptr<T>(ptr: *mut T) -> Address {
        Address(ptr as usize)
    }

    /// # Safety
    /// The caller must know `raw` denotes a valid address, or only ever use
    /// the result as an opaque sentinel (e.g. `Address::ZERO`-like markers).
    pub const unsafe fn from_usize(raw: usize) -> Address {
        Address(raw)
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn to_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    pub fn to_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    pub const fn align_up(self, align: usize) -> Address {
        Address((self.0 + align - 1) & !(align - 1))
    }

    pub const fn align_down(self, align: usize) -> Address {
        Address(self.0 & !(align - 1))
    }

    pub const fn is_aligned_to(self, align: usize) -> bool {
        (self.0 & (align - 1)) == 0
    }

    /// # Safety
    /// `self` must be a valid, live, and correctly-aligned `T*`.
    pub unsafe fn load<T: Copy>(self) -> T {
        *(self.0 as *const T)
    }

    /// # Safety
    /// `self` must be valid, writable and correctly aligned for `T`.
    pub unsafe fn store<T>(self, value: T) {
        (self.0 as *mut T).write(value);
    }

    /// # Safety
    /// `self` must be valid and aligned for an atomic access of `T`'s size.
    pub unsafe fn atomic_load_usize(self, order: Ordering) -> usize {
        (*(self.0 as *const AtomicUsize)).load(order)
    }

    /// # Safety
    /// See [`Address::atomic_load_usize`].
    pub unsafe fn atomic_store_usize(self, val: usize, order: Ordering) {
        (*(self.0 as *const AtomicUsize)).store(val, order)
    }
}

impl Add<usize> for Address {
    type Output = Address;
    fn add(self, offset: usize) -> Address {
        Address(self.0 + offset)
    }
}

impl AddAssign<usize> for Address {
    fn add_assign(&mut self, offset: usize) {
        self.0 += offset;
    }
}

impl Sub<usize> for Address {
    type Output = Address;
    fn sub(self, offset: usize) -> Address {
        Address(self.0 - offset)
    }
}

impl SubAssign<usize> for Address {
    fn sub_assign(&mut self, offset: usize) {
        self.0 -= offset;
    }
}

/// Address - Address (self must be the higher address).
impl Sub<Address> for Address {
    type Output = usize;
    fn sub(self, other: Address) -> usize {
        debug_assert!(self.0 >= other.0, "{} is lower than {}", self, other);
        self.0 - other.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

// Safety: Address is Copy and carries no aliasing/lifetime of its own; it is
// exactly as shareable across threads as a raw usize.
unsafe impl Send for Address {}
unsafe impl Sync for Address {}
