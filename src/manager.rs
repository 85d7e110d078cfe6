//! Manager callback: the per-block hook a caller installs to make the
//! collector aware of internal pointers that live inside an allocation
//! (precise marking, spec §3/§6) and to run finalization logic when a
//! block is swept.

use std::ops::BitOr;

/// Reason the manager function is being invoked. A plain bitset rather
/// than a `bitflags`-generated type, consistent with [`crate::block`]'s
/// own hand-rolled block flags.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ManageFlags(u32);

impl ManageFlags {
    /// The collector is marking; the manager must call back into the
    /// heap's root-holding helper for every live pointer reachable from
    /// this block.
    pub const MARK: ManageFlags = ManageFlags(1 << 0);
    /// The block was determined unreachable and is about to be returned
    /// to its free queue; the manager should run any finalization logic
    /// (closing handles, releasing non-GC resources) before the payload
    /// is scribbled over.
    pub const FREE: ManageFlags = ManageFlags(1 << 1);

    pub const fn contains(self, other: ManageFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ManageFlags {
    type Output = ManageFlags;
    fn bitor(self, rhs: ManageFlags) -> ManageFlags {
        ManageFlags(self.0 | rhs.0)
    }
}

/// A manager is a plain function pointer rather than a trait object:
/// spec §6 specifies it as a C-style callback, and blocks store it in a
/// single trailing pointer-sized slot ([`crate::block::Block::manager`])
/// rather than a fat pointer.
pub type Manager = fn(ptr: *mut u8, flags: ManageFlags);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine_and_test() {
        let both = ManageFlags::MARK | ManageFlags::FREE;
        assert!(both.contains(ManageFlags::MARK));
        assert!(both.contains(ManageFlags::FREE));
        assert!(!ManageFlags::MARK.contains(ManageFlags::FREE));
    }
}
