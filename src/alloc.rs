//! Pluggable allocator capability.
//!
//! Mirrors the C original's `cbor_allocator` (`alloc`/`realloc`/`free` function
//! pointers plus an opaque `context`): [`CborAllocator::allocate`],
//! [`CborAllocator::reallocate`] and [`CborAllocator::deallocate`] play the same
//! three roles, and `&self` plays the role of `context` — a stateful allocator
//! (an arena, or a fault-injecting test double) holds its state behind `&self`
//! with interior mutability instead of a `void*`.
//!
//! [`SystemAllocator`] is the default, forwarding to the host global allocator
//! the way `cbor_default_allocator` forwards to `malloc`/`realloc`/`free`.
//!
//! All allocations made through this trait are treated as suitably aligned for
//! any value the crate stores in them, matching `malloc`'s universal-alignment
//! guarantee; see [`layout_for`].

use core::alloc::Layout;
use core::ptr::NonNull;

/// Alignment used for every allocation made through [`CborAllocator`].
///
/// `malloc` guarantees memory suitably aligned for any object; since the
/// allocator interface here hands out untyped byte ranges for both raw byte
/// buffers and internal node storage, every request uses one conservative
/// alignment rather than threading a `Layout` through the trait.
const ALLOC_ALIGN: usize = core::mem::align_of::<u128>();

/// Build the [`Layout`] used for a request of `size` bytes.
///
/// # Panics
///
/// Panics if `size`, rounded up to [`ALLOC_ALIGN`], would overflow `isize`.
/// This can only happen for sizes no real allocation request in this crate
/// produces (the encoder and decoder both reject lengths that large before
/// they reach an allocator).
#[must_use]
pub(crate) fn layout_for(size: usize) -> Layout {
    Layout::from_size_align(size, ALLOC_ALIGN).expect("allocation size overflows isize")
}

/// A pluggable allocator: allocate, grow/shrink in place or move, and free.
///
/// Implementations must uphold the usual allocator contract: a pointer
/// returned by [`allocate`](Self::allocate) or
/// [`reallocate`](Self::reallocate) is valid for reads and writes of the
/// requested size until it is passed to [`reallocate`](Self::reallocate) (as
/// the old pointer) or [`deallocate`](Self::deallocate).
///
/// A failing call must leave any existing allocation untouched — callers
/// propagate the failure by returning `None`/`Err` and freeing whatever
/// partial tree they had already built with the allocator that is still
/// valid.
pub trait CborAllocator {
    /// Allocate `size` bytes, or return `None` on failure.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Resize a previous allocation of `old_size` bytes to `new_size` bytes.
    ///
    /// `old_size` is passed explicitly (rather than tracked by the
    /// allocator) so that arena-style backends that cannot recover a prior
    /// allocation's size still have enough information to grow in place or
    /// copy. On success the old pointer is invalidated; on failure it is
    /// untouched and still owned by the caller.
    fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Option<NonNull<u8>>;

    /// Free a `size`-byte allocation previously returned by this allocator.
    fn deallocate(&self, ptr: NonNull<u8>, size: usize);
}

/// The default allocator: forwards to the host's global allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl CborAllocator for SystemAllocator {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return NonNull::new(ALLOC_ALIGN as *mut u8);
        }
        // SAFETY: `layout_for` always returns a layout with a nonzero,
        // power-of-two alignment, and `size` is nonzero here.
        let raw = unsafe { alloc::alloc::alloc(layout_for(size)) };
        NonNull::new(raw)
    }

    fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        if new_size == 0 {
            self.deallocate(ptr, old_size);
            return NonNull::new(ALLOC_ALIGN as *mut u8);
        }
        if old_size == 0 {
            return self.allocate(new_size);
        }
        // SAFETY: `ptr` was allocated by this allocator with `old_size` bytes
        // under `layout_for(old_size)`, and `new_size` is nonzero.
        let raw = unsafe { alloc::alloc::realloc(ptr.as_ptr(), layout_for(old_size), new_size) };
        NonNull::new(raw)
    }

    fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        if size == 0 {
            return;
        }
        // SAFETY: `ptr` was allocated by this allocator with `size` bytes
        // under `layout_for(size)`.
        unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout_for(size)) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_allocator_round_trips() {
        let a = SystemAllocator;
        let p = a.allocate(32).expect("allocate");
        let p = a.reallocate(p, 32, 128).expect("grow");
        let p = a.reallocate(p, 128, 8).expect("shrink");
        a.deallocate(p, 8);
    }

    #[test]
    fn system_allocator_handles_zero_size() {
        let a = SystemAllocator;
        let p = a.allocate(0).expect("zero-size allocate");
        a.deallocate(p, 0);
    }
}
