//! Factory boundary: the external supplier and reclaimer of raw blocks
//!
//! A [`Pool`](crate::pool::Pool) never talks to the operating system. Every
//! raw buffer it manages is acquired from, and returned to, a
//! [`BlockFactory`]. A factory may pool or cache buffers transparently; the
//! pool only relies on the acquire/release contract below.

use std::alloc::{Layout, alloc, dealloc};
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::{MemoryError, Result};

/// Hook invoked when an allocation request cannot be satisfied even after
/// attempting growth.
///
/// Receives the pool's diagnostic name and the requested size. It runs
/// synchronously on the allocating context and is handed no pool reference,
/// so it cannot allocate from the failing pool. It must not panic across
/// the pool boundary.
pub type OverflowHandler = Arc<dyn Fn(&str, usize)>;

/// Minimum alignment of buffers handed out by [`SystemFactory`].
///
/// Pools align each allocation against absolute addresses, so correctness
/// never depends on the buffer's own alignment; 16 keeps the common case
/// padding-free.
pub const FACTORY_ALIGNMENT: usize = 16;

/// Supplier and reclaimer of raw memory blocks.
///
/// Whether an implementation is thread-safe is its own contract; the pool
/// itself is single-threaded and does not police it.
pub trait BlockFactory {
    /// Returns a buffer of at least `size` bytes, or fails (for example
    /// when the backing memory is exhausted).
    fn acquire_block(&self, size: usize) -> Result<NonNull<u8>>;

    /// Releases a buffer previously returned by [`acquire_block`].
    ///
    /// An implementation may be a no-op only if the memory stays valid for
    /// the process lifetime (a static, bump-only environment); that is a
    /// property the implementation states, not one the pool assumes.
    ///
    /// # Safety
    ///
    /// `buffer` must have been returned by `acquire_block` on this same
    /// factory with this exact `size`, and must not be released twice.
    ///
    /// [`acquire_block`]: BlockFactory::acquire_block
    unsafe fn release_block(&self, buffer: NonNull<u8>, size: usize);

    /// Handler used by pools created without an explicit overflow handler.
    ///
    /// The default logs a warning; implementations may abort, raise an
    /// alarm, or stay silent.
    fn default_overflow_handler(&self) -> OverflowHandler {
        Arc::new(|pool: &str, requested: usize| {
            tracing::warn!(pool, requested, "pool allocation failed");
        })
    }
}

/// [`BlockFactory`] backed by the global allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFactory;

impl SystemFactory {
    fn layout(size: usize) -> Result<Layout> {
        Layout::from_size_align(size, FACTORY_ALIGNMENT)
            .map_err(|_| MemoryError::invalid_config("block size exceeds address space"))
    }
}

impl BlockFactory for SystemFactory {
    fn acquire_block(&self, size: usize) -> Result<NonNull<u8>> {
        debug_assert!(size > 0);
        let layout = Self::layout(size)?;

        // SAFETY: layout has non-zero size and a valid power-of-two
        // alignment; a null return is handled below.
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr).ok_or_else(|| MemoryError::out_of_memory(size, 0))
    }

    unsafe fn release_block(&self, buffer: NonNull<u8>, size: usize) {
        // SAFETY: per the trait contract, buffer came from acquire_block
        // with this exact size, so the layout matches the allocation.
        unsafe {
            dealloc(
                buffer.as_ptr(),
                Layout::from_size_align_unchecked(size, FACTORY_ALIGNMENT),
            );
        }
    }
}
