//! A single contiguous memory span with a bump cursor
//!
//! Blocks never acquire or release memory themselves; the owning pool does
//! both through its factory. A block only carves aligned regions out of the
//! span it was given, in O(1), by advancing a cursor.

use std::ptr::NonNull;

use crate::utils::padding_needed;

/// One factory buffer managed by a pool.
///
/// The usable span starts at `buf`, after the reserved header span, and the
/// cursor satisfies `buf <= cur <= end` for the block's whole lifetime.
/// `size` is the full buffer size as acquired, which is also the exact size
/// the buffer must be released with.
pub(crate) struct Block {
    ptr: NonNull<u8>,
    size: usize,
    buf: *mut u8,
    end: *mut u8,
    cur: *mut u8,
}

impl Block {
    /// Wraps a factory buffer, reserving `reserved` bytes at its head.
    ///
    /// The caller guarantees `ptr` is valid for `size` bytes and that
    /// `reserved <= size`.
    pub(crate) fn new(ptr: NonNull<u8>, size: usize, reserved: usize) -> Self {
        debug_assert!(reserved <= size);

        // SAFETY: ptr is valid for size bytes and reserved <= size, so both
        // offsets stay within (or one past) the allocation.
        let (buf, end) = unsafe { (ptr.as_ptr().add(reserved), ptr.as_ptr().add(size)) };

        Self {
            ptr,
            size,
            buf,
            end,
            // The cursor starts unaligned; alignment is applied per request.
            cur: buf,
        }
    }

    /// Carves `size` bytes at the first `alignment`-multiple address at or
    /// past the cursor.
    ///
    /// Returns `None` without side effects when the remaining span cannot
    /// fit the request after alignment padding. Never acquires memory.
    #[inline]
    pub(crate) fn alloc(&mut self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        debug_assert!(alignment.is_power_of_two());

        let padding = padding_needed(self.cur as usize, alignment);
        let available = self.available();
        if padding > available || size > available - padding {
            return None;
        }

        // SAFETY: padding + size <= available, so both offsets stay within
        // (or one past) the span, and the cursor of a live allocation is
        // never null.
        let ptr = unsafe { NonNull::new_unchecked(self.cur.add(padding)) };
        self.cur = unsafe { ptr.as_ptr().add(size) };
        Some(ptr)
    }

    /// Bytes handed out from this block so far (alignment padding included).
    #[inline]
    pub(crate) fn used(&self) -> usize {
        self.cur as usize - self.buf as usize
    }

    /// Bytes between the cursor and the end of the span.
    #[inline]
    pub(crate) fn available(&self) -> usize {
        self.end as usize - self.cur as usize
    }

    /// Moves the cursor back to the start of the usable span, invalidating
    /// every address previously returned by [`alloc`](Block::alloc).
    #[inline]
    pub(crate) fn rewind(&mut self) {
        self.cur = self.buf;
    }

    /// Start of the underlying factory buffer.
    #[inline]
    pub(crate) fn base(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Full buffer size as acquired from the factory.
    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.size
    }
}
