//! The pool: block list, bounded search, growth, and bulk reclamation
//!
//! # Safety
//!
//! Single-threaded bump allocation with interior mutability:
//! - RefCell for the block list (runtime borrow checking)
//! - Cell for the running capacity
//! - `alloc*` take `&self`; `reset` takes `&mut self`, so the borrow
//!   checker rules out typed allocations outliving a reset
//! - Raw pointers make the pool `!Send + !Sync` by construction
//!
//! ## Invariants
//!
//! - The block list is never empty; index 0 is the seed block
//! - Blocks are searched newest to oldest (the newest is the emptiest)
//! - Capacity is the sum of all block sizes, headers included
//! - No operation leaves partial state behind on failure

use std::cell::{Cell, RefCell};
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use tracing::trace;

use super::{BLOCK_HEADER_SIZE, Block, DEFAULT_ALIGNMENT, MAX_NAME_LEN, POOL_HEADER_SIZE, PoolConfig};
use crate::error::{MemoryError, Result};
use crate::factory::{BlockFactory, OverflowHandler};

/// Computes the buffer size for a grown block.
///
/// The pool grows by at least one increment; when the increment cannot host
/// `BLOCK_HEADER_SIZE + (alignment - 1) + size`, the result is the smallest
/// multiple of the increment that can, so one growth always suffices.
/// `None` means the requirement overflows `usize`.
fn grown_block_size(increment: usize, alignment: usize, size: usize) -> Option<usize> {
    debug_assert!(increment > 0);
    debug_assert!(alignment.is_power_of_two());

    let needed = BLOCK_HEADER_SIZE
        .checked_add(alignment - 1)?
        .checked_add(size)?;

    if needed <= increment {
        Some(increment)
    } else {
        needed.div_ceil(increment).checked_mul(increment)
    }
}

/// Builds the pool's diagnostic name.
///
/// A `%p` placeholder is replaced with the seed buffer address so that many
/// pools sharing a name template stay distinguishable in logs. The result
/// is truncated to [`MAX_NAME_LEN`] bytes.
fn expand_name(name: &str, seed: *const u8) -> String {
    let mut name = if name.contains("%p") {
        name.replacen("%p", &format!("{seed:p}"), 1)
    } else {
        name.to_owned()
    };

    if name.len() > MAX_NAME_LEN {
        let mut end = MAX_NAME_LEN;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }

    name
}

/// Region memory pool with bump allocation and bulk reclamation.
///
/// Allocations are served in O(1) from the pool's blocks and are valid
/// until the next [`reset`](Pool::reset) or until the pool is dropped;
/// there is no individual free. When no block has room, the pool either
/// grows by acquiring a new block from its factory or, with growth
/// disabled, reports the failure through its overflow handler.
///
/// Dropping the pool releases every block, the seed buffer last.
pub struct Pool {
    name: String,
    factory: Arc<dyn BlockFactory>,
    /// Index 0 is the seed block; the highest index is the newest block.
    blocks: RefCell<Vec<Block>>,
    alignment: usize,
    increment_size: usize,
    max_search_blocks: usize,
    capacity: Cell<usize>,
    overflow: OverflowHandler,
}

impl Pool {
    /// Creates a pool from a validated configuration.
    ///
    /// Acquires the seed buffer of `config.initial_size` bytes from the
    /// factory. Fails with [`MemoryError::InvalidConfig`] or
    /// [`MemoryError::InvalidAlignment`] on a bad configuration, or with
    /// the factory's error when the seed buffer cannot be acquired (the
    /// overflow handler is not yet bound at that point and is not invoked).
    pub fn new(factory: Arc<dyn BlockFactory>, name: &str, config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let alignment = if config.alignment == 0 {
            DEFAULT_ALIGNMENT
        } else {
            config.alignment
        };
        let overflow = match &config.overflow_handler {
            Some(handler) => Arc::clone(handler),
            None => factory.default_overflow_handler(),
        };

        let seed = factory.acquire_block(config.initial_size)?;
        let name = expand_name(name, seed.as_ptr());

        // The seed buffer hosts the pool's reserved control span plus the
        // first block; both are released together, only on drop.
        let block = Block::new(seed, config.initial_size, POOL_HEADER_SIZE + BLOCK_HEADER_SIZE);

        trace!(pool = %name, size = config.initial_size, "pool created");

        Ok(Self {
            name,
            factory,
            blocks: RefCell::new(vec![block]),
            alignment,
            increment_size: config.increment_size,
            max_search_blocks: config.max_search_blocks,
            capacity: Cell::new(config.initial_size),
            overflow,
        })
    }

    /// Creates a pool with the given sizes and default alignment.
    pub fn create(
        factory: Arc<dyn BlockFactory>,
        name: &str,
        initial_size: usize,
        increment_size: usize,
    ) -> Result<Self> {
        Self::new(
            factory,
            name,
            PoolConfig::new()
                .with_initial_size(initial_size)
                .with_increment_size(increment_size),
        )
    }

    /// Allocates `size` bytes at the pool's alignment.
    ///
    /// The address is valid until the next [`reset`](Pool::reset) or until
    /// the pool is dropped. On failure the overflow handler has been
    /// invoked and the pool is unchanged.
    pub fn alloc_bytes(&self, size: usize) -> Result<NonNull<u8>> {
        self.allocate_find(size, self.alignment)
    }

    /// Allocates `size` bytes at an explicit power-of-two alignment
    /// (0 means the pool's alignment).
    pub fn alloc_bytes_aligned(&self, size: usize, alignment: usize) -> Result<NonNull<u8>> {
        let alignment = if alignment == 0 {
            self.alignment
        } else {
            alignment
        };
        if !alignment.is_power_of_two() {
            return Err(MemoryError::invalid_alignment(alignment));
        }
        self.allocate_find(size, alignment)
    }

    /// Allocates `size` zero-filled bytes at the pool's alignment.
    pub fn alloc_bytes_zeroed(&self, size: usize) -> Result<NonNull<u8>> {
        let ptr = self.alloc_bytes(size)?;
        // SAFETY: ptr was just carved for exactly size bytes and nothing
        // else references the region yet.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Ok(ptr)
    }

    /// Allocates and initializes a value.
    ///
    /// The value's `Drop` is never run: reclamation is bulk-only, so `T`
    /// should not own resources beyond pool memory.
    #[must_use = "allocated memory must be used"]
    pub fn alloc<T>(&self, value: T) -> Result<&mut T> {
        let ptr =
            self.alloc_bytes_aligned(mem::size_of::<T>(), mem::align_of::<T>())?.as_ptr() as *mut T;

        // SAFETY: ptr is aligned for T and spans size_of::<T>() bytes;
        // write moves the value in, after which the memory is a valid T.
        // The reference borrows self, so reset (&mut self) and drop both
        // end it.
        unsafe {
            ptr.write(value);
            Ok(&mut *ptr)
        }
    }

    /// Allocates and copies a slice.
    #[must_use = "allocated memory must be used"]
    pub fn alloc_slice<T: Copy>(&self, slice: &[T]) -> Result<&mut [T]> {
        if slice.is_empty() {
            return Ok(&mut []);
        }

        let ptr =
            self.alloc_bytes_aligned(mem::size_of_val(slice), mem::align_of::<T>())?.as_ptr()
                as *mut T;

        // SAFETY: ptr is a fresh region aligned for T with room for
        // slice.len() elements; source and destination cannot overlap.
        unsafe {
            ptr::copy_nonoverlapping(slice.as_ptr(), ptr, slice.len());
            Ok(&mut *ptr::slice_from_raw_parts_mut(ptr, slice.len()))
        }
    }

    /// Allocates a copy of a string.
    #[must_use = "allocated memory must be used"]
    pub fn alloc_str(&self, s: &str) -> Result<&str> {
        let bytes = self.alloc_slice(s.as_bytes())?;
        // SAFETY: bytes is an exact copy of valid UTF-8.
        unsafe { Ok(std::str::from_utf8_unchecked(bytes)) }
    }

    /// Releases every block except the seed and rewinds the seed cursor.
    ///
    /// Idempotent. Capacity returns to the seed buffer's size. All
    /// addresses previously returned by allocation are invalid afterwards;
    /// taking `&mut self` makes that statically true for the typed
    /// helpers, while raw `alloc_bytes*` callers carry the hazard
    /// themselves.
    pub fn reset(&mut self) {
        trace!(
            pool = %self.name,
            capacity = self.capacity.get(),
            used = self.used_size(),
            "reset"
        );

        let blocks = self.blocks.get_mut();
        while blocks.len() > 1 {
            if let Some(block) = blocks.pop() {
                // SAFETY: block.base() was acquired from this factory with
                // exactly block.size() bytes, and popping it is the only
                // release.
                unsafe { self.factory.release_block(block.base(), block.size()) };
            }
        }

        if let Some(seed) = blocks.first_mut() {
            seed.rewind();
            self.capacity.set(seed.size());
        }
    }

    /// Total bytes acquired from the factory, reserved header spans
    /// included. Grows with each added block; falls back to the seed size
    /// on [`reset`](Pool::reset).
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Bytes handed out since creation or the last reset, alignment
    /// padding included. Never exceeds [`capacity`](Pool::capacity).
    pub fn used_size(&self) -> usize {
        self.blocks.borrow().iter().map(Block::used).sum()
    }

    /// Number of blocks currently owned by the pool (at least 1).
    pub fn block_count(&self) -> usize {
        self.blocks.borrow().len()
    }

    /// The pool's diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Alignment applied to allocations made without an explicit one.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Growth increment; 0 means the pool is fixed-capacity.
    pub fn increment_size(&self) -> usize {
        self.increment_size
    }

    /// Searches the blocks newest-first, growing the pool when none fits.
    fn allocate_find(&self, size: usize, alignment: usize) -> Result<NonNull<u8>> {
        {
            let mut blocks = self.blocks.borrow_mut();
            let searched = if self.max_search_blocks == 0 {
                blocks.len()
            } else {
                self.max_search_blocks
            };

            for block in blocks.iter_mut().rev().take(searched) {
                if let Some(ptr) = block.alloc(size, alignment) {
                    return Ok(ptr);
                }
            }
        }

        self.grow_and_alloc(size, alignment)
    }

    /// Acquires a new block sized for the request and allocates from it.
    fn grow_and_alloc(&self, size: usize, alignment: usize) -> Result<NonNull<u8>> {
        if self.increment_size == 0 {
            trace!(
                pool = %self.name,
                requested = size,
                used = self.used_size(),
                capacity = self.capacity.get(),
                "cannot expand fixed-capacity pool"
            );
            return self.fail(size);
        }

        let Some(block_size) = grown_block_size(self.increment_size, alignment, size) else {
            return self.fail(size);
        };

        trace!(
            pool = %self.name,
            requested = size,
            grow_by = block_size,
            used = self.used_size(),
            capacity = self.capacity.get(),
            "resizing pool"
        );

        let buffer = match self.factory.acquire_block(block_size) {
            Ok(buffer) => buffer,
            Err(_) => return self.fail(size),
        };

        let mut block = Block::new(buffer, block_size, BLOCK_HEADER_SIZE);
        // The sizing above guarantees the fresh block fits the request; a
        // miss here is a sizing-arithmetic bug, and retrying would loop.
        let Some(ptr) = block.alloc(size, alignment) else {
            panic!(
                "pool '{}': grown block of {block_size} bytes cannot satisfy \
                 {size} bytes at alignment {alignment}",
                self.name
            );
        };

        self.blocks.borrow_mut().push(block);
        self.capacity.set(self.capacity.get() + block_size);

        Ok(ptr)
    }

    /// Reports an unsatisfiable request: overflow handler, then the error.
    fn fail(&self, requested: usize) -> Result<NonNull<u8>> {
        (self.overflow)(&self.name, requested);
        let available = self.blocks.borrow().iter().map(Block::available).sum();
        Err(MemoryError::out_of_memory(requested, available))
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        trace!(
            pool = %self.name,
            capacity = self.capacity.get(),
            used = self.used_size(),
            "destroy"
        );

        // Newest blocks first; the seed buffer, which also carries the
        // pool's reserved control span, goes back last as a single release.
        let blocks = self.blocks.get_mut();
        while let Some(block) = blocks.pop() {
            // SAFETY: every block's buffer came from this factory's
            // acquire_block with exactly block.size() bytes, and the list
            // is drained once.
            unsafe { self.factory.release_block(block.base(), block.size()) };
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("capacity", &self.capacity.get())
            .field("used", &self.used_size())
            .field("blocks", &self.block_count())
            .field("alignment", &self.alignment)
            .field("increment_size", &self.increment_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::SystemFactory;
    use crate::pool::MIN_INITIAL_SIZE;
    use crate::utils::is_aligned_ptr;
    use std::cell::Cell as StdCell;

    fn pool(config: PoolConfig) -> Pool {
        Pool::new(Arc::new(SystemFactory), "test", config).unwrap()
    }

    #[test]
    fn grown_size_uses_increment_when_it_fits() {
        // needed = 32 + 7 + 100 = 139 <= 4096
        assert_eq!(grown_block_size(4096, 8, 100), Some(4096));
    }

    #[test]
    fn grown_size_scales_to_smallest_multiple() {
        // needed = 32 + 7 + 100 = 139, so three 64-byte increments.
        assert_eq!(grown_block_size(64, 8, 100), Some(192));
        // needed = 32 + 0 + 33 = 65, just past one increment.
        assert_eq!(grown_block_size(64, 1, 33), Some(128));
    }

    #[test]
    fn grown_size_exact_multiple_boundary() {
        // needed = 32 + 7 + 89 = 128: exactly two increments, not three.
        assert_eq!(grown_block_size(64, 8, 89), Some(128));
        // needed = 32 + 0 + 32 = 64: exactly one increment.
        assert_eq!(grown_block_size(64, 1, 32), Some(64));
    }

    #[test]
    fn grown_size_rejects_overflow() {
        assert_eq!(grown_block_size(64, 1, usize::MAX), None);
        assert_eq!(grown_block_size(64, 1 << 63, usize::MAX - 100), None);
    }

    #[test]
    fn name_placeholder_is_expanded() {
        let pool = Pool::new(
            Arc::new(SystemFactory),
            "media-%p",
            PoolConfig::default(),
        )
        .unwrap();
        assert!(pool.name().starts_with("media-0x"));
        assert!(!pool.name().contains("%p"));
    }

    #[test]
    fn name_is_truncated() {
        let long = "x".repeat(MAX_NAME_LEN + 20);
        let pool = Pool::new(Arc::new(SystemFactory), &long, PoolConfig::default()).unwrap();
        assert_eq!(pool.name().len(), MAX_NAME_LEN);
    }

    #[test]
    fn create_rejects_bad_config() {
        let factory: Arc<dyn BlockFactory> = Arc::new(SystemFactory);

        let err = Pool::new(
            Arc::clone(&factory),
            "bad",
            PoolConfig::new().with_initial_size(MIN_INITIAL_SIZE - 1),
        )
        .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidConfig { .. }));

        let err = Pool::new(
            Arc::clone(&factory),
            "bad",
            PoolConfig::new().with_alignment(12),
        )
        .unwrap_err();
        assert_eq!(err, MemoryError::invalid_alignment(12));
    }

    #[test]
    fn allocations_are_aligned_and_disjoint() {
        let pool = pool(PoolConfig::default());

        let a = pool.alloc_bytes(100).unwrap();
        let b = pool.alloc_bytes(100).unwrap();

        assert!(is_aligned_ptr(a.as_ptr(), pool.alignment()));
        assert!(is_aligned_ptr(b.as_ptr(), pool.alignment()));

        let (a, b) = (a.as_ptr() as usize, b.as_ptr() as usize);
        assert!(a + 100 <= b || b + 100 <= a);
    }

    #[test]
    fn explicit_alignment_overrides_pool_alignment() {
        let pool = pool(PoolConfig::default());

        pool.alloc_bytes(3).unwrap();
        let p = pool.alloc_bytes_aligned(16, 64).unwrap();
        assert!(is_aligned_ptr(p.as_ptr(), 64));

        // 0 falls back to the pool's alignment.
        let p = pool.alloc_bytes_aligned(16, 0).unwrap();
        assert!(is_aligned_ptr(p.as_ptr(), pool.alignment()));

        assert_eq!(
            pool.alloc_bytes_aligned(16, 12).unwrap_err(),
            MemoryError::invalid_alignment(12)
        );
    }

    #[test]
    fn used_size_counts_padding() {
        let pool = pool(PoolConfig::default().with_alignment(8));

        pool.alloc_bytes(1).unwrap();
        pool.alloc_bytes(1).unwrap();
        // Each 1-byte request occupies a full 8-byte slot ahead of the next.
        assert_eq!(pool.used_size(), 9);
        assert!(pool.used_size() <= pool.capacity());
    }

    #[test]
    fn growth_adds_capacity() {
        let pool = pool(
            PoolConfig::new()
                .with_initial_size(512)
                .with_increment_size(512),
        );
        assert_eq!(pool.capacity(), 512);
        assert_eq!(pool.block_count(), 1);

        // Larger than the seed's usable span: forces one new block.
        pool.alloc_bytes(600).unwrap();
        assert_eq!(pool.block_count(), 2);
        assert_eq!(pool.capacity(), 512 + 1024);
    }

    #[test]
    fn zeroed_allocation_is_zero() {
        let pool = pool(PoolConfig::default());
        let ptr = pool.alloc_bytes_zeroed(64).unwrap();
        // SAFETY: ptr spans 64 freshly allocated bytes.
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 64) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn fixed_capacity_pool_reports_overflow() {
        let hits = Arc::new(StdCell::new(0usize));
        let seen = Arc::clone(&hits);

        let mut pool = pool(
            PoolConfig::new()
                .with_initial_size(256)
                .with_increment_size(0)
                .with_overflow_handler(Arc::new(move |_, _| seen.set(seen.get() + 1))),
        );

        // Usable seed span is 256 - 96 = 160 bytes.
        pool.alloc_bytes(160).unwrap();

        let capacity = pool.capacity();
        let err = pool.alloc_bytes(32).unwrap_err();
        assert!(matches!(err, MemoryError::OutOfMemory { requested: 32, .. }));
        assert_eq!(hits.get(), 1);
        assert_eq!(pool.capacity(), capacity);
        assert_eq!(pool.block_count(), 1);

        // One handler invocation per failing call.
        pool.alloc_bytes(32).unwrap_err();
        assert_eq!(hits.get(), 2);

        // Reset makes the span reusable again.
        pool.reset();
        pool.alloc_bytes(160).unwrap();
    }

    #[test]
    fn reset_restores_seed_capacity() {
        let mut pool = pool(
            PoolConfig::new()
                .with_initial_size(512)
                .with_increment_size(512),
        );

        for _ in 0..8 {
            pool.alloc_bytes(300).unwrap();
        }
        assert!(pool.block_count() > 1);
        assert!(pool.capacity() > 512);

        pool.reset();
        assert_eq!(pool.capacity(), 512);
        assert_eq!(pool.used_size(), 0);
        assert_eq!(pool.block_count(), 1);

        // Idempotent.
        pool.reset();
        assert_eq!(pool.capacity(), 512);
        assert_eq!(pool.used_size(), 0);
    }

    #[test]
    fn bounded_search_skips_older_blocks() {
        // Seed leaves 10 free bytes; three grown blocks leave 6 each.
        let config = PoolConfig::new()
            .with_initial_size(256)
            .with_increment_size(128)
            .with_alignment(1)
            .with_max_search_blocks(3);
        let pool = pool(config);

        pool.alloc_bytes(150).unwrap(); // seed: 160 usable, 10 left
        for _ in 0..3 {
            pool.alloc_bytes(90).unwrap(); // each new block: 96 usable, 6 left
        }
        assert_eq!(pool.block_count(), 4);
        let capacity = pool.capacity();

        // 8 bytes fit the seed, but the seed sits beyond the search bound:
        // the pool grows instead of finding that space.
        pool.alloc_bytes(8).unwrap();
        assert_eq!(pool.block_count(), 5);
        assert_eq!(pool.capacity(), capacity + 128);
    }

    #[test]
    fn unbounded_search_finds_oldest_block() {
        let config = PoolConfig::new()
            .with_initial_size(256)
            .with_increment_size(128)
            .with_alignment(1)
            .with_max_search_blocks(0);
        let pool = pool(config);

        pool.alloc_bytes(150).unwrap();
        for _ in 0..3 {
            pool.alloc_bytes(90).unwrap();
        }
        let capacity = pool.capacity();

        // Same layout as above, but the unbounded search reaches the seed.
        pool.alloc_bytes(8).unwrap();
        assert_eq!(pool.block_count(), 4);
        assert_eq!(pool.capacity(), capacity);
    }

    #[test]
    fn typed_helpers() {
        let pool = pool(PoolConfig::default());

        let value = pool.alloc(0x1234_5678u32).unwrap();
        assert_eq!(*value, 0x1234_5678);
        *value = 7;
        assert_eq!(*value, 7);

        let slice = pool.alloc_slice(&[1u16, 2, 3]).unwrap();
        assert_eq!(slice, &[1, 2, 3]);
        assert!(is_aligned_ptr(slice.as_ptr(), mem::align_of::<u16>()));

        let empty: &mut [u64] = pool.alloc_slice(&[]).unwrap();
        assert!(empty.is_empty());

        let s = pool.alloc_str("caller-id").unwrap();
        assert_eq!(s, "caller-id");
    }

    #[test]
    fn debug_output_names_the_pool() {
        let pool = pool(PoolConfig::default());
        let rendered = format!("{pool:?}");
        assert!(rendered.contains("\"test\""));
        assert!(rendered.contains("capacity"));
    }
}
