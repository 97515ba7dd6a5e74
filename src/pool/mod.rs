//! Region memory pools
//!
//! A [`Pool`] owns an ordered set of memory blocks and serves allocations
//! by bumping a cursor inside them, newest block first. There is no
//! individual deallocation: memory comes back only in bulk, either through
//! [`Pool::reset`] (which keeps the pool alive) or by dropping the pool.
//! Raw memory is acquired from and released to a
//! [`BlockFactory`](crate::factory::BlockFactory).
//!
//! Pools are deliberately not synchronized: one pool belongs to one thread
//! (they are `!Send`), and concurrent use is composed externally where
//! needed, keeping the hot allocation path lock-free.
//!
//! ```
//! use std::sync::Arc;
//! use rtpool::{Pool, PoolConfig, SystemFactory};
//!
//! let factory = Arc::new(SystemFactory);
//! let mut pool = Pool::new(factory, "session", PoolConfig::default()).unwrap();
//!
//! let greeting = pool.alloc_str("hello").unwrap();
//! assert_eq!(greeting, "hello");
//!
//! pool.reset(); // all prior allocations are gone
//! assert_eq!(pool.used_size(), 0);
//! ```

mod block;
#[allow(clippy::module_inception)]
mod pool;

pub(crate) use self::block::Block;
pub use self::pool::Pool;

use crate::error::{MemoryError, Result};
use crate::factory::OverflowHandler;

/// Alignment applied when a pool or a request specifies alignment 0.
pub const DEFAULT_ALIGNMENT: usize = 8;

/// Maximum length of a pool's diagnostic name, in bytes.
pub const MAX_NAME_LEN: usize = 32;

/// Span reserved at the head of the seed buffer for the pool's own
/// bookkeeping.
///
/// The pool's control data lives next to the block list rather than inside
/// the buffer, but the span is still reserved so that the seed buffer hosts
/// the control structure by construction: capacity accounting, the minimum
/// initial size, and release sizes all include it, and the whole seed
/// buffer is released as one unit when the pool is dropped.
pub const POOL_HEADER_SIZE: usize = 64;

/// Span reserved at the head of every block buffer for block bookkeeping.
///
/// Also the header term in the growth-sizing arithmetic: a new block must
/// fit `BLOCK_HEADER_SIZE + (alignment - 1) + size`.
pub const BLOCK_HEADER_SIZE: usize = 32;

/// Smallest accepted `initial_size`: the seed buffer must host the pool's
/// control span plus one block header.
pub const MIN_INITIAL_SIZE: usize = POOL_HEADER_SIZE + BLOCK_HEADER_SIZE;

/// Pool configuration
///
/// Built with chained `with_*` methods and checked by
/// [`validate`](PoolConfig::validate) (which [`Pool::new`] calls).
#[derive(Clone)]
pub struct PoolConfig {
    /// Size of the seed buffer, including [`POOL_HEADER_SIZE`] and
    /// [`BLOCK_HEADER_SIZE`].
    pub initial_size: usize,
    /// Byte count used to size new blocks when growth is needed; 0 disables
    /// growth and makes the pool fixed-capacity.
    pub increment_size: usize,
    /// Power-of-two alignment applied to every allocation; 0 means
    /// [`DEFAULT_ALIGNMENT`].
    pub alignment: usize,
    /// Upper bound on how many blocks one allocation may examine before the
    /// pool gives up and grows; 0 means unbounded. A positive bound trades
    /// utilization for a latency cap in pools with many full blocks.
    pub max_search_blocks: usize,
    /// Hook invoked on allocation failure; `None` uses the factory's
    /// default handler.
    pub overflow_handler: Option<OverflowHandler>,
}

impl PoolConfig {
    /// Creates a config with default values: a 4 KiB seed, 4 KiB growth
    /// increments, default alignment, unbounded search.
    pub fn new() -> Self {
        Self {
            initial_size: 4096,
            increment_size: 4096,
            alignment: DEFAULT_ALIGNMENT,
            max_search_blocks: 0,
            overflow_handler: None,
        }
    }

    /// Sets the seed buffer size
    #[must_use = "builder methods must be chained or built"]
    pub fn with_initial_size(mut self, size: usize) -> Self {
        self.initial_size = size;
        self
    }

    /// Sets the growth increment (0 disables growth)
    #[must_use = "builder methods must be chained or built"]
    pub fn with_increment_size(mut self, size: usize) -> Self {
        self.increment_size = size;
        self
    }

    /// Sets the pool alignment (0 for the default)
    #[must_use = "builder methods must be chained or built"]
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Bounds the per-allocation block search (0 for unbounded)
    #[must_use = "builder methods must be chained or built"]
    pub fn with_max_search_blocks(mut self, count: usize) -> Self {
        self.max_search_blocks = count;
        self
    }

    /// Sets the overflow handler
    #[must_use = "builder methods must be chained or built"]
    pub fn with_overflow_handler(mut self, handler: OverflowHandler) -> Self {
        self.overflow_handler = Some(handler);
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.initial_size < MIN_INITIAL_SIZE {
            return Err(MemoryError::invalid_config(format!(
                "initial size {} cannot host pool and block headers (minimum {})",
                self.initial_size, MIN_INITIAL_SIZE
            )));
        }

        if self.alignment != 0 && !self.alignment.is_power_of_two() {
            return Err(MemoryError::invalid_alignment(self.alignment));
        }

        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConfig")
            .field("initial_size", &self.initial_size)
            .field("increment_size", &self.increment_size)
            .field("alignment", &self.alignment)
            .field("max_search_blocks", &self.max_search_blocks)
            .field("overflow_handler", &self.overflow_handler.is_some())
            .finish()
    }
}
