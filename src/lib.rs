//! Region memory pools for real-time session workloads
//!
//! This crate provides a region (arena) allocator built for stacks that
//! allocate many short-lived or session-scoped objects: near-zero
//! per-allocation overhead, no individual deallocation, and bulk
//! reclamation when the session ends.
//!
//! - [`Pool`]: an ordered set of memory blocks with a bump cursor each;
//!   allocation is O(1), reclamation is [`Pool::reset`] or drop
//! - [`BlockFactory`]: the boundary through which all raw memory is
//!   acquired and released; [`SystemFactory`] backs it with the global
//!   allocator
//! - [`PoolConfig`]: seed size, growth increment, alignment, search bound,
//!   overflow handler
//!
//! Pools are single-threaded by design (`!Send`); compose synchronization
//! externally where several threads need pooled memory.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rtpool::{Pool, PoolConfig, SystemFactory};
//!
//! fn main() -> rtpool::Result<()> {
//!     let factory = Arc::new(SystemFactory);
//!     let mut pool = Pool::new(
//!         factory,
//!         "invite-session-%p",
//!         PoolConfig::new().with_initial_size(4096).with_increment_size(4096),
//!     )?;
//!
//!     let header = pool.alloc_str("SIP/2.0 200 OK")?;
//!     let scratch = pool.alloc_bytes(1500)?;
//!     let _ = (header, scratch);
//!
//!     pool.reset(); // transaction done: reclaim everything at once
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod factory;
pub mod pool;
pub mod utils;

pub use error::{MemoryError, Result};
pub use factory::{BlockFactory, FACTORY_ALIGNMENT, OverflowHandler, SystemFactory};
pub use pool::{
    BLOCK_HEADER_SIZE, DEFAULT_ALIGNMENT, MAX_NAME_LEN, MIN_INITIAL_SIZE, POOL_HEADER_SIZE, Pool,
    PoolConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
