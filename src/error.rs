//! Error types for pool operations

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Memory pool errors
///
/// Allocation failure is always reported as a value, never a panic: policy
/// (log, abort, propagate) belongs to the caller and the overflow handler.
/// The one exception is a sizing-arithmetic invariant breach inside the
/// pool, which panics instead of looping on a retry that cannot succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// The factory could not supply a block, or growth is disabled and
    /// every existing block is full.
    #[error("out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Bytes the caller asked for.
        requested: usize,
        /// Bytes still free across the pool's blocks at the time of failure.
        available: usize,
    },

    /// Alignment is not a power of two.
    #[error("invalid alignment: {value} is not a power of two")]
    InvalidAlignment {
        /// The rejected alignment value.
        value: usize,
    },

    /// Pool configuration rejected at creation.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        message: String,
    },
}

impl MemoryError {
    /// Create an out of memory error
    pub fn out_of_memory(requested: usize, available: usize) -> Self {
        Self::OutOfMemory {
            requested,
            available,
        }
    }

    /// Create an invalid alignment error
    pub fn invalid_alignment(value: usize) -> Self {
        Self::InvalidAlignment { value }
    }

    /// Create a configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
