//! # Core Error Types
//!
//! Errors raised while constructing or addressing shared memory.
//!
//! Every variant here is a *configuration* error: continuing after one of
//! them would corrupt a layout that another thread re-derives independently,
//! so callers propagate them up to the bootstrap and stop.

use thiserror::Error;

/// Errors from the triple buffer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// A triple buffer was requested with zero bytes per slot.
    #[error("triple buffer capacity must be greater than zero")]
    ZeroCapacity,

    /// The source does not fit into the write buffer.
    #[error("write of {len} bytes overflows triple buffer slot of {capacity} bytes")]
    Overflow {
        /// Length of the rejected source.
        len: usize,
        /// Bytes available per slot.
        capacity: usize,
    },
}

/// Errors from the cursor buffer layout allocator.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// A cursor buffer was requested with zero bytes.
    #[error("cursor buffer capacity must be greater than zero")]
    ZeroCapacity,

    /// A view would extend past the end of the arena.
    #[error("view of {requested} bytes at offset {offset} exceeds arena capacity of {capacity} bytes")]
    OutOfBounds {
        /// Aligned offset the view would start at.
        offset: usize,
        /// Bytes the view needs.
        requested: usize,
        /// Total arena capacity.
        capacity: usize,
    },

    /// A view was resolved against bytes that do not carry its layout.
    #[error("view at offset {offset} ({len} bytes) does not fit a {available}-byte region")]
    LayoutMismatch {
        /// Offset of the view.
        offset: usize,
        /// Byte length of the view.
        len: usize,
        /// Length of the region it was resolved against.
        available: usize,
    },

    /// The region a view was resolved against is not aligned for its element type.
    #[error("view at offset {offset} is misaligned for its element type")]
    Misaligned {
        /// Offset of the view.
        offset: usize,
    },
}

/// Result type for triple buffer operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for layout operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
