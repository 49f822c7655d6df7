//! # Synchronization Primitives
//!
//! Lock-free state sharing between the game, render and main threads.
//!
//! - [`TripleBuffer`]: one writer, one reader, last write wins.
//! - [`SharedCounter`]: monotonically increasing ids from any thread.

mod counter;
mod triple_buffer;

pub use counter::SharedCounter;
pub use triple_buffer::{
    BufferFlags, TripleBuffer, TripleBufferReader, TripleBufferWriter, DEFAULT_SLOT_BYTES,
};
