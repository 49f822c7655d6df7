//! # Memory Layout
//!
//! Shared byte arenas carved into typed views.
//!
//! ## Design Philosophy
//!
//! Arenas are sized once at startup. During a frame:
//! - No heap allocations
//! - Views are plain descriptors that both threads can compute independently
//! - Element types are `bytemuck::Pod`, so a view over foreign bytes is sound

mod cursor_buffer;

pub use cursor_buffer::{ArrayView, CursorBuffer, View};
