//! # TRIAD Core
//!
//! Lock-free sharing primitives for a three-thread engine:
//! - [`TripleBuffer`]: wait-free snapshots from the game thread to the render thread
//! - [`CursorBuffer`]: deterministic typed layouts over shared bytes
//! - [`EntityArena`]: generational entity handles
//!
//! ## Architecture Rules
//!
//! 1. **No locks on the frame path** - threads exchange bytes, never borrow each other's state
//! 2. **Layouts are replayed, not shared** - both sides derive identical views
//! 3. **Sizing errors are fatal** - they are reported once at startup
//!
//! ## Example
//!
//! ```rust
//! use triad_core::{CursorBuffer, TripleBuffer};
//!
//! let (mut writer, mut reader) = TripleBuffer::new(64).unwrap();
//!
//! let mut layout = CursorBuffer::new(64).unwrap();
//! let count = layout.add_view::<u32>(1).unwrap();
//! layout.get_mut(&count).unwrap()[0] = 3;
//!
//! writer.publish(layout.as_bytes()).unwrap();
//! assert!(reader.swap_read_buffer());
//! assert_eq!(count.resolve(reader.read_view()).unwrap(), &[3]);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod entity;
pub mod error;
pub mod memory;
pub mod sync;

pub use entity::{EntityArena, EntityId};
pub use error::{MemoryError, MemoryResult, SyncError, SyncResult};
pub use memory::{ArrayView, CursorBuffer, View};
pub use sync::{SharedCounter, TripleBuffer, TripleBufferReader, TripleBufferWriter};
