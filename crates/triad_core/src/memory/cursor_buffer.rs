//! # Cursor Buffer
//!
//! A bump-pointer layout allocator over one contiguous byte arena.
//!
//! Views are *descriptors* (offset + element count), not borrows. The game
//! thread and the render thread each replay the same sequence of
//! `add_view` calls, get identical descriptors, and resolve them against
//! their own side of a [`TripleBuffer`](crate::sync::TripleBuffer):
//!
//! ```text
//!  cursor ─────────────────────────────────────────────▶
//!  ┌──────────────┬──┬───┬──────────────────┬──────────┐
//!  │ positions f32│u8│pad│   ids u32        │  unused  │
//!  └──────────────┴──┴───┴──────────────────┴──────────┘
//!  0             12  13  16                 32
//! ```
//!
//! Each view starts at the cursor rounded up to its element's natural
//! alignment (4 for 32-bit, 8 for 64-bit). Layout is append-only; there is
//! no per-view free.

use std::marker::PhantomData;
use std::mem::{align_of, size_of};

use bytemuck::Pod;

use crate::error::{MemoryError, MemoryResult};

/// Typed window into a byte arena.
pub struct View<T> {
    offset: usize,
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for View<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for View<T> {}

impl<T> std::fmt::Debug for View<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> PartialEq for View<T> {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset && self.len == other.len
    }
}

impl<T> Eq for View<T> {}

impl<T: Pod> View<T> {
    /// Byte offset from the start of the arena.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the view holds no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Length in bytes.
    #[inline]
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.len * size_of::<T>()
    }

    /// Resolves the view against any byte region laid out the same way.
    pub fn resolve<'a>(&self, bytes: &'a [u8]) -> MemoryResult<&'a [T]> {
        let region = bytes
            .get(self.offset..self.offset + self.byte_len())
            .ok_or_else(|| self.mismatch(bytes.len()))?;
        bytemuck::try_cast_slice(region).map_err(|_| MemoryError::Misaligned {
            offset: self.offset,
        })
    }

    /// Mutable counterpart of [`resolve`](Self::resolve).
    pub fn resolve_mut<'a>(&self, bytes: &'a mut [u8]) -> MemoryResult<&'a mut [T]> {
        let available = bytes.len();
        let region = bytes
            .get_mut(self.offset..self.offset + self.byte_len())
            .ok_or_else(|| self.mismatch(available))?;
        bytemuck::try_cast_slice_mut(region).map_err(|_| MemoryError::Misaligned {
            offset: self.offset,
        })
    }

    fn mismatch(&self, available: usize) -> MemoryError {
        MemoryError::LayoutMismatch {
            offset: self.offset,
            len: self.byte_len(),
            available,
        }
    }
}

/// A view split into fixed-size records ("array of arrays").
///
/// `stride` elements per record, `count` records, laid out back to back.
#[derive(Debug, PartialEq, Eq)]
pub struct ArrayView<T> {
    view: View<T>,
    stride: usize,
}

impl<T> Clone for ArrayView<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArrayView<T> {}

impl<T: Pod> ArrayView<T> {
    /// The flat view underneath.
    #[inline]
    #[must_use]
    pub const fn flat(&self) -> View<T> {
        self.view
    }

    /// Elements per record.
    #[inline]
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Number of records.
    #[inline]
    #[must_use]
    pub const fn count(&self) -> usize {
        self.view.len / self.stride
    }

    /// Resolves into an iterator of records.
    pub fn resolve<'a>(&self, bytes: &'a [u8]) -> MemoryResult<std::slice::ChunksExact<'a, T>> {
        Ok(self.view.resolve(bytes)?.chunks_exact(self.stride))
    }

    /// Resolves into an iterator of mutable records.
    pub fn resolve_mut<'a>(
        &self,
        bytes: &'a mut [u8],
    ) -> MemoryResult<std::slice::ChunksExactMut<'a, T>> {
        Ok(self.view.resolve_mut(bytes)?.chunks_exact_mut(self.stride))
    }

    /// One record by index.
    pub fn record<'a>(&self, bytes: &'a [u8], index: usize) -> MemoryResult<Option<&'a [T]>> {
        Ok(self.resolve(bytes)?.nth(index))
    }
}

/// Bump-pointer layout allocator over an owned byte arena.
///
/// # Example
///
/// ```rust
/// use triad_core::CursorBuffer;
///
/// let mut layout = CursorBuffer::new(64).unwrap();
/// let positions = layout.add_view::<f32>(3).unwrap();
/// let flags = layout.add_view::<u8>(1).unwrap();
/// let ids = layout.add_view::<u32>(4).unwrap();
///
/// assert_eq!(positions.offset(), 0);
/// assert_eq!(flags.offset(), 12);
/// assert_eq!(ids.offset(), 16);
/// ```
pub struct CursorBuffer {
    /// Word-backed so every offset up to 8-byte alignment is honoured.
    storage: Box<[u64]>,
    capacity: usize,
    cursor: usize,
}

impl CursorBuffer {
    /// Creates a zeroed arena of `capacity` bytes.
    ///
    /// # Errors
    ///
    /// [`MemoryError::ZeroCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> MemoryResult<Self> {
        if capacity == 0 {
            return Err(MemoryError::ZeroCapacity);
        }
        Ok(Self {
            storage: vec![0u64; capacity.div_ceil(8)].into_boxed_slice(),
            capacity,
            cursor: 0,
        })
    }

    /// Total capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes consumed so far, padding included.
    #[inline]
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes left after the cursor.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.capacity - self.cursor
    }

    /// Reserves `count` elements of `T` at the next aligned offset.
    ///
    /// # Errors
    ///
    /// [`MemoryError::OutOfBounds`] if the view does not fit. The cursor is
    /// left untouched.
    pub fn add_view<T: Pod>(&mut self, count: usize) -> MemoryResult<View<T>> {
        let align = align_of::<T>();
        let offset = (self.cursor + align - 1) & !(align - 1);
        let requested = count.checked_mul(size_of::<T>()).unwrap_or(usize::MAX);
        let end = offset.checked_add(requested).unwrap_or(usize::MAX);

        if end > self.capacity {
            return Err(MemoryError::OutOfBounds {
                offset,
                requested,
                capacity: self.capacity,
            });
        }

        self.cursor = end;
        Ok(View {
            offset,
            len: count,
            _marker: PhantomData,
        })
    }

    /// Reserves a view sized to `defaults` and fills it with them.
    pub fn add_view_with<T: Pod>(&mut self, defaults: &[T]) -> MemoryResult<View<T>> {
        let view = self.add_view::<T>(defaults.len())?;
        view.resolve_mut(self.as_bytes_mut())?
            .copy_from_slice(defaults);
        Ok(view)
    }

    /// Reserves `count` records of `stride` elements each.
    ///
    /// # Panics
    ///
    /// Panics if `stride` is zero.
    pub fn add_view_array<T: Pod>(&mut self, stride: usize, count: usize) -> MemoryResult<ArrayView<T>> {
        assert!(stride > 0, "array view stride must be non-zero");
        let view = self.add_view::<T>(stride.saturating_mul(count))?;
        Ok(ArrayView { view, stride })
    }

    /// `count` three-component float vectors.
    pub fn add_vector3_array(&mut self, count: usize) -> MemoryResult<ArrayView<f32>> {
        self.add_view_array(3, count)
    }

    /// `count` four-component float vectors (quaternions, colours).
    pub fn add_vector4_array(&mut self, count: usize) -> MemoryResult<ArrayView<f32>> {
        self.add_view_array(4, count)
    }

    /// `count` column-major 4x4 float matrices.
    pub fn add_matrix4_array(&mut self, count: usize) -> MemoryResult<ArrayView<f32>> {
        self.add_view_array(16, count)
    }

    /// Resolves a view against this arena.
    pub fn get<T: Pod>(&self, view: &View<T>) -> MemoryResult<&[T]> {
        view.resolve(self.as_bytes())
    }

    /// Resolves a view mutably against this arena.
    pub fn get_mut<T: Pod>(&mut self, view: &View<T>) -> MemoryResult<&mut [T]> {
        view.resolve_mut(self.as_bytes_mut())
    }

    /// Zeroes every byte below the cursor. Views stay valid.
    pub fn clear(&mut self) {
        let cursor = self.cursor;
        self.as_bytes_mut()[..cursor].fill(0);
    }

    /// Discards all views and rewinds the cursor.
    ///
    /// Descriptors handed out before the reset still resolve, but will alias
    /// whatever is laid out next.
    pub fn reset(&mut self) {
        self.clear();
        self.cursor = 0;
    }

    /// The whole arena, `capacity` bytes long.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.storage)[..self.capacity]
    }

    /// The whole arena, mutably.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let capacity = self.capacity;
        &mut bytemuck::cast_slice_mut(&mut self.storage)[..capacity]
    }

    /// The used prefix of the arena, `cursor` bytes long.
    #[inline]
    #[must_use]
    pub fn used_bytes(&self) -> &[u8] {
        &self.as_bytes()[..self.cursor]
    }
}
