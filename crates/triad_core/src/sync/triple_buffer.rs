//! # Triple Buffer
//!
//! Wait-free snapshot publishing from one writer thread to one reader thread.
//!
//! ## Safety Note
//!
//! The slots are plain memory shared between two threads. The only thing
//! standing between them is the flags word, so this module needs unsafe
//! code to hand out slot slices. All unsafe blocks are documented.

#![allow(unsafe_code)]
//!
//! ## Architecture
//!
//! ```text
//!                 ┌─────────────────────────────────────┐
//!                 │            TripleBuffer             │
//!                 │  ┌────────┐ ┌────────┐ ┌────────┐   │
//!                 │  │ slot 0 │ │ slot 1 │ │ slot 2 │   │
//!                 │  └────────┘ └────────┘ └────────┘   │
//!                 │  ┌──────────────────────────────┐   │
//!                 │  │ flags: read|write|temp|chg   │   │
//!                 │  └──────────────────────────────┘   │
//!                 └─────────────────────────────────────┘
//!                        ▲                     ▲
//!          copy + swap_write_buffer      swap_read_buffer + read_view
//!                        │                     │
//!              ┌──────────────────┐   ┌──────────────────┐
//!              │ TripleBufferWriter│   │TripleBufferReader│
//!              │  (game thread)    │   │ (render thread)  │
//!              └──────────────────┘   └──────────────────┘
//! ```
//!
//! ## Protocol
//!
//! - The writer fills the write slot, then CAS-exchanges write↔temp and sets
//!   `changed`.
//! - The reader, if `changed` is set, CAS-exchanges read↔temp and clears it.
//!   Otherwise it keeps the snapshot it already has.
//!
//! The three indices are always a permutation of {0, 1, 2}, so the slot open
//! for writing is never the slot open for reading. Policy is last write wins:
//! a slow reader skips snapshots, it never sees a half-written one.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::{SyncError, SyncResult};

/// Default bytes per slot (10MB per slot, 30MB total).
pub const DEFAULT_SLOT_BYTES: usize = 10_000_000;

const INDEX_MASK: u8 = 0b11;
const WRITE_SHIFT: u8 = 2;
const TEMP_SHIFT: u8 = 4;
const CHANGED_BIT: u8 = 1 << 6;

/// Decoded form of the flags word.
///
/// Packed into a single byte so one compare-exchange moves all of it:
///
/// ```text
/// bit   6      5..4   3..2    1..0
///     changed  temp   write   read
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferFlags {
    /// Slot holding the latest snapshot the reader has claimed.
    pub read: u8,
    /// Slot the writer is filling.
    pub write: u8,
    /// Slot in flight between the two.
    pub temp: u8,
    /// Whether `temp` holds a snapshot the reader has not claimed yet.
    pub changed: bool,
}

impl BufferFlags {
    /// Initial state: slot 0 = temp, 1 = write, 2 = read, nothing published.
    pub const INITIAL: Self = Self {
        read: 2,
        write: 1,
        temp: 0,
        changed: false,
    };

    /// Packs the flags into their atomic representation.
    #[inline]
    #[must_use]
    pub const fn pack(self) -> u8 {
        let changed = if self.changed { CHANGED_BIT } else { 0 };
        changed | (self.temp << TEMP_SHIFT) | (self.write << WRITE_SHIFT) | self.read
    }

    /// Unpacks flags from their atomic representation.
    #[inline]
    #[must_use]
    pub const fn unpack(bits: u8) -> Self {
        Self {
            read: bits & INDEX_MASK,
            write: (bits >> WRITE_SHIFT) & INDEX_MASK,
            temp: (bits >> TEMP_SHIFT) & INDEX_MASK,
            changed: bits & CHANGED_BIT != 0,
        }
    }

    /// Publishes the write slot: write↔temp, mark changed.
    #[inline]
    #[must_use]
    pub const fn swap_write_with_temp(self) -> Self {
        Self {
            read: self.read,
            write: self.temp,
            temp: self.write,
            changed: true,
        }
    }

    /// Claims the published slot: read↔temp, clear changed.
    #[inline]
    #[must_use]
    pub const fn swap_read_with_temp(self) -> Self {
        Self {
            read: self.temp,
            write: self.write,
            temp: self.read,
            changed: false,
        }
    }
}

/// One slot, backed by 8-byte words so typed views can be replayed over it.
struct Slot(UnsafeCell<Box<[u64]>>);

impl Slot {
    fn new(byte_len: usize) -> Self {
        Self(UnsafeCell::new(vec![0u64; byte_len.div_ceil(8)].into_boxed_slice()))
    }
}

/// Shared state behind a writer/reader pair.
///
/// Never handed out directly: construct it with [`TripleBuffer::new`] and
/// move the two halves to their threads.
pub struct TripleBuffer {
    slots: [Slot; 3],
    flags: AtomicU8,
    byte_len: usize,
}

// SAFETY: slot access is partitioned by the flags protocol. The writer only
// touches `flags.write`, the reader only touches `flags.read`, and those are
// always distinct; ownership of a slot moves between threads only through an
// AcqRel compare-exchange on `flags`.
unsafe impl Sync for TripleBuffer {}
// SAFETY: see above; the slots hold plain bytes.
unsafe impl Send for TripleBuffer {}

impl TripleBuffer {
    /// Creates a triple buffer with `byte_len` bytes per slot.
    ///
    /// Returns the writer and reader halves. Neither half can be cloned, so
    /// the single-writer/single-reader contract is enforced by ownership.
    ///
    /// # Errors
    ///
    /// [`SyncError::ZeroCapacity`] if `byte_len` is zero.
    pub fn new(byte_len: usize) -> SyncResult<(TripleBufferWriter, TripleBufferReader)> {
        if byte_len == 0 {
            return Err(SyncError::ZeroCapacity);
        }

        let shared = Arc::new(Self {
            slots: [Slot::new(byte_len), Slot::new(byte_len), Slot::new(byte_len)],
            flags: AtomicU8::new(BufferFlags::INITIAL.pack()),
            byte_len,
        });

        tracing::debug!(byte_len, "triple buffer allocated");

        Ok((
            TripleBufferWriter {
                shared: Arc::clone(&shared),
            },
            TripleBufferReader { shared },
        ))
    }

    /// Creates a triple buffer with [`DEFAULT_SLOT_BYTES`] per slot.
    pub fn with_default_size() -> SyncResult<(TripleBufferWriter, TripleBufferReader)> {
        Self::new(DEFAULT_SLOT_BYTES)
    }

    #[inline]
    fn load_flags(&self) -> BufferFlags {
        BufferFlags::unpack(self.flags.load(Ordering::Acquire))
    }

    /// # Safety
    ///
    /// The caller must own slot `index` under the flags protocol and must not
    /// let the slice outlive that ownership.
    #[inline]
    unsafe fn slot(&self, index: u8) -> &[u8] {
        let words: &[u64] = &*self.slots[usize::from(index)].0.get();
        &bytemuck::cast_slice(words)[..self.byte_len]
    }

    /// # Safety
    ///
    /// Same as [`Self::slot`], and the caller must be the only party holding
    /// a reference into slot `index`.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    unsafe fn slot_mut(&self, index: u8) -> &mut [u8] {
        let words: &mut [u64] = &mut *self.slots[usize::from(index)].0.get();
        &mut bytemuck::cast_slice_mut(words)[..self.byte_len]
    }
}

/// Writer half. Lives on the thread that produces snapshots.
pub struct TripleBufferWriter {
    shared: Arc<TripleBuffer>,
}

impl TripleBufferWriter {
    /// Bytes per slot.
    #[inline]
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.shared.byte_len
    }

    /// Index of the slot currently open for writing.
    #[inline]
    #[must_use]
    pub fn write_buffer_index(&self) -> u8 {
        self.shared.load_flags().write
    }

    /// Mutable access to the write slot.
    ///
    /// Contents are whatever the slot held when it last cycled through, so
    /// overwrite everything the reader will look at.
    #[must_use]
    pub fn write_view(&mut self) -> &mut [u8] {
        let index = self.write_buffer_index();
        // SAFETY: only the writer ever moves `write`, and `&mut self` keeps
        // this the only live reference into it until the next swap.
        unsafe { self.shared.slot_mut(index) }
    }

    /// Copies `bytes` into the start of the write slot.
    ///
    /// # Errors
    ///
    /// [`SyncError::Overflow`] if `bytes` is longer than a slot. Nothing is
    /// written in that case.
    pub fn copy_to_write_buffer(&mut self, bytes: &[u8]) -> SyncResult<()> {
        let capacity = self.byte_len();
        if bytes.len() > capacity {
            return Err(SyncError::Overflow {
                len: bytes.len(),
                capacity,
            });
        }
        self.write_view()[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Publishes the write slot and starts writing into the old temp slot.
    ///
    /// Only the reader can race this CAS, and it can win at most once per
    /// publish (it clears `changed`), so the loop retries a bounded number
    /// of times.
    pub fn swap_write_buffer(&mut self) {
        let flags = &self.shared.flags;
        let mut current = flags.load(Ordering::Acquire);
        loop {
            let next = BufferFlags::unpack(current).swap_write_with_temp().pack();
            match flags.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return,
                Err(actual) => {
                    current = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Copies `bytes` into the write slot and publishes it.
    pub fn publish(&mut self, bytes: &[u8]) -> SyncResult<()> {
        self.copy_to_write_buffer(bytes)?;
        self.swap_write_buffer();
        Ok(())
    }
}

/// Reader half. Lives on the thread that consumes snapshots.
///
/// There is exactly one reader per buffer. A second reader could swap away
/// the slot the first one is still reading, so the half cannot be cloned;
/// give each consumer its own buffer instead.
///
/// ```compile_fail
/// let (_writer, reader) = triad_core::TripleBuffer::new(8).unwrap();
/// let second = reader.clone();
/// ```
pub struct TripleBufferReader {
    shared: Arc<TripleBuffer>,
}

impl TripleBufferReader {
    /// Bytes per slot.
    #[inline]
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.shared.byte_len
    }

    /// Index of the slot currently held for reading.
    #[inline]
    #[must_use]
    pub fn read_buffer_index(&self) -> u8 {
        self.shared.load_flags().read
    }

    /// Whether a snapshot newer than the read slot is waiting.
    #[inline]
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.shared.load_flags().changed
    }

    /// Claims the latest published snapshot, if there is one.
    ///
    /// Returns `false` without touching anything when nothing new was
    /// published; the reader keeps its current (possibly stale) snapshot.
    pub fn swap_read_buffer(&mut self) -> bool {
        let flags = &self.shared.flags;
        let mut current = flags.load(Ordering::Acquire);
        loop {
            let decoded = BufferFlags::unpack(current);
            if !decoded.changed {
                return false;
            }
            let next = decoded.swap_read_with_temp().pack();
            match flags.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// The stable snapshot held by this reader.
    ///
    /// Borrowing the view borrows the reader, so the slot cannot be swapped
    /// away while it is being read.
    #[must_use]
    pub fn read_view(&self) -> &[u8] {
        let index = self.read_buffer_index();
        // SAFETY: only the reader ever moves `read`, and `swap_read_buffer`
        // needs `&mut self`, so this slot stays ours for the borrow.
        unsafe { self.shared.slot(index) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_flags_layout() {
        assert_eq!(BufferFlags::INITIAL.pack(), 0x06);
        assert_eq!(BufferFlags::unpack(0x06), BufferFlags::INITIAL);
    }

    #[test]
    fn test_flags_roundtrip_all_permutations() {
        let permutations = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        for [read, write, temp] in permutations {
            for changed in [false, true] {
                let flags = BufferFlags { read, write, temp, changed };
                assert_eq!(BufferFlags::unpack(flags.pack()), flags);
            }
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(TripleBuffer::new(0), Err(SyncError::ZeroCapacity)));
    }

    #[test]
    fn test_overflow_rejected_without_partial_write() {
        let (mut writer, _reader) = TripleBuffer::new(4).unwrap();
        writer.copy_to_write_buffer(&[9, 9, 9, 9]).unwrap();

        let err = writer.copy_to_write_buffer(&[1, 2, 3, 4, 5]).unwrap_err();
        assert_eq!(err, SyncError::Overflow { len: 5, capacity: 4 });
        assert_eq!(writer.write_view(), &[9, 9, 9, 9]);
    }

    #[test]
    fn test_swap_read_without_publish_is_noop() {
        let (_writer, mut reader) = TripleBuffer::new(8).unwrap();
        let before = reader.read_buffer_index();

        assert!(!reader.swap_read_buffer());
        assert_eq!(reader.read_buffer_index(), before);
        assert_eq!(reader.read_view(), &[0; 8]);
    }

    #[test]
    fn test_publish_then_read() {
        let (mut writer, mut reader) = TripleBuffer::new(4).unwrap();
        writer.publish(&[1, 2, 3, 4]).unwrap();

        assert!(reader.has_changed());
        assert!(reader.swap_read_buffer());
        assert_eq!(reader.read_view(), &[1, 2, 3, 4]);
        assert!(!reader.has_changed());
    }

    #[test]
    fn test_last_write_wins_after_many_publishes() {
        let (mut writer, mut reader) = TripleBuffer::new(4).unwrap();
        for n in 1..=10u32 {
            writer.publish(&n.to_le_bytes()).unwrap();
        }

        assert!(reader.swap_read_buffer());
        assert_eq!(reader.read_view(), &10u32.to_le_bytes());
        // Nothing new since the read.
        assert!(!reader.swap_read_buffer());
        assert_eq!(reader.read_view(), &10u32.to_le_bytes());
    }

    #[test]
    fn test_write_and_read_slots_never_alias() {
        let (mut writer, mut reader) = TripleBuffer::new(1).unwrap();
        for step in 0..32u8 {
            assert_ne!(writer.write_buffer_index(), reader.read_buffer_index());
            if step % 3 == 0 {
                reader.swap_read_buffer();
            } else {
                writer.publish(&[step]).unwrap();
            }
        }
    }

    #[test]
    fn test_unaligned_length_is_exact() {
        let (writer, reader) = TripleBuffer::new(13).unwrap();
        assert_eq!(writer.byte_len(), 13);
        assert_eq!(reader.read_view().len(), 13);
    }
}
