//! # Shared Buffer Layouts
//!
//! The two TripleBuffers carry raw bytes. Both ends derive the same views by
//! replaying the same `CursorBuffer` calls, so only the bytes ever cross.
//!
//! ```text
//!   renderables (game → render)          input (main → game)
//! ┌──────────────────────────────┐     ┌──────────────────────┐
//! │ count        u32             │     │ sequence  u32        │
//! │ network_ids  u32   × max     │     │ buttons   u32        │
//! │ positions    f32×3 × max     │     │ axes      f32 × 2    │
//! │ rotations    f32×4 × max     │     │ pointer   f32 × 2    │
//! └──────────────────────────────┘     └──────────────────────┘
//! ```

use std::mem::size_of;

use triad_core::{ArrayView, CursorBuffer, MemoryError, MemoryResult, View};

use crate::transforms::{Transform, TransformStore};

/// Views into a renderable snapshot.
#[derive(Clone, Debug)]
pub struct RenderableLayout {
    max: usize,
    count: View<u32>,
    network_ids: View<u32>,
    positions: ArrayView<f32>,
    rotations: ArrayView<f32>,
    byte_len: usize,
}

impl RenderableLayout {
    /// Lays out room for `max` renderables.
    pub fn new(max: usize) -> MemoryResult<Self> {
        let per_entity = size_of::<u32>() + 3 * size_of::<f32>() + 4 * size_of::<f32>();
        let capacity = max
            .checked_mul(per_entity)
            .and_then(|bytes| bytes.checked_add(size_of::<u32>()))
            .ok_or(MemoryError::ZeroCapacity)?;

        let mut arena = CursorBuffer::new(capacity)?;
        let count = arena.add_view::<u32>(1)?;
        let network_ids = arena.add_view::<u32>(max)?;
        let positions = arena.add_vector3_array(max)?;
        let rotations = arena.add_vector4_array(max)?;

        Ok(Self {
            max,
            count,
            network_ids,
            positions,
            rotations,
            byte_len: arena.cursor(),
        })
    }

    /// Bytes a snapshot needs.
    #[inline]
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Renderable capacity.
    #[inline]
    #[must_use]
    pub const fn max(&self) -> usize {
        self.max
    }

    /// Writes every transform into `bytes`. Entities past `max` are dropped
    /// from the snapshot. Returns the number written.
    pub fn write(&self, bytes: &mut [u8], transforms: &TransformStore) -> MemoryResult<usize> {
        let mut written = 0;
        {
            let ids = self.network_ids.resolve_mut(bytes)?;
            for (slot, (_, transform)) in ids.iter_mut().zip(transforms.iter()) {
                *slot = transform.network_id.0;
                written += 1;
            }
        }
        for (record, (_, transform)) in self.positions.resolve_mut(bytes)?.zip(transforms.iter()) {
            record.copy_from_slice(&transform.position);
        }
        for (record, (_, transform)) in self.rotations.resolve_mut(bytes)?.zip(transforms.iter()) {
            record.copy_from_slice(&transform.rotation);
        }

        let count = u32::try_from(written).unwrap_or(u32::MAX);
        self.count.resolve_mut(bytes)?[0] = count;
        if transforms.len() > written {
            tracing::warn!(total = transforms.len(), max = self.max, "renderable snapshot truncated");
        }
        Ok(written)
    }

    /// Reads a snapshot written by [`write`](Self::write).
    pub fn read<'a>(&self, bytes: &'a [u8]) -> MemoryResult<RenderFrame<'a>> {
        let count = (self.count.resolve(bytes)?[0] as usize).min(self.max);
        let network_ids = &self.network_ids.resolve(bytes)?[..count];
        let positions = &self.positions.flat().resolve(bytes)?[..count * 3];
        let rotations = &self.rotations.flat().resolve(bytes)?[..count * 4];
        Ok(RenderFrame {
            network_ids,
            positions,
            rotations,
        })
    }
}

/// One renderable snapshot, borrowed from the render thread's read slot.
#[derive(Clone, Copy, Debug)]
pub struct RenderFrame<'a> {
    network_ids: &'a [u32],
    positions: &'a [f32],
    rotations: &'a [f32],
}

impl<'a> RenderFrame<'a> {
    /// Number of renderables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.network_ids.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.network_ids.is_empty()
    }

    /// Every renderable, in snapshot order.
    pub fn iter(&self) -> impl Iterator<Item = Transform> + 'a {
        self.network_ids
            .iter()
            .zip(self.positions.chunks_exact(3))
            .zip(self.rotations.chunks_exact(4))
            .map(|((&id, position), rotation)| Transform {
                network_id: triad_networking::NetworkId(id),
                position: [position[0], position[1], position[2]],
                rotation: [rotation[0], rotation[1], rotation[2], rotation[3]],
            })
    }
}

/// Input published by the main thread once per UI frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InputState {
    /// Incremented by the main thread on every publish.
    pub sequence: u32,
    /// Pressed-button bitmask.
    pub buttons: u32,
    /// Movement axes in `[-1, 1]`.
    pub axes: [f32; 2],
    /// Pointer position in window coordinates.
    pub pointer: [f32; 2],
}

/// Views into an input snapshot.
#[derive(Clone, Debug)]
pub struct InputLayout {
    sequence: View<u32>,
    buttons: View<u32>,
    axes: View<f32>,
    pointer: View<f32>,
    byte_len: usize,
}

impl InputLayout {
    /// Lays out the input record inside a `capacity`-byte slot.
    pub fn new(capacity: usize) -> MemoryResult<Self> {
        let mut arena = CursorBuffer::new(capacity)?;
        Ok(Self {
            sequence: arena.add_view(1)?,
            buttons: arena.add_view(1)?,
            axes: arena.add_view(2)?,
            pointer: arena.add_view(2)?,
            byte_len: arena.cursor(),
        })
    }

    /// Bytes the record occupies.
    #[inline]
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Encodes `state` into `bytes`.
    pub fn write(&self, bytes: &mut [u8], state: &InputState) -> MemoryResult<()> {
        self.sequence.resolve_mut(bytes)?[0] = state.sequence;
        self.buttons.resolve_mut(bytes)?[0] = state.buttons;
        self.axes.resolve_mut(bytes)?.copy_from_slice(&state.axes);
        self.pointer.resolve_mut(bytes)?.copy_from_slice(&state.pointer);
        Ok(())
    }

    /// Decodes a record.
    pub fn read(&self, bytes: &[u8]) -> MemoryResult<InputState> {
        let axes = self.axes.resolve(bytes)?;
        let pointer = self.pointer.resolve(bytes)?;
        Ok(InputState {
            sequence: self.sequence.resolve(bytes)?[0],
            buttons: self.buttons.resolve(bytes)?[0],
            axes: [axes[0], axes[1]],
            pointer: [pointer[0], pointer[1]],
        })
    }
}
