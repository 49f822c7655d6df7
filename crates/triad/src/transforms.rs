//! # Transforms
//!
//! The game thread's world state: one transform per networked entity, keyed
//! by the replicator's entity key. Physics writes it, the replicator syncs
//! it, and the renderable snapshot is built from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use triad_core::EntityId;
use triad_networking::{NetworkId, NetworkTemplate, ProtocolError, TemplateContext};

/// Identity quaternion, `[x, y, z, w]`.
pub const IDENTITY_ROTATION: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Position and orientation of one entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Entity the transform belongs to.
    pub network_id: NetworkId,
    /// World position.
    pub position: [f32; 3],
    /// Orientation quaternion, `[x, y, z, w]`.
    pub rotation: [f32; 4],
}

impl Transform {
    /// Unrotated transform at `position`.
    #[must_use]
    pub const fn new(network_id: NetworkId, position: [f32; 3]) -> Self {
        Self {
            network_id,
            position,
            rotation: IDENTITY_ROTATION,
        }
    }
}

/// Transforms by entity key, iterated in key order.
#[derive(Debug, Default)]
pub struct TransformStore {
    transforms: BTreeMap<EntityId, Transform>,
}

impl TransformStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a transform.
    pub fn insert(&mut self, entity: EntityId, transform: Transform) -> Option<Transform> {
        self.transforms.insert(entity, transform)
    }

    /// Removes a transform.
    pub fn remove(&mut self, entity: EntityId) -> Option<Transform> {
        self.transforms.remove(&entity)
    }

    /// Transform of an entity.
    #[must_use]
    pub fn get(&self, entity: EntityId) -> Option<&Transform> {
        self.transforms.get(&entity)
    }

    /// Mutable transform of an entity.
    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut Transform> {
        self.transforms.get_mut(&entity)
    }

    /// All transforms.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Transform)> + '_ {
        self.transforms.iter().map(|(&entity, transform)| (entity, transform))
    }

    /// All transforms, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut Transform)> + '_ {
        self.transforms
            .iter_mut()
            .map(|(&entity, transform)| (entity, transform))
    }

    /// Number of transforms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

/// Wire form: `{"p": [x, y, z], "r": [x, y, z, w]}`.
#[derive(Serialize, Deserialize)]
struct TransformData {
    p: [f32; 3],
    #[serde(default = "identity")]
    r: [f32; 4],
}

fn identity() -> [f32; 4] {
    IDENTITY_ROTATION
}

/// Replicates a [`Transform`] per entity.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransformTemplate;

impl TransformTemplate {
    fn apply(store: &mut TransformStore, ctx: &TemplateContext, data: &Value) -> Result<(), ProtocolError> {
        let TransformData { p, r } = TransformData::deserialize(data)?;
        store.insert(
            ctx.entity,
            Transform {
                network_id: ctx.network_id,
                position: p,
                rotation: r,
            },
        );
        Ok(())
    }
}

impl NetworkTemplate<TransformStore> for TransformTemplate {
    fn on_create(&self, store: &mut TransformStore, ctx: &TemplateContext, data: &Value) -> Result<(), ProtocolError> {
        Self::apply(store, ctx, data)
    }

    fn on_update(&self, store: &mut TransformStore, ctx: &TemplateContext, data: &Value) -> Result<(), ProtocolError> {
        Self::apply(store, ctx, data)
    }

    fn on_delete(&self, store: &mut TransformStore, ctx: &TemplateContext) {
        store.remove(ctx.entity);
    }

    fn send_create(&self, store: &TransformStore, ctx: &TemplateContext) -> Result<Value, ProtocolError> {
        let transform = store
            .get(ctx.entity)
            .ok_or_else(|| ProtocolError::InvalidPayload(format!("no transform for {}", ctx.network_id)))?;
        Ok(serde_json::to_value(TransformData {
            p: transform.position,
            r: transform.rotation,
        })?)
    }
}
