//! # Network Templates
//!
//! A template is the callback set for one kind of networked entity: how to
//! serialize it for the wire and how to apply what arrives. `W` is whatever
//! world the game thread keeps its simulation state in.

use serde_json::Value;

use crate::error::ProtocolError;
use crate::id::NetworkId;
use crate::participant::ParticipantId;
use triad_core::EntityId;

/// Index of a registered template. Assigned sequentially from 0, so every
/// peer must register the same templates in the same order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(pub u32);

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which entity a callback is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TemplateContext {
    /// Local entity key.
    pub entity: EntityId,
    /// Network id of the entity.
    pub network_id: NetworkId,
    /// Peer the message came from ([`ParticipantId::LOCAL`] when sending).
    pub sender: ParticipantId,
}

/// Callbacks for one kind of networked entity.
pub trait NetworkTemplate<W>: Send {
    /// A remote entity appeared. Returning an error discards it.
    fn on_create(&self, world: &mut W, ctx: &TemplateContext, data: &Value) -> Result<(), ProtocolError>;

    /// New state for an entity another peer owns.
    fn on_update(&self, world: &mut W, ctx: &TemplateContext, data: &Value) -> Result<(), ProtocolError>;

    /// The owner deleted the entity.
    fn on_delete(&self, world: &mut W, ctx: &TemplateContext);

    /// Full state for a peer that has not seen the entity.
    fn send_create(&self, world: &W, ctx: &TemplateContext) -> Result<Value, ProtocolError>;

    /// Periodic state. Defaults to the full state.
    fn send_update(&self, world: &W, ctx: &TemplateContext) -> Result<Value, ProtocolError> {
        self.send_create(world, ctx)
    }
}
