//! # Networking Errors
//!
//! - [`ProtocolError`]: a peer sent something we cannot apply. Logged and
//!   dropped, never fatal.
//! - [`ReplicationError`]: local misuse of the replicator.
//! - [`ChannelError`]: a send raced a channel close.

use thiserror::Error;

use crate::id::NetworkId;
use crate::template::TemplateId;
use triad_core::EntityId;

/// Malformed or inapplicable wire data.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The payload is not valid JSON for the expected shape.
    #[error("malformed network message: {0}")]
    Json(#[from] serde_json::Error),

    /// The `t` field holds an unknown message type.
    #[error("unknown network message type {0}")]
    UnknownType(u8),

    /// A field required by the message type is absent.
    #[error("{kind} message missing field `{field}`")]
    MissingField {
        /// Message type name.
        kind: &'static str,
        /// Wire field name.
        field: &'static str,
    },

    /// A template rejected the entity data.
    #[error("invalid entity payload: {0}")]
    InvalidPayload(String),
}

/// Local replicator misuse.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationError {
    /// A local entity already uses this network id.
    #[error("network id {0} already in use")]
    DuplicateNetworkId(NetworkId),

    /// The null network id cannot name an entity.
    #[error("network id {0} is reserved")]
    ReservedNetworkId(NetworkId),

    /// No template registered under this id.
    #[error("network template {0} not registered")]
    UnknownTemplate(TemplateId),

    /// The entity key is stale or was never issued.
    #[error("unknown networked entity {0}")]
    UnknownEntity(EntityId),
}

/// Data channel failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel is closed.
    #[error("data channel closed")]
    Closed,
}

/// Result type for replicator operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;
