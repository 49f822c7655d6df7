//! # Wire Protocol
//!
//! One JSON object per data channel message:
//!
//! ```text
//! { "t": 0|1|2,      message type (Create, Update, Delete)
//!   "n": u32,        network id
//!   "x": u32,        template id      (Create only)
//!   "o": u32,        last_owned stamp (Create, Update)
//!   "d": any }       template data    (Create, Update)
//! ```
//!
//! The sender is never on the wire; it is the peer at the other end of the
//! channel the message arrived on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::id::NetworkId;
use crate::template::TemplateId;

/// Wire discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// A new entity, or a full state for a peer that has not seen it yet.
    Create = 0,
    /// Periodic state of an owned entity.
    Update = 1,
    /// The owner removed the entity.
    Delete = 2,
}

impl MessageType {
    /// Name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Create),
            1 => Ok(Self::Update),
            2 => Ok(Self::Delete),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

/// A decoded network message.
#[derive(Clone, Debug, PartialEq)]
pub enum NetworkMessage {
    /// See [`MessageType::Create`].
    Create {
        /// Entity id.
        network_id: NetworkId,
        /// Template that decodes `data`.
        template_id: TemplateId,
        /// Ownership stamp.
        last_owned: u32,
        /// Template data.
        data: Value,
    },
    /// See [`MessageType::Update`].
    Update {
        /// Entity id.
        network_id: NetworkId,
        /// Ownership stamp.
        last_owned: u32,
        /// Template data.
        data: Value,
    },
    /// See [`MessageType::Delete`].
    Delete {
        /// Entity id.
        network_id: NetworkId,
    },
}

/// Flat wire shape.
#[derive(Serialize, Deserialize)]
struct WireMessage {
    t: u8,
    n: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    o: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    d: Option<Value>,
}

impl NetworkMessage {
    /// Wire discriminant.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Create { .. } => MessageType::Create,
            Self::Update { .. } => MessageType::Update,
            Self::Delete { .. } => MessageType::Delete,
        }
    }

    /// Entity the message is about.
    #[must_use]
    pub const fn network_id(&self) -> NetworkId {
        match self {
            Self::Create { network_id, .. }
            | Self::Update { network_id, .. }
            | Self::Delete { network_id } => *network_id,
        }
    }

    /// Serializes to the JSON wire form.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let wire = match self {
            Self::Create {
                network_id,
                template_id,
                last_owned,
                data,
            } => WireMessage {
                t: MessageType::Create as u8,
                n: network_id.0,
                x: Some(template_id.0),
                o: Some(*last_owned),
                d: Some(data.clone()),
            },
            Self::Update {
                network_id,
                last_owned,
                data,
            } => WireMessage {
                t: MessageType::Update as u8,
                n: network_id.0,
                x: None,
                o: Some(*last_owned),
                d: Some(data.clone()),
            },
            Self::Delete { network_id } => WireMessage {
                t: MessageType::Delete as u8,
                n: network_id.0,
                x: None,
                o: None,
                d: None,
            },
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Parses the JSON wire form.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let wire: WireMessage = serde_json::from_str(text)?;
        let kind = MessageType::try_from(wire.t)?;
        let network_id = NetworkId(wire.n);
        let missing = |field: &'static str| ProtocolError::MissingField {
            kind: kind.name(),
            field,
        };

        Ok(match kind {
            MessageType::Create => Self::Create {
                network_id,
                template_id: TemplateId(wire.x.ok_or_else(|| missing("x"))?),
                last_owned: wire.o.ok_or_else(|| missing("o"))?,
                data: wire.d.unwrap_or(Value::Null),
            },
            MessageType::Update => Self::Update {
                network_id,
                last_owned: wire.o.ok_or_else(|| missing("o"))?,
                data: wire.d.unwrap_or(Value::Null),
            },
            MessageType::Delete => Self::Delete { network_id },
        })
    }
}
