//! # Resource Protocol Messages
//!
//! ```text
//!  game thread                                   render thread
//! ┌───────────────────────┐   ResourceRequest   ┌──────────────────┐
//! │ RemoteResourceManager │ ──────────────────▶ │ ResourceManager  │
//! │  (ids + summaries)    │ ◀────────────────── │ (decoded assets) │
//! └───────────────────────┘    ResourceEvent    └──────────────────┘
//! ```
//!
//! Messages for one id arrive in the order the sending half posted them.

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Identifier handed out by the shared counter. Only meaningful to the
/// owning half.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub u32);

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// Selects the loader.
    pub kind: String,
    /// Display name. Defaults to `<kind>[<id>]` on the owning half.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Loader-specific parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ResourceDefinition {
    /// A definition with no name and no parameters.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            params: serde_json::Value::Null,
        }
    }

    /// Sets an explicit name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the loader parameters.
    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// Lifecycle of one resource record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Load in flight.
    Loading,
    /// Decoded and available on the owning thread.
    Loaded,
    /// Load failed; the record stays until its last reference is dropped.
    Error,
}

/// Requesting half → owning half.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceRequest {
    /// Start loading `definition` under `resource_id` with one reference.
    Load {
        /// Freshly allocated id.
        resource_id: ResourceId,
        /// What to load.
        definition: ResourceDefinition,
        /// Raw bytes moved along with the request (e.g. a downloaded file).
        payload: Option<Vec<u8>>,
    },
    /// Take one more reference.
    AddRef {
        /// Target resource.
        resource_id: ResourceId,
    },
    /// Drop one reference.
    RemoveRef {
        /// Target resource.
        resource_id: ResourceId,
    },
}

/// Owning half → requesting half.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    /// The load finished.
    Loaded {
        /// Target resource.
        resource_id: ResourceId,
        /// Lightweight summary for the requesting side, if the loader made one.
        remote_resource: Option<serde_json::Value>,
    },
    /// The load failed. Not retried.
    LoadFailed {
        /// Target resource.
        resource_id: ResourceId,
        /// What went wrong.
        error: LoadError,
    },
    /// The last reference was dropped and the resource is gone.
    Disposed {
        /// Target resource.
        resource_id: ResourceId,
    },
}

impl ResourceEvent {
    /// The id this event is about.
    #[must_use]
    pub const fn resource_id(&self) -> ResourceId {
        match self {
            Self::Loaded { resource_id, .. }
            | Self::LoadFailed { resource_id, .. }
            | Self::Disposed { resource_id } => *resource_id,
        }
    }
}

/// Outbound side of a message port.
///
/// Implemented for crossbeam senders; bounded senders block when full, so
/// the bootstrap wires resource ports with unbounded channels.
pub trait PostMessageTarget<M>: Send {
    /// Posts one message. A hung-up receiver is not an error: the other
    /// thread is shutting down.
    fn post_message(&self, message: M);
}

impl<M: Send> PostMessageTarget<M> for crossbeam_channel::Sender<M> {
    fn post_message(&self, message: M) {
        if self.send(message).is_err() {
            tracing::debug!("message port disconnected; dropping message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_defaults_from_json() {
        let def: ResourceDefinition = serde_json::from_str(r#"{"kind":"texture"}"#).unwrap();
        assert_eq!(def, ResourceDefinition::new("texture"));
    }

    #[test]
    fn test_post_to_dropped_receiver_is_silent() {
        let (tx, rx) = crossbeam_channel::unbounded::<ResourceEvent>();
        drop(rx);
        tx.post_message(ResourceEvent::Disposed {
            resource_id: ResourceId(1),
        });
    }
}
