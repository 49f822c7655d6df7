//! # Worker Message Bus
//!
//! Everything the main thread and the two workers say to each other.
//!
//! ## Bootstrap handshake
//!
//! ```text
//!   main                      game                     render
//!    │ InitGameWorker ─────────▶│                          │
//!    │ InitRenderWorker ────────┼─────────────────────────▶│
//!    │◀──────── GameWorkerInitialized                      │
//!    │◀──────────────────────── RenderWorkerInitialized ───│
//!    │ StartGameWorker ────────▶│                          │
//!    │ StartRenderWorker ───────┼─────────────────────────▶│
//!    │                          │   ResourceRequest ──────▶│
//!    │                          │◀───── ResourceEvent      │
//! ```
//!
//! A worker that fails answers `GameWorkerError` / `RenderWorkerError`
//! instead and stops. `Shutdown` stops a worker at any point.

use crossbeam_channel::{Receiver, Sender};
use triad_core::{SharedCounter, TripleBufferReader, TripleBufferWriter};
use triad_networking::{DataChannel, InboundSender};
use triad_resources::{ResourceEvent, ResourceRequest};

use crate::collab::{FrameRenderer, PhysicsStep};
use crate::config::EngineConfig;
use crate::tick::NetworkClock;

/// Everything the game worker owns, handed over once.
pub struct GameWorkerInit {
    /// Engine configuration.
    pub config: EngineConfig,
    /// Protocol-level id of the local user.
    pub local_user_id: String,
    /// Session clock for ownership stamps.
    pub clock: NetworkClock,
    /// Writer half of the renderable snapshot buffer.
    pub renderables: TripleBufferWriter,
    /// Reader half of the input buffer.
    pub input: TripleBufferReader,
    /// Resource id source.
    pub resource_counter: SharedCounter,
    /// Port to the render thread's resource manager.
    pub resource_requests: Sender<ResourceRequest>,
    /// Port from the render thread's resource manager.
    pub resource_events: Receiver<ResourceEvent>,
    /// Simulation collaborator.
    pub physics: Box<dyn PhysicsStep>,
}

/// Everything the render worker owns, handed over once.
pub struct RenderWorkerInit {
    /// Engine configuration.
    pub config: EngineConfig,
    /// Reader half of the renderable snapshot buffer.
    pub renderables: TripleBufferReader,
    /// Port from the game thread's resource requester.
    pub resource_requests: Receiver<ResourceRequest>,
    /// Port back to the game thread.
    pub resource_events: Sender<ResourceEvent>,
    /// Frame collaborator.
    pub renderer: Box<dyn FrameRenderer>,
}

/// Control messages between the main thread and the workers.
pub enum WorkerMessage {
    /// main → game.
    InitGameWorker(Box<GameWorkerInit>),
    /// main → render.
    InitRenderWorker(Box<RenderWorkerInit>),
    /// game → main.
    GameWorkerInitialized,
    /// render → main.
    RenderWorkerInitialized,
    /// main → game.
    StartGameWorker,
    /// main → render.
    StartRenderWorker,
    /// game → main. The worker has stopped.
    GameWorkerError(String),
    /// render → main. The worker has stopped.
    RenderWorkerError(String),
    /// main → game: the signaling layer opened a data channel to a peer.
    PeerChannelOpened {
        /// Protocol-level id of the peer.
        user_id: String,
        /// Outbound half of the channel.
        channel: Box<dyn DataChannel>,
    },
    /// game → main: where the transport should push the peer's frames.
    PeerChannelReady {
        /// Protocol-level id of the peer.
        user_id: String,
        /// Inbound handle for the peer.
        inbound: InboundSender,
    },
    /// main → game: a peer's channel closed.
    PeerChannelClosed {
        /// Protocol-level id of the peer.
        user_id: String,
    },
    /// main → any worker.
    Shutdown,
}

impl WorkerMessage {
    /// Variant name, for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::InitGameWorker(_) => "InitGameWorker",
            Self::InitRenderWorker(_) => "InitRenderWorker",
            Self::GameWorkerInitialized => "GameWorkerInitialized",
            Self::RenderWorkerInitialized => "RenderWorkerInitialized",
            Self::StartGameWorker => "StartGameWorker",
            Self::StartRenderWorker => "StartRenderWorker",
            Self::GameWorkerError(_) => "GameWorkerError",
            Self::RenderWorkerError(_) => "RenderWorkerError",
            Self::PeerChannelOpened { .. } => "PeerChannelOpened",
            Self::PeerChannelReady { .. } => "PeerChannelReady",
            Self::PeerChannelClosed { .. } => "PeerChannelClosed",
            Self::Shutdown => "Shutdown",
        }
    }
}

impl std::fmt::Debug for WorkerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GameWorkerError(message) | Self::RenderWorkerError(message) => {
                f.debug_tuple(self.name()).field(message).finish()
            }
            Self::PeerChannelOpened { user_id, .. }
            | Self::PeerChannelReady { user_id, .. }
            | Self::PeerChannelClosed { user_id } => f
                .debug_struct(self.name())
                .field("user_id", user_id)
                .finish_non_exhaustive(),
            _ => f.write_str(self.name()),
        }
    }
}

/// Posts without blocking. A full or closed port drops the message.
pub(crate) fn post(outbox: &Sender<WorkerMessage>, message: WorkerMessage) {
    let name = message.name();
    if let Err(err) = outbox.try_send(message) {
        tracing::warn!(message = name, full = err.is_full(), "worker message dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_debug_hides_payloads() {
        let message = WorkerMessage::PeerChannelClosed {
            user_id: "@bob:example.org".into(),
        };
        assert_eq!(
            format!("{message:?}"),
            r#"PeerChannelClosed { user_id: "@bob:example.org", .. }"#
        );
        assert_eq!(format!("{:?}", WorkerMessage::Shutdown), "Shutdown");
    }

    #[test]
    fn test_post_never_blocks() {
        let (tx, rx) = bounded(1);
        post(&tx, WorkerMessage::GameWorkerInitialized);
        post(&tx, WorkerMessage::RenderWorkerInitialized);
        assert_eq!(rx.len(), 1);
        drop(rx);
        post(&tx, WorkerMessage::Shutdown);
    }
}
