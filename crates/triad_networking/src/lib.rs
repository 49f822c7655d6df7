//! # TRIAD Networking - Peer-to-Peer Entity Replication
//!
//! Every peer in a session owns some networked entities and mirrors the
//! rest. There is no server: peers send their owned entities to each other
//! over best-effort data channels, and each peer arbitrates ownership
//! conflicts with the same rule, so they all converge.
//!
//! ## Architecture
//!
//! - **Protocol**: three JSON messages (Create, Update, Delete)
//! - **Templates**: per-kind callbacks that serialize and apply entity state
//! - **Ownership**: latest `last_owned` stamp wins, ties go to the greater
//!   user id
//! - **Replicator**: the entity table, inbound queue and send pipeline
//!
//! ```text
//!   PEER A                                     PEER B
//!   owns 42                                    mirrors 42
//!     │  send(): Update{42, o=100, d}            │
//!     │ ───────────────────────────────────────▶ │ receive(): on_update
//!     │                                          │
//!     │              take_ownership(42)          │
//!     │  Update{42, o=140, d'}                   │
//!     │ ◀─────────────────────────────────────── │
//!   on_update, owner := B                     owns 42
//! ```
//!
//! ## Example
//!
//! ```rust
//! use triad_networking::{MemoryChannel, NetworkIdAllocator, Replicator};
//!
//! let mut replicator: Replicator<()> =
//!     Replicator::new("@alice:example.org", 50, NetworkIdAllocator::seeded(7));
//! let (ours, theirs) = MemoryChannel::pair();
//! let inbound = replicator.open_channel("@bob:example.org", Box::new(ours));
//!
//! // The transport feeds frames from Bob into `inbound` ...
//! assert!(inbound.push("not json").is_err());
//! // ... and the game thread applies them once per tick.
//! assert_eq!(replicator.receive(&mut ()), 0);
//! # drop(theirs);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod channel;
pub mod error;
pub mod id;
pub mod ownership;
pub mod participant;
pub mod protocol;
pub mod replicator;
pub mod template;

pub use channel::{DataChannel, MemoryChannel};
pub use error::{ChannelError, ProtocolError, ReplicationError, ReplicationResult};
pub use id::{NetworkId, NetworkIdAllocator};
pub use ownership::OwnershipStamp;
pub use participant::{ParticipantId, ParticipantRegistry};
pub use protocol::{MessageType, NetworkMessage};
pub use replicator::{InboundMessage, InboundSender, NetworkTickStats, NetworkedEntity, Replicator};
pub use template::{NetworkTemplate, TemplateContext, TemplateId};

/// Default interval between network ticks.
pub const DEFAULT_NETWORK_TICK_INTERVAL_MS: u32 = 50;
