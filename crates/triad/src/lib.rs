//! # TRIAD
//!
//! Engine runtime: three threads, two TripleBuffers, two message ports, and
//! peer-to-peer replication running on the game thread.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              TRIAD RUNTIME                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐  input TripleBuffer  ┌─────────────────┐           │
//! │  │   MAIN / UI     │─────────────────────>│   GAME          │           │
//! │  │                 │  WorkerMessage bus   │                 │<── peers  │
//! │  │  • bootstrap    │<────────────────────>│  • physics      │──> peers  │
//! │  │  • input        │                      │  • replicator   │           │
//! │  │  • signaling    │                      │  • resource ids │           │
//! │  └────────┬────────┘                      └───┬─────────┬───┘           │
//! │           │                      renderables  │         │ Resource      │
//! │           │                      TripleBuffer │         │ Request/Event │
//! │           │                                   v         v               │
//! │           │                               ┌─────────────────┐           │
//! │           └──────────────────────────────>│   RENDER        │           │
//! │                 WorkerMessage bus         │  • frames       │           │
//! │                                           │  • decoding     │           │
//! │                                           └─────────────────┘           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: TOML engine configuration
//! - `engine`: main-thread bootstrap and control
//! - `message`: the worker message bus
//! - `game` / `render`: the two workers
//! - `layout`: byte layouts of the shared buffers
//! - `transforms`: replicated world state
//! - `collab`: physics and renderer plug-in traits
//! - `tick`: fixed-timestep pacing

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod game;
pub mod layout;
pub mod message;
pub mod render;
pub mod tick;
pub mod transforms;
mod worker;

// Re-export the subsystems
pub use triad_core as kernel;
pub use triad_networking as networking;
pub use triad_resources as resources;

// Re-export commonly used types
pub use collab::{FrameRenderer, GameResources, NoPhysics, NoRenderer, PhysicsStep, RenderResources};
pub use config::EngineConfig;
pub use engine::{Collaborators, Engine, HANDSHAKE_TIMEOUT};
pub use error::{ConfigError, EngineError, EngineResult};
pub use game::{GameSession, GameWorker};
pub use layout::{InputLayout, InputState, RenderFrame, RenderableLayout};
pub use message::{GameWorkerInit, RenderWorkerInit, WorkerMessage};
pub use render::RenderWorker;
pub use tick::{NetworkClock, TickLoop, TickStats};
pub use transforms::{Transform, TransformStore, TransformTemplate, IDENTITY_ROTATION};
