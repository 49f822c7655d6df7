//! # Collaborator Traits
//!
//! The runtime does not simulate or draw anything itself. Physics and
//! rendering plug in through these traits and run on their worker threads.
//!
//! ```text
//!   engine defines:          application implements:
//! ┌──────────────────┐      ┌──────────────────┐
//! │ trait PhysicsStep│ ◀─── │ impl PhysicsStep │   game thread
//! │ trait FrameRender│ ◀─── │ impl FrameRender │   render thread
//! └──────────────────┘      └──────────────────┘
//! ```

use crossbeam_channel::Sender;
use triad_resources::{RemoteResourceManager, ResourceEvent, ResourceManager, ResourceRequest};

use crate::game::GameSession;
use crate::layout::{InputState, RenderFrame};

/// Requesting half of the resource protocol, as owned by the game thread.
pub type GameResources = RemoteResourceManager<Sender<ResourceRequest>>;

/// Owning half of the resource protocol, as owned by the render thread.
pub type RenderResources = ResourceManager<Sender<ResourceEvent>>;

/// Simulation step, run on the game thread.
pub trait PhysicsStep: Send {
    /// Called once after the worker starts, before the first tick.
    fn setup(&mut self, _session: &mut GameSession<'_>) {}

    /// Advances the simulation by `dt` seconds.
    ///
    /// Only entities the local peer owns should be moved; the rest follow
    /// their owners through replication.
    fn step(&mut self, session: &mut GameSession<'_>, input: &InputState, dt: f32);
}

/// Frame submission, run on the render thread.
pub trait FrameRenderer: Send {
    /// Called once before the first frame. Register resource loaders here.
    fn setup(&mut self, _resources: &mut RenderResources) {}

    /// Draws the latest snapshot. Called every frame, whether or not the
    /// snapshot changed.
    fn render(&mut self, frame: &RenderFrame<'_>, resources: &RenderResources);
}

/// Physics that does nothing. For headless peers that only mirror.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPhysics;

impl PhysicsStep for NoPhysics {
    fn step(&mut self, _session: &mut GameSession<'_>, _input: &InputState, _dt: f32) {}
}

/// Renderer that draws nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRenderer;

impl FrameRenderer for NoRenderer {
    fn render(&mut self, _frame: &RenderFrame<'_>, _resources: &RenderResources) {}
}
