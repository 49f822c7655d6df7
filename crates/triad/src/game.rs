//! # Game Worker
//!
//! Owns the simulation: transforms, the replicator and the requesting half
//! of the resource protocol.
//!
//! ```text
//! tick:
//!   1. apply resource events from the render thread
//!   2. claim the newest input snapshot, if any
//!   3. apply queued peer messages (arrival order)
//!   4. physics step
//!   5. replication send (every network_tick_interval_ms)
//!   6. write renderable snapshot, swap
//! ```

use std::ops::ControlFlow;

use crossbeam_channel::{Receiver, Sender};
use triad_core::{EntityId, TripleBufferReader, TripleBufferWriter};
use triad_networking::{DataChannel, NetworkIdAllocator, ReplicationResult, Replicator, TemplateId};
use triad_resources::ResourceEvent;

use crate::collab::{GameResources, PhysicsStep};
use crate::error::EngineResult;
use crate::layout::{InputLayout, InputState, RenderableLayout};
use crate::message::{post, GameWorkerInit, WorkerMessage};
use crate::tick::{NetworkClock, TickLoop};
use crate::transforms::{Transform, TransformStore, TransformTemplate};
use crate::worker::Worker;

/// What physics sees of the game thread during one call.
pub struct GameSession<'a> {
    /// World state.
    pub transforms: &'a mut TransformStore,
    /// Entity replication.
    pub replicator: &'a mut Replicator<TransformStore>,
    /// Resource requests to the render thread.
    pub resources: &'a mut GameResources,
    /// Network clock at the start of this tick.
    pub now_ms: u32,
    transform_template: TemplateId,
}

impl GameSession<'_> {
    /// Spawns a locally owned, replicated entity at `position`.
    pub fn spawn(&mut self, position: [f32; 3]) -> ReplicationResult<EntityId> {
        let entity = self.replicator.spawn(self.transform_template, self.now_ms)?;
        if let Some(record) = self.replicator.entity(entity) {
            self.transforms
                .insert(entity, Transform::new(record.network_id, position));
        }
        Ok(entity)
    }

    /// Removes a local entity; peers hear about it on the next network tick.
    pub fn despawn(&mut self, entity: EntityId) -> ReplicationResult<()> {
        self.replicator.despawn(entity)?;
        self.transforms.remove(entity);
        Ok(())
    }

    /// Claims an entity another peer owns.
    pub fn take_ownership(&mut self, entity: EntityId) -> ReplicationResult<()> {
        self.replicator.take_ownership(entity, self.now_ms)
    }

    /// Whether the local peer owns `entity`.
    #[must_use]
    pub fn is_mine(&self, entity: EntityId) -> bool {
        self.replicator.is_mine(entity)
    }
}

/// Game thread state.
pub struct GameWorker {
    tick: TickLoop,
    clock: NetworkClock,
    outbox: Sender<WorkerMessage>,
    transforms: TransformStore,
    replicator: Replicator<TransformStore>,
    transform_template: TemplateId,
    resources: GameResources,
    resource_events: Receiver<ResourceEvent>,
    renderables: TripleBufferWriter,
    renderable_layout: RenderableLayout,
    input: TripleBufferReader,
    input_layout: InputLayout,
    last_input: InputState,
    physics: Box<dyn PhysicsStep>,
}

impl GameWorker {
    fn session(&mut self) -> (GameSession<'_>, &mut Box<dyn PhysicsStep>, &InputState) {
        (
            GameSession {
                transforms: &mut self.transforms,
                replicator: &mut self.replicator,
                resources: &mut self.resources,
                now_ms: self.clock.now_ms(),
                transform_template: self.transform_template,
            },
            &mut self.physics,
            &self.last_input,
        )
    }

    fn open_peer(&mut self, user_id: String, channel: Box<dyn DataChannel>) {
        let inbound = self.replicator.open_channel(user_id.as_str(), channel);
        post(&self.outbox, WorkerMessage::PeerChannelReady { user_id, inbound });
    }
}

impl Worker for GameWorker {
    type Init = Box<GameWorkerInit>;
    const NAME: &'static str = "game";

    fn span() -> tracing::Span {
        tracing::info_span!("game")
    }

    fn take_init(message: WorkerMessage) -> Result<Self::Init, WorkerMessage> {
        match message {
            WorkerMessage::InitGameWorker(init) => Ok(init),
            other => Err(other),
        }
    }

    fn is_start(message: &WorkerMessage) -> bool {
        matches!(message, WorkerMessage::StartGameWorker)
    }

    fn initialized() -> WorkerMessage {
        WorkerMessage::GameWorkerInitialized
    }

    fn failed(message: String) -> WorkerMessage {
        WorkerMessage::GameWorkerError(message)
    }

    fn create(init: Self::Init, outbox: Sender<WorkerMessage>) -> EngineResult<Self> {
        let GameWorkerInit {
            config,
            local_user_id,
            clock,
            renderables,
            input,
            resource_counter,
            resource_requests,
            resource_events,
            physics,
        } = *init;

        let renderable_layout = RenderableLayout::new(config.max_renderables as usize)?;
        let input_layout = InputLayout::new(config.input_buffer_bytes as usize)?;

        let ids = config
            .seed
            .map_or_else(NetworkIdAllocator::from_entropy, NetworkIdAllocator::seeded);
        let mut replicator = Replicator::new(local_user_id.as_str(), config.network_tick_interval_ms, ids);
        let transform_template = replicator.register_template(TransformTemplate);

        tracing::debug!(user = %local_user_id, snapshot_bytes = renderable_layout.byte_len(), "game worker initialized");

        Ok(Self {
            tick: TickLoop::new(config.tick_rate),
            clock,
            outbox,
            transforms: TransformStore::new(),
            replicator,
            transform_template,
            resources: GameResources::new(resource_counter, resource_requests),
            resource_events,
            renderables,
            renderable_layout,
            input,
            input_layout,
            last_input: InputState::default(),
            physics,
        })
    }

    fn start(&mut self) {
        let (mut session, physics, _) = self.session();
        physics.setup(&mut session);
    }

    fn handle(&mut self, message: WorkerMessage) -> ControlFlow<()> {
        match message {
            WorkerMessage::Shutdown => return ControlFlow::Break(()),
            WorkerMessage::PeerChannelOpened { user_id, channel } => self.open_peer(user_id, channel),
            WorkerMessage::PeerChannelClosed { user_id } => {
                if !self.replicator.close_channel(&user_id) {
                    tracing::debug!(user = %user_id, "close for unknown peer ignored");
                }
            }
            other => tracing::warn!(message = other.name(), "unexpected message"),
        }
        ControlFlow::Continue(())
    }

    fn tick(&mut self) -> EngineResult<()> {
        while let Ok(event) = self.resource_events.try_recv() {
            self.resources.process_message(event);
        }

        if self.input.swap_read_buffer() {
            self.last_input = self.input_layout.read(self.input.read_view())?;
        }

        self.replicator.receive(&mut self.transforms);

        let dt = self.tick.delta_seconds();
        let (mut session, physics, input) = self.session();
        let now_ms = session.now_ms;
        physics.step(&mut session, input, dt);

        if let Some(stats) = self.replicator.send(&self.transforms, now_ms) {
            if stats.frames > 0 {
                tracing::trace!(?stats, "replication sent");
            }
        }

        self.renderable_layout
            .write(self.renderables.write_view(), &self.transforms)?;
        self.renderables.swap_write_buffer();
        Ok(())
    }

    fn tick_loop(&mut self) -> &mut TickLoop {
        &mut self.tick
    }

    fn stop(&mut self) {
        self.replicator.dispose();
    }
}
