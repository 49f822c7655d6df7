//! End-to-end engine tests: real threads, real buffers, real channels.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use triad::kernel::{EntityId, MemoryError};
use triad::networking::{InboundSender, MemoryChannel, NetworkId};
use triad::resources::{FnLoader, LoadError, LoadResponse, ResourceDefinition, ResourceId, ResourceState};
use triad::{
    Collaborators, ConfigError, Engine, EngineConfig, EngineError, FrameRenderer, GameSession, InputState,
    NoPhysics, PhysicsStep, RenderFrame, RenderResources, Transform, WorkerMessage,
};

const WAIT: Duration = Duration::from_secs(5);

/// Reports from the game thread.
#[derive(Debug, PartialEq)]
enum GameReport {
    Spawned(NetworkId),
    ResourceReady(ResourceState),
}

/// Spawns one entity, asks for one resource, and puts the entity at
/// `x = input.axes[0]`.
struct TrackingPhysics {
    reports: Sender<GameReport>,
    entity: Option<EntityId>,
    resource: Option<ResourceId>,
    resource_reported: bool,
    resource_kind: &'static str,
}

impl TrackingPhysics {
    fn new(reports: Sender<GameReport>, resource_kind: &'static str) -> Self {
        Self {
            reports,
            entity: None,
            resource: None,
            resource_reported: false,
            resource_kind,
        }
    }
}

impl PhysicsStep for TrackingPhysics {
    fn setup(&mut self, session: &mut GameSession<'_>) {
        let entity = session.spawn([0.0, 0.0, 0.0]).expect("spawn");
        let network_id = session.transforms.get(entity).expect("transform").network_id;
        self.entity = Some(entity);
        self.resource = Some(
            session
                .resources
                .load_resource(ResourceDefinition::new(self.resource_kind).with_name("crate")),
        );
        let _ = self.reports.send(GameReport::Spawned(network_id));
    }

    fn step(&mut self, session: &mut GameSession<'_>, input: &InputState, _dt: f32) {
        if let Some(transform) = self.entity.and_then(|entity| session.transforms.get_mut(entity)) {
            transform.position[0] = input.axes[0];
        }
        if self.resource_reported {
            return;
        }
        if let Some(state) = self.resource.and_then(|id| session.resources.state(id)) {
            if state != ResourceState::Loading {
                self.resource_reported = true;
                let _ = self.reports.send(GameReport::ResourceReady(state));
            }
        }
    }
}

/// Forwards every rendered frame.
struct RecordingRenderer {
    frames: Sender<Vec<Transform>>,
}

impl FrameRenderer for RecordingRenderer {
    fn setup(&mut self, resources: &mut RenderResources) {
        resources.register_loader(FnLoader::new("mesh", |request| {
            if request.name().is_empty() {
                return Err(LoadError::new("unnamed mesh"));
            }
            Ok(LoadResponse::new(vec![1u8, 2, 3]))
        }));
    }

    fn render(&mut self, frame: &RenderFrame<'_>, _resources: &RenderResources) {
        let _ = self.frames.send(frame.iter().collect());
    }
}

struct Harness {
    engine: Engine,
    reports: Receiver<GameReport>,
    frames: Receiver<Vec<Transform>>,
}

fn test_config(seed: u64) -> EngineConfig {
    EngineConfig {
        tick_rate: 120,
        frame_rate: 120,
        network_tick_interval_ms: 10,
        max_renderables: 64,
        seed: Some(seed),
        ..EngineConfig::default()
    }
}

fn start(user: &str, config: EngineConfig, physics: Option<&'static str>) -> Harness {
    let (report_tx, reports) = unbounded();
    let (frame_tx, frames) = unbounded();
    let physics: Box<dyn PhysicsStep> = match physics {
        Some(kind) => Box::new(TrackingPhysics::new(report_tx, kind)),
        None => Box::new(NoPhysics),
    };
    let engine = Engine::start(
        config,
        Collaborators {
            local_user_id: user.to_owned(),
            physics,
            renderer: Box::new(RecordingRenderer { frames: frame_tx }),
        },
    )
    .unwrap_or_else(|err| panic!("engine failed to start: {err}"));
    Harness {
        engine,
        reports,
        frames,
    }
}

/// Waits for a rendered frame matching `predicate`.
fn wait_for_frame(frames: &Receiver<Vec<Transform>>, predicate: impl Fn(&[Transform]) -> bool) -> Vec<Transform> {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if let Ok(frame) = frames.recv_timeout(Duration::from_millis(50)) {
            if predicate(&frame) {
                return frame;
            }
        }
    }
    panic!("no matching frame rendered in time");
}

fn wait_for_ready(engine: &Engine, user: &str) -> InboundSender {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if let Some(WorkerMessage::PeerChannelReady { user_id, inbound }) =
            engine.recv_timeout(Duration::from_millis(50))
        {
            if user_id == user {
                return inbound;
            }
        }
    }
    panic!("peer channel for {user} never became ready");
}

fn spawn_pump(frames: Receiver<String>, inbound: InboundSender) {
    thread::spawn(move || {
        for frame in frames {
            let _ = inbound.push(&frame);
        }
    });
}

#[test]
fn test_spawned_entity_reaches_the_render_thread() {
    let harness = start("@alice:test", test_config(1), Some("mesh"));

    let Ok(GameReport::Spawned(network_id)) = harness.reports.recv_timeout(WAIT) else {
        panic!("physics setup did not run");
    };
    let frame = wait_for_frame(&harness.frames, |frame| !frame.is_empty());
    assert_eq!(frame.len(), 1);
    assert_eq!(frame[0].network_id, network_id);

    harness.engine.shutdown().expect("clean shutdown");
}

#[test]
fn test_input_drives_physics() {
    let mut harness = start("@alice:test", test_config(2), Some("mesh"));

    let sequence = harness
        .engine
        .publish_input(InputState {
            axes: [0.5, 0.0],
            ..InputState::default()
        })
        .expect("publish");
    assert_eq!(sequence, 1);

    let frame = wait_for_frame(&harness.frames, |frame| {
        frame.first().is_some_and(|transform| (transform.position[0] - 0.5).abs() < f32::EPSILON)
    });
    assert_eq!(frame.len(), 1);

    let sequence = harness.engine.publish_input(InputState::default()).expect("publish");
    assert_eq!(sequence, 2);
    harness.engine.shutdown().expect("clean shutdown");
}

#[test]
fn test_resource_loads_across_threads() {
    let harness = start("@alice:test", test_config(3), Some("mesh"));

    let deadline = Instant::now() + WAIT;
    let mut ready = None;
    while ready.is_none() && Instant::now() < deadline {
        if let Ok(GameReport::ResourceReady(state)) = harness.reports.recv_timeout(Duration::from_millis(50)) {
            ready = Some(state);
        }
    }
    assert_eq!(ready, Some(ResourceState::Loaded));

    harness.engine.shutdown().expect("clean shutdown");
}

#[test]
fn test_unregistered_loader_fails_the_render_worker() {
    let harness = start("@alice:test", test_config(4), Some("texture"));

    let deadline = Instant::now() + WAIT;
    let mut failure = None;
    while failure.is_none() && Instant::now() < deadline {
        if let Some(WorkerMessage::RenderWorkerError(message)) = harness.engine.recv_timeout(Duration::from_millis(50))
        {
            failure = Some(message);
        }
    }
    let failure = failure.expect("render worker reported an error");
    assert!(failure.contains("texture"), "unexpected error: {failure}");

    harness.engine.shutdown().expect("game worker still stops cleanly");
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = EngineConfig {
        tick_rate: 0,
        ..EngineConfig::default()
    };
    let result = Engine::start(
        config,
        Collaborators {
            local_user_id: "@alice:test".to_owned(),
            physics: Box::new(NoPhysics),
            renderer: Box::new(triad::NoRenderer),
        },
    );
    assert!(matches!(
        result,
        Err(EngineError::Config(ConfigError::Zero("tick_rate")))
    ));
}

#[test]
fn test_input_buffer_too_small() {
    let config = EngineConfig {
        input_buffer_bytes: 8,
        ..EngineConfig::default()
    };
    let result = Engine::start(
        config,
        Collaborators {
            local_user_id: "@alice:test".to_owned(),
            physics: Box::new(NoPhysics),
            renderer: Box::new(triad::NoRenderer),
        },
    );
    assert!(matches!(
        result,
        Err(EngineError::Memory(MemoryError::OutOfBounds { .. }))
    ));
}

#[test]
fn test_two_engines_replicate_over_a_data_channel() {
    let mut alice = start("@alice:test", test_config(5), Some("mesh"));
    let bob = start("@bob:test", test_config(6), None);

    let Ok(GameReport::Spawned(network_id)) = alice.reports.recv_timeout(WAIT) else {
        panic!("alice did not spawn");
    };

    let (alice_end, bob_end) = MemoryChannel::pair();
    let to_alice = alice_end.incoming();
    let to_bob = bob_end.incoming();
    alice
        .engine
        .connect_peer("@bob:test", Box::new(alice_end))
        .expect("connect alice");
    bob.engine
        .connect_peer("@alice:test", Box::new(bob_end))
        .expect("connect bob");
    spawn_pump(to_alice, wait_for_ready(&alice.engine, "@bob:test"));
    spawn_pump(to_bob, wait_for_ready(&bob.engine, "@alice:test"));

    alice
        .engine
        .publish_input(InputState {
            axes: [2.0, 0.0],
            ..InputState::default()
        })
        .expect("publish");

    let frame = wait_for_frame(&bob.frames, |frame| {
        frame
            .iter()
            .any(|t| t.network_id == network_id && (t.position[0] - 2.0).abs() < f32::EPSILON)
    });
    assert_eq!(frame.len(), 1);

    alice.engine.disconnect_peer("@bob:test").expect("disconnect");
    bob.engine.disconnect_peer("@alice:test").expect("disconnect");
    alice.engine.shutdown().expect("alice shutdown");
    bob.engine.shutdown().expect("bob shutdown");
}
