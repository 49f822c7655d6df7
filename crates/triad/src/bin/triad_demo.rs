//! # TRIAD Demo
//!
//! Two engines in one process, linked by in-memory data channels. Alice
//! spawns an orbiting entity; Bob mirrors it and logs what his render
//! thread sees.
//!
//! ```bash
//! RUST_LOG=debug triad_demo [config.toml] [seconds]
//! ```

use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing_subscriber::EnvFilter;

use triad::networking::{InboundSender, MemoryChannel};
use triad::resources::{FnLoader, LoadResponse, ResourceDefinition};
use triad::{
    Collaborators, Engine, EngineConfig, EngineResult, FrameRenderer, GameSession, InputState,
    PhysicsStep, RenderFrame, RenderResources, WorkerMessage,
};

const ALICE: &str = "@alice:triad.local";
const BOB: &str = "@bob:triad.local";

/// Spawns one entity and moves it around a circle; input axes shift the
/// circle's centre.
#[derive(Default)]
struct Orbit {
    entity: Option<triad::kernel::EntityId>,
    angle: f32,
    centre: [f32; 2],
}

impl PhysicsStep for Orbit {
    fn setup(&mut self, session: &mut GameSession<'_>) {
        match session.spawn([1.0, 0.0, 0.0]) {
            Ok(entity) => self.entity = Some(entity),
            Err(err) => tracing::error!(%err, "spawn failed"),
        }
        session
            .resources
            .load_resource(ResourceDefinition::new("mesh").with_name("orbiter"));
    }

    fn step(&mut self, session: &mut GameSession<'_>, input: &InputState, dt: f32) {
        let Some(entity) = self.entity.filter(|&entity| session.is_mine(entity)) else {
            return;
        };
        self.centre[0] += input.axes[0] * dt;
        self.centre[1] += input.axes[1] * dt;
        self.angle += dt;
        if let Some(transform) = session.transforms.get_mut(entity) {
            transform.position = [
                self.centre[0] + self.angle.cos(),
                0.0,
                self.centre[1] + self.angle.sin(),
            ];
        }
    }
}

/// Logs the snapshot about once a second.
struct LogRenderer {
    user: &'static str,
    frames: u64,
}

impl FrameRenderer for LogRenderer {
    fn setup(&mut self, resources: &mut RenderResources) {
        resources.register_loader(FnLoader::new("mesh", |request| {
            Ok(LoadResponse::new(vec![0u8; 64]).with_name(request.name().to_owned()))
        }));
    }

    fn render(&mut self, frame: &RenderFrame<'_>, resources: &RenderResources) {
        self.frames += 1;
        if self.frames % 60 != 0 {
            return;
        }
        for transform in frame.iter() {
            tracing::info!(
                user = self.user,
                network_id = %transform.network_id,
                x = transform.position[0],
                z = transform.position[2],
                resources = resources.len(),
                "renderable"
            );
        }
    }
}

fn start(config: &EngineConfig, user: &'static str, physics: Box<dyn PhysicsStep>) -> EngineResult<Engine> {
    Engine::start(
        config.clone(),
        Collaborators {
            local_user_id: user.to_owned(),
            physics,
            renderer: Box::new(LogRenderer { user, frames: 0 }),
        },
    )
}

/// Waits for the game thread's inbound handle for `user`.
fn inbound_for(engine: &Engine, user: &str) -> Option<InboundSender> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        match engine.recv_timeout(Duration::from_millis(100)) {
            Some(WorkerMessage::PeerChannelReady { user_id, inbound }) if user_id == user => return Some(inbound),
            Some(other) => tracing::warn!(message = ?other, "unexpected worker message"),
            None => {}
        }
    }
    None
}

/// Moves frames from one channel end into the other engine's inbound queue.
fn spawn_transport(frames: Receiver<String>, inbound: InboundSender) {
    thread::spawn(move || {
        for frame in frames {
            let _ = inbound.push(&frame);
        }
    });
}

fn run(config: &EngineConfig, seconds: u64) -> EngineResult<()> {
    let mut alice = start(config, ALICE, Box::<Orbit>::default())?;
    let bob = start(config, BOB, Box::new(triad::NoPhysics))?;

    let (alice_end, bob_end) = MemoryChannel::pair();
    let to_alice = alice_end.incoming();
    let to_bob = bob_end.incoming();
    alice.connect_peer(BOB, Box::new(alice_end))?;
    bob.connect_peer(ALICE, Box::new(bob_end))?;

    let (Some(alice_inbound), Some(bob_inbound)) = (inbound_for(&alice, BOB), inbound_for(&bob, ALICE)) else {
        tracing::error!("peer channels never became ready");
        return Ok(());
    };
    spawn_transport(to_bob, bob_inbound);
    spawn_transport(to_alice, alice_inbound);

    let deadline = Instant::now() + Duration::from_secs(seconds);
    let mut phase = 0.0f32;
    while Instant::now() < deadline {
        phase += 0.05;
        alice.publish_input(InputState {
            axes: [phase.sin(), 0.0],
            ..InputState::default()
        })?;
        for engine in [&alice, &bob] {
            while let Some(message) = engine.try_recv() {
                if let WorkerMessage::GameWorkerError(error) | WorkerMessage::RenderWorkerError(error) = message {
                    tracing::error!(%error, "worker failed");
                }
            }
        }
        thread::sleep(Duration::from_millis(16));
    }

    alice.disconnect_peer(BOB)?;
    bob.disconnect_peer(ALICE)?;
    alice.shutdown()?;
    bob.shutdown()
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => match EngineConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(%err, "bad configuration");
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };
    let seconds = args.next().and_then(|arg| arg.parse().ok()).unwrap_or(5);

    tracing::info!(?config, seconds, "starting demo");
    match run(&config, seconds) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "demo failed");
            ExitCode::FAILURE
        }
    }
}
