//! # Engine Bootstrap
//!
//! The main thread's side of the runtime. [`Engine::start`] creates the
//! shared buffers and ports, spawns the game and render threads, and runs
//! the handshake. After that the main thread only publishes input and relays
//! peer channel lifecycle; it never touches simulation or render state.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use triad_core::{SharedCounter, TripleBuffer, TripleBufferWriter};
use triad_networking::DataChannel;

use crate::collab::{FrameRenderer, PhysicsStep};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::game::GameWorker;
use crate::layout::{InputLayout, InputState, RenderableLayout};
use crate::message::{GameWorkerInit, RenderWorkerInit, WorkerMessage};
use crate::tick::NetworkClock;
use crate::render::RenderWorker;
use crate::worker::{run_worker, Worker};

/// How long [`Engine::start`] waits for both workers to initialize.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Application pieces plugged into the runtime.
pub struct Collaborators {
    /// Protocol-level id of the local user.
    pub local_user_id: String,
    /// Runs on the game thread.
    pub physics: Box<dyn PhysicsStep>,
    /// Runs on the render thread.
    pub renderer: Box<dyn FrameRenderer>,
}

/// A running engine. Dropping it shuts both workers down.
pub struct Engine {
    config: EngineConfig,
    game_tx: Sender<WorkerMessage>,
    render_tx: Sender<WorkerMessage>,
    inbox: Receiver<WorkerMessage>,
    input: TripleBufferWriter,
    input_layout: InputLayout,
    input_sequence: u32,
    game: Option<JoinHandle<()>>,
    render: Option<JoinHandle<()>>,
}

impl Engine {
    /// Validates `config`, spawns the workers and completes the handshake.
    pub fn start(config: EngineConfig, collaborators: Collaborators) -> EngineResult<Self> {
        config.validate()?;
        let clock = NetworkClock::start();
        let Collaborators {
            local_user_id,
            physics,
            renderer,
        } = collaborators;

        let renderable_layout = RenderableLayout::new(config.max_renderables as usize)?;
        let (renderables_writer, renderables_reader) = TripleBuffer::new(renderable_layout.byte_len())?;
        let input_layout = InputLayout::new(config.input_buffer_bytes as usize)?;
        let (input_writer, input_reader) = TripleBuffer::new(config.input_buffer_bytes as usize)?;

        let capacity = config.message_capacity();
        let (game_tx, game_inbox) = bounded(capacity);
        let (render_tx, render_inbox) = bounded(capacity);
        let (main_tx, inbox) = bounded(capacity);
        let (request_tx, request_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();

        let game = spawn_worker::<GameWorker>(game_inbox, main_tx.clone())?;
        let render = match spawn_worker::<RenderWorker>(render_inbox, main_tx) {
            Ok(handle) => handle,
            Err(err) => {
                abandon_worker(GameWorker::NAME, &game_tx, game);
                return Err(err);
            }
        };

        let engine = Self {
            config: config.clone(),
            game_tx,
            render_tx,
            inbox,
            input: input_writer,
            input_layout,
            input_sequence: 0,
            game: Some(game),
            render: Some(render),
        };

        engine.send_game(WorkerMessage::InitGameWorker(Box::new(GameWorkerInit {
            config: config.clone(),
            local_user_id,
            clock,
            renderables: renderables_writer,
            input: input_reader,
            resource_counter: SharedCounter::new(),
            resource_requests: request_tx,
            resource_events: event_rx,
            physics,
        })))?;
        engine.send_render(WorkerMessage::InitRenderWorker(Box::new(RenderWorkerInit {
            config,
            renderables: renderables_reader,
            resource_requests: request_rx,
            resource_events: event_tx,
            renderer,
        })))?;

        engine.await_initialized()?;
        engine.send_game(WorkerMessage::StartGameWorker)?;
        engine.send_render(WorkerMessage::StartRenderWorker)?;
        tracing::info!("engine started");
        Ok(engine)
    }

    fn await_initialized(&self) -> EngineResult<()> {
        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        let (mut game, mut render) = (false, false);

        while !(game && render) {
            let pending = if game { "render" } else { "game" };
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.inbox.recv_timeout(remaining) {
                Ok(WorkerMessage::GameWorkerInitialized) => game = true,
                Ok(WorkerMessage::RenderWorkerInitialized) => render = true,
                Ok(WorkerMessage::GameWorkerError(message)) => {
                    return Err(EngineError::Worker {
                        worker: GameWorker::NAME,
                        message,
                    })
                }
                Ok(WorkerMessage::RenderWorkerError(message)) => {
                    return Err(EngineError::Worker {
                        worker: RenderWorker::NAME,
                        message,
                    })
                }
                Ok(other) => tracing::warn!(message = other.name(), "unexpected message during handshake"),
                Err(RecvTimeoutError::Timeout) => return Err(EngineError::HandshakeTimeout { worker: pending }),
                Err(RecvTimeoutError::Disconnected) => return Err(EngineError::Disconnected { worker: pending }),
            }
        }
        Ok(())
    }

    /// Configuration the engine was started with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Publishes an input snapshot for the game thread. The sequence number
    /// is assigned here.
    pub fn publish_input(&mut self, state: InputState) -> EngineResult<u32> {
        self.input_sequence = self.input_sequence.wrapping_add(1);
        let state = InputState {
            sequence: self.input_sequence,
            ..state
        };
        self.input_layout.write(self.input.write_view(), &state)?;
        self.input.swap_write_buffer();
        Ok(self.input_sequence)
    }

    /// Hands an open data channel to the game thread. The inbound handle for
    /// the transport arrives later as [`WorkerMessage::PeerChannelReady`].
    pub fn connect_peer(&self, user_id: impl Into<String>, channel: Box<dyn DataChannel>) -> EngineResult<()> {
        self.send_game(WorkerMessage::PeerChannelOpened {
            user_id: user_id.into(),
            channel,
        })
    }

    /// Tells the game thread a peer's channel closed.
    pub fn disconnect_peer(&self, user_id: impl Into<String>) -> EngineResult<()> {
        self.send_game(WorkerMessage::PeerChannelClosed {
            user_id: user_id.into(),
        })
    }

    /// Next message from a worker, if one is waiting.
    #[must_use]
    pub fn try_recv(&self) -> Option<WorkerMessage> {
        self.inbox.try_recv().ok()
    }

    /// Next message from a worker, waiting up to `timeout`.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkerMessage> {
        self.inbox.recv_timeout(timeout).ok()
    }

    /// Stops both workers and waits for them.
    pub fn shutdown(mut self) -> EngineResult<()> {
        self.stop()
    }

    fn stop(&mut self) -> EngineResult<()> {
        let mut result = Ok(());
        let mut joined = 0;
        for (worker, tx, handle) in [
            (GameWorker::NAME, &self.game_tx, self.game.take()),
            (RenderWorker::NAME, &self.render_tx, self.render.take()),
        ] {
            let Some(handle) = handle else { continue };
            // Blocking: the worker drains its inbox every tick.
            let _ = tx.send(WorkerMessage::Shutdown);
            if handle.join().is_err() && result.is_ok() {
                result = Err(EngineError::Panicked { worker });
            }
            joined += 1;
        }
        if joined > 0 && result.is_ok() {
            tracing::info!("engine stopped");
        }
        result
    }

    fn send_game(&self, message: WorkerMessage) -> EngineResult<()> {
        send(&self.game_tx, GameWorker::NAME, message)
    }

    fn send_render(&self, message: WorkerMessage) -> EngineResult<()> {
        send(&self.render_tx, RenderWorker::NAME, message)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::error!(%err, "engine shutdown failed");
        }
    }
}

fn send(tx: &Sender<WorkerMessage>, worker: &'static str, message: WorkerMessage) -> EngineResult<()> {
    tx.try_send(message).map_err(|err| match err {
        TrySendError::Full(_) => EngineError::BusFull { worker },
        TrySendError::Disconnected(_) => EngineError::Disconnected { worker },
    })
}

/// Stops a worker that will never be started. Returns whether it exited
/// cleanly; a panic is logged, not propagated.
fn abandon_worker(worker: &'static str, tx: &Sender<WorkerMessage>, handle: JoinHandle<()>) -> bool {
    if tx.send(WorkerMessage::Shutdown).is_err() {
        tracing::debug!(worker, "worker already gone");
    }
    match handle.join() {
        Ok(()) => true,
        Err(_) => {
            tracing::warn!(worker, "worker panicked while being abandoned");
            false
        }
    }
}

fn spawn_worker<W: Worker + 'static>(
    inbox: Receiver<WorkerMessage>,
    outbox: Sender<WorkerMessage>,
) -> EngineResult<JoinHandle<()>>
where
    W::Init: 'static,
{
    thread::Builder::new()
        .name(format!("triad-{}", W::NAME))
        .spawn(move || {
            let span = W::span();
            let _entered = span.enter();
            run_worker::<W>(&inbox, &outbox);
        })
        .map_err(|source| EngineError::Spawn {
            worker: W::NAME,
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abandon_worker_reports_panic() {
        let (tx, rx) = bounded::<WorkerMessage>(1);
        let handle = thread::spawn(move || {
            let _ = rx.recv();
            panic!("init failed");
        });
        assert!(!abandon_worker("game", &tx, handle));
    }

    #[test]
    fn test_abandon_worker_stops_idle_worker() {
        let (tx, rx) = bounded::<WorkerMessage>(1);
        let handle = thread::spawn(move || {
            assert!(matches!(rx.recv(), Ok(WorkerMessage::Shutdown)));
        });
        assert!(abandon_worker("game", &tx, handle));
    }

    #[test]
    fn test_abandon_worker_tolerates_closed_inbox() {
        let (tx, rx) = bounded::<WorkerMessage>(1);
        drop(rx);
        let handle = thread::spawn(|| {});
        assert!(abandon_worker("render", &tx, handle));
    }
}
