//! # Worker Lifecycle
//!
//! The game and render workers share one lifecycle: wait for their init
//! message, build state, report, wait for start, then tick at a fixed rate
//! until `Shutdown` while draining their inbox between ticks.

use std::ops::ControlFlow;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::error::EngineResult;
use crate::message::{post, WorkerMessage};
use crate::tick::TickLoop;

/// Longest a worker sleeps before polling its inbox again.
const INBOX_POLL: Duration = Duration::from_millis(5);

/// A thread-owned worker driven by [`run_worker`].
pub(crate) trait Worker: Sized {
    /// Init payload.
    type Init;

    /// Thread name suffix and log label.
    const NAME: &'static str;

    /// Span every event of this worker is recorded in.
    fn span() -> tracing::Span;

    /// Extracts this worker's init payload, or hands the message back.
    fn take_init(message: WorkerMessage) -> Result<Self::Init, WorkerMessage>;

    /// Whether `message` is this worker's start signal.
    fn is_start(message: &WorkerMessage) -> bool;

    /// Handshake reply.
    fn initialized() -> WorkerMessage;

    /// Fatal error report.
    fn failed(message: String) -> WorkerMessage;

    /// Builds the worker.
    fn create(init: Self::Init, outbox: Sender<WorkerMessage>) -> EngineResult<Self>;

    /// Called once after start.
    fn start(&mut self) {}

    /// Applies one inbox message. `Break` stops the worker.
    fn handle(&mut self, message: WorkerMessage) -> ControlFlow<()>;

    /// One fixed-rate step.
    fn tick(&mut self) -> EngineResult<()>;

    /// Pacing.
    fn tick_loop(&mut self) -> &mut TickLoop;

    /// Called once on the way out, however the worker stops.
    fn stop(&mut self) {}
}

/// Runs a worker to completion on the current thread.
pub(crate) fn run_worker<W: Worker>(inbox: &Receiver<WorkerMessage>, outbox: &Sender<WorkerMessage>) {
    let Some(init) = wait_for_init::<W>(inbox) else {
        return;
    };

    let mut worker = match W::create(init, outbox.clone()) {
        Ok(worker) => worker,
        Err(err) => {
            tracing::error!(%err, "worker failed to initialize");
            post(outbox, W::failed(err.to_string()));
            return;
        }
    };
    post(outbox, W::initialized());

    if wait_for_start(&mut worker, inbox).is_break() {
        worker.stop();
        return;
    }
    tracing::info!(worker = W::NAME, "worker started");
    worker.start();

    if let Err(err) = run_ticks(&mut worker, inbox) {
        tracing::error!(%err, "worker stopped on error");
        post(outbox, W::failed(err.to_string()));
    }
    worker.stop();
    tracing::info!(worker = W::NAME, ticks = worker.tick_loop().tick_count(), "worker stopped");
}

fn wait_for_init<W: Worker>(inbox: &Receiver<WorkerMessage>) -> Option<W::Init> {
    loop {
        match W::take_init(inbox.recv().ok()?) {
            Ok(init) => return Some(init),
            Err(WorkerMessage::Shutdown) => return None,
            Err(other) => tracing::warn!(message = other.name(), "message before init ignored"),
        }
    }
}

fn wait_for_start<W: Worker>(worker: &mut W, inbox: &Receiver<WorkerMessage>) -> ControlFlow<()> {
    loop {
        let Ok(message) = inbox.recv() else {
            return ControlFlow::Break(());
        };
        if W::is_start(&message) {
            return ControlFlow::Continue(());
        }
        worker.handle(message)?;
    }
}

fn run_ticks<W: Worker>(worker: &mut W, inbox: &Receiver<WorkerMessage>) -> EngineResult<()> {
    loop {
        loop {
            match inbox.try_recv() {
                Ok(message) => {
                    if worker.handle(message).is_break() {
                        return Ok(());
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }

        while worker.tick_loop().should_tick() {
            let start = worker.tick_loop().begin_tick();
            worker.tick()?;
            worker.tick_loop().end_tick(start);
        }
        worker.tick_loop().wait_for_next_tick(INBOX_POLL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    /// Counts ticks; fails on demand.
    struct Probe {
        tick: TickLoop,
        ticks: u32,
        fail_after: Option<u32>,
    }

    impl Worker for Probe {
        type Init = Option<u32>;
        const NAME: &'static str = "probe";

        fn span() -> tracing::Span {
            tracing::info_span!("probe")
        }

        fn take_init(message: WorkerMessage) -> Result<Self::Init, WorkerMessage> {
            match message {
                WorkerMessage::GameWorkerError(text) => Ok(text.parse().ok()),
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
            WorkerMessage::RenderWorkerError(message)
        }

        fn create(fail_after: Self::Init, _outbox: Sender<WorkerMessage>) -> EngineResult<Self> {
            Ok(Self {
                tick: TickLoop::new(1000),
                ticks: 0,
                fail_after,
            })
        }

        fn handle(&mut self, message: WorkerMessage) -> ControlFlow<()> {
            match message {
                WorkerMessage::Shutdown => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        }

        fn tick(&mut self) -> EngineResult<()> {
            self.ticks += 1;
            match self.fail_after {
                Some(limit) if self.ticks >= limit => Err(crate::error::EngineError::Worker {
                    worker: "probe",
                    message: "limit".into(),
                }),
                _ => Ok(()),
            }
        }

        fn tick_loop(&mut self) -> &mut TickLoop {
            &mut self.tick
        }
    }

    #[test]
    fn test_handshake_then_shutdown() {
        let (to_worker, inbox) = unbounded();
        let (outbox, from_worker) = unbounded();
        let handle = std::thread::spawn(move || run_worker::<Probe>(&inbox, &outbox));

        to_worker.send(WorkerMessage::GameWorkerError("none".into())).unwrap();
        assert!(matches!(
            from_worker.recv_timeout(Duration::from_secs(5)).unwrap(),
            WorkerMessage::GameWorkerInitialized
        ));
        to_worker.send(WorkerMessage::StartGameWorker).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        to_worker.send(WorkerMessage::Shutdown).unwrap();
        handle.join().unwrap();
        assert!(from_worker.try_recv().is_err());
    }

    #[test]
    fn test_tick_error_is_reported() {
        let (to_worker, inbox) = unbounded();
        let (outbox, from_worker) = unbounded();
        let handle = std::thread::spawn(move || run_worker::<Probe>(&inbox, &outbox));

        to_worker.send(WorkerMessage::GameWorkerError("3".into())).unwrap();
        to_worker.send(WorkerMessage::StartGameWorker).unwrap();
        handle.join().unwrap();

        let messages: Vec<_> = from_worker.try_iter().collect();
        assert!(matches!(messages[0], WorkerMessage::GameWorkerInitialized));
        assert!(matches!(&messages[1], WorkerMessage::RenderWorkerError(text) if text.contains("limit")));
    }

    #[test]
    fn test_shutdown_before_init() {
        let (to_worker, inbox) = unbounded();
        let (outbox, from_worker) = unbounded();
        to_worker.send(WorkerMessage::StartGameWorker).unwrap();
        to_worker.send(WorkerMessage::Shutdown).unwrap();
        run_worker::<Probe>(&inbox, &outbox);
        assert!(from_worker.try_recv().is_err());
    }
}
