//! # Render Worker
//!
//! Sole reader of the renderable snapshot and sole owner of decoded
//! resources. Loads run on a small tokio runtime owned by this thread; their
//! results are applied here between frames.

use std::ops::ControlFlow;

use crossbeam_channel::{Receiver, Sender};
use tokio::runtime::{Builder, Runtime};
use triad_core::TripleBufferReader;
use triad_resources::ResourceRequest;

use crate::collab::{FrameRenderer, RenderResources};
use crate::error::{EngineError, EngineResult};
use crate::layout::RenderableLayout;
use crate::message::{RenderWorkerInit, WorkerMessage};
use crate::tick::TickLoop;
use crate::worker::Worker;

/// Threads decoding resources off the render thread.
const LOADER_THREADS: usize = 2;

/// Render thread state.
pub struct RenderWorker {
    tick: TickLoop,
    resources: RenderResources,
    resource_requests: Receiver<ResourceRequest>,
    renderables: TripleBufferReader,
    layout: RenderableLayout,
    renderer: Box<dyn FrameRenderer>,
    snapshots: u64,
    // Dropped last: in-flight loads hold handles into it.
    _runtime: Runtime,
}

impl Worker for RenderWorker {
    type Init = Box<RenderWorkerInit>;
    const NAME: &'static str = "render";

    fn span() -> tracing::Span {
        tracing::info_span!("render")
    }

    fn take_init(message: WorkerMessage) -> Result<Self::Init, WorkerMessage> {
        match message {
            WorkerMessage::InitRenderWorker(init) => Ok(init),
            other => Err(other),
        }
    }

    fn is_start(message: &WorkerMessage) -> bool {
        matches!(message, WorkerMessage::StartRenderWorker)
    }

    fn initialized() -> WorkerMessage {
        WorkerMessage::RenderWorkerInitialized
    }

    fn failed(message: String) -> WorkerMessage {
        WorkerMessage::RenderWorkerError(message)
    }

    fn create(init: Self::Init, _outbox: Sender<WorkerMessage>) -> EngineResult<Self> {
        let RenderWorkerInit {
            config,
            renderables,
            resource_requests,
            resource_events,
            mut renderer,
        } = *init;

        let runtime = Builder::new_multi_thread()
            .worker_threads(LOADER_THREADS)
            .thread_name("triad-loader")
            .enable_time()
            .build()
            .map_err(|source| EngineError::Spawn {
                worker: "loader",
                source,
            })?;

        let mut resources = RenderResources::new(runtime.handle().clone(), resource_events);
        renderer.setup(&mut resources);

        Ok(Self {
            tick: TickLoop::new(config.frame_rate),
            resources,
            resource_requests,
            renderables,
            layout: RenderableLayout::new(config.max_renderables as usize)?,
            renderer,
            snapshots: 0,
            _runtime: runtime,
        })
    }

    fn handle(&mut self, message: WorkerMessage) -> ControlFlow<()> {
        match message {
            WorkerMessage::Shutdown => ControlFlow::Break(()),
            other => {
                tracing::warn!(message = other.name(), "unexpected message");
                ControlFlow::Continue(())
            }
        }
    }

    fn tick(&mut self) -> EngineResult<()> {
        while let Ok(request) = self.resource_requests.try_recv() {
            self.resources.process_message(request)?;
        }
        self.resources.update();

        if self.renderables.swap_read_buffer() {
            self.snapshots += 1;
        }
        let frame = self.layout.read(self.renderables.read_view())?;
        self.renderer.render(&frame, &self.resources);
        Ok(())
    }

    fn tick_loop(&mut self) -> &mut TickLoop {
        &mut self.tick
    }

    fn stop(&mut self) {
        tracing::debug!(
            frames = self.tick.tick_count(),
            snapshots = self.snapshots,
            resources = self.resources.len(),
            "render worker stopping"
        );
    }
}
