//! Resource protocol between two real threads.
//!
//! The "game" side runs on the test thread with a [`RemoteResourceManager`];
//! the "render" side runs a [`ResourceManager`] on its own thread with a
//! tokio runtime, pumping requests and completions until told to stop.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};
use triad_core::SharedCounter;
use triad_resources::{
    FnLoader, LoadError, LoadResponse, RemoteResourceManager, ResourceDefinition, ResourceEvent,
    ResourceId, ResourceLoader, ResourceManager, ResourceRequest, ResourceState, LoadFuture,
    LoadRequest, BoxedResource,
};

struct CountingDispose<L> {
    inner: L,
    disposed: Arc<AtomicUsize>,
}

impl<L: ResourceLoader> ResourceLoader for CountingDispose<L> {
    fn kind(&self) -> &str {
        self.inner.kind()
    }

    fn load(&mut self, request: LoadRequest) -> LoadFuture {
        self.inner.load(request)
    }

    fn dispose(&mut self, _resource_id: ResourceId, _resource: Option<BoxedResource>) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

fn spawn_render_thread(
    requests: Receiver<ResourceRequest>,
    events: crossbeam_channel::Sender<ResourceEvent>,
    stop: Arc<AtomicBool>,
    disposed: Arc<AtomicUsize>,
) -> thread::JoinHandle<Vec<String>> {
    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let mut manager = ResourceManager::new(runtime.handle().clone(), events);
        manager.register_loader(CountingDispose {
            inner: FnLoader::new("text", |request: LoadRequest| {
                let bytes = request.payload.unwrap_or_default();
                if bytes.is_empty() {
                    return Err(LoadError::new("empty payload"));
                }
                let text = String::from_utf8(bytes).map_err(|e| LoadError::new(e.to_string()))?;
                let len = text.len();
                Ok(LoadResponse::new(text).with_remote(serde_json::json!({ "len": len })))
            }),
            disposed,
        });

        let mut fatal = Vec::new();
        while !stop.load(Ordering::Acquire) {
            while let Ok(request) = requests.try_recv() {
                if let Err(err) = manager.process_message(request) {
                    fatal.push(err.to_string());
                }
            }
            manager.update();
            thread::sleep(Duration::from_millis(1));
        }
        fatal
    })
}

fn wait_for(events: &Receiver<ResourceEvent>) -> ResourceEvent {
    events
        .recv_timeout(Duration::from_secs(5))
        .expect("render thread never answered")
}

#[test]
fn load_refcount_and_dispose_across_threads() {
    let (request_tx, request_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    let stop = Arc::new(AtomicBool::new(false));
    let disposed = Arc::new(AtomicUsize::new(0));
    let render = spawn_render_thread(request_rx, event_tx, Arc::clone(&stop), Arc::clone(&disposed));

    let mut remote = RemoteResourceManager::new(SharedCounter::new(), request_tx);

    let started = Instant::now();
    let id = remote.load_resource_with_payload(ResourceDefinition::new("text"), Some(b"hello".to_vec()));
    assert!(started.elapsed() < Duration::from_millis(100), "load_resource must not block");
    assert_eq!(remote.state(id), Some(ResourceState::Loading));

    let event = wait_for(&event_rx);
    remote.process_message(event.clone());
    assert_eq!(
        event,
        ResourceEvent::Loaded {
            resource_id: id,
            remote_resource: Some(serde_json::json!({ "len": 5 })),
        }
    );
    assert_eq!(remote.state(id), Some(ResourceState::Loaded));

    remote.add_resource_ref(id);
    remote.remove_resource_ref(id);
    remote.remove_resource_ref(id);
    remote.remove_resource_ref(id);

    let event = wait_for(&event_rx);
    assert_eq!(event, ResourceEvent::Disposed { resource_id: id });
    remote.process_message(event);
    assert!(remote.info(id).is_none());

    // The extra remove must not produce a second dispose.
    assert!(event_rx.recv_timeout(Duration::from_millis(100)).is_err());

    stop.store(true, Ordering::Release);
    assert!(render.join().unwrap().is_empty());
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
}

#[test]
fn load_error_and_unregistered_kind() {
    let (request_tx, request_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    let stop = Arc::new(AtomicBool::new(false));
    let render = spawn_render_thread(
        request_rx,
        event_tx,
        Arc::clone(&stop),
        Arc::new(AtomicUsize::new(0)),
    );

    let mut remote = RemoteResourceManager::new(SharedCounter::new(), request_tx);
    let bad = remote.load_resource(ResourceDefinition::new("text"));
    let event = wait_for(&event_rx);
    assert!(matches!(event, ResourceEvent::LoadFailed { resource_id, .. } if resource_id == bad));
    remote.process_message(event);
    assert_eq!(remote.state(bad), Some(ResourceState::Error));

    remote.load_resource(ResourceDefinition::new("video"));
    thread::sleep(Duration::from_millis(50));

    stop.store(true, Ordering::Release);
    let fatal = render.join().unwrap();
    assert_eq!(fatal, vec!["resource loader video not registered".to_string()]);
}
