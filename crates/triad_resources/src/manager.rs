//! # Resource Manager (owning half)
//!
//! Lives on the render thread. Holds every decoded resource, the loader
//! registry and the refcounts.
//!
//! ## Load lifecycle
//!
//! ```text
//!  Load ──▶ Loading ──(future resolves, update())──▶ Loaded ──▶ post Loaded
//!              │                                  └▶ Error  ──▶ post LoadFailed
//!              │
//!              └─ last ref dropped while Loading: dispose once settled,
//!                 post Disposed only
//! ```
//!
//! Futures run on the tokio runtime; their results come back over a
//! crossbeam channel and are applied by [`ResourceManager::update`], so
//! records are only ever touched on the owning thread.

use std::any::Any;
use std::collections::HashMap;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tokio::runtime::Handle;

use crate::error::{LoadError, ResourceError, ResourceResult};
use crate::loader::{BoxedResource, LoadRequest, LoadResponse, ResourceLoader};
use crate::message::{
    PostMessageTarget, ResourceDefinition, ResourceEvent, ResourceId, ResourceRequest,
    ResourceState,
};

/// Snapshot of one record, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    /// Record id.
    pub resource_id: ResourceId,
    /// Loader kind.
    pub kind: String,
    /// Resolved display name.
    pub name: String,
    /// Outstanding references.
    pub ref_count: u32,
    /// Current state.
    pub state: ResourceState,
}

struct ResourceRecord {
    kind: String,
    name: String,
    has_explicit_name: bool,
    ref_count: u32,
    state: ResourceState,
    resource: Option<BoxedResource>,
    error: Option<LoadError>,
    /// Last reference dropped while the load was in flight.
    dispose_when_settled: bool,
}

struct Completion {
    resource_id: ResourceId,
    result: Result<LoadResponse, LoadError>,
}

/// Owning half of the resource protocol.
pub struct ResourceManager<P> {
    runtime: Handle,
    outbox: P,
    loaders: HashMap<String, Box<dyn ResourceLoader>>,
    store: HashMap<ResourceId, ResourceRecord>,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
}

impl<P: PostMessageTarget<ResourceEvent>> ResourceManager<P> {
    /// Creates a manager that runs loads on `runtime` and posts events to `outbox`.
    pub fn new(runtime: Handle, outbox: P) -> Self {
        let (completion_tx, completion_rx) = unbounded();
        Self {
            runtime,
            outbox,
            loaders: HashMap::new(),
            store: HashMap::new(),
            completion_tx,
            completion_rx,
        }
    }

    /// Registers the loader for its kind, replacing any previous one.
    pub fn register_loader<L: ResourceLoader + 'static>(&mut self, loader: L) {
        let kind = loader.kind().to_owned();
        if self.loaders.insert(kind.clone(), Box::new(loader)).is_some() {
            tracing::warn!(%kind, "resource loader replaced");
        } else {
            tracing::debug!(%kind, "resource loader registered");
        }
    }

    /// Applies one request from the requesting half.
    ///
    /// # Errors
    ///
    /// [`ResourceError::LoaderNotRegistered`] for a load of an unknown kind.
    pub fn process_message(&mut self, request: ResourceRequest) -> ResourceResult<()> {
        match request {
            ResourceRequest::Load {
                resource_id,
                definition,
                payload,
            } => self.load_resource(resource_id, definition, payload),
            ResourceRequest::AddRef { resource_id } => {
                self.add_resource_ref(resource_id);
                Ok(())
            }
            ResourceRequest::RemoveRef { resource_id } => {
                self.remove_resource_ref(resource_id);
                Ok(())
            }
        }
    }

    /// Starts loading `definition` under `resource_id` with one reference.
    ///
    /// A second load for an id that is already stored is ignored.
    ///
    /// # Errors
    ///
    /// [`ResourceError::LoaderNotRegistered`] if no loader handles the kind.
    pub fn load_resource(
        &mut self,
        resource_id: ResourceId,
        mut definition: ResourceDefinition,
        payload: Option<Vec<u8>>,
    ) -> ResourceResult<()> {
        if self.store.contains_key(&resource_id) {
            tracing::debug!(%resource_id, "duplicate load ignored");
            return Ok(());
        }

        let loader = self
            .loaders
            .get_mut(&definition.kind)
            .ok_or_else(|| ResourceError::LoaderNotRegistered(definition.kind.clone()))?;

        let has_explicit_name = definition.name.is_some();
        let name = definition
            .name
            .get_or_insert_with(|| format!("{}[{}]", definition.kind, resource_id))
            .clone();

        self.store.insert(
            resource_id,
            ResourceRecord {
                kind: definition.kind.clone(),
                name: name.clone(),
                has_explicit_name,
                ref_count: 1,
                state: ResourceState::Loading,
                resource: None,
                error: None,
                dispose_when_settled: false,
            },
        );

        tracing::debug!(%resource_id, %name, "resource load started");

        let future = loader.load(LoadRequest {
            resource_id,
            definition,
            payload,
        });
        let completions = self.completion_tx.clone();
        self.runtime.spawn(async move {
            let result = future.await;
            // Receiver lives as long as the manager.
            let _ = completions.send(Completion { resource_id, result });
        });

        Ok(())
    }

    /// Adds a reference. Unknown ids are ignored.
    pub fn add_resource_ref(&mut self, resource_id: ResourceId) {
        let Some(record) = self.store.get_mut(&resource_id) else {
            return;
        };
        if let Some(loader) = self.loaders.get_mut(&record.kind) {
            loader.add_ref(resource_id);
        }
        record.ref_count += 1;
        record.dispose_when_settled = false;
    }

    /// Drops a reference, disposing on the last one. Unknown ids are ignored.
    pub fn remove_resource_ref(&mut self, resource_id: ResourceId) {
        let Some(record) = self.store.get_mut(&resource_id) else {
            return;
        };
        if record.ref_count == 0 {
            return;
        }

        if record.ref_count > 1 {
            record.ref_count -= 1;
            if let Some(loader) = self.loaders.get_mut(&record.kind) {
                loader.remove_ref(resource_id);
            }
            return;
        }

        record.ref_count = 0;
        if record.state == ResourceState::Loading {
            tracing::debug!(%resource_id, "last reference dropped mid-load; deferring dispose");
            record.dispose_when_settled = true;
            return;
        }

        self.dispose(resource_id);
    }

    /// Applies every finished load. Returns how many were applied.
    pub fn update(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(Completion { resource_id, result }) = self.completion_rx.try_recv() {
            self.settle(resource_id, result);
            applied += 1;
        }
        applied
    }

    fn settle(&mut self, resource_id: ResourceId, result: Result<LoadResponse, LoadError>) {
        let Some(record) = self.store.get_mut(&resource_id) else {
            return;
        };

        match result {
            Ok(response) => {
                if !record.has_explicit_name {
                    if let Some(name) = response.name {
                        record.name = name;
                    }
                }
                record.resource = Some(response.resource);
                record.state = ResourceState::Loaded;

                if record.dispose_when_settled {
                    self.dispose(resource_id);
                    return;
                }

                tracing::debug!(%resource_id, name = %record.name, "resource loaded");
                self.outbox.post_message(ResourceEvent::Loaded {
                    resource_id,
                    remote_resource: response.remote_resource,
                });
            }
            Err(error) => {
                record.state = ResourceState::Error;
                record.error = Some(error.clone());

                if record.dispose_when_settled {
                    self.dispose(resource_id);
                    return;
                }

                tracing::error!(%resource_id, name = %record.name, %error, "resource load failed");
                self.outbox
                    .post_message(ResourceEvent::LoadFailed { resource_id, error });
            }
        }
    }

    fn dispose(&mut self, resource_id: ResourceId) {
        let Some(record) = self.store.remove(&resource_id) else {
            return;
        };
        if let Some(loader) = self.loaders.get_mut(&record.kind) {
            loader.dispose(resource_id, record.resource);
        }
        tracing::debug!(%resource_id, name = %record.name, "resource disposed");
        self.outbox
            .post_message(ResourceEvent::Disposed { resource_id });
    }

    /// Typed access to a loaded resource.
    #[must_use]
    pub fn get<T: Any>(&self, resource_id: ResourceId) -> Option<&T> {
        self.store
            .get(&resource_id)?
            .resource
            .as_ref()?
            .downcast_ref::<T>()
    }

    /// Diagnostics snapshot of one record.
    #[must_use]
    pub fn info(&self, resource_id: ResourceId) -> Option<ResourceInfo> {
        self.store.get(&resource_id).map(|record| ResourceInfo {
            resource_id,
            kind: record.kind.clone(),
            name: record.name.clone(),
            ref_count: record.ref_count,
            state: record.state,
        })
    }

    /// Current state of one record.
    #[must_use]
    pub fn state(&self, resource_id: ResourceId) -> Option<ResourceState> {
        self.store.get(&resource_id).map(|record| record.state)
    }

    /// Failure recorded for a resource in the `Error` state.
    #[must_use]
    pub fn error(&self, resource_id: ResourceId) -> Option<&LoadError> {
        self.store.get(&resource_id)?.error.as_ref()
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether no records are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Runtime the loads run on.
    #[must_use]
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoadFuture;
    use crossbeam_channel::Receiver;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Loader whose loads resolve when the test says so.
    struct GatedLoader {
        gate: Arc<tokio::sync::Notify>,
        disposed: Arc<AtomicUsize>,
        fail: bool,
    }

    impl ResourceLoader for GatedLoader {
        fn kind(&self) -> &str {
            "mesh"
        }

        fn load(&mut self, request: LoadRequest) -> LoadFuture {
            let gate = Arc::clone(&self.gate);
            let fail = self.fail;
            Box::pin(async move {
                gate.notified().await;
                if fail {
                    Err(LoadError::new("corrupt mesh"))
                } else {
                    Ok(LoadResponse::new(request.resource_id.0 * 10).with_name("discovered"))
                }
            })
        }

        fn dispose(&mut self, _resource_id: ResourceId, _resource: Option<BoxedResource>) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        runtime: tokio::runtime::Runtime,
        manager: ResourceManager<Sender<ResourceEvent>>,
        events: Receiver<ResourceEvent>,
        gate: Arc<tokio::sync::Notify>,
        disposed: Arc<AtomicUsize>,
    }

    fn harness(fail: bool) -> Harness {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let (tx, events) = unbounded();
        let gate = Arc::new(tokio::sync::Notify::new());
        let disposed = Arc::new(AtomicUsize::new(0));
        let mut manager = ResourceManager::new(runtime.handle().clone(), tx);
        manager.register_loader(GatedLoader {
            gate: Arc::clone(&gate),
            disposed: Arc::clone(&disposed),
            fail,
        });
        Harness {
            runtime,
            manager,
            events,
            gate,
            disposed,
        }
    }

    fn settle(h: &mut Harness) {
        h.gate.notify_one();
        for _ in 0..200 {
            if h.manager.update() > 0 {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("load never settled");
    }

    #[test]
    fn test_unregistered_loader_fails() {
        let mut h = harness(false);
        let err = h
            .manager
            .load_resource(ResourceId(0), ResourceDefinition::new("audio"), None)
            .unwrap_err();
        assert_eq!(err, ResourceError::LoaderNotRegistered("audio".into()));
        assert!(err.to_string().contains("not registered"));
        assert!(h.manager.is_empty());
    }

    #[test]
    fn test_default_name_replaced_by_loader_name() {
        let mut h = harness(false);
        h.manager
            .load_resource(ResourceId(3), ResourceDefinition::new("mesh"), None)
            .unwrap();
        assert_eq!(h.manager.info(ResourceId(3)).unwrap().name, "mesh[3]");

        settle(&mut h);
        let info = h.manager.info(ResourceId(3)).unwrap();
        assert_eq!(info.name, "discovered");
        assert_eq!(info.state, ResourceState::Loaded);
        assert_eq!(h.manager.get::<u32>(ResourceId(3)), Some(&30));
        assert_eq!(
            h.events.try_recv().unwrap(),
            ResourceEvent::Loaded {
                resource_id: ResourceId(3),
                remote_resource: None
            }
        );
    }

    #[test]
    fn test_explicit_name_kept() {
        let mut h = harness(false);
        h.manager
            .load_resource(ResourceId(1), ResourceDefinition::new("mesh").with_name("crate"), None)
            .unwrap();
        settle(&mut h);
        assert_eq!(h.manager.info(ResourceId(1)).unwrap().name, "crate");
    }

    #[test]
    fn test_refcount_reaching_zero_disposes_once() {
        let mut h = harness(false);
        let id = ResourceId(7);
        h.manager
            .load_resource(id, ResourceDefinition::new("mesh"), None)
            .unwrap();
        settle(&mut h);
        let _ = h.events.try_recv();

        h.manager.add_resource_ref(id);
        h.manager.remove_resource_ref(id);
        assert_eq!(h.disposed.load(Ordering::SeqCst), 0);
        assert_eq!(h.manager.info(id).unwrap().ref_count, 1);

        h.manager.remove_resource_ref(id);
        h.manager.remove_resource_ref(id);
        assert_eq!(h.disposed.load(Ordering::SeqCst), 1);
        assert_eq!(h.events.try_recv().unwrap(), ResourceEvent::Disposed { resource_id: id });
        assert!(h.events.try_recv().is_err());
        assert!(h.manager.info(id).is_none());
    }

    #[test]
    fn test_failed_load_posts_error() {
        let mut h = harness(true);
        h.manager
            .load_resource(ResourceId(2), ResourceDefinition::new("mesh"), None)
            .unwrap();
        settle(&mut h);

        assert_eq!(h.manager.state(ResourceId(2)), Some(ResourceState::Error));
        assert!(matches!(
            h.events.try_recv().unwrap(),
            ResourceEvent::LoadFailed { resource_id: ResourceId(2), .. }
        ));
    }

    #[test]
    fn test_dispose_while_loading_defers() {
        let mut h = harness(false);
        let id = ResourceId(4);
        h.manager
            .load_resource(id, ResourceDefinition::new("mesh"), None)
            .unwrap();
        h.manager.remove_resource_ref(id);
        assert_eq!(h.disposed.load(Ordering::SeqCst), 0);
        assert_eq!(h.manager.state(id), Some(ResourceState::Loading));

        settle(&mut h);
        assert_eq!(h.disposed.load(Ordering::SeqCst), 1);
        assert_eq!(h.events.try_recv().unwrap(), ResourceEvent::Disposed { resource_id: id });
        assert!(h.events.try_recv().is_err());
        drop(h.runtime);
    }

    #[test]
    fn test_duplicate_load_ignored() {
        let mut h = harness(false);
        let id = ResourceId(5);
        h.manager
            .load_resource(id, ResourceDefinition::new("mesh"), None)
            .unwrap();
        h.manager
            .process_message(ResourceRequest::Load {
                resource_id: id,
                definition: ResourceDefinition::new("mesh"),
                payload: None,
            })
            .unwrap();
        assert_eq!(h.manager.len(), 1);
        assert_eq!(h.manager.info(id).unwrap().ref_count, 1);
    }

    #[test]
    fn test_unknown_ids_are_noops() {
        let mut h = harness(false);
        h.manager.add_resource_ref(ResourceId(99));
        h.manager.remove_resource_ref(ResourceId(99));
        assert!(h.events.try_recv().is_err());
    }
}
