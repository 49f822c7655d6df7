//! # Remote Resource Manager (requesting half)
//!
//! Lives on the game thread. Allocates ids from the shared counter, so a
//! load request returns immediately, and mirrors each resource's state as
//! the owning half reports it.

use std::collections::HashMap;

use triad_core::SharedCounter;

use crate::loader::RemoteResourceLoader;
use crate::message::{
    PostMessageTarget, ResourceDefinition, ResourceEvent, ResourceId, ResourceRequest,
    ResourceState,
};

/// What the requesting half knows about one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResourceInfo {
    /// Record id.
    pub resource_id: ResourceId,
    /// Loader kind.
    pub kind: String,
    /// Mirrored state.
    pub state: ResourceState,
    /// Summary posted with `Loaded`.
    pub remote_resource: Option<serde_json::Value>,
}

/// Requesting half of the resource protocol.
pub struct RemoteResourceManager<P> {
    counter: SharedCounter,
    outbox: P,
    store: HashMap<ResourceId, RemoteResourceInfo>,
    loaders: HashMap<String, Box<dyn RemoteResourceLoader>>,
}

impl<P: PostMessageTarget<ResourceRequest>> RemoteResourceManager<P> {
    /// Creates a requesting half sharing `counter` with any other requesters.
    pub fn new(counter: SharedCounter, outbox: P) -> Self {
        Self {
            counter,
            outbox,
            store: HashMap::new(),
            loaders: HashMap::new(),
        }
    }

    /// Registers hooks for one kind, replacing any previous ones.
    pub fn register_loader<L: RemoteResourceLoader + 'static>(&mut self, loader: L) {
        let kind = loader.kind().to_owned();
        self.loaders.insert(kind, Box::new(loader));
    }

    /// Requests a load and returns its id without waiting.
    pub fn load_resource(&mut self, definition: ResourceDefinition) -> ResourceId {
        self.load_resource_with_payload(definition, None)
    }

    /// Requests a load, moving `payload` to the owning half with it.
    pub fn load_resource_with_payload(
        &mut self,
        definition: ResourceDefinition,
        payload: Option<Vec<u8>>,
    ) -> ResourceId {
        let resource_id = ResourceId(self.counter.fetch_next());

        self.store.insert(
            resource_id,
            RemoteResourceInfo {
                resource_id,
                kind: definition.kind.clone(),
                state: ResourceState::Loading,
                remote_resource: None,
            },
        );

        tracing::trace!(%resource_id, kind = %definition.kind, "load requested");
        self.outbox.post_message(ResourceRequest::Load {
            resource_id,
            definition,
            payload,
        });
        resource_id
    }

    /// Asks the owning half to add a reference.
    pub fn add_resource_ref(&self, resource_id: ResourceId) {
        self.outbox
            .post_message(ResourceRequest::AddRef { resource_id });
    }

    /// Asks the owning half to drop a reference.
    pub fn remove_resource_ref(&self, resource_id: ResourceId) {
        self.outbox
            .post_message(ResourceRequest::RemoveRef { resource_id });
    }

    /// Applies one event from the owning half. Events for ids this half
    /// never requested are ignored.
    pub fn process_message(&mut self, event: ResourceEvent) {
        match event {
            ResourceEvent::Loaded {
                resource_id,
                remote_resource,
            } => {
                let Some(info) = self.store.get_mut(&resource_id) else {
                    return;
                };
                info.state = ResourceState::Loaded;
                info.remote_resource = remote_resource;
                if let Some(loader) = self.loaders.get_mut(&info.kind) {
                    loader.loaded(resource_id, info.remote_resource.as_ref());
                }
            }
            ResourceEvent::LoadFailed { resource_id, error } => {
                let Some(info) = self.store.get_mut(&resource_id) else {
                    return;
                };
                info.state = ResourceState::Error;
                if let Some(loader) = self.loaders.get_mut(&info.kind) {
                    loader.load_error(resource_id, &error);
                }
            }
            ResourceEvent::Disposed { resource_id } => {
                let Some(info) = self.store.remove(&resource_id) else {
                    return;
                };
                if let Some(loader) = self.loaders.get_mut(&info.kind) {
                    loader.disposed(resource_id);
                }
            }
        }
    }

    /// What is known about one resource.
    #[must_use]
    pub fn info(&self, resource_id: ResourceId) -> Option<&RemoteResourceInfo> {
        self.store.get(&resource_id)
    }

    /// Mirrored state of one resource.
    #[must_use]
    pub fn state(&self, resource_id: ResourceId) -> Option<ResourceState> {
        self.store.get(&resource_id).map(|info| info.state)
    }

    /// Number of tracked resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// The shared id counter.
    #[must_use]
    pub fn counter(&self) -> &SharedCounter {
        &self.counter
    }
}
