//! # Loader Traits
//!
//! One loader per resource kind on each half. Every hook except
//! [`ResourceLoader::load`] is optional.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;

use crate::error::LoadError;
use crate::message::{ResourceDefinition, ResourceId};

/// A decoded resource. Owned by the render thread, never sent back.
pub type BoxedResource = Box<dyn Any + Send>;

/// Future returned by [`ResourceLoader::load`]. Runs on the owning thread's
/// tokio runtime.
pub type LoadFuture = Pin<Box<dyn Future<Output = Result<LoadResponse, LoadError>> + Send + 'static>>;

/// Everything a loader gets for one load.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Id the resource is stored under.
    pub resource_id: ResourceId,
    /// Definition with `name` already filled in.
    pub definition: ResourceDefinition,
    /// Bytes moved along with the request.
    pub payload: Option<Vec<u8>>,
}

impl LoadRequest {
    /// The resolved display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.definition.name.as_deref().unwrap_or_default()
    }
}

/// What a successful load produces.
pub struct LoadResponse {
    /// Replaces the default `<kind>[<id>]` name when the definition had none.
    pub name: Option<String>,
    /// The decoded resource.
    pub resource: BoxedResource,
    /// Summary posted to the requesting half.
    pub remote_resource: Option<serde_json::Value>,
}

impl LoadResponse {
    /// Wraps a decoded resource.
    pub fn new<T: Any + Send>(resource: T) -> Self {
        Self {
            name: None,
            resource: Box::new(resource),
            remote_resource: None,
        }
    }

    /// Sets the discovered name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches a summary for the requesting half.
    #[must_use]
    pub fn with_remote(mut self, remote: serde_json::Value) -> Self {
        self.remote_resource = Some(remote);
        self
    }
}

impl std::fmt::Debug for LoadResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadResponse")
            .field("name", &self.name)
            .field("remote_resource", &self.remote_resource)
            .finish_non_exhaustive()
    }
}

/// Owning-half loader for one kind.
pub trait ResourceLoader: Send {
    /// Kind this loader handles.
    fn kind(&self) -> &str;

    /// Starts a load. The future must own everything it needs.
    fn load(&mut self, request: LoadRequest) -> LoadFuture;

    /// Called after a reference is added.
    fn add_ref(&mut self, _resource_id: ResourceId) {}

    /// Called after a reference is dropped, unless it was the last one.
    fn remove_ref(&mut self, _resource_id: ResourceId) {}

    /// Called once when the last reference is dropped. `resource` is `None`
    /// if the load failed.
    fn dispose(&mut self, _resource_id: ResourceId, _resource: Option<BoxedResource>) {}
}

/// Requesting-half loader hooks for one kind.
pub trait RemoteResourceLoader: Send {
    /// Kind these hooks observe.
    fn kind(&self) -> &str;

    /// The owning half finished loading.
    fn loaded(&mut self, _resource_id: ResourceId, _remote_resource: Option<&serde_json::Value>) {}

    /// The owning half failed to load.
    fn load_error(&mut self, _resource_id: ResourceId, _error: &LoadError) {}

    /// The owning half disposed the resource.
    fn disposed(&mut self, _resource_id: ResourceId) {}
}

/// Wraps a synchronous decode function as a [`ResourceLoader`].
///
/// The function runs on a blocking-capable tokio worker, off the render
/// thread.
pub struct FnLoader<F> {
    kind: String,
    decode: F,
}

impl<F> FnLoader<F>
where
    F: Fn(LoadRequest) -> Result<LoadResponse, LoadError> + Clone + Send + Sync + 'static,
{
    /// Creates a loader for `kind`.
    pub fn new(kind: impl Into<String>, decode: F) -> Self {
        Self {
            kind: kind.into(),
            decode,
        }
    }
}

impl<F> ResourceLoader for FnLoader<F>
where
    F: Fn(LoadRequest) -> Result<LoadResponse, LoadError> + Clone + Send + Sync + 'static,
{
    fn kind(&self) -> &str {
        &self.kind
    }

    fn load(&mut self, request: LoadRequest) -> LoadFuture {
        let decode = self.decode.clone();
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || decode(request)).await {
                Ok(result) => result,
                Err(join) => Err(LoadError::new(format!("loader task failed: {join}"))),
            }
        })
    }
}
