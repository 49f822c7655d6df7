//! # TRIAD Resources
//!
//! Refcounted, asynchronously loaded assets shared between the game thread
//! and the render thread by id.
//!
//! ## Architecture
//!
//! - [`RemoteResourceManager`]: requesting half. Ids only.
//! - [`ResourceManager`]: owning half. Decoded resources, loaders, refcounts.
//! - [`ResourceRequest`] / [`ResourceEvent`]: the messages between them.
//!
//! A resource id is allocated by the requester from a [`SharedCounter`]
//! (`triad_core`), so `load_resource` never waits for the owner.
//!
//! [`SharedCounter`]: triad_core::SharedCounter

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod loader;
pub mod manager;
pub mod message;
pub mod remote;

pub use error::{LoadError, ResourceError, ResourceResult};
pub use loader::{
    BoxedResource, FnLoader, LoadFuture, LoadRequest, LoadResponse, RemoteResourceLoader,
    ResourceLoader,
};
pub use manager::{ResourceInfo, ResourceManager};
pub use message::{
    PostMessageTarget, ResourceDefinition, ResourceEvent, ResourceId, ResourceRequest,
    ResourceState,
};
pub use remote::{RemoteResourceInfo, RemoteResourceManager};
