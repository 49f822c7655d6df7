//! # Resource Errors
//!
//! Two very different kinds of failure:
//!
//! - [`ResourceError`]: the owning half was misconfigured. Fatal.
//! - [`LoadError`]: one asset failed to decode. Recoverable, travels back to
//!   the requesting half inside a `LoadFailed` event.

use thiserror::Error;

/// Fatal resource manager errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// A load was requested for a kind with no registered loader.
    #[error("resource loader {0} not registered")]
    LoaderNotRegistered(String),
}

/// A single asset failed to load.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct LoadError {
    message: String,
}

impl LoadError {
    /// Creates a load error with a human readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Result type for resource manager operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
