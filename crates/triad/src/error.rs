//! # Engine Errors
//!
//! Configuration problems and bootstrap failures. Anything that goes wrong
//! inside a running worker is reported on the bus as a
//! `GameWorkerError` / `RenderWorkerError` message instead.

use std::path::PathBuf;

use thiserror::Error;
use triad_core::{MemoryError, SyncError};
use triad_resources::ResourceError;

/// Invalid or unreadable engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`EngineConfig`](crate::EngineConfig).
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A rate or capacity that must be positive is zero.
    #[error("config key `{0}` must be greater than zero")]
    Zero(&'static str),
}

/// Engine bootstrap and runtime failures.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A shared buffer could not be created.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// A buffer layout does not fit.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// The resource protocol hit an unrecoverable request.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A worker thread could not be spawned.
    #[error("failed to spawn {worker} thread: {source}")]
    Spawn {
        /// Worker name.
        worker: &'static str,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A worker reported a fatal error.
    #[error("{worker} worker failed: {message}")]
    Worker {
        /// Worker name.
        worker: &'static str,
        /// Reported error.
        message: String,
    },

    /// A worker did not answer the bootstrap handshake in time.
    #[error("{worker} worker did not initialize in time")]
    HandshakeTimeout {
        /// Worker name.
        worker: &'static str,
    },

    /// A worker's inbox is full.
    #[error("{worker} worker inbox is full")]
    BusFull {
        /// Worker name.
        worker: &'static str,
    },

    /// A worker's channel is gone.
    #[error("{worker} worker disconnected")]
    Disconnected {
        /// Worker name.
        worker: &'static str,
    },

    /// A worker thread panicked.
    #[error("{worker} worker panicked")]
    Panicked {
        /// Worker name.
        worker: &'static str,
    },
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
