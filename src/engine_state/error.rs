//! # Error Types
//!
//! Every fallible pipeline operation reports a [`PipelineError`]. Errors are `Clone` so a
//! failed build can be handed to every caller that was waiting on the same grid slot.

use std::{path::PathBuf, sync::Arc};

use cgmath::Point3;

use crate::engine_state::grid::ChunkCoordinate;

/// Failure of a cache lookup, a stage factory, or an edit.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// A non-blocking build needed an upstream artifact that is not cached yet.
    #[error("upstream data for chunk {0:?} is not ready")]
    NotReady(ChunkCoordinate),
    /// GPU buffers can only be created through a render token.
    #[error("GPU buffer for chunk {0:?} requires the render context")]
    RenderContextRequired(ChunkCoordinate),
    /// The edited voxel lies above the sky ceiling.
    #[error("voxel {0:?} lies outside the editable world")]
    OutsideWorld(Point3<i32>),
    /// The store that owned this cache has been shut down.
    #[error("the {0} cache has been shut down")]
    ShutDown(&'static str),
    #[error("GPU upload failed: {0}")]
    Gpu(#[from] GpuError),
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Failure reported by a render backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GpuError {
    #[error("the rendering context was lost")]
    ContextLost,
    #[error("a buffer of {requested} bytes exceeds the device limit of {limit} bytes")]
    AllocationExhausted { requested: u64, limit: u64 },
    #[error("no usable GPU: {0}")]
    Unavailable(String),
}

/// Failure of the on-disk chunk store or journal.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("cannot encode journal record: {0}")]
    Encode(String),
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}

/// Failure to load or validate an [`EngineConfig`](crate::engine_state::config::EngineConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure of the headless demo run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
