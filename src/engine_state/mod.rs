//! # Engine State Module
//!
//! Everything between a camera position and a set of drawable chunk buffers.
//!
//! ## Key Components
//!
//! * `grid` - The per-stage spatial cache keyed by chunk coordinate
//! * `voxels` - Authored voxel data: generation, persistence and the edit log
//! * `lighting` - Sunlight propagation and per-voxel ambient occlusion
//! * `rendering` - Chunk geometry, GPU buffers and the render backends
//! * `pipeline` - The voxel, lighting and geometry caches wired together
//! * `edit` - Voxel edits and the invalidation cascade they trigger
//! * `active_region` - The camera-centred box of chunks kept alive and drawn
//! * `task_management` - Background workers that build geometry
//! * `chunk_store` - The per-frame facade a host loop drives
//!
//! ## Architecture
//!
//! Each stage is a [`grid::GridCache`] whose factory pulls its inputs from the stage
//! before it, so asking for geometry builds lighting and voxels on demand. Edits travel
//! the other way: changing a voxel invalidates the downstream artifacts it touched, and
//! the next request rebuilds them.
//!
//! ## Performance Considerations
//!
//! * Concurrent requests for the same chunk collapse onto a single build
//! * Each cache evicts least-recently-used artifacts against its own cost budget
//! * The render thread never waits on a build, it draws what is ready

pub mod active_region;
pub mod camera_state;
pub mod chunk_store;
pub mod config;
pub mod edit;
pub mod error;
pub mod grid;
pub mod lighting;
pub mod pipeline;
pub mod rendering;
pub mod task_management;
pub mod voxels;

pub use active_region::{ActiveRegion, ActiveRegionExtent};
pub use camera_state::{CameraModifiedFlags, CameraState};
pub use chunk_store::{ChunkStore, DrawSummary, StoreInfo};
pub use config::EngineConfig;
pub use edit::InvalidationSet;
pub use error::{ConfigError, GpuError, PersistenceError, PipelineError, RunError};
pub use grid::{ChunkCoordinate, ChunkDimensions};
pub use pipeline::ChunkPipeline;
