//! Rendering side of the chunk pipeline.
//!
//! This module contains the Geometry stage (CPU meshing, safe on any thread) and the
//! GPU-Buffer stage (uploads, render-thread only), plus the backends the latter can drive.

pub mod geometry;
pub mod gpu_buffer;
pub mod recording_backend;
pub mod vertex;
pub mod wgpu_backend;

// Re-export commonly used types
pub use geometry::GeometryData;
pub use gpu_buffer::{GpuBuffer, GpuBufferStage, RenderBackend, RenderContext, RenderToken};
pub use recording_backend::RecordingBackend;
pub use vertex::Vertex;
pub use wgpu_backend::WgpuBackend;
