//! # wgpu Backend
//!
//! Uploads chunk meshes as a vertex buffer plus an index buffer each. Draws are not encoded
//! immediately: the backend collects them per frame and the host replays them into its own
//! render pass with [`WgpuBackend::record_draws`], after binding its pipeline.

use std::sync::Arc;

use log::{debug, info};
use wgpu::util::DeviceExt;

use super::{geometry::GeometryData, gpu_buffer::RenderBackend};
use crate::engine_state::{error::GpuError, grid::GridItem};

/// Vertex and index buffers of one chunk.
pub struct WgpuChunkBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl WgpuChunkBuffers {
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    fn size(&self) -> u64 {
        self.vertex.size() + self.index.size()
    }
}

/// Running totals over every chunk buffer the backend has created.
#[derive(Debug, Default, Clone, Copy)]
pub struct BufferAnalytics {
    /// Bytes currently allocated on the device for chunk meshes
    pub allocated_memory: u64,
    /// Chunk buffer pairs alive right now
    pub live_buffers: u64,
    /// Chunk buffer pairs created since start-up
    pub times_created: u64,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    analytics: BufferAnalytics,
    frame_draws: Vec<Arc<WgpuChunkBuffers>>,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            analytics: BufferAnalytics::default(),
            frame_draws: Vec::new(),
        }
    }

    /// Opens a device without a surface, for offscreen and headless use.
    pub async fn request_headless() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|error| GpuError::Unavailable(error.to_string()))?;
        info!("Using adapter {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("voxel terrain device"),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                ..Default::default()
            })
            .await
            .map_err(|error| GpuError::Unavailable(error.to_string()))?;
        Ok(Self::new(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn analytics(&self) -> BufferAnalytics {
        self.analytics
    }

    /// Encodes this frame's draws into `render_pass` and starts a new frame.
    ///
    /// The caller binds the pipeline and any bind groups first; each chunk only sets its
    /// own vertex and index buffers.
    pub fn record_draws(&mut self, render_pass: &mut wgpu::RenderPass<'_>) {
        for buffers in self.frame_draws.drain(..) {
            render_pass.set_vertex_buffer(0, buffers.vertex.slice(..));
            render_pass.set_index_buffer(buffers.index.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..buffers.index_count, 0, 0..1);
        }
    }

    /// Drops this frame's draws without encoding them.
    pub fn discard_draws(&mut self) -> usize {
        let count = self.frame_draws.len();
        self.frame_draws.clear();
        count
    }

    fn check_size(&self, requested: u64) -> Result<(), GpuError> {
        let limit = self.device.limits().max_buffer_size;
        if requested > limit {
            return Err(GpuError::AllocationExhausted { requested, limit });
        }
        Ok(())
    }
}

impl RenderBackend for WgpuBackend {
    type Handle = Arc<WgpuChunkBuffers>;

    fn create_buffer(&mut self, geometry: &GeometryData) -> Result<Self::Handle, GpuError> {
        self.check_size(geometry.vertex_bytes().len() as u64)?;
        self.check_size(geometry.index_bytes().len() as u64)?;

        let coordinate = geometry.coordinate();
        let vertex = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("chunk vertex buffer"),
                contents: geometry.vertex_bytes(),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("chunk index buffer"),
                contents: geometry.index_bytes(),
                usage: wgpu::BufferUsages::INDEX,
            });
        let buffers = WgpuChunkBuffers {
            vertex,
            index,
            index_count: geometry.indices().len() as u32,
        };

        self.analytics.allocated_memory += buffers.size();
        self.analytics.live_buffers += 1;
        self.analytics.times_created += 1;
        debug!(
            "Uploaded chunk {coordinate:?}: {} indices, {} bytes",
            buffers.index_count,
            buffers.size()
        );
        Ok(Arc::new(buffers))
    }

    fn destroy_buffer(&mut self, handle: Self::Handle) {
        self.analytics.allocated_memory = self.analytics.allocated_memory.saturating_sub(handle.size());
        self.analytics.live_buffers = self.analytics.live_buffers.saturating_sub(1);
        // A handle still queued for this frame keeps its buffers alive until the frame is
        // recorded; destroy only when this was the last reference.
        if let Ok(buffers) = Arc::try_unwrap(handle) {
            buffers.vertex.destroy();
            buffers.index.destroy();
        }
    }

    fn draw(&mut self, handle: &Self::Handle) {
        self.frame_draws.push(Arc::clone(handle));
    }
}
