//! A [`RenderBackend`] that keeps a log instead of talking to a GPU.
//!
//! Used by the tests and by the demo binary when no adapter is available.

use std::collections::HashSet;

use super::{geometry::GeometryData, gpu_buffer::RenderBackend};
use crate::engine_state::{
    error::GpuError,
    grid::{ChunkCoordinate, GridItem},
};

/// Handle to a buffer the recording backend pretends to have created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedBuffer {
    pub id: u64,
    pub coordinate: ChunkCoordinate,
    pub index_count: u32,
}

#[derive(Default)]
pub struct RecordingBackend {
    next_id: u64,
    uploads: Vec<ChunkCoordinate>,
    draws: Vec<ChunkCoordinate>,
    destroyed: Vec<u64>,
    live: HashSet<u64>,
    failures_remaining: usize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` uploads fail with [`GpuError::AllocationExhausted`].
    pub fn fail_next_uploads(&mut self, count: usize) {
        self.failures_remaining = count;
    }

    /// Coordinates of every successful upload, in order.
    pub fn uploads(&self) -> &[ChunkCoordinate] {
        &self.uploads
    }

    /// Coordinates of every draw call, in order.
    pub fn draws(&self) -> &[ChunkCoordinate] {
        &self.draws
    }

    pub fn take_draws(&mut self) -> Vec<ChunkCoordinate> {
        std::mem::take(&mut self.draws)
    }

    pub fn destroyed(&self) -> &[u64] {
        &self.destroyed
    }

    pub fn live_buffers(&self) -> usize {
        self.live.len()
    }
}

impl RenderBackend for RecordingBackend {
    type Handle = RecordedBuffer;

    fn create_buffer(&mut self, geometry: &GeometryData) -> Result<RecordedBuffer, GpuError> {
        let requested = (geometry.vertex_bytes().len() + geometry.index_bytes().len()) as u64;
        if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            return Err(GpuError::AllocationExhausted {
                requested,
                limit: 0,
            });
        }
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id);
        self.uploads.push(geometry.coordinate());
        Ok(RecordedBuffer {
            id,
            coordinate: geometry.coordinate(),
            index_count: geometry.indices().len() as u32,
        })
    }

    fn destroy_buffer(&mut self, handle: RecordedBuffer) {
        debug_assert!(self.live.contains(&handle.id), "buffer {} destroyed twice", handle.id);
        self.live.remove(&handle.id);
        self.destroyed.push(handle.id);
    }

    fn draw(&mut self, handle: &RecordedBuffer) {
        debug_assert!(self.live.contains(&handle.id), "drawing destroyed buffer {}", handle.id);
        self.draws.push(handle.coordinate);
    }
}
