//! Meshes one chunk on a worker thread.
//!
//! Requesting the geometry drives the whole CPU side of the pipeline for that chunk:
//! voxels of the chunk and its neighbours are generated or loaded, lighting is computed,
//! and the mesh is built. The result only carries a summary back; the mesh itself stays in
//! the geometry cache for the render thread to upload.

use std::sync::Arc;

use log::{trace, warn};

use crate::engine_state::{
    error::PipelineError,
    grid::ChunkCoordinate,
    pipeline::ChunkPipeline,
    task_management::task::{Task, TaskContext, TaskResult},
};

pub struct GeometryTask {
    pipeline: Arc<ChunkPipeline>,
    coordinate: ChunkCoordinate,
}

impl GeometryTask {
    pub fn new(pipeline: Arc<ChunkPipeline>, coordinate: ChunkCoordinate) -> Self {
        Self {
            pipeline,
            coordinate,
        }
    }
}

impl Task for GeometryTask {
    fn process(&self) -> Box<dyn TaskResult + Send> {
        let outcome = self
            .pipeline
            .geometry()
            .get(self.coordinate)
            .map(|geometry| geometry.face_count());
        Box::new(GeometryTaskResult {
            coordinate: self.coordinate,
            outcome,
        })
    }

    fn coordinate(&self) -> Option<ChunkCoordinate> {
        Some(self.coordinate)
    }
}

pub struct GeometryTaskResult {
    coordinate: ChunkCoordinate,
    outcome: Result<usize, PipelineError>,
}

impl TaskResult for GeometryTaskResult {
    fn handle_result(self: Box<Self>, context: &mut TaskContext) -> Vec<Box<dyn Task + Send>> {
        context.in_flight.remove(&self.coordinate);
        match self.outcome {
            Ok(faces) => {
                trace!("Meshed chunk {:?}: {faces} faces", self.coordinate);
                context.completed.push(self.coordinate);
            }
            Err(error) => {
                warn!("Meshing chunk {:?} failed: {error}", self.coordinate);
                context.failed.push((self.coordinate, error));
            }
        }
        Vec::new()
    }
}
