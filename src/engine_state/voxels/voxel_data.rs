//! The Voxel stage artifact: one chunk's voxel grid behind a reader/writer lock.

use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};

use log::warn;

use super::{persistence::ChunkPersistence, voxel_grid::VoxelGrid};
use crate::{
    core::MtResource,
    engine_state::grid::{ChunkCoordinate, GridItem},
};

/// Voxels of one chunk.
///
/// Builders of derived artifacts take the shared side of the lock; an edit takes the
/// exclusive side for exactly one mutation. Evicted chunks are written back through the
/// persistence layer, and invalidated chunks have their saved copy discarded.
pub struct VoxelData {
    coordinate: ChunkCoordinate,
    grid: MtResource<VoxelGrid>,
    cost: usize,
    persistence: Arc<dyn ChunkPersistence>,
}

impl VoxelData {
    pub fn new(
        coordinate: ChunkCoordinate,
        grid: VoxelGrid,
        persistence: Arc<dyn ChunkPersistence>,
    ) -> Self {
        let cost = grid.byte_cost();
        Self {
            coordinate,
            grid: MtResource::new(grid),
            cost,
            persistence,
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, VoxelGrid> {
        self.grid.get()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, VoxelGrid> {
        self.grid.get_mut()
    }

    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, VoxelGrid>> {
        self.grid.try_get()
    }
}

impl GridItem for VoxelData {
    fn coordinate(&self) -> ChunkCoordinate {
        self.coordinate
    }

    fn cost(&self) -> usize {
        self.cost
    }

    fn item_will_be_evicted(&self) {
        let grid = self.grid.get();
        if let Err(error) = self.persistence.save_voxels(self.coordinate, &grid) {
            warn!("Failed to save evicted chunk {:?}: {error}", self.coordinate);
        }
    }

    fn item_will_be_invalidated(&self) {
        if let Err(error) = self.persistence.discard_voxels(self.coordinate) {
            warn!("Failed to discard chunk {:?}: {error}", self.coordinate);
        }
    }
}
