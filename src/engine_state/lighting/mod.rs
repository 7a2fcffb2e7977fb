//! # Lighting
//!
//! The second pipeline stage. A chunk's [`LightingData`] depends on the voxels of the chunk
//! and of its eight lateral neighbours, so an edit anywhere in that 3x3 neighborhood
//! invalidates it.
//!
//! Two fields live in each artifact, each behind its own lock:
//! - sunlight, computed eagerly when the artifact is built
//! - ambient occlusion, computed lazily by the first mesher that asks for it

pub mod ambient_occlusion;
pub mod sunlight;

use std::sync::{Arc, RwLockReadGuard};

use cgmath::Point3;

pub use ambient_occlusion::{AmbientOcclusion, BlockLighting};
pub use sunlight::{SunlightField, CHUNK_LIGHTING_MAX};

use crate::{
    core::MtResource,
    engine_state::{
        grid::{ChunkCoordinate, ChunkDimensions, GridItem},
        voxels::{neighborhood::NeighborhoodGuard, VoxelGrid},
    },
};

pub struct LightingData {
    coordinate: ChunkCoordinate,
    sunlight: MtResource<SunlightField>,
    ambient_occlusion: AmbientOcclusion,
    cost: usize,
}

impl LightingData {
    /// Computes sunlight for the centre of a locked lateral neighborhood.
    pub fn build(
        coordinate: ChunkCoordinate,
        neighborhood: &NeighborhoodGuard<'_>,
        attenuation: u8,
    ) -> Self {
        let sunlight = SunlightField::compute(neighborhood, attenuation);
        let dimensions: ChunkDimensions = neighborhood.dimensions();
        let ao_cost = dimensions.voxel_count() * std::mem::size_of::<BlockLighting>();
        let cost = sunlight.byte_cost() + ao_cost;
        Self {
            coordinate,
            sunlight: MtResource::new(sunlight),
            ambient_occlusion: AmbientOcclusion::default(),
            cost,
        }
    }

    /// Shared access to the sunlight field. Callers that also hold voxel locks must have
    /// acquired those first.
    pub fn sunlight(&self) -> RwLockReadGuard<'_, SunlightField> {
        self.sunlight.get()
    }

    pub fn sunlight_at(&self, local: Point3<i32>) -> Option<u8> {
        self.sunlight.get().level_at(local)
    }

    /// Ambient occlusion of the chunk, computed from `voxels` on first use. `voxels` must be
    /// this chunk's grid, read-locked by the caller.
    pub fn ambient_occlusion(&self, voxels: &VoxelGrid) -> Arc<Vec<BlockLighting>> {
        self.ambient_occlusion.get_or_compute(voxels)
    }
}

impl GridItem for LightingData {
    fn coordinate(&self) -> ChunkCoordinate {
        self.coordinate
    }

    fn cost(&self) -> usize {
        self.cost
    }

    fn item_will_be_evicted(&self) {}

    fn item_will_be_invalidated(&self) {}
}
