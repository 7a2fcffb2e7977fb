//! # Ambient Occlusion
//!
//! Per-corner darkening of voxel faces from the solidity of the voxels around each corner.
//! Only the chunk's own voxels are consulted; anything beyond the chunk counts as empty.
//!
//! The values are computed lazily, the first time the mesher asks for them, because many
//! lit chunks are never meshed. Concurrent first callers are serialized by a small state
//! machine: one thread computes while the others wait on a condition variable.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use cgmath::{Point3, Vector3};

use crate::engine_state::voxels::{block_side::BlockSide, VoxelGrid};

/// Lighting of one voxel: four corner values for each of the six faces, indexed by
/// [`BlockSide::index`] and then by corner in [`BlockSide::corners`] order.
pub type BlockLighting = [[f32; 4]; 6];

/// Corner brightness by number of unoccluded neighbours.
const OCCLUSION_BRIGHTNESS: [f32; 4] = [0.4, 0.6, 0.8, 1.0];

pub const UNOCCLUDED: BlockLighting = [[1.0; 4]; 6];

enum AoState {
    Pending,
    Computing,
    Ready(Arc<Vec<BlockLighting>>),
}

pub struct AmbientOcclusion {
    state: Mutex<AoState>,
    ready: Condvar,
}

impl Default for AmbientOcclusion {
    fn default() -> Self {
        Self {
            state: Mutex::new(AoState::Pending),
            ready: Condvar::new(),
        }
    }
}

impl AmbientOcclusion {
    /// Returns the per-voxel values, computing them from `voxels` on first use.
    pub fn get_or_compute(&self, voxels: &VoxelGrid) -> Arc<Vec<BlockLighting>> {
        let mut state = self.lock();
        loop {
            if let AoState::Ready(values) = &*state {
                return Arc::clone(values);
            }
            if matches!(*state, AoState::Computing) {
                state = match self.ready.wait(state) {
                    Ok(state) => state,
                    Err(error) => panic!("ambient occlusion lock poisoned: {error}"),
                };
                continue;
            }

            *state = AoState::Computing;
            drop(state);
            let values = Arc::new(compute(voxels));
            *self.lock() = AoState::Ready(Arc::clone(&values));
            self.ready.notify_all();
            return values;
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(*self.lock(), AoState::Ready(_))
    }

    fn lock(&self) -> MutexGuard<'_, AoState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(error) => panic!("ambient occlusion lock poisoned: {error}"),
        }
    }
}

fn compute(voxels: &VoxelGrid) -> Vec<BlockLighting> {
    let dimensions = voxels.dimensions();
    let mut values = vec![UNOCCLUDED; dimensions.voxel_count()];
    for z in 0..dimensions.z {
        for y in 0..dimensions.y {
            for x in 0..dimensions.x {
                if voxels.is_empty(x, y, z) {
                    continue;
                }
                let position = Point3::new(x as i32, y as i32, z as i32);
                let lighting = &mut values[dimensions.index(x, y, z)];
                for side in BlockSide::all() {
                    lighting[side.index()] = face_occlusion(voxels, position, side);
                }
            }
        }
    }
    values
}

fn face_occlusion(voxels: &VoxelGrid, position: Point3<i32>, side: BlockSide) -> [f32; 4] {
    let normal = side.normal();
    let facing = position + normal;
    let tangents: Vec<usize> = (0..3).filter(|axis| normal[*axis] == 0).collect();
    let (u, v) = (tangents[0], tangents[1]);

    side.corners().map(|corner| {
        let mut along_u = Vector3::new(0, 0, 0);
        along_u[u] = if corner[u] == 1 { 1 } else { -1 };
        let mut along_v = Vector3::new(0, 0, 0);
        along_v[v] = if corner[v] == 1 { 1 } else { -1 };

        let side_u = !voxels.is_empty_at(facing + along_u);
        let side_v = !voxels.is_empty_at(facing + along_v);
        let diagonal = !voxels.is_empty_at(facing + along_u + along_v);
        let level = if side_u && side_v {
            0
        } else {
            3 - (side_u as usize + side_v as usize + diagonal as usize)
        };
        OCCLUSION_BRIGHTNESS[level]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::grid::ChunkDimensions;

    #[test]
    fn isolated_voxels_are_unoccluded() {
        let dimensions = ChunkDimensions::cube(3);
        let mut grid = VoxelGrid::filled(dimensions, true);
        grid.set_empty(1, 1, 1, false);
        let ao = AmbientOcclusion::default();
        let values = ao.get_or_compute(&grid);
        assert_eq!(values[dimensions.index(1, 1, 1)], UNOCCLUDED);
        assert!(ao.is_computed());
    }

    #[test]
    fn corners_next_to_walls_darken() {
        let dimensions = ChunkDimensions::cube(3);
        let mut grid = VoxelGrid::filled(dimensions, true);
        grid.set_empty(1, 0, 1, false);
        grid.set_empty(0, 1, 1, false);
        grid.set_empty(1, 1, 0, false);

        let values = AmbientOcclusion::default().get_or_compute(&grid);
        let top = values[dimensions.index(1, 0, 1)][BlockSide::TOP.index()];
        // Corner (0, 1, 0) touches both walls, corner (1, 1, 1) touches neither.
        assert_eq!(top[0], OCCLUSION_BRIGHTNESS[0]);
        assert_eq!(top[2], OCCLUSION_BRIGHTNESS[3]);
        // Corner (0, 1, 1) touches only the wall at x = 0.
        assert_eq!(top[1], OCCLUSION_BRIGHTNESS[2]);
    }
}
