//! # Terrain Generation
//!
//! Produces the initial voxels of a chunk that has never been saved.
//!
//! - `PerlinTerrain`: a 2D Perlin height field with 3D Perlin caves carved below it
//! - `FlatTerrain`: everything below a fixed height is solid
//! - `EmptyTerrain`: nothing but air
//!
//! Generation is a pure function of the chunk coordinate, so any chunk can be thrown away
//! and rebuilt to exactly the same voxels.

use noise::{NoiseFn, Perlin};

use super::voxel_grid::VoxelGrid;
use crate::engine_state::grid::{ChunkCoordinate, ChunkDimensions};

pub trait TerrainGenerator: Send + Sync {
    fn generate(&self, coordinate: ChunkCoordinate, dimensions: ChunkDimensions) -> VoxelGrid;
}

/// Cave noise samples above this value are carved out of the terrain.
const CAVE_THRESHOLD: f64 = 0.55;
/// Scaling factor applied to world coordinates when sampling cave noise.
const CAVE_SCALE_FACTOR: f64 = 0.08;

pub struct PerlinTerrain {
    seed: u32,
    base_height: f64,
    amplitude: f64,
    scale: f64,
}

impl PerlinTerrain {
    /// # Arguments
    /// * `seed` - Noise seed; equal seeds generate identical worlds
    /// * `base_height` - World-space height of the terrain where the noise is zero
    /// * `amplitude` - Maximum deviation from `base_height`, in voxels
    /// * `scale` - Horizontal frequency of the height field
    pub fn new(seed: u32, base_height: f64, amplitude: f64, scale: f64) -> Self {
        Self {
            seed,
            base_height,
            amplitude,
            scale,
        }
    }
}

impl TerrainGenerator for PerlinTerrain {
    fn generate(&self, coordinate: ChunkCoordinate, dimensions: ChunkDimensions) -> VoxelGrid {
        let perlin = Perlin::new(self.seed);
        let corner = coordinate.min_corner(dimensions);

        let mut heights = Vec::with_capacity(dimensions.column_count());
        for z in 0..dimensions.z {
            for x in 0..dimensions.x {
                let sample = perlin.get([
                    (corner.x + x as i32) as f64 * self.scale,
                    (corner.z + z as i32) as f64 * self.scale,
                ]);
                heights.push(self.base_height + sample * self.amplitude);
            }
        }

        VoxelGrid::from_fn(dimensions, |x, y, z| {
            let world_y = (corner.y + y as i32) as f64;
            if world_y >= heights[dimensions.column_index(x, z)] {
                return true;
            }
            let cave = perlin.get([
                (corner.x + x as i32) as f64 * CAVE_SCALE_FACTOR,
                world_y * CAVE_SCALE_FACTOR,
                (corner.z + z as i32) as f64 * CAVE_SCALE_FACTOR,
            ]);
            cave > CAVE_THRESHOLD
        })
    }
}

/// Solid below `height` (world voxels), empty at and above it.
pub struct FlatTerrain {
    pub height: i32,
}

impl TerrainGenerator for FlatTerrain {
    fn generate(&self, coordinate: ChunkCoordinate, dimensions: ChunkDimensions) -> VoxelGrid {
        let corner = coordinate.min_corner(dimensions);
        VoxelGrid::from_fn(dimensions, |_, y, _| corner.y + y as i32 >= self.height)
    }
}

pub struct EmptyTerrain;

impl TerrainGenerator for EmptyTerrain {
    fn generate(&self, _: ChunkCoordinate, dimensions: ChunkDimensions) -> VoxelGrid {
        VoxelGrid::filled(dimensions, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perlin_generation_is_deterministic() {
        let dimensions = ChunkDimensions::cube(8);
        let coordinate = ChunkCoordinate::new(3, 0, -2);
        let a = PerlinTerrain::new(7, 4.0, 6.0, 0.05).generate(coordinate, dimensions);
        let b = PerlinTerrain::new(7, 4.0, 6.0, 0.05).generate(coordinate, dimensions);
        assert_eq!(a, b);
    }

    #[test]
    fn perlin_terrain_is_solid_deep_down_and_empty_high_up() {
        let dimensions = ChunkDimensions::cube(8);
        let terrain = PerlinTerrain::new(1, 0.0, 4.0, 0.05);
        assert!(terrain
            .generate(ChunkCoordinate::new(0, 4, 0), dimensions)
            .is_all_empty());
        assert!(terrain
            .generate(ChunkCoordinate::new(0, -4, 0), dimensions)
            .solid_count() > 0);
    }

    #[test]
    fn flat_terrain_splits_at_its_height() {
        let dimensions = ChunkDimensions::cube(4);
        let grid = FlatTerrain { height: 2 }.generate(ChunkCoordinate::new(0, 0, 0), dimensions);
        assert!(!grid.is_empty(0, 1, 0));
        assert!(grid.is_empty(0, 2, 0));
        assert_eq!(grid.solid_count(), 32);
        assert!(FlatTerrain { height: 2 }
            .generate(ChunkCoordinate::new(0, 1, 0), dimensions)
            .is_all_empty());
    }
}
