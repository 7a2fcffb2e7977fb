//! # Sunlight
//!
//! Sky light levels for one chunk, computed from the voxels of its 3x3 lateral
//! neighborhood.
//!
//! ## Algorithm
//! 1. Vertical pass, per column from the top down: an `outside` voxel receives
//!    [`CHUNK_LIGHTING_MAX`]. Any other voxel inherits the level of the voxel above it,
//!    reduced by the attenuation when that voxel is solid. The topmost voxel of a column
//!    that is closed to the sky starts from full light minus the attenuation of every
//!    solid voxel above the chunk, so a roof shades the same whichever chunk holds it.
//! 2. Lateral flood: light spreads through empty voxels along ±x and ±z, losing the
//!    attenuation at every step, until it runs out or leaves the neighborhood.
//!
//! The stored field keeps the chunk plus a one-voxel lateral border, which is everything
//! the mesher needs to light faces on the chunk boundary.

use std::collections::VecDeque;

use cgmath::Point3;

use crate::engine_state::{
    grid::ChunkDimensions,
    voxels::{neighborhood::NeighborhoodGuard, Voxel},
};

/// Full sky light.
pub const CHUNK_LIGHTING_MAX: u8 = 15;

pub struct SunlightField {
    dimensions: ChunkDimensions,
    levels: Vec<u8>,
}

impl SunlightField {
    /// Computes the field of the neighborhood's centre chunk. The neighborhood must hold
    /// the centre and its eight lateral neighbours.
    pub fn compute(neighborhood: &NeighborhoodGuard<'_>, attenuation: u8) -> Self {
        let dimensions = neighborhood.dimensions();
        let region = Region::new(dimensions);
        let mut empty = vec![true; region.len()];
        let mut levels = vec![0u8; region.len()];

        for rz in 0..region.z {
            for rx in 0..region.x {
                let mut above: Option<(u8, bool)> = None;
                for y in (0..region.y).rev() {
                    let local = region.to_local(rx, y, rz);
                    let voxel = neighborhood.voxel_at(local).unwrap_or(Voxel::EMPTY);
                    let level = if voxel.outside {
                        CHUNK_LIGHTING_MAX
                    } else {
                        match above {
                            None => neighborhood.sky_shade_at(local).map_or(0, |shade| {
                                CHUNK_LIGHTING_MAX.saturating_sub(shade.saturating_mul(attenuation))
                            }),
                            Some((level, true)) => level,
                            Some((level, false)) => level.saturating_sub(attenuation),
                        }
                    };
                    let index = region.index(rx, y, rz);
                    levels[index] = level;
                    empty[index] = voxel.empty;
                    above = Some((level, voxel.empty));
                }
            }
        }

        let mut frontier: VecDeque<(usize, usize, usize)> = VecDeque::new();
        for rz in 0..region.z {
            for y in 0..region.y {
                for rx in 0..region.x {
                    let index = region.index(rx, y, rz);
                    if empty[index] && levels[index] > attenuation {
                        frontier.push_back((rx, y, rz));
                    }
                }
            }
        }
        while let Some((rx, y, rz)) = frontier.pop_front() {
            let spread = levels[region.index(rx, y, rz)].saturating_sub(attenuation);
            if spread == 0 {
                continue;
            }
            for (nx, nz) in region.lateral_neighbors(rx, rz) {
                let index = region.index(nx, y, nz);
                if empty[index] && levels[index] < spread {
                    levels[index] = spread;
                    frontier.push_back((nx, y, nz));
                }
            }
        }

        let mut field = Self {
            dimensions,
            levels: vec![0; (dimensions.x + 2) * dimensions.y * (dimensions.z + 2)],
        };
        for z in -1..=dimensions.z as i32 {
            for y in 0..dimensions.y as i32 {
                for x in -1..=dimensions.x as i32 {
                    let level = levels[region.index(
                        (x + dimensions.x as i32) as usize,
                        y as usize,
                        (z + dimensions.z as i32) as usize,
                    )];
                    if let Some(index) = field.index(Point3::new(x, y, z)) {
                        field.levels[index] = level;
                    }
                }
            }
        }
        field
    }

    fn index(&self, local: Point3<i32>) -> Option<usize> {
        let width = self.dimensions.x as i32 + 2;
        let depth = self.dimensions.z as i32 + 2;
        let (x, y, z) = (local.x + 1, local.y, local.z + 1);
        if x < 0 || z < 0 || y < 0 || x >= width || z >= depth || y >= self.dimensions.y as i32 {
            return None;
        }
        Some((x + width * (y + self.dimensions.y as i32 * z)) as usize)
    }

    /// Sunlight at a chunk-local voxel. Valid for `x` and `z` one voxel beyond the chunk on
    /// either side and `y` inside the chunk.
    pub fn level_at(&self, local: Point3<i32>) -> Option<u8> {
        self.index(local).map(|index| self.levels[index])
    }

    pub fn byte_cost(&self) -> usize {
        std::mem::size_of::<Self>() + self.levels.len()
    }
}

/// The 3x3 lateral neighborhood as one flat array, origin at the minimum corner of the
/// (-1, 0, -1) chunk.
struct Region {
    dimensions: ChunkDimensions,
    x: usize,
    y: usize,
    z: usize,
}

impl Region {
    fn new(dimensions: ChunkDimensions) -> Self {
        Self {
            dimensions,
            x: dimensions.x * 3,
            y: dimensions.y,
            z: dimensions.z * 3,
        }
    }

    fn len(&self) -> usize {
        self.x * self.y * self.z
    }

    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.x * (y + self.y * z)
    }

    fn to_local(&self, x: usize, y: usize, z: usize) -> Point3<i32> {
        Point3::new(
            x as i32 - self.dimensions.x as i32,
            y as i32,
            z as i32 - self.dimensions.z as i32,
        )
    }

    fn lateral_neighbors(&self, x: usize, z: usize) -> impl Iterator<Item = (usize, usize)> {
        let (width, depth) = (self.x, self.z);
        [(-1i32, 0i32), (1, 0), (0, -1), (0, 1)]
            .into_iter()
            .filter_map(move |(dx, dz)| {
                let nx = x as i32 + dx;
                let nz = z as i32 + dz;
                (nx >= 0 && nz >= 0 && (nx as usize) < width && (nz as usize) < depth)
                    .then_some((nx as usize, nz as usize))
            })
    }
}
