//! # Voxel Neighborhoods
//!
//! Lighting and geometry read the voxels of several chunks at once. A `Neighborhood`
//! resolves those chunks through the Voxel cache first (possibly generating them), and only
//! then read-locks all of them in ascending [`ChunkCoordinate`] order. Resolving before
//! locking means no voxel lock is ever held across a cache build, and the fixed order means
//! two builders can never wait on each other's chunks.

use std::sync::{Arc, RwLockReadGuard};

use cgmath::Point3;

use super::{voxel::Voxel, voxel_data::VoxelData, voxel_grid::VoxelGrid};
use crate::engine_state::{
    error::PipelineError,
    grid::{ChunkCoordinate, ChunkDimensions, GridCache, GridItem},
};

pub struct Neighborhood {
    center: ChunkCoordinate,
    dimensions: ChunkDimensions,
    chunks: Vec<Arc<VoxelData>>,
}

impl Neighborhood {
    /// Fetches (building if necessary) the voxel chunks at `coordinates`.
    pub fn resolve(
        voxels: &GridCache<VoxelData>,
        center: ChunkCoordinate,
        dimensions: ChunkDimensions,
        coordinates: &[ChunkCoordinate],
    ) -> Result<Self, PipelineError> {
        let mut sorted = coordinates.to_vec();
        sorted.sort();
        sorted.dedup();
        let chunks = sorted
            .into_iter()
            .map(|coordinate| voxels.get(coordinate))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            center,
            dimensions,
            chunks,
        })
    }

    /// Read-locks every chunk in lock order.
    pub fn read(&self) -> NeighborhoodGuard<'_> {
        debug_assert!(self
            .chunks
            .windows(2)
            .all(|pair| pair[0].coordinate() < pair[1].coordinate()));
        let guards = self
            .chunks
            .iter()
            .map(|chunk| (chunk.coordinate(), chunk.read()))
            .collect();
        NeighborhoodGuard {
            center: self.center,
            dimensions: self.dimensions,
            guards,
        }
    }
}

/// Shared read access to every chunk of a [`Neighborhood`].
pub struct NeighborhoodGuard<'a> {
    center: ChunkCoordinate,
    dimensions: ChunkDimensions,
    guards: Vec<(ChunkCoordinate, RwLockReadGuard<'a, VoxelGrid>)>,
}

impl NeighborhoodGuard<'_> {
    pub fn dimensions(&self) -> ChunkDimensions {
        self.dimensions
    }

    pub fn chunk(&self, coordinate: ChunkCoordinate) -> Option<&VoxelGrid> {
        self.guards
            .iter()
            .find(|(held, _)| *held == coordinate)
            .map(|(_, guard)| &**guard)
    }

    /// Voxels of the chunk the neighborhood is centred on.
    ///
    /// # Panics
    /// Panics if the centre was not among the resolved coordinates.
    pub fn center(&self) -> &VoxelGrid {
        match self.chunk(self.center) {
            Some(grid) => grid,
            None => panic!("neighborhood of {:?} does not hold its centre", self.center),
        }
    }

    /// Looks up a voxel by its position relative to the centre chunk's minimum corner.
    ///
    /// # Returns
    /// `None` if the point falls in a chunk that is not part of the neighborhood.
    pub fn voxel_at(&self, local: Point3<i32>) -> Option<Voxel> {
        let extent = self.dimensions.as_vector();
        let chunk = self.center.offset(
            local.x.div_euclid(extent.x),
            local.y.div_euclid(extent.y),
            local.z.div_euclid(extent.z),
        );
        let grid = self.chunk(chunk)?;
        grid.voxel_at(Point3::new(
            local.x.rem_euclid(extent.x),
            local.y.rem_euclid(extent.y),
            local.z.rem_euclid(extent.z),
        ))
    }

    /// Shade entering the top of the column holding a centre-relative point, taken from
    /// the chunk at the point's height.
    pub fn sky_shade_at(&self, local: Point3<i32>) -> Option<u8> {
        let extent = self.dimensions.as_vector();
        let chunk = self.center.offset(
            local.x.div_euclid(extent.x),
            local.y.div_euclid(extent.y),
            local.z.div_euclid(extent.z),
        );
        let grid = self.chunk(chunk)?;
        Some(grid.sky_shade(
            local.x.rem_euclid(extent.x) as usize,
            local.z.rem_euclid(extent.z) as usize,
        ))
    }

    /// Whether a centre-relative point is empty. Points outside the neighborhood count
    /// as empty.
    pub fn is_empty_at(&self, local: Point3<i32>) -> bool {
        self.voxel_at(local).map_or(true, |voxel| voxel.empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::persistence::NullPersistence;

    #[test]
    fn lookups_cross_chunk_borders() {
        let dimensions = ChunkDimensions::cube(2);
        let persistence = Arc::new(NullPersistence);
        let voxels = GridCache::new(
            "voxels",
            usize::MAX,
            Box::new(move |coordinate: ChunkCoordinate| {
                let solid = coordinate.x == 1;
                Ok(VoxelData::new(
                    coordinate,
                    VoxelGrid::filled(dimensions, !solid),
                    persistence.clone(),
                ))
            }),
        );
        let center = ChunkCoordinate::new(0, 0, 0);
        let neighborhood = Neighborhood::resolve(
            &voxels,
            center,
            dimensions,
            &center.lateral_neighborhood(),
        )
        .unwrap();
        let guard = neighborhood.read();

        assert!(guard.is_empty_at(Point3::new(1, 0, 0)));
        assert!(!guard.is_empty_at(Point3::new(2, 0, 0)));
        assert!(!guard.is_empty_at(Point3::new(3, 1, -2)));
        assert!(guard.voxel_at(Point3::new(0, 2, 0)).is_none());
        assert!(guard.is_empty_at(Point3::new(0, -1, 0)));
        assert_eq!(voxels.len(), 9);
    }
}
