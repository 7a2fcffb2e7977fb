//! # Active Region
//!
//! The box of chunks around the camera that must be resident and drawn. The box is wider
//! than it is tall: `horizontal_radius` chunks either side on X and Z, `vertical_radius`
//! on Y.
//!
//! The set is only recomputed when the camera enters a different chunk (or a refresh is
//! forced), and is kept sorted nearest-first: that order is both the meshing priority and
//! the draw order.

use std::collections::HashSet;

use cgmath::{MetricSpace, Point3};
use serde::{Deserialize, Serialize};

use super::{
    camera_state::CameraModifiedFlags,
    grid::{ChunkCoordinate, ChunkDimensions},
};

/// Half-extent of the active box, in chunks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveRegionExtent {
    pub horizontal_radius: u32,
    pub vertical_radius: u32,
}

impl Default for ActiveRegionExtent {
    fn default() -> Self {
        Self {
            horizontal_radius: 4,
            vertical_radius: 2,
        }
    }
}

impl ActiveRegionExtent {
    /// Number of chunks in the box.
    pub fn chunk_count(&self) -> usize {
        let horizontal = 2 * self.horizontal_radius as usize + 1;
        let vertical = 2 * self.vertical_radius as usize + 1;
        horizontal * horizontal * vertical
    }
}

pub struct ActiveRegion {
    extent: ActiveRegionExtent,
    dimensions: ChunkDimensions,
    camera_chunk: Option<ChunkCoordinate>,
    coordinates: Vec<ChunkCoordinate>,
    members: HashSet<ChunkCoordinate>,
}

impl ActiveRegion {
    pub fn new(extent: ActiveRegionExtent, dimensions: ChunkDimensions) -> Self {
        Self {
            extent,
            dimensions,
            camera_chunk: None,
            coordinates: Vec::new(),
            members: HashSet::new(),
        }
    }

    /// Recomputes the active set for a camera at `position`.
    ///
    /// # Arguments
    /// * `position` - World-space camera position
    /// * `flags` - What the host reports changed; only `force_refresh` bypasses the
    ///   same-chunk early-out
    ///
    /// # Returns
    /// `true` if the set was recomputed
    pub fn update(&mut self, position: Point3<f32>, flags: CameraModifiedFlags) -> bool {
        let camera_chunk = ChunkCoordinate::containing_position(position, self.dimensions);
        if self.camera_chunk == Some(camera_chunk) && !flags.force_refresh {
            return false;
        }
        self.camera_chunk = Some(camera_chunk);

        let horizontal = self.extent.horizontal_radius as i32;
        let vertical = self.extent.vertical_radius as i32;
        let mut coordinates = Vec::with_capacity(self.extent.chunk_count());
        for dx in -horizontal..=horizontal {
            for dy in -vertical..=vertical {
                for dz in -horizontal..=horizontal {
                    coordinates.push(camera_chunk.offset(dx, dy, dz));
                }
            }
        }

        // Distances are measured from the camera chunk's centre, not the camera itself, so
        // the order only depends on which chunk the camera is in.
        let center = camera_chunk.center(self.dimensions);
        coordinates.sort_by(|a, b| {
            let da = a.center(self.dimensions).distance2(center);
            let db = b.center(self.dimensions).distance2(center);
            da.total_cmp(&db).then_with(|| a.cmp(b))
        });

        self.members = coordinates.iter().copied().collect();
        self.coordinates = coordinates;
        true
    }

    /// Active chunks, nearest first.
    pub fn coordinates(&self) -> &[ChunkCoordinate] {
        &self.coordinates
    }

    pub fn contains(&self, coordinate: ChunkCoordinate) -> bool {
        self.members.contains(&coordinate)
    }

    pub fn camera_chunk(&self) -> Option<ChunkCoordinate> {
        self.camera_chunk
    }

    pub fn extent(&self) -> ActiveRegionExtent {
        self.extent
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> ActiveRegion {
        ActiveRegion::new(
            ActiveRegionExtent {
                horizontal_radius: 2,
                vertical_radius: 1,
            },
            ChunkDimensions::cube(16),
        )
    }

    #[test]
    fn enumerates_a_box_nearest_first() {
        let mut region = region();
        assert!(region.update(Point3::new(8.0, 8.0, 8.0), CameraModifiedFlags::NONE));
        assert_eq!(region.len(), 5 * 3 * 5);
        assert_eq!(region.coordinates()[0], ChunkCoordinate::new(0, 0, 0));
        assert!(region.contains(ChunkCoordinate::new(2, -1, -2)));
        assert!(!region.contains(ChunkCoordinate::new(0, 2, 0)));

        let distances: Vec<f32> = region
            .coordinates()
            .iter()
            .map(|c| c.center(ChunkDimensions::cube(16)).distance2(Point3::new(8.0, 8.0, 8.0)))
            .collect();
        assert!(distances.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn staying_in_a_chunk_skips_recomputation() {
        let mut region = region();
        region.update(Point3::new(1.0, 1.0, 1.0), CameraModifiedFlags::NONE);
        let moved = CameraModifiedFlags {
            position: true,
            ..CameraModifiedFlags::NONE
        };
        assert!(!region.update(Point3::new(15.0, 2.0, 3.0), moved));
        assert!(region.update(Point3::new(15.0, 2.0, 3.0), CameraModifiedFlags::FORCE_REFRESH));
        assert!(region.update(Point3::new(16.5, 2.0, 3.0), moved));
        assert_eq!(region.camera_chunk(), Some(ChunkCoordinate::new(1, 0, 0)));
    }

    #[test]
    fn returning_to_a_chunk_restores_the_same_set() {
        let mut region = region();
        region.update(Point3::new(3.0, 3.0, 3.0), CameraModifiedFlags::NONE);
        let original = region.coordinates().to_vec();

        region.update(Point3::new(19.0, 3.0, 3.0), CameraModifiedFlags::NONE);
        assert_ne!(region.coordinates(), original.as_slice());

        region.update(Point3::new(5.0, 9.0, 2.0), CameraModifiedFlags::NONE);
        assert_eq!(region.coordinates(), original.as_slice());
    }
}
