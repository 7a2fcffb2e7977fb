//! Chunk-granular coordinates and the voxel extent of one chunk.

use cgmath::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Integer coordinate of a chunk, in units of whole chunks.
///
/// The derived `Ord` is lexical (x, then y, then z) and is the global lock order: any
/// code that read-locks several chunks at once must acquire them in ascending order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoordinate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Lateral offsets of a chunk's 3x3 neighborhood, the chunk itself included.
pub const LATERAL_NEIGHBORHOOD: [(i32, i32); 9] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 0),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

impl ChunkCoordinate {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn above(self) -> Self {
        self.offset(0, 1, 0)
    }

    pub fn below(self) -> Self {
        self.offset(0, -1, 0)
    }

    /// The chunk and its eight lateral neighbours, in lock order.
    pub fn lateral_neighborhood(self) -> [ChunkCoordinate; 9] {
        LATERAL_NEIGHBORHOOD.map(|(dx, dz)| self.offset(dx, 0, dz))
    }

    /// The chunk and the six chunks sharing a face with it, in lock order.
    pub fn face_neighborhood(self) -> [ChunkCoordinate; 7] {
        let mut neighborhood = [
            self.offset(-1, 0, 0),
            self.offset(0, -1, 0),
            self.offset(0, 0, -1),
            self,
            self.offset(0, 0, 1),
            self.offset(0, 1, 0),
            self.offset(1, 0, 0),
        ];
        neighborhood.sort();
        neighborhood
    }

    /// Returns the chunk containing a world-space voxel.
    pub fn containing(point: Point3<i32>, dimensions: ChunkDimensions) -> Self {
        Self::new(
            point.x.div_euclid(dimensions.x as i32),
            point.y.div_euclid(dimensions.y as i32),
            point.z.div_euclid(dimensions.z as i32),
        )
    }

    /// Returns the chunk containing a world-space position.
    pub fn containing_position(position: Point3<f32>, dimensions: ChunkDimensions) -> Self {
        Self::new(
            (position.x / dimensions.x as f32).floor() as i32,
            (position.y / dimensions.y as f32).floor() as i32,
            (position.z / dimensions.z as f32).floor() as i32,
        )
    }

    /// World-space voxel at the chunk's minimum corner.
    pub fn min_corner(self, dimensions: ChunkDimensions) -> Point3<i32> {
        Point3::new(
            self.x * dimensions.x as i32,
            self.y * dimensions.y as i32,
            self.z * dimensions.z as i32,
        )
    }

    /// World-space centre of the chunk.
    pub fn center(self, dimensions: ChunkDimensions) -> Point3<f32> {
        let corner = self.min_corner(dimensions);
        Point3::new(
            corner.x as f32 + dimensions.x as f32 * 0.5,
            corner.y as f32 + dimensions.y as f32 * 0.5,
            corner.z as f32 + dimensions.z as f32 * 0.5,
        )
    }

    /// Offset of `other` from this chunk, in chunks.
    pub fn delta(self, other: ChunkCoordinate) -> Vector3<i32> {
        Vector3::new(other.x - self.x, other.y - self.y, other.z - self.z)
    }
}

impl From<Point3<i32>> for ChunkCoordinate {
    fn from(point: Point3<i32>) -> Self {
        Self::new(point.x, point.y, point.z)
    }
}

impl From<ChunkCoordinate> for Point3<i32> {
    fn from(coordinate: ChunkCoordinate) -> Self {
        Point3::new(coordinate.x, coordinate.y, coordinate.z)
    }
}

/// Voxel extent of every chunk in the world.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkDimensions {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Default for ChunkDimensions {
    fn default() -> Self {
        Self::cube(16)
    }
}

impl ChunkDimensions {
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    pub const fn cube(size: usize) -> Self {
        Self::new(size, size, size)
    }

    pub fn voxel_count(&self) -> usize {
        self.x * self.y * self.z
    }

    pub fn column_count(&self) -> usize {
        self.x * self.z
    }

    /// Linear index of a local voxel; x varies fastest, then y, then z.
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.x * (y + self.y * z)
    }

    pub fn column_index(&self, x: usize, z: usize) -> usize {
        x + self.x * z
    }

    /// Whether a chunk-local point lies inside the chunk.
    pub fn contains(&self, local: Point3<i32>) -> bool {
        local.x >= 0
            && local.y >= 0
            && local.z >= 0
            && (local.x as usize) < self.x
            && (local.y as usize) < self.y
            && (local.z as usize) < self.z
    }

    pub fn as_vector(&self) -> Vector3<i32> {
        Vector3::new(self.x as i32, self.y as i32, self.z as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containing_rounds_towards_negative_infinity() {
        let dimensions = ChunkDimensions::cube(16);
        assert_eq!(
            ChunkCoordinate::containing(Point3::new(-1, 0, 15), dimensions),
            ChunkCoordinate::new(-1, 0, 0)
        );
        assert_eq!(
            ChunkCoordinate::containing(Point3::new(-16, -17, 16), dimensions),
            ChunkCoordinate::new(-1, -2, 1)
        );
        assert_eq!(
            ChunkCoordinate::containing_position(Point3::new(-0.5, 31.9, 0.0), dimensions),
            ChunkCoordinate::new(-1, 1, 0)
        );
    }

    #[test]
    fn neighborhoods_are_sorted_and_centered() {
        let center = ChunkCoordinate::new(3, -2, 7);
        let lateral = center.lateral_neighborhood();
        assert!(lateral.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(lateral.contains(&center));
        assert!(lateral.iter().all(|c| c.y == center.y));

        let faces = center.face_neighborhood();
        assert!(faces.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(faces.contains(&center.above()));
        assert!(faces.contains(&center.below()));
    }

    #[test]
    fn index_covers_every_voxel_once() {
        let dimensions = ChunkDimensions::new(3, 4, 5);
        let mut seen = vec![false; dimensions.voxel_count()];
        for z in 0..5 {
            for y in 0..4 {
                for x in 0..3 {
                    let index = dimensions.index(x, y, z);
                    assert!(!seen[index]);
                    seen[index] = true;
                }
            }
        }
        assert!(seen.into_iter().all(|visited| visited));
    }
}
