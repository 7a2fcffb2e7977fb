//! # Chunk Geometry
//!
//! The third pipeline stage: an indexed triangle mesh of every voxel face that borders an
//! empty voxel. Faces on the chunk boundary are culled against the neighbouring chunks, so
//! the mesh depends on the voxels of the six face-adjacent chunks and on the chunk's own
//! lighting.

use cgmath::{Point3, Vector3};

use super::vertex::Vertex;
use crate::engine_state::{
    grid::{ChunkCoordinate, GridItem},
    lighting::{BlockLighting, SunlightField, CHUNK_LIGHTING_MAX},
    voxels::{block_side::BlockSide, neighborhood::NeighborhoodGuard, VoxelGrid},
};

pub struct GeometryData {
    coordinate: ChunkCoordinate,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl GeometryData {
    /// Geometry of a chunk with nothing to draw.
    pub fn empty(coordinate: ChunkCoordinate) -> Self {
        Self {
            coordinate,
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn from_parts(coordinate: ChunkCoordinate, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        debug_assert_eq!(indices.len() % 3, 0);
        Self {
            coordinate,
            vertices,
            indices,
        }
    }

    /// Meshes the centre chunk of a locked face neighborhood.
    ///
    /// # Arguments
    /// * `neighborhood` - The chunk and its six face neighbours, read-locked
    /// * `sunlight` - The chunk's sunlight, read-locked after the voxels
    /// * `ambient_occlusion` - Per-voxel corner occlusion of the chunk
    pub fn build(
        coordinate: ChunkCoordinate,
        neighborhood: &NeighborhoodGuard<'_>,
        sunlight: &SunlightField,
        ambient_occlusion: &[BlockLighting],
    ) -> Self {
        let dimensions = neighborhood.dimensions();
        let center = neighborhood.center();
        let origin = coordinate.min_corner(dimensions);
        let mut geometry = Self::empty(coordinate);

        for z in 0..dimensions.z {
            for y in 0..dimensions.y {
                for x in 0..dimensions.x {
                    if center.is_empty(x, y, z) {
                        continue;
                    }
                    let position = Point3::new(x as i32, y as i32, z as i32);
                    let occlusion = &ambient_occlusion[dimensions.index(x, y, z)];
                    for side in BlockSide::all() {
                        let facing = position + side.normal();
                        if !neighborhood.is_empty_at(facing) {
                            continue;
                        }
                        let light = face_sunlight(center, sunlight, position, facing) as f32
                            / CHUNK_LIGHTING_MAX as f32;
                        geometry.push_face(
                            origin + Vector3::new(position.x, position.y, position.z),
                            side,
                            light,
                            occlusion[side.index()],
                        );
                    }
                }
            }
        }
        geometry
    }

    fn push_face(&mut self, voxel: Point3<i32>, side: BlockSide, light: f32, occlusion: [f32; 4]) {
        let base = self.vertices.len() as u32;
        let normal = side.normal().map(|component| component as f32);
        for (corner, corner_occlusion) in side.corners().into_iter().zip(occlusion) {
            let world = voxel + corner;
            self.vertices.push(Vertex::new(
                Point3::new(world.x as f32, world.y as f32, world.z as f32),
                normal,
                side.texture_index(),
                light * corner_occlusion,
            ));
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn face_count(&self) -> usize {
        self.indices.len() / 6
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// Sunlight reaching a face, sampled in the empty voxel the face looks into.
fn face_sunlight(
    center: &VoxelGrid,
    sunlight: &SunlightField,
    voxel: Point3<i32>,
    facing: Point3<i32>,
) -> u8 {
    if let Some(level) = sunlight.level_at(facing) {
        return level;
    }
    // Above or below the chunk. Open sky above an outside voxel is full light; otherwise
    // fall back to the voxel's own level.
    let outside = center.voxel_at(voxel).is_some_and(|v| v.outside);
    if facing.y >= center.dimensions().y as i32 && outside {
        return CHUNK_LIGHTING_MAX;
    }
    sunlight.level_at(voxel).unwrap_or(0)
}

impl GridItem for GeometryData {
    fn coordinate(&self) -> ChunkCoordinate {
        self.coordinate
    }

    fn cost(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.vertices.len() * std::mem::size_of::<Vertex>()
            + self.indices.len() * std::mem::size_of::<u32>()
    }

    fn item_will_be_evicted(&self) {}

    fn item_will_be_invalidated(&self) {}
}
