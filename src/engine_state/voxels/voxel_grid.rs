//! # Voxel Grid
//!
//! Bit-packed storage for one chunk of voxels. Each flag lives in its own `BitVec` so
//! whole-chunk questions ("is anything solid?") are single word scans, matching how the
//! renderer's solidity arrays were laid out.
//!
//! ## Sky exposure
//!
//! `sky_shade` records, per `(x, z)` column, how many solid voxels lie between the sky and
//! the top face of the chunk. Zero means the column is open. The chunk above supplies it
//! through [`VoxelGrid::bottom_shade`]; chunks at or above the sky ceiling are open
//! everywhere. The `outside` flag of every voxel is recomputed from the shade and the empty
//! flags whenever either changes, and sunlight uses the shade to carry attenuated light
//! across chunk boundaries.

use bitvec::prelude::*;
use cgmath::Point3;

use super::voxel::Voxel;
use crate::engine_state::{grid::ChunkDimensions, lighting::CHUNK_LIGHTING_MAX};

pub type ColumnMask = BitVec<u8, Lsb0>;

/// Solid voxels above the top of a chunk, one count per `(x, z)` column, saturating at
/// [`SHADE_LIMIT`].
pub type ColumnShade = Vec<u8>;

/// Attenuation is at least one, so no sunlight survives this many solid voxels.
pub const SHADE_LIMIT: u8 = CHUNK_LIGHTING_MAX;

/// Shade of a chunk with nothing but sky above it.
pub fn open_sky(dimensions: ChunkDimensions) -> ColumnShade {
    vec![0; dimensions.column_count()]
}

const ENCODING_MAGIC: &[u8; 4] = b"VXG1";
const HEADER_LEN: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoxelGrid {
    dimensions: ChunkDimensions,
    empty: BitVec<u8, Lsb0>,
    outside: BitVec<u8, Lsb0>,
    sky_shade: ColumnShade,
}

impl VoxelGrid {
    /// Creates a grid where every voxel is empty or every voxel is solid. Every column is
    /// fully shaded until [`apply_sky`](Self::apply_sky) is called.
    pub fn filled(dimensions: ChunkDimensions, empty: bool) -> Self {
        Self {
            dimensions,
            empty: BitVec::repeat(empty, dimensions.voxel_count()),
            outside: BitVec::repeat(false, dimensions.voxel_count()),
            sky_shade: vec![SHADE_LIMIT; dimensions.column_count()],
        }
    }

    /// Creates a grid by asking `is_empty` about every local voxel.
    pub fn from_fn<F>(dimensions: ChunkDimensions, mut is_empty: F) -> Self
    where
        F: FnMut(usize, usize, usize) -> bool,
    {
        let mut grid = Self::filled(dimensions, true);
        for z in 0..dimensions.z {
            for y in 0..dimensions.y {
                for x in 0..dimensions.x {
                    let index = dimensions.index(x, y, z);
                    grid.empty.set(index, is_empty(x, y, z));
                }
            }
        }
        grid
    }

    pub fn dimensions(&self) -> ChunkDimensions {
        self.dimensions
    }

    pub fn voxel(&self, x: usize, y: usize, z: usize) -> Voxel {
        let index = self.dimensions.index(x, y, z);
        Voxel {
            empty: self.empty[index],
            outside: self.outside[index],
        }
    }

    /// Returns the voxel at a chunk-local point, or `None` outside the chunk.
    pub fn voxel_at(&self, local: Point3<i32>) -> Option<Voxel> {
        if !self.dimensions.contains(local) {
            return None;
        }
        Some(self.voxel(local.x as usize, local.y as usize, local.z as usize))
    }

    pub fn is_empty(&self, x: usize, y: usize, z: usize) -> bool {
        self.empty[self.dimensions.index(x, y, z)]
    }

    /// Whether a chunk-local point is empty. Points outside the chunk count as empty.
    pub fn is_empty_at(&self, local: Point3<i32>) -> bool {
        self.voxel_at(local).map_or(true, |voxel| voxel.empty)
    }

    pub fn is_all_empty(&self) -> bool {
        self.empty.all()
    }

    pub fn solid_count(&self) -> usize {
        self.empty.count_zeros()
    }

    /// Sets one voxel's empty flag and refreshes the `outside` flags of its column.
    ///
    /// # Returns
    /// `true` if the empty flag actually changed.
    pub fn set_empty(&mut self, x: usize, y: usize, z: usize, empty: bool) -> bool {
        let index = self.dimensions.index(x, y, z);
        if self.empty[index] == empty {
            return false;
        }
        self.empty.set(index, empty);
        self.recompute_column(x, z);
        true
    }

    /// Columns whose top face sees the sky.
    pub fn open_columns(&self) -> ColumnMask {
        self.sky_shade.iter().map(|&shade| shade == 0).collect()
    }

    /// Solid voxels between the sky and the top of column `(x, z)`.
    pub fn sky_shade(&self, x: usize, z: usize) -> u8 {
        self.sky_shade[self.dimensions.column_index(x, z)]
    }

    /// Installs the shade arriving at the top of the chunk and recomputes every `outside`
    /// flag.
    ///
    /// # Returns
    /// `true` if the shade or any voxel's `outside` flag changed. Either one changes the
    /// chunk's sunlight.
    pub fn apply_sky(&mut self, shade: &[u8]) -> bool {
        debug_assert_eq!(shade.len(), self.dimensions.column_count());
        let mut changed = self.sky_shade.as_slice() != shade;
        self.sky_shade.copy_from_slice(shade);
        for z in 0..self.dimensions.z {
            for x in 0..self.dimensions.x {
                changed |= self.recompute_column(x, z);
            }
        }
        changed
    }

    fn recompute_column(&mut self, x: usize, z: usize) -> bool {
        let mut exposed = self.sky_shade[self.dimensions.column_index(x, z)] == 0;
        let mut changed = false;
        for y in (0..self.dimensions.y).rev() {
            let index = self.dimensions.index(x, y, z);
            if self.outside[index] != exposed {
                self.outside.set(index, exposed);
                changed = true;
            }
            if !self.empty[index] {
                exposed = false;
            }
        }
        changed
    }

    /// Per-column shade leaving the bottom of the chunk: the shade that entered at the top
    /// plus the column's own solid voxels.
    pub fn bottom_shade(&self) -> ColumnShade {
        let mut shade = self.sky_shade.clone();
        for z in 0..self.dimensions.z {
            for x in 0..self.dimensions.x {
                let solid = (0..self.dimensions.y)
                    .filter(|&y| !self.is_empty(x, y, z))
                    .count();
                let column = &mut shade[self.dimensions.column_index(x, z)];
                *column = (*column as usize + solid).min(SHADE_LIMIT as usize) as u8;
            }
        }
        shade
    }

    /// Approximate resident size in bytes.
    pub fn byte_cost(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.empty.as_raw_slice().len()
            + self.outside.as_raw_slice().len()
            + self.sky_shade.len()
    }

    /// Serializes the authored state (dimensions and empty flags).
    pub fn encode(&self) -> Vec<u8> {
        let raw = self.empty.as_raw_slice();
        let mut bytes = Vec::with_capacity(HEADER_LEN + raw.len());
        bytes.extend_from_slice(ENCODING_MAGIC);
        for extent in [self.dimensions.x, self.dimensions.y, self.dimensions.z] {
            bytes.extend_from_slice(&(extent as u32).to_le_bytes());
        }
        bytes.extend_from_slice(raw);
        bytes
    }

    /// Parses bytes written by [`encode`](Self::encode).
    ///
    /// # Returns
    /// `None` if the bytes are truncated, carry the wrong header, or were written for a
    /// different chunk size.
    pub fn decode(bytes: &[u8], dimensions: ChunkDimensions) -> Option<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != ENCODING_MAGIC {
            return None;
        }
        let mut extents = bytes[4..HEADER_LEN]
            .chunks_exact(4)
            .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]) as usize);
        let stored = ChunkDimensions::new(extents.next()?, extents.next()?, extents.next()?);
        if stored != dimensions {
            return None;
        }

        let voxel_count = dimensions.voxel_count();
        let payload = &bytes[HEADER_LEN..];
        if payload.len() != voxel_count.div_ceil(8) {
            return None;
        }
        let mut empty = BitVec::<u8, Lsb0>::from_slice(payload);
        empty.truncate(voxel_count);

        let mut grid = Self::filled(dimensions, true);
        grid.empty = empty;
        Some(grid)
    }
}
