//! # Voxels
//!
//! The first pipeline stage: authored voxel data, where it comes from (generation,
//! persistence, the edit log) and how several chunks are read together.

pub mod block_side;
pub mod edit_log;
pub mod generator;
pub mod neighborhood;
pub mod persistence;
pub mod ray_cast;
pub mod voxel;
pub mod voxel_data;
pub mod voxel_grid;

pub use voxel::Voxel;
pub use voxel_data::VoxelData;
pub use voxel_grid::VoxelGrid;
