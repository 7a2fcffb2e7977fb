//! In-memory record of every block edit made this session.
//!
//! A voxel chunk that is evicted without persistence, or invalidated, is rebuilt from the
//! terrain generator. The log is replayed over the generated grid so the rebuilt chunk
//! still reflects every edit. Only the latest edit of each voxel is kept, so the log grows
//! with the number of distinct voxels edited rather than the number of edits.

use std::collections::HashMap;

use super::{persistence::BlockEdit, voxel_grid::VoxelGrid};
use crate::{
    core::MtResource,
    engine_state::grid::{ChunkCoordinate, ChunkDimensions},
};

/// Latest edit per world voxel, keyed by `[x, y, z]`.
type ChunkEdits = HashMap<[i32; 3], BlockEdit>;

pub struct EditLog {
    dimensions: ChunkDimensions,
    edits: MtResource<HashMap<ChunkCoordinate, ChunkEdits>>,
}

impl EditLog {
    pub fn new(dimensions: ChunkDimensions) -> Self {
        Self {
            dimensions,
            edits: MtResource::new(HashMap::new()),
        }
    }

    /// Creates a log pre-populated with journaled edits, oldest first.
    pub fn from_journal(dimensions: ChunkDimensions, journal: Vec<BlockEdit>) -> Self {
        let log = Self::new(dimensions);
        for edit in journal {
            log.record(edit);
        }
        log
    }

    /// Records an edit, replacing any earlier edit of the same voxel.
    pub fn record(&self, edit: BlockEdit) {
        let point = edit.point();
        let coordinate = ChunkCoordinate::containing(point, self.dimensions);
        self.edits
            .get_mut()
            .entry(coordinate)
            .or_default()
            .insert([point.x, point.y, point.z], edit);
    }

    /// Replays the latest edit of every voxel in one chunk over `grid`.
    ///
    /// # Returns
    /// The number of voxels whose empty flag changed.
    pub fn apply(&self, coordinate: ChunkCoordinate, grid: &mut VoxelGrid) -> usize {
        let edits = self.edits.get();
        let Some(chunk_edits) = edits.get(&coordinate) else {
            return 0;
        };
        let corner = coordinate.min_corner(self.dimensions);
        chunk_edits
            .values()
            .filter(|edit| {
                let local = edit.point() - corner;
                grid.set_empty(
                    local.x as usize,
                    local.y as usize,
                    local.z as usize,
                    edit.voxel.empty,
                )
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.edits.get().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::voxel::Voxel;
    use cgmath::Point3;

    #[test]
    fn replays_only_the_requested_chunk() {
        let dimensions = ChunkDimensions::cube(4);
        let log = EditLog::from_journal(
            dimensions,
            vec![
                BlockEdit::new(Point3::new(-1, 0, 0), Voxel::SOLID),
                BlockEdit::new(Point3::new(1, 1, 1), Voxel::SOLID),
                BlockEdit::new(Point3::new(1, 1, 1), Voxel::EMPTY),
                BlockEdit::new(Point3::new(2, 3, 0), Voxel::SOLID),
            ],
        );
        assert_eq!(log.len(), 3);

        let mut grid = VoxelGrid::filled(dimensions, true);
        assert_eq!(log.apply(ChunkCoordinate::new(0, 0, 0), &mut grid), 1);
        assert!(grid.is_empty(1, 1, 1));
        assert!(!grid.is_empty(2, 3, 0));
        assert_eq!(grid.solid_count(), 1);

        let mut neighbour = VoxelGrid::filled(dimensions, true);
        assert_eq!(log.apply(ChunkCoordinate::new(-1, 0, 0), &mut neighbour), 1);
        assert!(!neighbour.is_empty(3, 0, 0));
    }

    #[test]
    fn repeated_edits_of_one_voxel_keep_only_the_latest() {
        let dimensions = ChunkDimensions::cube(4);
        let log = EditLog::new(dimensions);
        let point = Point3::new(2, 2, 2);
        for _ in 0..50 {
            log.record(BlockEdit::new(point, Voxel::SOLID));
            log.record(BlockEdit::new(point, Voxel::EMPTY));
        }
        log.record(BlockEdit::new(point, Voxel::SOLID));
        log.record(BlockEdit::new(Point3::new(0, 0, 0), Voxel::SOLID));
        assert_eq!(log.len(), 2);

        let mut grid = VoxelGrid::filled(dimensions, true);
        assert_eq!(log.apply(ChunkCoordinate::new(0, 0, 0), &mut grid), 2);
        assert!(!grid.is_empty(2, 2, 2));
        assert!(!grid.is_empty(0, 0, 0));
    }
}
