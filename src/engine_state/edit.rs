//! # Edit Cascade
//!
//! A block edit mutates one voxel and then drops every cached artifact that was derived
//! from the old value. Nothing is recomputed eagerly: the next `get` on an invalidated slot
//! rebuilds it.
//!
//! What an edit reaches:
//! 1. the edited chunk's voxels, mutated under the chunk's exclusive lock
//! 2. if the shade leaving the bottom of the chunk changed, the sky shade and `outside`
//!    flags of resident chunks below it, one chunk at a time until a chunk's bottom shade
//!    stops changing
//! 3. for every chunk whose voxel flags or sky shade changed, the Lighting and Geometry of its 3x3
//!    lateral neighborhood and the Geometry of the chunks directly above and below
//!
//! Lighting is always invalidated before Geometry, so a mesher that starts between the two
//! steps cannot pick up the old lighting and survive.

use std::collections::BTreeSet;

use cgmath::Point3;
use log::{debug, error};

use super::{
    error::PipelineError,
    grid::ChunkCoordinate,
    pipeline::ChunkPipeline,
    voxels::{persistence::BlockEdit, Voxel},
};

/// The artifacts one edit invalidated, by stage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvalidationSet {
    /// Chunks whose voxel flags changed or whose voxels were dropped.
    pub voxels: BTreeSet<ChunkCoordinate>,
    pub lighting: BTreeSet<ChunkCoordinate>,
    /// Also the set of GPU buffers the render side must drop.
    pub geometry: BTreeSet<ChunkCoordinate>,
}

impl InvalidationSet {
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }
}

impl ChunkPipeline {
    /// Sets the voxel at a world point and invalidates everything derived from it.
    ///
    /// # Arguments
    /// * `point` - World voxel coordinate
    /// * `voxel` - New value; only its `empty` flag is used
    /// * `add_to_journal` - Whether to append the edit to the persistent journal. Replays
    ///   pass `false`.
    ///
    /// # Returns
    /// The invalidated artifacts. Empty if the voxel already had this value.
    ///
    /// # Errors
    /// [`PipelineError::OutsideWorld`] for points above the sky ceiling, or any failure to
    /// build the voxels of the edited chunk or of the chunk above it.
    pub fn set_block(
        &self,
        point: Point3<i32>,
        voxel: Voxel,
        add_to_journal: bool,
    ) -> Result<InvalidationSet, PipelineError> {
        let dimensions = self.dimensions();
        let coordinate = ChunkCoordinate::containing(point, dimensions);
        if coordinate.y > self.sky_ceiling() {
            return Err(PipelineError::OutsideWorld(point));
        }

        let chunk = self.voxels().get(coordinate)?;
        let local = point - coordinate.min_corner(dimensions);
        let (changed, shade_changed) = {
            let mut grid = chunk.write();
            let before = grid.bottom_shade();
            let changed =
                grid.set_empty(local.x as usize, local.y as usize, local.z as usize, voxel.empty);
            (changed, changed && grid.bottom_shade() != before)
        };

        let edit = BlockEdit::new(point, voxel);
        self.edit_log().record(edit);
        if add_to_journal {
            if let Err(failure) = self.persistence().append_edit(&edit) {
                error!("Edit at {point:?} was applied but not journaled: {failure}");
            }
        }

        let mut invalidation = InvalidationSet::default();
        if !changed {
            return Ok(invalidation);
        }
        invalidation.voxels.insert(coordinate);
        if shade_changed {
            self.propagate_sky_downward(coordinate, &mut invalidation.voxels)?;
        }
        self.invalidate_dependents(&mut invalidation);
        debug!(
            "Edit at {point:?}: {} voxel chunks changed, {} lighting and {} geometry slots invalidated",
            invalidation.voxels.len(),
            invalidation.lighting.len(),
            invalidation.geometry.len()
        );
        Ok(invalidation)
    }

    /// Pushes a changed bottom shade down the column of resident chunks.
    fn propagate_sky_downward(
        &self,
        from: ChunkCoordinate,
        changed: &mut BTreeSet<ChunkCoordinate>,
    ) -> Result<(), PipelineError> {
        let mut above = from;
        loop {
            let below = above.below();
            let Some(chunk) = self.voxels().peek(below) else {
                // Anything further down took its sky from a chunk that will be rebuilt, so
                // drop it too.
                for coordinate in self.voxels().known_coordinates() {
                    if coordinate.x == below.x && coordinate.z == below.z && coordinate.y < below.y
                    {
                        self.voxels().invalidate(coordinate);
                        changed.insert(coordinate);
                    }
                }
                return Ok(());
            };

            let sky = self.sky_entering(below)?;
            let (sky_changed, shade_changed) = {
                let mut grid = chunk.write();
                let before = grid.bottom_shade();
                let sky_changed = grid.apply_sky(&sky);
                (sky_changed, sky_changed && grid.bottom_shade() != before)
            };
            if sky_changed {
                changed.insert(below);
            }
            if !shade_changed {
                return Ok(());
            }
            above = below;
        }
    }

    fn invalidate_dependents(&self, invalidation: &mut InvalidationSet) {
        for changed in &invalidation.voxels {
            invalidation.lighting.extend(changed.lateral_neighborhood());
            invalidation.geometry.extend(changed.lateral_neighborhood());
            invalidation.geometry.insert(changed.above());
            invalidation.geometry.insert(changed.below());
        }
        for &coordinate in &invalidation.lighting {
            self.lighting().invalidate(coordinate);
        }
        for &coordinate in &invalidation.geometry {
            self.geometry().invalidate(coordinate);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine_state::{
        config::EngineConfig,
        grid::ChunkDimensions,
        voxels::{
            generator::{EmptyTerrain, FlatTerrain},
            persistence::MemoryPersistence,
        },
    };

    fn pipeline(
        generator: Arc<dyn crate::engine_state::voxels::generator::TerrainGenerator>,
        persistence: Arc<MemoryPersistence>,
    ) -> Arc<ChunkPipeline> {
        let config = EngineConfig {
            chunk_dimensions: ChunkDimensions::cube(4),
            sky_ceiling_chunk_y: 1,
            ..EngineConfig::default()
        };
        ChunkPipeline::new(&config, generator, persistence).unwrap()
    }

    fn sunlight(pipeline: &ChunkPipeline, point: Point3<i32>) -> u8 {
        let dimensions = pipeline.dimensions();
        let coordinate = ChunkCoordinate::containing(point, dimensions);
        let local = point - coordinate.min_corner(dimensions);
        pipeline
            .lighting()
            .get(coordinate)
            .unwrap()
            .sunlight_at(Point3::new(local.x, local.y, local.z))
            .unwrap()
    }

    #[test]
    fn a_roof_voxel_attenuates_the_light_below_it() {
        let pipeline = pipeline(Arc::new(EmptyTerrain), Arc::new(MemoryPersistence::new()));
        let below = Point3::new(1, 6, 1);
        assert_eq!(sunlight(&pipeline, below), 15);

        pipeline.set_block(Point3::new(1, 7, 1), Voxel::SOLID, true).unwrap();
        assert_eq!(sunlight(&pipeline, below), 14);

        pipeline.set_block(Point3::new(1, 7, 1), Voxel::EMPTY, true).unwrap();
        assert_eq!(sunlight(&pipeline, below), 15);
    }

    #[test]
    fn a_roof_on_a_chunk_boundary_shades_like_one_inside_a_chunk() {
        let on_boundary = pipeline(Arc::new(EmptyTerrain), Arc::new(MemoryPersistence::new()));
        let inside = pipeline(Arc::new(EmptyTerrain), Arc::new(MemoryPersistence::new()));
        assert_eq!(sunlight(&on_boundary, Point3::new(1, 3, 1)), 15);
        assert_eq!(sunlight(&inside, Point3::new(1, 5, 1)), 15);

        for x in 0..3 {
            for z in 0..3 {
                on_boundary.set_block(Point3::new(x, 4, z), Voxel::SOLID, false).unwrap();
                inside.set_block(Point3::new(x, 6, z), Voxel::SOLID, false).unwrap();
            }
        }
        assert_eq!(sunlight(&inside, Point3::new(1, 5, 1)), 14);
        assert_eq!(sunlight(&on_boundary, Point3::new(1, 3, 1)), 14);
        assert_eq!(sunlight(&on_boundary, Point3::new(1, 1, 1)), 14);

        on_boundary.set_block(Point3::new(1, 4, 1), Voxel::EMPTY, false).unwrap();
        assert_eq!(sunlight(&on_boundary, Point3::new(1, 3, 1)), 15);
    }

    #[test]
    fn edits_invalidate_the_lateral_neighborhood() {
        let pipeline = pipeline(Arc::new(FlatTerrain { height: 2 }), Arc::new(MemoryPersistence::new()));
        let center = ChunkCoordinate::new(0, 0, 0);
        for coordinate in center.lateral_neighborhood() {
            pipeline.geometry().get(coordinate).unwrap();
        }
        let far = ChunkCoordinate::new(3, 0, 0);
        pipeline.geometry().get(far).unwrap();

        let invalidation = pipeline
            .set_block(Point3::new(1, 2, 1), Voxel::SOLID, false)
            .unwrap();
        assert_eq!(invalidation.voxels, BTreeSet::from([center]));
        for coordinate in center.lateral_neighborhood() {
            assert!(invalidation.lighting.contains(&coordinate));
            assert!(!pipeline.lighting().is_resident(coordinate));
            assert!(!pipeline.geometry().is_resident(coordinate));
        }
        assert!(invalidation.geometry.contains(&center.above()));
        assert!(invalidation.geometry.contains(&center.below()));
        assert!(pipeline.geometry().is_resident(far));
        assert!(pipeline.voxels().is_resident(center));
    }

    #[test]
    fn opening_a_column_reaches_resident_chunks_below() {
        let pipeline = pipeline(Arc::new(EmptyTerrain), Arc::new(MemoryPersistence::new()));
        let roof = Point3::new(2, 4, 2);
        pipeline.set_block(roof, Voxel::SOLID, false).unwrap();

        let low = pipeline.voxels().get(ChunkCoordinate::new(0, -1, 0)).unwrap();
        assert!(!low.read().voxel(2, 3, 2).outside);

        let invalidation = pipeline.set_block(roof, Voxel::EMPTY, false).unwrap();
        assert!(low.read().voxel(2, 3, 2).outside);
        assert!(invalidation.voxels.contains(&ChunkCoordinate::new(0, 0, 0)));
        assert!(invalidation.voxels.contains(&ChunkCoordinate::new(0, -1, 0)));
    }

    #[test]
    fn unchanged_voxels_invalidate_nothing() {
        let persistence = Arc::new(MemoryPersistence::new());
        let pipeline = pipeline(Arc::new(EmptyTerrain), Arc::clone(&persistence));
        let invalidation = pipeline
            .set_block(Point3::new(0, 0, 0), Voxel::EMPTY, true)
            .unwrap();
        assert!(invalidation.is_empty());
        assert_eq!(persistence.journal().len(), 1);
    }

    #[test]
    fn edits_above_the_ceiling_are_rejected() {
        let pipeline = pipeline(Arc::new(EmptyTerrain), Arc::new(MemoryPersistence::new()));
        assert!(matches!(
            pipeline.set_block(Point3::new(0, 8, 0), Voxel::SOLID, true),
            Err(PipelineError::OutsideWorld(_))
        ));
        assert!(pipeline.set_block(Point3::new(0, 7, 0), Voxel::SOLID, true).is_ok());
    }
}
