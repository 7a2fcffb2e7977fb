//! # Chunk Pipeline
//!
//! Wires the three CPU stages together: Voxel → Lighting → Geometry. Each stage is a
//! [`GridCache`] whose factory pulls what it needs from the stage before it, so asking for
//! the geometry of a chunk nobody has seen transparently generates its voxels (and those of
//! its neighbours) and computes its lighting.
//!
//! Factories reach the other caches through a `Weak` back-reference to the pipeline. A
//! factory that outlives its pipeline fails with [`PipelineError::ShutDown`].
//!
//! ## Lock order
//!
//! Multi-chunk reads go through [`Neighborhood`], which locks voxels in ascending
//! coordinate order. A builder that needs both voxels and a sunlight field always takes the
//! voxel locks first.

use std::sync::{Arc, Weak};

use cgmath::{Point3, Vector3};
use log::{info, trace};

use super::{
    config::EngineConfig,
    error::PipelineError,
    grid::{ChunkCoordinate, ChunkDimensions, GridCache, GridInfo},
    lighting::LightingData,
    rendering::GeometryData,
    voxels::{
        edit_log::EditLog,
        generator::TerrainGenerator,
        neighborhood::Neighborhood,
        persistence::ChunkPersistence,
        ray_cast::{cast_ray, RayHit},
        voxel_grid::{open_sky, ColumnShade},
        Voxel, VoxelData,
    },
};

pub struct ChunkPipeline {
    dimensions: ChunkDimensions,
    sunlight_attenuation: u8,
    sky_ceiling: i32,
    generator: Arc<dyn TerrainGenerator>,
    persistence: Arc<dyn ChunkPersistence>,
    edit_log: EditLog,
    voxels: GridCache<VoxelData>,
    lighting: GridCache<LightingData>,
    geometry: Arc<GridCache<GeometryData>>,
}

impl ChunkPipeline {
    /// Creates the three CPU caches and replays the persisted edit journal into the edit log.
    ///
    /// # Arguments
    /// * `config` - Chunk dimensions, lighting parameters and cache budgets
    /// * `generator` - Terrain for chunks that have never been saved
    /// * `persistence` - Where evicted chunks and edits are kept
    pub fn new(
        config: &EngineConfig,
        generator: Arc<dyn TerrainGenerator>,
        persistence: Arc<dyn ChunkPersistence>,
    ) -> Result<Arc<Self>, PipelineError> {
        let journal = persistence.replay_journal()?;
        info!("Replaying {} journaled edits", journal.len());
        let edit_log = EditLog::from_journal(config.chunk_dimensions, journal);
        let limits = config.cost_limits.clone();

        Ok(Arc::new_cyclic(|pipeline: &Weak<ChunkPipeline>| {
            let voxels_owner = pipeline.clone();
            let lighting_owner = pipeline.clone();
            let geometry_owner = pipeline.clone();
            Self {
                dimensions: config.chunk_dimensions,
                sunlight_attenuation: config.sunlight_attenuation,
                sky_ceiling: config.sky_ceiling_chunk_y,
                generator,
                persistence,
                edit_log,
                voxels: GridCache::new(
                    "voxels",
                    limits.voxels,
                    Box::new(move |coordinate| upgrade(&voxels_owner, "voxels")?.build_voxels(coordinate)),
                ),
                lighting: GridCache::new(
                    "lighting",
                    limits.lighting,
                    Box::new(move |coordinate| {
                        upgrade(&lighting_owner, "lighting")?.build_lighting(coordinate)
                    }),
                ),
                geometry: Arc::new(GridCache::new(
                    "geometry",
                    limits.geometry,
                    Box::new(move |coordinate| {
                        upgrade(&geometry_owner, "geometry")?.build_geometry(coordinate)
                    }),
                )),
            }
        }))
    }

    pub fn dimensions(&self) -> ChunkDimensions {
        self.dimensions
    }

    pub fn sky_ceiling(&self) -> i32 {
        self.sky_ceiling
    }

    pub fn voxels(&self) -> &GridCache<VoxelData> {
        &self.voxels
    }

    pub fn lighting(&self) -> &GridCache<LightingData> {
        &self.lighting
    }

    pub fn geometry(&self) -> &Arc<GridCache<GeometryData>> {
        &self.geometry
    }

    pub fn edit_log(&self) -> &EditLog {
        &self.edit_log
    }

    pub(crate) fn persistence(&self) -> &dyn ChunkPersistence {
        self.persistence.as_ref()
    }

    /// Loads or generates a chunk, replays its edits and derives its sky shade.
    fn build_voxels(&self, coordinate: ChunkCoordinate) -> Result<VoxelData, PipelineError> {
        let (mut grid, source) = match self.persistence.load_voxels(coordinate, self.dimensions) {
            Some(grid) => (grid, "loaded"),
            None => (self.generator.generate(coordinate, self.dimensions), "generated"),
        };
        let replayed = self.edit_log.apply(coordinate, &mut grid);
        let sky = self.sky_entering(coordinate)?;
        grid.apply_sky(&sky);
        trace!("voxels {coordinate:?}: {source}, {replayed} edits replayed");
        Ok(VoxelData::new(
            coordinate,
            grid,
            Arc::clone(&self.persistence),
        ))
    }

    /// Shade arriving at the top face of `coordinate`, read from the chunk above.
    pub(crate) fn sky_entering(
        &self,
        coordinate: ChunkCoordinate,
    ) -> Result<ColumnShade, PipelineError> {
        if coordinate.y >= self.sky_ceiling {
            return Ok(open_sky(self.dimensions));
        }
        let above = match self.voxels.peek(coordinate.above()) {
            Some(above) => above,
            None => self.build_column_above(coordinate)?,
        };
        let shade = above.read().bottom_shade();
        Ok(shade)
    }

    /// Builds the missing chunks between `coordinate` and the nearest resident chunk (or
    /// the sky ceiling) above it, top down. Every build finds its parent already resident,
    /// so the stack stays flat however deep `coordinate` is.
    ///
    /// # Returns
    /// The chunk directly above `coordinate`.
    fn build_column_above(
        &self,
        coordinate: ChunkCoordinate,
    ) -> Result<Arc<VoxelData>, PipelineError> {
        let target = coordinate.above();
        let mut top = target;
        while top.y < self.sky_ceiling && !self.voxels.is_resident(top.above()) {
            top = top.above();
        }
        trace!(
            "voxels {coordinate:?}: building {} chunks above",
            top.y - coordinate.y
        );

        // Holding the previous chunk keeps it from being evicted before its child reads it.
        let mut parent = self.voxels.get(top)?;
        let mut link = top;
        while link != target {
            link = link.below();
            parent = self.voxels.get(link)?;
        }
        Ok(parent)
    }

    fn build_lighting(&self, coordinate: ChunkCoordinate) -> Result<LightingData, PipelineError> {
        let neighborhood = Neighborhood::resolve(
            &self.voxels,
            coordinate,
            self.dimensions,
            &coordinate.lateral_neighborhood(),
        )?;
        let voxels = neighborhood.read();
        trace!("lighting {coordinate:?}");
        Ok(LightingData::build(coordinate, &voxels, self.sunlight_attenuation))
    }

    fn build_geometry(&self, coordinate: ChunkCoordinate) -> Result<GeometryData, PipelineError> {
        if self.voxels.get(coordinate)?.read().is_all_empty() {
            trace!("geometry {coordinate:?}: empty chunk");
            return Ok(GeometryData::empty(coordinate));
        }
        let lighting = self.lighting.get(coordinate)?;
        let neighborhood = Neighborhood::resolve(
            &self.voxels,
            coordinate,
            self.dimensions,
            &coordinate.face_neighborhood(),
        )?;
        let voxels = neighborhood.read();
        let ambient_occlusion = lighting.ambient_occlusion(voxels.center());
        let sunlight = lighting.sunlight();
        let geometry = GeometryData::build(coordinate, &voxels, &sunlight, &ambient_occlusion);
        trace!(
            "geometry {coordinate:?}: {} faces",
            geometry.face_count()
        );
        Ok(geometry)
    }

    /// The voxel at a world point, if its chunk is resident. Never waits on a chunk that
    /// is still being built.
    pub fn voxel_at(&self, point: Point3<i32>) -> Option<Voxel> {
        let coordinate = ChunkCoordinate::containing(point, self.dimensions);
        let chunk = self.voxels.try_get(coordinate)?;
        let local = point - coordinate.min_corner(self.dimensions);
        let voxel = chunk.read().voxel_at(Point3::new(local.x, local.y, local.z));
        voxel
    }

    /// Finds the first solid voxel along a ray through resident chunks.
    ///
    /// A chunk that is not resident, or still being built, ends the ray without a hit.
    pub fn ray_cast(
        &self,
        origin: Point3<f32>,
        direction: Vector3<f32>,
        max_distance: f32,
    ) -> Option<RayHit> {
        let mut current: Option<(ChunkCoordinate, Arc<VoxelData>)> = None;
        cast_ray(origin, direction, max_distance, |point| {
            let coordinate = ChunkCoordinate::containing(point, self.dimensions);
            let chunk = match &current {
                Some((held, chunk)) if *held == coordinate => Arc::clone(chunk),
                _ => {
                    let chunk = self.voxels.try_get(coordinate)?;
                    current = Some((coordinate, Arc::clone(&chunk)));
                    chunk
                }
            };
            let local = point - coordinate.min_corner(self.dimensions);
            let empty = chunk
                .read()
                .voxel_at(Point3::new(local.x, local.y, local.z))
                .map(|voxel| voxel.empty);
            empty
        })
    }

    /// Cache snapshots, upstream first.
    pub fn info(&self) -> [GridInfo; 3] {
        [self.voxels.info(), self.lighting.info(), self.geometry.info()]
    }
}

fn upgrade(
    pipeline: &Weak<ChunkPipeline>,
    stage: &'static str,
) -> Result<Arc<ChunkPipeline>, PipelineError> {
    pipeline.upgrade().ok_or(PipelineError::ShutDown(stage))
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Mutex,
        thread,
        time::{Duration, Instant},
    };

    use super::*;
    use crate::engine_state::{
        config::{CostLimits, EngineConfig},
        voxels::{
            generator::{EmptyTerrain, FlatTerrain},
            persistence::{BlockEdit, MemoryPersistence, NullPersistence},
            VoxelGrid,
        },
    };

    /// Solid terrain that cannot be generated while the gate is held.
    struct GatedTerrain {
        gate: Arc<Mutex<()>>,
    }

    impl TerrainGenerator for GatedTerrain {
        fn generate(&self, _: ChunkCoordinate, dimensions: ChunkDimensions) -> VoxelGrid {
            let _open = self.gate.lock().unwrap();
            VoxelGrid::filled(dimensions, false)
        }
    }

    fn config(size: usize, ceiling: i32) -> EngineConfig {
        EngineConfig {
            chunk_dimensions: ChunkDimensions::cube(size),
            sky_ceiling_chunk_y: ceiling,
            cost_limits: CostLimits {
                voxels: usize::MAX,
                lighting: usize::MAX,
                geometry: usize::MAX,
                gpu_buffers: usize::MAX,
            },
            ..EngineConfig::default()
        }
    }

    #[test]
    fn fully_empty_chunk_has_no_geometry() {
        let pipeline = ChunkPipeline::new(
            &config(2, 1),
            Arc::new(EmptyTerrain),
            Arc::new(NullPersistence),
        )
        .unwrap();
        let geometry = pipeline.geometry().get(ChunkCoordinate::new(0, 0, 0)).unwrap();
        assert!(geometry.is_empty());
        assert_eq!(geometry.vertex_bytes().len(), 0);
        assert!(!pipeline.lighting().is_resident(ChunkCoordinate::new(0, 0, 0)));
    }

    #[test]
    fn geometry_request_drives_every_upstream_stage() {
        let pipeline = ChunkPipeline::new(
            &config(4, 1),
            Arc::new(FlatTerrain { height: 2 }),
            Arc::new(NullPersistence),
        )
        .unwrap();
        let coordinate = ChunkCoordinate::new(0, 0, 0);
        let geometry = pipeline.geometry().get(coordinate).unwrap();

        // A flat floor two voxels deep: only the top surface is visible inside the region
        // of resolved neighbours.
        assert_eq!(geometry.face_count(), 16);
        assert!(pipeline.lighting().is_resident(coordinate));
        for neighbour in coordinate.lateral_neighborhood() {
            assert!(pipeline.voxels().is_resident(neighbour));
        }
        assert!(pipeline.voxels().is_resident(coordinate.above()));
    }

    #[test]
    fn sky_is_derived_from_the_chunk_above() {
        let pipeline = ChunkPipeline::new(
            &config(4, 1),
            Arc::new(FlatTerrain { height: 6 }),
            Arc::new(NullPersistence),
        )
        .unwrap();
        // The chunk above is solid up to y = 6, so nothing below it sees the sky.
        let below = pipeline.voxels().get(ChunkCoordinate::new(0, 0, 0)).unwrap();
        assert!(below.read().open_columns().not_any());
        assert_eq!(below.read().sky_shade(0, 0), 2);
        let deeper = pipeline.voxels().get(ChunkCoordinate::new(0, -1, 0)).unwrap();
        assert_eq!(deeper.read().sky_shade(3, 3), 6);
        let above = pipeline.voxels().get(ChunkCoordinate::new(0, 1, 0)).unwrap();
        assert!(above.read().voxel(0, 3, 0).outside);
        assert!(above.read().voxel(0, 1, 0).outside);
        assert!(!above.read().voxel(0, 0, 0).outside);
    }

    #[test]
    fn journaled_edits_are_replayed_into_new_chunks() {
        let persistence = Arc::new(MemoryPersistence::with_journal(vec![BlockEdit::new(
            Point3::new(1, 1, 1),
            Voxel::SOLID,
        )]));
        let pipeline =
            ChunkPipeline::new(&config(4, 1), Arc::new(EmptyTerrain), persistence).unwrap();
        assert_eq!(pipeline.edit_log().len(), 1);
        let chunk = pipeline.voxels().get(ChunkCoordinate::new(0, 0, 0)).unwrap();
        assert!(!chunk.read().voxel(1, 1, 1).empty);
        assert_eq!(pipeline.voxel_at(Point3::new(1, 1, 1)), Some(Voxel { empty: false, outside: true }));
    }

    #[test]
    fn ray_stops_at_the_terrain_surface() {
        let pipeline = ChunkPipeline::new(
            &config(4, 1),
            Arc::new(FlatTerrain { height: 2 }),
            Arc::new(NullPersistence),
        )
        .unwrap();
        pipeline.voxels().get(ChunkCoordinate::new(0, 0, 0)).unwrap();

        let hit = pipeline
            .ray_cast(Point3::new(1.5, 3.5, 1.5), -Vector3::unit_y(), 8.0)
            .unwrap();
        assert_eq!(hit.voxel, Point3::new(1, 1, 1));
        assert_eq!(hit.previous_empty, Some(Point3::new(1, 2, 1)));

        // Nothing is resident to the side, so the ray ends without a hit.
        assert!(pipeline
            .ray_cast(Point3::new(1.5, 3.5, 1.5), Vector3::unit_x(), 8.0)
            .is_none());
    }

    #[test]
    fn deep_chunks_build_on_a_small_stack() {
        let pipeline = ChunkPipeline::new(
            &config(4, 1),
            Arc::new(EmptyTerrain),
            Arc::new(NullPersistence),
        )
        .unwrap();
        let deep = ChunkCoordinate::new(0, -1500, 0);
        let open = thread::Builder::new()
            .stack_size(512 * 1024)
            .spawn({
                let pipeline = Arc::clone(&pipeline);
                move || {
                    pipeline
                        .voxels()
                        .get(deep)
                        .map_or(false, |chunk| chunk.read().open_columns().all())
                }
            })
            .unwrap()
            .join()
            .unwrap();

        assert!(open);
        assert!(pipeline.voxels().is_resident(deep.above()));
        assert!(pipeline.voxels().is_resident(ChunkCoordinate::new(0, 1, 0)));
        assert!(!pipeline.voxels().is_resident(ChunkCoordinate::new(0, 2, 0)));
    }

    #[test]
    fn targeting_never_waits_on_a_chunk_being_built() {
        let gate = Arc::new(Mutex::new(()));
        let pipeline = ChunkPipeline::new(
            &config(4, 0),
            Arc::new(GatedTerrain {
                gate: Arc::clone(&gate),
            }),
            Arc::new(NullPersistence),
        )
        .unwrap();
        let origin = ChunkCoordinate::new(0, 0, 0);
        let closed = gate.lock().unwrap();
        let builder = thread::spawn({
            let pipeline = Arc::clone(&pipeline);
            move || pipeline.voxels().get(origin).is_ok()
        });
        while !pipeline.voxels().known_coordinates().contains(&origin) {
            thread::yield_now();
        }

        let started = Instant::now();
        assert_eq!(pipeline.voxel_at(Point3::new(1, 1, 1)), None);
        assert!(pipeline
            .ray_cast(Point3::new(1.5, 3.5, 1.5), -Vector3::unit_y(), 8.0)
            .is_none());
        assert!(started.elapsed() < Duration::from_millis(50));

        drop(closed);
        assert!(builder.join().unwrap());
        assert_eq!(
            pipeline.voxel_at(Point3::new(1, 1, 1)).map(|voxel| voxel.empty),
            Some(false)
        );
    }
}
