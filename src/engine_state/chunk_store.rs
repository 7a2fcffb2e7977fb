//! # Chunk Store
//!
//! The host-facing side of the terrain: owns the pipeline caches, the GPU-buffer stage,
//! the active region and the background workers, and exposes the per-frame calls a host
//! loop makes.
//!
//! ## Frame loop
//! ```rust,ignore
//! store.update_with_camera(camera.position, flags);
//! let mut token = context.lock();
//! store.draw_with_limit(&mut token, config.vbo_generation_limit);
//! ```
//!
//! `update_with_camera` never blocks on pipeline work: meshing runs on the workers, and
//! finished meshes are picked up on a later frame. `draw_with_limit` uploads at most
//! `limit` meshes and draws everything else that is ready, nearest chunk first.

use std::{fmt, sync::Arc};

use cgmath::{Point3, Vector3};
use log::{debug, info, warn};
use web_time::Instant;

use super::{
    active_region::ActiveRegion,
    camera_state::CameraModifiedFlags,
    config::EngineConfig,
    edit::InvalidationSet,
    error::PipelineError,
    grid::{ChunkCoordinate, EvictionStats, GridInfo},
    pipeline::ChunkPipeline,
    rendering::{GpuBufferStage, RenderBackend, RenderToken},
    task_management::{task::TaskContext, tasks::GeometryTask, TaskManager},
    voxels::{
        generator::TerrainGenerator, persistence::ChunkPersistence, ray_cast::RayHit, Voxel,
    },
};

/// What one [`ChunkStore::draw_with_limit`] call did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrawSummary {
    /// Chunks whose buffers were drawn
    pub drawn: usize,
    /// Active chunks with no faces, so nothing to draw
    pub empty: usize,
    /// Buffers uploaded this frame
    pub generated: usize,
    /// Chunks with geometry but no buffer, left for a later frame by the upload limit
    pub deferred: usize,
    /// Chunks whose geometry is not built yet
    pub missing_geometry: usize,
    /// Uploads that failed this frame
    pub failed: usize,
    /// Retired buffers destroyed at the start of the frame
    pub destroyed: usize,
}

/// Snapshot of every cache and the background work, as printed by
/// [`ChunkStore::print_info`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreInfo {
    pub voxels: GridInfo,
    pub lighting: GridInfo,
    pub geometry: GridInfo,
    pub gpu_buffers: GridInfo,
    pub active_chunks: usize,
    pub tasks_in_flight: usize,
    pub queued_tasks: usize,
    pub logged_edits: usize,
}

impl fmt::Display for StoreInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.voxels)?;
        writeln!(f, "{}", self.lighting)?;
        writeln!(f, "{}", self.geometry)?;
        writeln!(f, "{}", self.gpu_buffers)?;
        write!(
            f,
            "{} active chunks, {} tasks running, {} queued, {} edits logged",
            self.active_chunks, self.tasks_in_flight, self.queued_tasks, self.logged_edits
        )
    }
}

pub struct ChunkStore<B: RenderBackend> {
    config: EngineConfig,
    pipeline: Arc<ChunkPipeline>,
    gpu_buffers: GpuBufferStage<B::Handle>,
    active_region: ActiveRegion,
    task_manager: TaskManager,
    task_context: TaskContext,
}

impl<B: RenderBackend> ChunkStore<B> {
    /// Creates a store over the given terrain and persistence.
    ///
    /// # Errors
    /// Fails if the persisted edit journal cannot be read.
    pub fn new(
        config: EngineConfig,
        generator: Arc<dyn TerrainGenerator>,
        persistence: Arc<dyn ChunkPersistence>,
    ) -> Result<Self, PipelineError> {
        let pipeline = ChunkPipeline::new(&config, generator, persistence)?;
        let gpu_buffers =
            GpuBufferStage::new(config.cost_limits.gpu_buffers, Arc::clone(pipeline.geometry()));
        let active_region = ActiveRegion::new(config.active_region, config.chunk_dimensions);
        let task_manager = TaskManager::new(config.worker_count());
        info!(
            "Chunk store ready: {}x{}x{} voxel chunks, active box {}x{} chunks",
            config.chunk_dimensions.x,
            config.chunk_dimensions.y,
            config.chunk_dimensions.z,
            2 * config.active_region.horizontal_radius + 1,
            2 * config.active_region.vertical_radius + 1,
        );
        Ok(Self {
            config,
            pipeline,
            gpu_buffers,
            active_region,
            task_manager,
            task_context: TaskContext::default(),
        })
    }

    /// Creates a store with the terrain generator and persistence the configuration selects.
    pub fn open(config: EngineConfig) -> Result<Self, PipelineError> {
        let generator = config.generator();
        let persistence = config.persistence()?;
        Self::new(config, generator, persistence)
    }

    /// Per-frame update: collects finished background work, recomputes the active set if
    /// the camera changed chunk, and schedules meshing for active chunks that lack it.
    ///
    /// # Arguments
    /// * `position` - World-space camera position
    /// * `flags` - What changed about the camera since the previous frame
    ///
    /// # Returns
    /// `true` if the active set was recomputed
    pub fn update_with_camera(
        &mut self,
        position: Point3<f32>,
        flags: CameraModifiedFlags,
    ) -> bool {
        let started = Instant::now();
        self.task_manager
            .process_completed_tasks(&mut self.task_context);
        let (completed, failed) = self.task_context.drain_outcomes();

        let recomputed = self.active_region.update(position, flags);
        if recomputed {
            for task in self.task_manager.clear_queued() {
                if let Some(coordinate) = task.coordinate() {
                    self.task_context.in_flight.remove(&coordinate);
                }
            }
            self.pin_active_set();
            let evicted = self.evict_to_budget();
            debug!(
                "Active set moved to {:?}: {} chunks, {} artifacts evicted",
                self.active_region.camera_chunk(),
                self.active_region.len(),
                evicted.items_evicted
            );
        }

        let published = self.publish_geometry_tasks();
        self.task_manager.process_queued_tasks();
        if published > 0 || !completed.is_empty() || !failed.is_empty() {
            debug!(
                "Update: {} meshed, {} failed, {published} meshing tasks published in {:?}",
                completed.len(),
                failed.len(),
                started.elapsed()
            );
        }
        recomputed
    }

    fn pin_active_set(&self) {
        let active = self.active_region.coordinates();
        self.pipeline.voxels().set_pinned(active.iter().copied());
        self.pipeline.lighting().set_pinned(active.iter().copied());
        self.pipeline.geometry().set_pinned(active.iter().copied());
        self.gpu_buffers.set_pinned(active.iter().copied());
    }

    fn evict_to_budget(&self) -> EvictionStats {
        let mut eviction = self.gpu_buffers.evict_excess(self.gpu_buffers.cost_limit());
        for stats in [
            self.pipeline
                .geometry()
                .evict_excess(self.pipeline.geometry().cost_limit()),
            self.pipeline
                .lighting()
                .evict_excess(self.pipeline.lighting().cost_limit()),
            self.pipeline
                .voxels()
                .evict_excess(self.pipeline.voxels().cost_limit()),
        ] {
            eviction.merge(&stats);
        }
        eviction
    }

    /// Publishes meshing tasks for the nearest active chunks without geometry.
    fn publish_geometry_tasks(&mut self) -> usize {
        let mut published = 0;
        for &coordinate in self.active_region.coordinates() {
            if published >= self.config.max_geometry_tasks_per_frame {
                break;
            }
            if self.task_context.in_flight.contains(&coordinate)
                || self.pipeline.geometry().is_resident(coordinate)
            {
                continue;
            }
            self.task_context.in_flight.insert(coordinate);
            self.task_manager.publish_task(Box::new(GeometryTask::new(
                Arc::clone(&self.pipeline),
                coordinate,
            )));
            published += 1;
        }
        published
    }

    /// Draws the active set nearest-first, uploading at most `limit` new buffers.
    ///
    /// Chunks whose geometry is not ready yet are skipped rather than waited for. A failed
    /// upload leaves the chunk undrawn and is retried on a later frame.
    pub fn draw_with_limit(&mut self, token: &mut RenderToken<'_, B>, limit: usize) -> DrawSummary {
        let started = Instant::now();
        let mut summary = DrawSummary {
            destroyed: token.collect_garbage(),
            ..DrawSummary::default()
        };

        for &coordinate in self.active_region.coordinates() {
            let buffer = match self.gpu_buffers.try_get(coordinate) {
                Some(buffer) => buffer,
                None if summary.generated >= limit => {
                    if self.pipeline.geometry().is_resident(coordinate) {
                        summary.deferred += 1;
                    } else {
                        summary.missing_geometry += 1;
                    }
                    continue;
                }
                None => match self.gpu_buffers.try_get_or_create(token, coordinate) {
                    Ok(Some(buffer)) => {
                        if buffer.is_uploaded() {
                            summary.generated += 1;
                        }
                        buffer
                    }
                    Ok(None) => {
                        summary.missing_geometry += 1;
                        continue;
                    }
                    Err(error) => {
                        warn!("Chunk {coordinate:?} not drawn: {error}");
                        summary.failed += 1;
                        continue;
                    }
                },
            };
            if buffer.draw(token) {
                summary.drawn += 1;
            } else {
                summary.empty += 1;
            }
        }

        if summary.generated > 0 || summary.failed > 0 {
            debug!(
                "Drew {} chunks, uploaded {} ({} deferred, {} failed) in {:?}",
                summary.drawn,
                summary.generated,
                summary.deferred,
                summary.failed,
                started.elapsed()
            );
        }
        summary
    }

    /// [`draw_with_limit`](Self::draw_with_limit) with the configured upload limit.
    pub fn draw(&mut self, token: &mut RenderToken<'_, B>) -> DrawSummary {
        let limit = self.config.vbo_generation_limit;
        self.draw_with_limit(token, limit)
    }

    /// Edits one voxel and drops every artifact derived from it, GPU buffers included.
    ///
    /// The dropped buffers are destroyed on the next draw.
    pub fn set_block(
        &self,
        point: Point3<i32>,
        voxel: Voxel,
        add_to_journal: bool,
    ) -> Result<InvalidationSet, PipelineError> {
        let invalidation = self.pipeline.set_block(point, voxel, add_to_journal)?;
        for &coordinate in &invalidation.geometry {
            self.gpu_buffers.invalidate(coordinate);
        }
        Ok(invalidation)
    }

    /// First solid voxel along a ray through resident chunks. Never waits on a build.
    pub fn ray_cast(
        &self,
        origin: Point3<f32>,
        direction: Vector3<f32>,
        max_distance: f32,
    ) -> Option<RayHit> {
        self.pipeline.ray_cast(origin, direction, max_distance)
    }

    /// Evicts everything that is not pinned by the active set, in every cache.
    pub fn memory_pressure(&self) -> EvictionStats {
        let mut eviction = self.gpu_buffers.evict_excess(0);
        for stats in [
            self.pipeline.geometry().evict_excess(0),
            self.pipeline.lighting().evict_excess(0),
            self.pipeline.voxels().evict_excess(0),
        ] {
            eviction.merge(&stats);
        }
        warn!(
            "Memory pressure: evicted {} artifacts, {} KiB freed",
            eviction.items_evicted,
            eviction.cost_freed / 1024
        );
        eviction
    }

    /// Logs and returns the state of every cache.
    pub fn print_info(&self) -> StoreInfo {
        let [voxels, lighting, geometry] = self.pipeline.info();
        let info = StoreInfo {
            voxels,
            lighting,
            geometry,
            gpu_buffers: self.gpu_buffers.info(),
            active_chunks: self.active_region.len(),
            tasks_in_flight: self.task_manager.tasks_in_flight(),
            queued_tasks: self.task_manager.queued_len(),
            logged_edits: self.pipeline.edit_log().len(),
        };
        for line in info.to_string().lines() {
            info!("{line}");
        }
        info
    }

    /// Blocks until every scheduled meshing task has finished.
    pub fn wait_for_background_work(&mut self) {
        self.task_manager.wait_until_idle(&mut self.task_context);
    }

    /// Stops background work, saves every resident voxel chunk and destroys every GPU
    /// buffer. The store refuses to build anything afterwards.
    pub fn shutdown(&mut self, token: &mut RenderToken<'_, B>) {
        self.task_manager.clear_queued();
        self.task_context.in_flight.clear();
        self.wait_for_background_work();

        let buffers = self.gpu_buffers.drain();
        let meshes = self.pipeline.geometry().drain();
        let lighting = self.pipeline.lighting().drain();
        let voxels = self.pipeline.voxels().drain();
        let destroyed = token.collect_garbage();
        info!(
            "Chunk store shut down: {voxels} voxel chunks saved, {lighting} lighting and {meshes} meshes dropped, {buffers} buffers released ({destroyed} destroyed)"
        );
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Arc<ChunkPipeline> {
        &self.pipeline
    }

    pub fn gpu_buffers(&self) -> &GpuBufferStage<B::Handle> {
        &self.gpu_buffers
    }

    pub fn active_region(&self) -> &ActiveRegion {
        &self.active_region
    }

    /// Whether the chunk has a task queued or running.
    pub fn is_meshing(&self, coordinate: ChunkCoordinate) -> bool {
        self.task_context.in_flight.contains(&coordinate)
    }
}
