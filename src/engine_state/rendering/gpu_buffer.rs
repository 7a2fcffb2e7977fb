//! # GPU Buffers
//!
//! The last pipeline stage turns [`GeometryData`] into buffers the GPU can draw. It is the
//! only stage with thread affinity: native buffers may only be created, drawn and destroyed
//! by the thread that owns the rendering context.
//!
//! ## Render tokens
//!
//! The rendering context is a [`RenderContext`], which is deliberately not `Send`. Creating
//! or drawing a buffer requires a [`RenderToken`], an exclusive borrow of the context, so the
//! affinity rule is enforced by the type system rather than by convention. The stage's own
//! cache factory always fails with [`PipelineError::RenderContextRequired`]; buffers are only
//! ever built through methods that take a token.
//!
//! ## Retirement
//!
//! Eviction and invalidation can happen on any thread (an edit on a worker invalidates the
//! buffers of its neighbours). Their hooks never touch the backend: they move the native
//! handle into a shared graveyard, which the render thread empties with
//! [`RenderToken::collect_garbage`].

use std::sync::{Arc, Mutex, MutexGuard, RwLockReadGuard, RwLockWriteGuard};

use log::{trace, warn};

use super::geometry::GeometryData;
use crate::{
    core::StResource,
    engine_state::{
        error::{GpuError, PipelineError},
        grid::{ChunkCoordinate, EvictionStats, GridCache, GridInfo, GridItem, WaitPolicy},
    },
};

/// A rendering API able to hold chunk meshes.
pub trait RenderBackend {
    /// Native buffer handle. Handles travel between threads only inside the graveyard and
    /// are destroyed on the render thread.
    type Handle: Send + Sync + 'static;

    /// Uploads the vertex and index data of one chunk.
    fn create_buffer(&mut self, geometry: &GeometryData) -> Result<Self::Handle, GpuError>;

    fn destroy_buffer(&mut self, handle: Self::Handle);

    /// Issues (or records) the draw call for one chunk.
    fn draw(&mut self, handle: &Self::Handle);
}

/// Handles retired off the render thread, waiting to be destroyed on it.
pub type Graveyard<H> = Arc<Mutex<Vec<H>>>;

fn bury<H>(graveyard: &Graveyard<H>) -> MutexGuard<'_, Vec<H>> {
    match graveyard.lock() {
        Ok(guard) => guard,
        Err(error) => panic!("GPU buffer graveyard poisoned: {error}"),
    }
}

/// Owner of the rendering backend. Lives on the render thread only.
pub struct RenderContext<B: RenderBackend> {
    backend: StResource<B>,
    graveyard: Graveyard<B::Handle>,
}

impl<B: RenderBackend> RenderContext<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: StResource::new(backend),
            graveyard: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn graveyard(&self) -> Graveyard<B::Handle> {
        Arc::clone(&self.graveyard)
    }

    /// Takes exclusive access to the backend, or `None` if a token is already alive.
    pub fn try_lock(&self) -> Option<RenderToken<'_, B>> {
        let backend = self.backend.try_get_mut()?;
        Some(RenderToken {
            backend,
            graveyard: &self.graveyard,
        })
    }

    /// Takes exclusive access to the backend.
    ///
    /// # Panics
    /// Panics if a token is already alive; holding two would mean re-entering the frame.
    pub fn lock(&self) -> RenderToken<'_, B> {
        match self.try_lock() {
            Some(token) => token,
            None => panic!("render context is already held by this thread"),
        }
    }

    /// Read access for inspection outside a frame.
    ///
    /// # Panics
    /// Panics if a token is alive.
    pub fn backend(&self) -> RwLockReadGuard<'_, B> {
        self.backend.get()
    }

    /// Number of handles waiting to be destroyed.
    pub fn pending_garbage(&self) -> usize {
        bury(&self.graveyard).len()
    }
}

/// Proof that the caller holds the rendering context exclusively.
pub struct RenderToken<'a, B: RenderBackend> {
    backend: RwLockWriteGuard<'a, B>,
    graveyard: &'a Graveyard<B::Handle>,
}

impl<B: RenderBackend> RenderToken<'_, B> {
    pub fn backend(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Destroys every retired handle.
    ///
    /// # Returns
    /// The number of buffers destroyed.
    pub fn collect_garbage(&mut self) -> usize {
        let retired = std::mem::take(&mut *bury(self.graveyard));
        let count = retired.len();
        for handle in retired {
            self.backend.destroy_buffer(handle);
        }
        if count > 0 {
            trace!("Destroyed {count} retired GPU buffers");
        }
        count
    }
}

/// The uploaded form of one chunk's geometry. Chunks without geometry hold no handle and
/// never reach the backend.
pub struct GpuBuffer<H: Send + Sync + 'static> {
    coordinate: ChunkCoordinate,
    handle: Mutex<Option<H>>,
    index_count: u32,
    cost: usize,
    graveyard: Graveyard<H>,
}

impl<H: Send + Sync + 'static> GpuBuffer<H> {
    fn upload<B>(
        token: &mut RenderToken<'_, B>,
        geometry: &GeometryData,
    ) -> Result<Self, PipelineError>
    where
        B: RenderBackend<Handle = H>,
    {
        let coordinate = GridItem::coordinate(geometry);
        let handle = if geometry.is_empty() {
            None
        } else {
            match token.backend().create_buffer(geometry) {
                Ok(handle) => Some(handle),
                Err(error) => {
                    warn!("GPU upload of chunk {coordinate:?} failed: {error}");
                    return Err(error.into());
                }
            }
        };
        Ok(Self {
            coordinate,
            handle: Mutex::new(handle),
            index_count: geometry.indices().len() as u32,
            cost: std::mem::size_of::<Self>()
                + geometry.vertex_bytes().len()
                + geometry.index_bytes().len(),
            graveyard: Arc::clone(token.graveyard),
        })
    }

    fn handle(&self) -> MutexGuard<'_, Option<H>> {
        match self.handle.lock() {
            Ok(guard) => guard,
            Err(error) => panic!("GPU buffer of {:?} poisoned: {error}", self.coordinate),
        }
    }

    /// Whether a native buffer exists. `false` for empty chunks and retired buffers.
    pub fn is_uploaded(&self) -> bool {
        self.handle().is_some()
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Draws the chunk.
    ///
    /// # Returns
    /// `false` when there was nothing to draw.
    pub fn draw<B>(&self, token: &mut RenderToken<'_, B>) -> bool
    where
        B: RenderBackend<Handle = H>,
    {
        match &*self.handle() {
            Some(handle) => {
                token.backend().draw(handle);
                true
            }
            None => false,
        }
    }

    fn retire(&self) {
        if let Some(handle) = self.handle().take() {
            bury(&self.graveyard).push(handle);
        }
    }
}

impl<H: Send + Sync + 'static> GridItem for GpuBuffer<H> {
    fn coordinate(&self) -> ChunkCoordinate {
        self.coordinate
    }

    fn cost(&self) -> usize {
        self.cost
    }

    fn item_will_be_evicted(&self) {
        self.retire();
    }

    fn item_will_be_invalidated(&self) {
        self.retire();
    }
}

/// The GPU-buffer cache together with the geometry cache it uploads from.
pub struct GpuBufferStage<H: Send + Sync + 'static> {
    cache: GridCache<GpuBuffer<H>>,
    geometry: Arc<GridCache<GeometryData>>,
}

impl<H: Send + Sync + 'static> GpuBufferStage<H> {
    pub fn new(cost_limit: usize, geometry: Arc<GridCache<GeometryData>>) -> Self {
        Self {
            cache: GridCache::new(
                "gpu_buffers",
                cost_limit,
                Box::new(|coordinate| Err(PipelineError::RenderContextRequired(coordinate))),
            ),
            geometry,
        }
    }

    /// Returns the chunk's buffer, building geometry (and everything upstream of it) and
    /// uploading as needed. Blocks on the whole pipeline.
    pub fn get<B>(
        &self,
        token: &mut RenderToken<'_, B>,
        coordinate: ChunkCoordinate,
    ) -> Result<Arc<GpuBuffer<H>>, PipelineError>
    where
        B: RenderBackend<Handle = H>,
    {
        self.cache
            .get_with(coordinate, WaitPolicy::Block, |coordinate| {
                let geometry = self.geometry.get(coordinate)?;
                GpuBuffer::upload(token, &geometry)
            })?
            .ok_or(PipelineError::NotReady(coordinate))
    }

    /// Returns the chunk's buffer if it is already uploaded.
    pub fn try_get(&self, coordinate: ChunkCoordinate) -> Option<Arc<GpuBuffer<H>>> {
        self.cache.try_get(coordinate)
    }

    /// Returns the chunk's buffer, uploading it now if its geometry is already cached.
    ///
    /// Never waits: `Ok(None)` means the geometry is not ready yet and the chunk should be
    /// retried on a later frame. Upload failures are returned and leave the slot empty.
    pub fn try_get_or_create<B>(
        &self,
        token: &mut RenderToken<'_, B>,
        coordinate: ChunkCoordinate,
    ) -> Result<Option<Arc<GpuBuffer<H>>>, PipelineError>
    where
        B: RenderBackend<Handle = H>,
    {
        if let Some(buffer) = self.cache.try_get(coordinate) {
            return Ok(Some(buffer));
        }
        if self.geometry.try_get(coordinate).is_none() {
            return Ok(None);
        }
        // Geometry is looked up again inside the factory so a rebuild after a stale upload
        // picks up the newest mesh.
        let built = self
            .cache
            .get_with(coordinate, WaitPolicy::FailFast, |coordinate| {
                let geometry = self
                    .geometry
                    .try_get(coordinate)
                    .ok_or(PipelineError::NotReady(coordinate))?;
                GpuBuffer::upload(token, &geometry)
            });
        match built {
            Err(PipelineError::NotReady(_)) => Ok(None),
            other => other,
        }
    }

    /// Whether the chunk's buffer is uploaded, without touching recency.
    pub fn is_resident(&self, coordinate: ChunkCoordinate) -> bool {
        self.cache.is_resident(coordinate)
    }

    pub fn invalidate(&self, coordinate: ChunkCoordinate) -> bool {
        self.cache.invalidate(coordinate)
    }

    pub fn set_pinned<I>(&self, coordinates: I)
    where
        I: IntoIterator<Item = ChunkCoordinate>,
    {
        self.cache.set_pinned(coordinates);
    }

    pub fn evict_excess(&self, cost_limit: usize) -> EvictionStats {
        self.cache.evict_excess(cost_limit)
    }

    pub fn cost_limit(&self) -> usize {
        self.cache.cost_limit()
    }

    pub fn drain(&self) -> usize {
        self.cache.drain()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn resident_coordinates(&self) -> Vec<ChunkCoordinate> {
        self.cache.resident_coordinates()
    }

    pub fn info(&self) -> GridInfo {
        self.cache.info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::rendering::{recording_backend::RecordingBackend, vertex::Vertex};
    use cgmath::{Point3, Vector3};

    fn quad(coordinate: ChunkCoordinate) -> GeometryData {
        let vertices = (0..4)
            .map(|i| {
                Vertex::new(
                    Point3::new(i as f32, 0.0, 0.0),
                    Vector3::unit_y(),
                    0,
                    1.0,
                )
            })
            .collect();
        GeometryData::from_parts(coordinate, vertices, vec![0, 1, 2, 0, 2, 3])
    }

    fn stage(
        geometry: fn(ChunkCoordinate) -> GeometryData,
    ) -> GpuBufferStage<<RecordingBackend as RenderBackend>::Handle> {
        let geometry = Arc::new(GridCache::new(
            "geometry",
            usize::MAX,
            Box::new(move |coordinate| Ok(geometry(coordinate))),
        ));
        GpuBufferStage::new(usize::MAX, geometry)
    }

    #[test]
    fn stored_factory_refuses_to_upload() {
        let stage = stage(quad);
        let coordinate = ChunkCoordinate::new(0, 0, 0);
        assert!(matches!(
            stage.cache.get(coordinate),
            Err(PipelineError::RenderContextRequired(_))
        ));
    }

    #[test]
    fn empty_geometry_is_never_uploaded() {
        let context = RenderContext::new(RecordingBackend::new());
        let stage = stage(GeometryData::empty);
        let coordinate = ChunkCoordinate::new(1, 0, 0);
        let buffer = stage.get(&mut context.lock(), coordinate).unwrap();
        assert!(!buffer.is_uploaded());
        assert!(!buffer.draw(&mut context.lock()));
        assert!(context.backend().uploads().is_empty());
    }

    #[test]
    fn try_get_or_create_waits_for_geometry() {
        let context = RenderContext::new(RecordingBackend::new());
        let stage = stage(quad);
        let coordinate = ChunkCoordinate::new(0, 0, 0);
        let mut token = context.lock();
        assert!(stage
            .try_get_or_create(&mut token, coordinate)
            .unwrap()
            .is_none());

        stage.geometry.get(coordinate).unwrap();
        let buffer = stage
            .try_get_or_create(&mut token, coordinate)
            .unwrap()
            .unwrap();
        assert!(buffer.draw(&mut token));
        drop(token);
        assert_eq!(context.backend().uploads(), &[coordinate]);
        assert_eq!(context.backend().draws(), &[coordinate]);
    }

    #[test]
    fn failed_upload_leaves_the_slot_empty() {
        let mut backend = RecordingBackend::new();
        backend.fail_next_uploads(1);
        let context = RenderContext::new(backend);
        let stage = stage(quad);
        let coordinate = ChunkCoordinate::new(0, 0, 0);

        let failed = stage.get(&mut context.lock(), coordinate);
        assert!(matches!(
            failed,
            Err(PipelineError::Gpu(GpuError::AllocationExhausted { .. }))
        ));
        assert!(!stage.is_resident(coordinate));

        assert!(stage.get(&mut context.lock(), coordinate).is_ok());
        assert_eq!(context.backend().live_buffers(), 1);
    }

    #[test]
    fn retired_buffers_are_destroyed_on_collection() {
        let context = RenderContext::new(RecordingBackend::new());
        let stage = stage(quad);
        let coordinate = ChunkCoordinate::new(0, 0, 0);
        let buffer = stage.get(&mut context.lock(), coordinate).unwrap();

        assert!(stage.invalidate(coordinate));
        assert!(!buffer.is_uploaded());
        assert_eq!(context.pending_garbage(), 1);
        assert_eq!(context.backend().live_buffers(), 1);

        assert_eq!(context.lock().collect_garbage(), 1);
        assert_eq!(context.backend().live_buffers(), 0);
    }
}
