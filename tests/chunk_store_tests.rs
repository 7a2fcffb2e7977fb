/// Integration tests for the chunk store
/// These drive the store the way a host frame loop does, against the recording backend
use std::sync::Arc;

use cgmath::Point3;
use voxel_terrain::engine_state::{
    config::CostLimits,
    rendering::{RecordingBackend, RenderContext},
    voxels::{
        generator::{EmptyTerrain, FlatTerrain, PerlinTerrain, TerrainGenerator},
        persistence::MemoryPersistence,
        Voxel,
    },
    ActiveRegionExtent, CameraModifiedFlags, ChunkCoordinate, ChunkDimensions, ChunkPipeline,
    ChunkStore, EngineConfig,
};

/// Camera position inside chunk (0, 1, 0) for 4-voxel chunks.
fn camera() -> Point3<f32> {
    Point3::new(2.0, 6.0, 2.0)
}

fn config() -> EngineConfig {
    EngineConfig {
        chunk_dimensions: ChunkDimensions::cube(4),
        active_region: ActiveRegionExtent {
            horizontal_radius: 1,
            vertical_radius: 1,
        },
        worker_count: Some(2),
        sky_ceiling_chunk_y: 3,
        ..EngineConfig::default()
    }
}

/// Flat ground two voxels deep: only the nine chunks at y = 0 have faces.
fn flat_store(config: EngineConfig) -> (ChunkStore<RecordingBackend>, Arc<MemoryPersistence>) {
    let persistence = Arc::new(MemoryPersistence::new());
    let store = ChunkStore::new(
        config,
        Arc::new(FlatTerrain { height: 2 }),
        Arc::clone(&persistence) as _,
    )
    .unwrap();
    (store, persistence)
}

fn settle(store: &mut ChunkStore<RecordingBackend>, flags: CameraModifiedFlags) {
    store.update_with_camera(camera(), flags);
    store.wait_for_background_work();
}

#[test]
fn active_chunks_are_meshed_and_only_non_empty_ones_uploaded() {
    let context = RenderContext::new(RecordingBackend::new());
    let (mut store, _) = flat_store(config());

    assert!(store.update_with_camera(camera(), CameraModifiedFlags::FORCE_REFRESH));
    assert_eq!(store.active_region().len(), 27);
    store.wait_for_background_work();

    let mut token = context.lock();
    let summary = store.draw_with_limit(&mut token, usize::MAX);
    assert_eq!(summary.generated, 9);
    assert_eq!(summary.drawn, 9);
    assert_eq!(summary.empty, 18);
    assert_eq!(summary.missing_geometry, 0);
    assert_eq!(token.backend().uploads().len(), 9);
    assert!(token.backend().uploads().iter().all(|c| c.y == 0));
}

#[test]
fn empty_chunks_never_reach_the_gpu() {
    let context = RenderContext::new(RecordingBackend::new());
    let config = EngineConfig {
        chunk_dimensions: ChunkDimensions::cube(2),
        ..config()
    };
    let mut store: ChunkStore<RecordingBackend> = ChunkStore::new(
        config,
        Arc::new(EmptyTerrain),
        Arc::new(MemoryPersistence::new()),
    )
    .unwrap();
    store.update_with_camera(Point3::new(1.0, 1.0, 1.0), CameraModifiedFlags::FORCE_REFRESH);
    store.wait_for_background_work();

    let mut token = context.lock();
    let summary = store.draw_with_limit(&mut token, usize::MAX);
    assert_eq!(summary.generated, 0);
    assert_eq!(summary.drawn, 0);
    assert_eq!(summary.empty, 27);
    assert!(token.backend().uploads().is_empty());
    for &coordinate in store.active_region().coordinates() {
        assert!(store.pipeline().geometry().try_get(coordinate).unwrap().is_empty());
    }
}

#[test]
fn uploads_per_frame_respect_the_limit() {
    let context = RenderContext::new(RecordingBackend::new());
    let (mut store, _) = flat_store(config());
    settle(&mut store, CameraModifiedFlags::FORCE_REFRESH);

    let mut token = context.lock();
    let first = store.draw_with_limit(&mut token, 2);
    assert_eq!(first.generated, 2);
    assert_eq!(first.drawn, 2);
    assert!(first.deferred > 0);

    let mut uploaded = first.generated;
    for _ in 0..10 {
        let frame = store.draw_with_limit(&mut token, 2);
        assert!(frame.generated <= 2);
        uploaded += frame.generated;
    }
    assert_eq!(uploaded, 9);
    let last = store.draw_with_limit(&mut token, 2);
    assert_eq!(last.drawn, 9);
    assert_eq!(last.deferred, 0);
}

#[test]
fn returning_to_a_chunk_restores_the_same_active_set() {
    let (mut store, _) = flat_store(config());
    store.update_with_camera(camera(), CameraModifiedFlags::FORCE_REFRESH);
    let original = store.active_region().coordinates().to_vec();

    let away = Point3::new(30.0, 6.0, -9.0);
    assert!(store.update_with_camera(away, CameraModifiedFlags::NONE));
    assert_ne!(store.active_region().coordinates(), original.as_slice());

    assert!(store.update_with_camera(camera(), CameraModifiedFlags::NONE));
    assert_eq!(store.active_region().coordinates(), original.as_slice());
    assert!(!store.update_with_camera(camera(), CameraModifiedFlags::NONE));
    store.wait_for_background_work();
}

#[test]
fn eviction_never_touches_the_active_set() {
    let context = RenderContext::new(RecordingBackend::new());
    let config = EngineConfig {
        cost_limits: CostLimits {
            voxels: 1,
            lighting: 1,
            geometry: 1,
            gpu_buffers: 1,
        },
        ..config()
    };
    let (mut store, persistence) = flat_store(config);
    settle(&mut store, CameraModifiedFlags::FORCE_REFRESH);
    {
        let mut token = context.lock();
        store.draw_with_limit(&mut token, usize::MAX);
    }

    store.memory_pressure();
    assert!(persistence.save_count() > 0);

    let active = store.active_region().coordinates().to_vec();
    for &coordinate in &active {
        assert!(store.pipeline().voxels().is_resident(coordinate));
        assert!(store.pipeline().geometry().is_resident(coordinate));
        assert!(store.gpu_buffers().is_resident(coordinate));
    }
    assert_eq!(store.pipeline().voxels().len(), active.len());
    assert!(store
        .pipeline()
        .lighting()
        .resident_coordinates()
        .iter()
        .all(|coordinate| active.contains(coordinate)));

    let mut token = context.lock();
    let summary = store.draw_with_limit(&mut token, usize::MAX);
    assert_eq!(summary.drawn, 9);
    assert_eq!(summary.generated, 0);
}

#[test]
fn edits_replace_the_affected_gpu_buffers() {
    let context = RenderContext::new(RecordingBackend::new());
    let (mut store, persistence) = flat_store(config());
    settle(&mut store, CameraModifiedFlags::FORCE_REFRESH);
    {
        let mut token = context.lock();
        store.draw_with_limit(&mut token, usize::MAX);
    }

    let invalidation = store
        .set_block(Point3::new(1, 1, 1), Voxel::EMPTY, true)
        .unwrap();
    assert!(invalidation.geometry.contains(&ChunkCoordinate::new(0, 0, 0)));
    assert!(!store.gpu_buffers().is_resident(ChunkCoordinate::new(0, 0, 0)));
    assert_eq!(context.pending_garbage(), 9);
    assert_eq!(persistence.journal().len(), 1);

    settle(&mut store, CameraModifiedFlags::NONE);
    let mut token = context.lock();
    let summary = store.draw_with_limit(&mut token, usize::MAX);
    assert_eq!(summary.destroyed, 9);
    assert_eq!(summary.generated, 9);
    assert_eq!(summary.drawn, 9);
    assert_eq!(token.backend().destroyed().len(), 9);
    assert_eq!(token.backend().live_buffers(), 9);
}

#[test]
fn failed_uploads_are_retried_on_the_next_frame() {
    let context = RenderContext::new(RecordingBackend::new());
    let (mut store, _) = flat_store(config());
    settle(&mut store, CameraModifiedFlags::FORCE_REFRESH);

    let mut token = context.lock();
    token.backend().fail_next_uploads(1);
    let failing = store.draw_with_limit(&mut token, usize::MAX);
    assert_eq!(failing.failed, 1);
    assert_eq!(failing.generated, 8);
    assert_eq!(failing.drawn, 8);

    let retry = store.draw_with_limit(&mut token, usize::MAX);
    assert_eq!(retry.failed, 0);
    assert_eq!(retry.generated, 1);
    assert_eq!(retry.drawn, 9);
}

#[test]
fn shutdown_saves_voxels_and_releases_every_buffer() {
    let context = RenderContext::new(RecordingBackend::new());
    let (mut store, persistence) = flat_store(config());
    settle(&mut store, CameraModifiedFlags::FORCE_REFRESH);
    let mut token = context.lock();
    store.draw_with_limit(&mut token, usize::MAX);
    let resident_voxels = store.pipeline().voxels().len();

    store.shutdown(&mut token);

    assert_eq!(persistence.save_count(), resident_voxels);
    assert_eq!(token.backend().live_buffers(), 0);
    assert_eq!(context.pending_garbage(), 0);
    assert!(store
        .pipeline()
        .geometry()
        .get(ChunkCoordinate::new(0, 0, 0))
        .is_err());
}

#[test]
fn incremental_edits_match_a_rebuild_from_the_journal() {
    let config = EngineConfig {
        chunk_dimensions: ChunkDimensions::cube(8),
        sky_ceiling_chunk_y: 2,
        ..EngineConfig::default()
    };
    let terrain = || -> Arc<dyn TerrainGenerator> { Arc::new(PerlinTerrain::new(11, 4.0, 6.0, 0.05)) };
    let region: Vec<ChunkCoordinate> = (-1..=1)
        .flat_map(|x| (-1..=1).flat_map(move |y| (-1..=1).map(move |z| ChunkCoordinate::new(x, y, z))))
        .collect();

    let persistence = Arc::new(MemoryPersistence::new());
    let edited = ChunkPipeline::new(&config, terrain(), Arc::clone(&persistence) as _).unwrap();
    for &coordinate in &region {
        edited.geometry().get(coordinate).unwrap();
    }
    let mut rng = fastrand::Rng::with_seed(7);
    for _ in 0..60 {
        let point = Point3::new(rng.i32(-8..16), rng.i32(-8..16), rng.i32(-8..16));
        let voxel = if rng.bool() { Voxel::EMPTY } else { Voxel::SOLID };
        edited.set_block(point, voxel, true).unwrap();
    }

    let rebuilt = ChunkPipeline::new(
        &config,
        terrain(),
        Arc::new(MemoryPersistence::with_journal(persistence.journal())),
    )
    .unwrap();
    for &coordinate in &region {
        let incremental = edited.geometry().get(coordinate).unwrap();
        let from_scratch = rebuilt.geometry().get(coordinate).unwrap();
        assert_eq!(
            incremental.vertex_bytes(),
            from_scratch.vertex_bytes(),
            "vertices differ in chunk {coordinate:?}"
        );
        assert_eq!(incremental.indices(), from_scratch.indices());
    }
}
