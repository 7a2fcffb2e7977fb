#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Terrain
//!
//! Streaming voxel terrain: chunked voxel storage, sunlight and ambient occlusion,
//! per-chunk meshing and GPU buffer management around a moving camera.
//!
//! ## Key Modules
//!
//! * `core` - Shared lock wrappers used throughout the crate
//! * `engine_state` - The pipeline caches, edits, active region and chunk store
//!
//! ## Architecture
//!
//! Every artifact a chunk needs lives in its own cache keyed by chunk coordinate:
//! voxels feed lighting, lighting and voxels feed geometry, and geometry feeds the GPU
//! buffer that gets drawn. A host drives the [`ChunkStore`] once per frame:
//!
//! ```rust,ignore
//! let context = RenderContext::new(backend);
//! let mut store = ChunkStore::open(EngineConfig::default())?;
//! loop {
//!     let flags = camera.move_to(next_position);
//!     store.update_with_camera(camera.position, flags);
//!     store.draw(&mut context.lock());
//! }
//! ```
//!
//! ## Performance Considerations
//!
//! * Meshing runs on background workers, the render thread only uploads
//! * Uploads per frame are capped so a camera jump never stalls a frame
//! * Every cache is bounded by its own byte budget

use std::path::Path;

use cgmath::{Deg, Point3, Vector3};
use log::{info, warn};
use web_time::Instant;

pub mod core;
pub mod engine_state;

pub use engine_state::{
    rendering::{RecordingBackend, RenderBackend, RenderContext, RenderToken, WgpuBackend},
    voxels::Voxel,
    CameraModifiedFlags, CameraState, ChunkCoordinate, ChunkDimensions, ChunkStore, DrawSummary,
    EngineConfig, PipelineError, RunError, StoreInfo,
};

/// Number of frames the headless demo renders.
const DEMO_FRAMES: usize = 240;
/// Frames between two scripted edits.
const EDIT_INTERVAL: usize = 20;
/// Camera travel per frame along X and Z, in voxels.
const CAMERA_STEP: (f32, f32) = (0.75, 0.3);

/// Initializes `env_logger` on stdout, filtered by `RUST_LOG`.
pub fn init_logging() {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();
    info!("Logger initialized");
}

/// Runs the headless demo: flies a camera across the terrain, edits a few voxels under
/// its gaze and prints the cache statistics before shutting the store down.
///
/// Uses a real GPU through wgpu when one is available and falls back to the recording
/// backend otherwise.
///
/// # Arguments
/// * `config_path` - Optional JSON configuration, defaults are used when absent
pub fn run(config_path: Option<&Path>) -> Result<(), RunError> {
    let config = match config_path {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    match pollster::block_on(WgpuBackend::request_headless()) {
        Ok(backend) => run_frames(config, RenderContext::new(backend), |backend| {
            backend.discard_draws();
        }),
        Err(error) => {
            warn!("{error}, falling back to the recording backend");
            run_frames(config, RenderContext::new(RecordingBackend::new()), |backend| {
                backend.take_draws();
            })
        }
    }
}

/// Drives one store through the scripted flight.
///
/// `present` is called after every frame's draws with the backend still locked.
fn run_frames<B, F>(config: EngineConfig, context: RenderContext<B>, mut present: F) -> Result<(), RunError>
where
    B: RenderBackend,
    F: FnMut(&mut B),
{
    let mut store = ChunkStore::<B>::open(config)?;
    let mut rng = fastrand::Rng::with_seed(u64::from(store.config().seed));
    let terrain = &store.config().terrain;
    let altitude = terrain.height as f32 + terrain.amplitude as f32 + 6.0;
    let mut camera = CameraState::new(Point3::new(0.0, altitude, 0.0), Deg(20.0), Deg(-35.0));
    let mut flags = CameraModifiedFlags::FORCE_REFRESH;

    let started = Instant::now();
    let mut chunk_draws = 0;
    let mut uploads = 0;
    let mut edits = 0;
    for frame in 0..DEMO_FRAMES {
        let frame_started = Instant::now();
        store.update_with_camera(camera.position, flags);
        let summary = {
            let mut token = context.lock();
            let summary = store.draw(&mut token);
            present(token.backend());
            summary
        };
        chunk_draws += summary.drawn;
        uploads += summary.generated;

        if frame % EDIT_INTERVAL == EDIT_INTERVAL - 1 {
            if let Some(hit) = store.ray_cast(camera.position, camera.look_direction(), 96.0) {
                let edit = if rng.bool() {
                    Some((hit.voxel, Voxel::EMPTY))
                } else {
                    hit.previous_empty.map(|point| (point, Voxel::SOLID))
                };
                if let Some((point, voxel)) = edit {
                    match store.set_block(point, voxel, true) {
                        Ok(invalidation) => {
                            edits += 1;
                            info!(
                                "Frame {frame}: edited {point:?}, {} meshes invalidated",
                                invalidation.geometry.len()
                            );
                        }
                        Err(error) => warn!("Frame {frame}: edit at {point:?} rejected: {error}"),
                    }
                }
            }
        }

        flags = camera.move_to(camera.position + Vector3::new(CAMERA_STEP.0, 0.0, CAMERA_STEP.1));
        log::trace!("Frame {frame} took {:?}: {summary:?}", frame_started.elapsed());
    }

    store.wait_for_background_work();
    store.print_info();
    let mut token = context.lock();
    store.shutdown(&mut token);
    info!(
        "Rendered {DEMO_FRAMES} frames in {:?}: {chunk_draws} chunk draws, {uploads} uploads, {edits} edits",
        started.elapsed()
    );
    Ok(())
}
