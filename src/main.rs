//! # Voxel Terrain Demo Entry Point
//!
//! Runs the headless terrain demo. An optional JSON configuration path may be passed as
//! the first argument.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release -- terrain.json
//! ```

use std::{path::PathBuf, process};

fn main() {
    voxel_terrain::init_logging();
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    if let Err(error) = voxel_terrain::run(config_path.as_deref()) {
        log::error!("{error}");
        process::exit(1);
    }
}
