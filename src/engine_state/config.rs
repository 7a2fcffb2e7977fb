//! # Engine Configuration
//!
//! Every tunable of the chunk store, loadable from a JSON file. Every field has a default,
//! so a configuration file only needs the values it changes:
//!
//! ```json
//! { "seed": 7, "active_region": { "horizontal_radius": 6 }, "terrain": { "kind": "flat" } }
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::info;
use serde::{Deserialize, Serialize};

use super::{
    active_region::ActiveRegionExtent,
    error::{ConfigError, PersistenceError},
    grid::ChunkDimensions,
    voxels::{
        generator::{EmptyTerrain, FlatTerrain, PerlinTerrain, TerrainGenerator},
        persistence::{ChunkPersistence, FolderPersistence, NullPersistence},
    },
};

/// Cost budget of each pipeline cache, in bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostLimits {
    pub voxels: usize,
    pub lighting: usize,
    pub geometry: usize,
    pub gpu_buffers: usize,
}

impl Default for CostLimits {
    fn default() -> Self {
        Self {
            voxels: 64 << 20,
            lighting: 256 << 20,
            geometry: 256 << 20,
            gpu_buffers: 256 << 20,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerrainKind {
    Perlin,
    Flat,
    Empty,
}

/// Selection of a built-in terrain generator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub kind: TerrainKind,
    /// World-space surface height (flat) or mean surface height (perlin)
    pub height: i32,
    /// Maximum deviation from `height` (perlin only)
    pub amplitude: f64,
    /// Horizontal noise frequency (perlin only)
    pub scale: f64,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            kind: TerrainKind::Perlin,
            height: 8,
            amplitude: 12.0,
            scale: 0.02,
        }
    }
}

impl TerrainConfig {
    pub fn build(&self, seed: u32) -> Arc<dyn TerrainGenerator> {
        match self.kind {
            TerrainKind::Perlin => Arc::new(PerlinTerrain::new(
                seed,
                self.height as f64,
                self.amplitude,
                self.scale,
            )),
            TerrainKind::Flat => Arc::new(FlatTerrain {
                height: self.height,
            }),
            TerrainKind::Empty => Arc::new(EmptyTerrain),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Terrain seed
    pub seed: u32,
    pub chunk_dimensions: ChunkDimensions,
    pub active_region: ActiveRegionExtent,
    /// GPU uploads allowed per frame when the host does not pass its own limit
    pub vbo_generation_limit: usize,
    /// New background meshing tasks published per update
    pub max_geometry_tasks_per_frame: usize,
    /// Background workers; defaults to the available parallelism
    pub worker_count: Option<usize>,
    /// Sunlight lost per voxel step
    pub sunlight_attenuation: u8,
    /// Chunk layer at and above which the sky is always open
    pub sky_ceiling_chunk_y: i32,
    pub cost_limits: CostLimits,
    pub terrain: TerrainConfig,
    /// Folder for saved chunks and the edit journal; nothing is persisted when unset
    pub cache_folder: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            chunk_dimensions: ChunkDimensions::default(),
            active_region: ActiveRegionExtent::default(),
            vbo_generation_limit: 4,
            max_geometry_tasks_per_frame: 64,
            worker_count: None,
            sunlight_attenuation: 1,
            sky_ceiling_chunk_y: 4,
            cost_limits: CostLimits::default(),
            terrain: TerrainConfig::default(),
            cache_folder: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dimensions = self.chunk_dimensions;
        if dimensions.x == 0 || dimensions.y == 0 || dimensions.z == 0 {
            return Err(ConfigError::Invalid(format!(
                "chunk dimensions must be non-zero, got {}x{}x{}",
                dimensions.x, dimensions.y, dimensions.z
            )));
        }
        if self.sunlight_attenuation == 0 {
            return Err(ConfigError::Invalid(
                "sunlight_attenuation must be at least 1".to_string(),
            ));
        }
        if self.worker_count == Some(0) {
            return Err(ConfigError::Invalid(
                "worker_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|count| count.get())
                .unwrap_or(1)
        })
    }

    pub fn generator(&self) -> Arc<dyn TerrainGenerator> {
        self.terrain.build(self.seed)
    }

    /// Opens the persistence collaborator selected by `cache_folder`.
    pub fn persistence(&self) -> Result<Arc<dyn ChunkPersistence>, PersistenceError> {
        Ok(match &self.cache_folder {
            Some(folder) => Arc::new(FolderPersistence::open(folder)?),
            None => Arc::new(NullPersistence),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{ "seed": 9, "terrain": { "kind": "flat" } }"#)
                .unwrap();
        assert_eq!(config.seed, 9);
        assert_eq!(config.terrain.kind, TerrainKind::Flat);
        assert_eq!(config.terrain.height, TerrainConfig::default().height);
        assert_eq!(config.chunk_dimensions, ChunkDimensions::cube(16));
        assert_eq!(config.sunlight_attenuation, 1);
    }

    #[test]
    fn zero_attenuation_is_rejected() {
        let result = EngineConfig::from_json_str(r#"{ "sunlight_attenuation": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            EngineConfig::from_json_str("{ seed: "),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn round_trips_through_json() {
        let config = EngineConfig {
            worker_count: Some(3),
            cache_folder: Some(PathBuf::from("saves")),
            ..EngineConfig::default()
        };
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(EngineConfig::from_json_str(&text).unwrap(), config);
    }
}
