//! # Chunk Persistence
//!
//! Where evicted voxel chunks go, and where edits are journaled so they survive a restart.
//!
//! Three stores are provided:
//! - [`NullPersistence`]: keeps nothing; chunks are regenerated from the terrain generator
//! - [`MemoryPersistence`]: keeps encoded chunks and the journal in memory
//! - [`FolderPersistence`]: one binary file per chunk plus a JSON-lines journal
//!
//! A chunk file that cannot be decoded is treated as absent, so the chunk is regenerated
//! and the journal re-applied on top of it.

use std::{
    collections::HashMap,
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use cgmath::Point3;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{voxel::Voxel, voxel_grid::VoxelGrid};
use crate::{
    core::MtResource,
    engine_state::{
        error::PersistenceError,
        grid::{ChunkCoordinate, ChunkDimensions},
    },
};

/// One journaled block edit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEdit {
    pub point: [i32; 3],
    pub voxel: Voxel,
}

impl BlockEdit {
    pub fn new(point: Point3<i32>, voxel: Voxel) -> Self {
        Self {
            point: [point.x, point.y, point.z],
            voxel,
        }
    }

    pub fn point(&self) -> Point3<i32> {
        Point3::new(self.point[0], self.point[1], self.point[2])
    }
}

/// Storage backing the Voxel stage.
pub trait ChunkPersistence: Send + Sync {
    /// Returns the saved voxels for a chunk, or `None` if nothing usable is stored.
    fn load_voxels(
        &self,
        coordinate: ChunkCoordinate,
        dimensions: ChunkDimensions,
    ) -> Option<VoxelGrid>;

    fn save_voxels(
        &self,
        coordinate: ChunkCoordinate,
        voxels: &VoxelGrid,
    ) -> Result<(), PersistenceError>;

    /// Forgets any saved copy of a chunk.
    fn discard_voxels(&self, coordinate: ChunkCoordinate) -> Result<(), PersistenceError>;

    fn append_edit(&self, edit: &BlockEdit) -> Result<(), PersistenceError>;

    /// Returns every journaled edit, oldest first.
    fn replay_journal(&self) -> Result<Vec<BlockEdit>, PersistenceError>;
}

/// Persistence that stores nothing.
#[derive(Debug, Default)]
pub struct NullPersistence;

impl ChunkPersistence for NullPersistence {
    fn load_voxels(&self, _: ChunkCoordinate, _: ChunkDimensions) -> Option<VoxelGrid> {
        None
    }

    fn save_voxels(&self, _: ChunkCoordinate, _: &VoxelGrid) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn discard_voxels(&self, _: ChunkCoordinate) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn append_edit(&self, _: &BlockEdit) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn replay_journal(&self) -> Result<Vec<BlockEdit>, PersistenceError> {
        Ok(Vec::new())
    }
}

/// Persistence held entirely in memory. Chunks are stored encoded, exactly as they would
/// be written to disk.
pub struct MemoryPersistence {
    chunks: MtResource<HashMap<ChunkCoordinate, Vec<u8>>>,
    journal: Mutex<Vec<BlockEdit>>,
    saves: AtomicUsize,
    discards: AtomicUsize,
}

impl Default for MemoryPersistence {
    fn default() -> Self {
        Self {
            chunks: MtResource::new(HashMap::new()),
            journal: Mutex::new(Vec::new()),
            saves: AtomicUsize::new(0),
            discards: AtomicUsize::new(0),
        }
    }
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose journal already holds `edits`.
    pub fn with_journal(edits: Vec<BlockEdit>) -> Self {
        let persistence = Self::default();
        *lock(&persistence.journal) = edits;
        persistence
    }

    pub fn stored_chunks(&self) -> usize {
        self.chunks.get().len()
    }

    pub fn is_stored(&self, coordinate: ChunkCoordinate) -> bool {
        self.chunks.get().contains_key(&coordinate)
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn discard_count(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }

    pub fn journal(&self) -> Vec<BlockEdit> {
        lock(&self.journal).clone()
    }

    /// Overwrites a stored chunk with arbitrary bytes.
    pub fn store_raw(&self, coordinate: ChunkCoordinate, bytes: Vec<u8>) {
        self.chunks.get_mut().insert(coordinate, bytes);
    }
}

impl ChunkPersistence for MemoryPersistence {
    fn load_voxels(
        &self,
        coordinate: ChunkCoordinate,
        dimensions: ChunkDimensions,
    ) -> Option<VoxelGrid> {
        let chunks = self.chunks.get();
        let bytes = chunks.get(&coordinate)?;
        let grid = VoxelGrid::decode(bytes, dimensions);
        if grid.is_none() {
            warn!("Ignoring corrupt stored chunk {coordinate:?}");
        }
        grid
    }

    fn save_voxels(
        &self,
        coordinate: ChunkCoordinate,
        voxels: &VoxelGrid,
    ) -> Result<(), PersistenceError> {
        self.chunks.get_mut().insert(coordinate, voxels.encode());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn discard_voxels(&self, coordinate: ChunkCoordinate) -> Result<(), PersistenceError> {
        self.chunks.get_mut().remove(&coordinate);
        self.discards.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn append_edit(&self, edit: &BlockEdit) -> Result<(), PersistenceError> {
        lock(&self.journal).push(*edit);
        Ok(())
    }

    fn replay_journal(&self) -> Result<Vec<BlockEdit>, PersistenceError> {
        Ok(self.journal())
    }
}

const JOURNAL_FILE: &str = "journal.jsonl";

/// Persistence rooted at a cache folder on disk.
pub struct FolderPersistence {
    folder: PathBuf,
    journal: Mutex<()>,
}

impl FolderPersistence {
    /// Opens (creating if needed) a cache folder.
    pub fn open(folder: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let folder = folder.into();
        fs::create_dir_all(&folder).map_err(|error| PersistenceError::io(&folder, error))?;
        debug!("Chunk cache folder: {}", folder.display());
        Ok(Self {
            folder,
            journal: Mutex::new(()),
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn chunk_path(&self, coordinate: ChunkCoordinate) -> PathBuf {
        self.folder.join(format!(
            "chunk_{}_{}_{}.voxels",
            coordinate.x, coordinate.y, coordinate.z
        ))
    }

    fn journal_path(&self) -> PathBuf {
        self.folder.join(JOURNAL_FILE)
    }
}

impl ChunkPersistence for FolderPersistence {
    fn load_voxels(
        &self,
        coordinate: ChunkCoordinate,
        dimensions: ChunkDimensions,
    ) -> Option<VoxelGrid> {
        let path = self.chunk_path(coordinate);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return None,
            Err(error) => {
                warn!("Cannot read {}: {error}", path.display());
                return None;
            }
        };
        let grid = VoxelGrid::decode(&bytes, dimensions);
        if grid.is_none() {
            warn!("Ignoring corrupt chunk file {}", path.display());
        }
        grid
    }

    fn save_voxels(
        &self,
        coordinate: ChunkCoordinate,
        voxels: &VoxelGrid,
    ) -> Result<(), PersistenceError> {
        let path = self.chunk_path(coordinate);
        let staging = path.with_extension("partial");
        fs::write(&staging, voxels.encode())
            .map_err(|error| PersistenceError::io(&staging, error))?;
        fs::rename(&staging, &path).map_err(|error| PersistenceError::io(&path, error))
    }

    fn discard_voxels(&self, coordinate: ChunkCoordinate) -> Result<(), PersistenceError> {
        let path = self.chunk_path(coordinate);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(PersistenceError::io(&path, error)),
        }
    }

    fn append_edit(&self, edit: &BlockEdit) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_string(edit)
            .map_err(|error| PersistenceError::Encode(error.to_string()))?;
        line.push('\n');

        let path = self.journal_path();
        let _guard = lock(&self.journal);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|error| PersistenceError::io(&path, error))?;
        file.write_all(line.as_bytes())
            .map_err(|error| PersistenceError::io(&path, error))
    }

    fn replay_journal(&self) -> Result<Vec<BlockEdit>, PersistenceError> {
        let path = self.journal_path();
        let _guard = lock(&self.journal);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(PersistenceError::io(&path, error)),
        };

        let mut edits = Vec::new();
        for (number, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<BlockEdit>(line) {
                Ok(edit) => edits.push(edit),
                Err(error) => warn!("Skipping journal line {}: {error}", number + 1),
            }
        }
        Ok(edits)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(error) => panic!("persistence lock poisoned: {error}"),
    }
}
