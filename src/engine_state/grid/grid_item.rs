//! The contract every cached per-chunk artifact fulfils.

use super::ChunkCoordinate;
use crate::engine_state::error::PipelineError;

/// A per-chunk artifact that can live in a [`GridCache`](super::GridCache).
///
/// Items are shared as `Arc<Self>` between the cache and any number of readers, so all
/// mutation goes through interior locks. Both lifecycle hooks are invoked with the cache's
/// table lock released, which lets them perform I/O or queue GPU work without stalling
/// unrelated lookups.
pub trait GridItem: Send + Sync + 'static {
    /// Chunk this item was built for.
    fn coordinate(&self) -> ChunkCoordinate;

    /// Approximate resident size in bytes. Must stay constant while the item is cached.
    fn cost(&self) -> usize;

    /// Called once when the cache drops the item to stay under its cost limit.
    fn item_will_be_evicted(&self) {}

    /// Called once when the item is dropped because its inputs changed.
    fn item_will_be_invalidated(&self) {}
}

/// Builds the item for one chunk. Runs with the cache table unlocked.
pub type GridItemFactory<T> =
    Box<dyn Fn(ChunkCoordinate) -> Result<T, PipelineError> + Send + Sync + 'static>;

/// How a lookup behaves when the slot is being built or the table is contended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Wait for an in-flight build to finish.
    Block,
    /// Report absence instead of waiting on any lock or build.
    FailFast,
}
