//! # Spatial Grid Cache
//!
//! A thread-safe, cost-bounded map from [`ChunkCoordinate`] to a shared per-chunk artifact.
//! Every pipeline stage (voxels, lighting, geometry, GPU buffers) is one `GridCache`.
//!
//! ## Guarantees
//! - At most one build runs per coordinate at any time. Concurrent `get` calls for the same
//!   missing coordinate collapse onto that build and all receive the same `Arc`.
//! - The factory runs with the table unlocked, so builds of different coordinates proceed
//!   in parallel and a factory may itself look up other coordinates in any cache.
//! - Invalidating a slot whose build is in flight marks the build stale. The builder then
//!   discards its result and rebuilds, so no caller ever receives an artifact computed from
//!   inputs that were superseded before it was published.
//! - Eviction walks from least to most recently used and never drops a pinned entry, an
//!   entry that is still being built, or an entry somebody outside the cache still holds.
//! - Lifecycle hooks run after the table lock has been released.

pub mod chunk_coordinate;
pub mod grid_item;
pub mod stats;

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError,
    },
};

use log::{debug, trace};
use lru::LruCache;

pub use chunk_coordinate::{ChunkCoordinate, ChunkDimensions, LATERAL_NEIGHBORHOOD};
pub use grid_item::{GridItem, GridItemFactory, WaitPolicy};
pub use stats::{EvictionStats, GridInfo, GridStats};

use crate::engine_state::error::PipelineError;

enum Slot<T> {
    Ready(Arc<T>),
    Building { ticket: u64, stale: bool },
}

enum Lookup<T> {
    Ready(Arc<T>),
    Building,
    Vacant,
}

struct GridTable<T: GridItem> {
    slots: HashMap<ChunkCoordinate, Slot<T>>,
    /// Ready entries only, most recently used first.
    recency: LruCache<ChunkCoordinate, ()>,
    pinned: HashSet<ChunkCoordinate>,
    total_cost: usize,
    next_ticket: u64,
    stats: GridStats,
}

impl<T: GridItem> GridTable<T> {
    fn new() -> Self {
        Self {
            slots: HashMap::new(),
            recency: LruCache::unbounded(),
            pinned: HashSet::new(),
            total_cost: 0,
            next_ticket: 0,
            stats: GridStats::default(),
        }
    }

    fn lookup(&self, coordinate: ChunkCoordinate) -> Lookup<T> {
        match self.slots.get(&coordinate) {
            Some(Slot::Ready(item)) => Lookup::Ready(Arc::clone(item)),
            Some(Slot::Building { .. }) => Lookup::Building,
            None => Lookup::Vacant,
        }
    }

    fn begin_build(&mut self, coordinate: ChunkCoordinate) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.slots
            .insert(coordinate, Slot::Building { ticket, stale: false });
        ticket
    }

    /// Removes the build marker and reports whether the build went stale.
    fn finish_build(&mut self, coordinate: ChunkCoordinate, ticket: u64) -> bool {
        match self.slots.remove(&coordinate) {
            Some(Slot::Building {
                ticket: current,
                stale,
            }) if current == ticket => stale,
            other => {
                debug_assert!(false, "build marker for {coordinate:?} was replaced mid-build");
                if let Some(slot) = other {
                    self.slots.insert(coordinate, slot);
                }
                true
            }
        }
    }

    fn abandon_build(&mut self, coordinate: ChunkCoordinate, ticket: u64) {
        if matches!(
            self.slots.get(&coordinate),
            Some(Slot::Building { ticket: current, .. }) if *current == ticket
        ) {
            self.slots.remove(&coordinate);
        }
    }

    fn insert(&mut self, coordinate: ChunkCoordinate, item: Arc<T>) {
        debug_assert_eq!(item.coordinate(), coordinate);
        self.total_cost += item.cost();
        self.recency.put(coordinate, ());
        self.slots.insert(coordinate, Slot::Ready(item));
        self.stats.builds += 1;
    }

    fn take_ready(&mut self, coordinate: ChunkCoordinate) -> Option<Arc<T>> {
        match self.slots.remove(&coordinate) {
            Some(Slot::Ready(item)) => {
                self.recency.pop(&coordinate);
                self.total_cost = self.total_cost.saturating_sub(item.cost());
                Some(item)
            }
            Some(building) => {
                self.slots.insert(coordinate, building);
                None
            }
            None => None,
        }
    }

    /// Returns whether the slot existed, and the removed item if it was ready.
    fn invalidate(&mut self, coordinate: ChunkCoordinate) -> (bool, Option<Arc<T>>) {
        if let Some(Slot::Building { stale, .. }) = self.slots.get_mut(&coordinate) {
            *stale = true;
            self.stats.invalidations += 1;
            return (true, None);
        }
        match self.take_ready(coordinate) {
            Some(item) => {
                self.stats.invalidations += 1;
                (true, Some(item))
            }
            None => (false, None),
        }
    }

    fn evict_until(&mut self, cost_limit: usize, eviction: &mut EvictionStats) -> Vec<Arc<T>> {
        let mut victims = Vec::new();
        if self.total_cost <= cost_limit {
            return victims;
        }

        let oldest_first: Vec<ChunkCoordinate> =
            self.recency.iter().rev().map(|(coordinate, _)| *coordinate).collect();
        for coordinate in oldest_first {
            if self.total_cost <= cost_limit {
                break;
            }
            if self.pinned.contains(&coordinate) {
                eviction.items_skipped += 1;
                continue;
            }
            let borrowed = matches!(
                self.slots.get(&coordinate),
                Some(Slot::Ready(item)) if Arc::strong_count(item) > 1
            );
            if borrowed {
                eviction.items_skipped += 1;
                continue;
            }
            if let Some(item) = self.take_ready(coordinate) {
                eviction.items_evicted += 1;
                eviction.cost_freed += item.cost();
                self.stats.evictions += 1;
                victims.push(item);
            }
        }
        victims
    }
}

/// Clears an abandoned build marker if the factory unwinds.
struct PendingBuild<'a, T: GridItem> {
    cache: &'a GridCache<T>,
    coordinate: ChunkCoordinate,
    ticket: u64,
    armed: bool,
}

impl<T: GridItem> Drop for PendingBuild<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut table = self
            .cache
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        table.abandon_build(self.coordinate, self.ticket);
        drop(table);
        self.cache.slot_changed.notify_all();
    }
}

/// A cost-bounded, concurrently built cache of per-chunk artifacts.
///
/// # Examples
/// ```
/// use voxel_terrain::engine_state::grid::{ChunkCoordinate, GridCache, GridItem};
///
/// struct Marker(ChunkCoordinate);
///
/// impl GridItem for Marker {
///     fn coordinate(&self) -> ChunkCoordinate { self.0 }
///     fn cost(&self) -> usize { 1 }
///     fn item_will_be_evicted(&self) {}
///     fn item_will_be_invalidated(&self) {}
/// }
///
/// let cache = GridCache::new("markers", 16, Box::new(|c| Ok(Marker(c))));
/// let item = cache.get(ChunkCoordinate::new(1, 2, 3)).unwrap();
/// assert_eq!(item.coordinate(), ChunkCoordinate::new(1, 2, 3));
/// assert!(cache.is_resident(ChunkCoordinate::new(1, 2, 3)));
/// ```
pub struct GridCache<T: GridItem> {
    name: &'static str,
    cost_limit: usize,
    table: Mutex<GridTable<T>>,
    slot_changed: Condvar,
    factory: GridItemFactory<T>,
    closed: AtomicBool,
}

impl<T: GridItem> GridCache<T> {
    /// Creates an empty cache.
    ///
    /// # Arguments
    /// * `name` - Label used in logs and `GridInfo`
    /// * `cost_limit` - Total cost the cache trims itself back to after every insert
    /// * `factory` - Builds the item for a coordinate on a cache miss
    pub fn new(name: &'static str, cost_limit: usize, factory: GridItemFactory<T>) -> Self {
        Self {
            name,
            cost_limit,
            table: Mutex::new(GridTable::new()),
            slot_changed: Condvar::new(),
            factory,
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn cost_limit(&self) -> usize {
        self.cost_limit
    }

    /// Returns the item at `coordinate`, building it with the stored factory if needed.
    ///
    /// Blocks while another thread builds the same slot. A factory failure is returned to
    /// this caller and leaves the slot empty, so a later call retries the build.
    pub fn get(&self, coordinate: ChunkCoordinate) -> Result<Arc<T>, PipelineError> {
        self.acquire(coordinate, WaitPolicy::Block, true, |c| (self.factory)(c))?
            .ok_or(PipelineError::NotReady(coordinate))
    }

    /// Returns the item only if it is cached and the table is uncontended. Never builds
    /// and never waits.
    pub fn try_get(&self, coordinate: ChunkCoordinate) -> Option<Arc<T>> {
        self.acquire(coordinate, WaitPolicy::FailFast, false, |c| {
            Err(PipelineError::NotReady(c))
        })
        .unwrap_or(None)
    }

    /// Returns the cached item, waiting out an in-flight build but never starting one.
    pub fn peek(&self, coordinate: ChunkCoordinate) -> Option<Arc<T>> {
        self.acquire(coordinate, WaitPolicy::Block, false, |c| {
            Err(PipelineError::NotReady(c))
        })
        .unwrap_or(None)
    }

    /// Returns the cached item, or builds it on this thread when the slot is empty.
    ///
    /// Returns `Ok(None)` without waiting when another thread is building the slot or the
    /// table is contended.
    pub fn try_get_or_create(
        &self,
        coordinate: ChunkCoordinate,
    ) -> Result<Option<Arc<T>>, PipelineError> {
        self.acquire(coordinate, WaitPolicy::FailFast, true, |c| (self.factory)(c))
    }

    /// Like [`get`](Self::get) or [`try_get_or_create`](Self::try_get_or_create), but
    /// builds a missing item with `factory` instead of the stored one.
    ///
    /// This is how builds that need a capability the cache cannot own (such as the render
    /// context) are performed.
    pub fn get_with<F>(
        &self,
        coordinate: ChunkCoordinate,
        policy: WaitPolicy,
        factory: F,
    ) -> Result<Option<Arc<T>>, PipelineError>
    where
        F: FnMut(ChunkCoordinate) -> Result<T, PipelineError>,
    {
        self.acquire(coordinate, policy, true, factory)
    }

    fn acquire<F>(
        &self,
        coordinate: ChunkCoordinate,
        policy: WaitPolicy,
        create_if_missing: bool,
        mut factory: F,
    ) -> Result<Option<Arc<T>>, PipelineError>
    where
        F: FnMut(ChunkCoordinate) -> Result<T, PipelineError>,
    {
        let mut table = match policy {
            WaitPolicy::Block => self.lock_table(),
            WaitPolicy::FailFast => match self.table.try_lock() {
                Ok(table) => table,
                Err(TryLockError::WouldBlock) => return Ok(None),
                Err(TryLockError::Poisoned(error)) => {
                    panic!("{} cache table poisoned: {error}", self.name)
                }
            },
        };

        loop {
            match table.lookup(coordinate) {
                Lookup::Ready(item) => {
                    table.recency.promote(&coordinate);
                    table.stats.hits += 1;
                    return Ok(Some(item));
                }
                Lookup::Building => {
                    if policy == WaitPolicy::FailFast {
                        return Ok(None);
                    }
                    table = self.wait_for_change(table);
                }
                Lookup::Vacant => {
                    table.stats.misses += 1;
                    if !create_if_missing {
                        return Ok(None);
                    }
                    if self.closed.load(Ordering::Acquire) {
                        return Err(PipelineError::ShutDown(self.name));
                    }

                    let ticket = table.begin_build(coordinate);
                    drop(table);

                    let mut pending = PendingBuild {
                        cache: self,
                        coordinate,
                        ticket,
                        armed: true,
                    };
                    let built = factory(coordinate);
                    table = self.lock_table();
                    pending.armed = false;
                    let stale = table.finish_build(coordinate, ticket);

                    match built {
                        Ok(item) if !stale => {
                            let item = Arc::new(item);
                            table.insert(coordinate, Arc::clone(&item));
                            let mut eviction = EvictionStats::default();
                            let evicted = table.evict_until(self.cost_limit, &mut eviction);
                            drop(table);
                            self.slot_changed.notify_all();
                            self.notify_evicted(evicted, &eviction);
                            return Ok(Some(item));
                        }
                        Ok(discarded) => {
                            table.stats.stale_builds += 1;
                            drop(table);
                            self.slot_changed.notify_all();
                            trace!("{}: discarding stale build of {coordinate:?}", self.name);
                            discarded.item_will_be_invalidated();
                            table = self.lock_table();
                        }
                        Err(error) => {
                            table.stats.failed_builds += 1;
                            drop(table);
                            self.slot_changed.notify_all();
                            return Err(error);
                        }
                    }
                }
            }
        }
    }

    /// Drops the item at `coordinate` because its inputs changed.
    ///
    /// A ready item is removed and its invalidation hook called. A slot that is still
    /// being built is marked stale so its result is thrown away. Returns whether the slot
    /// held anything.
    pub fn invalidate(&self, coordinate: ChunkCoordinate) -> bool {
        let mut table = self.lock_table();
        let (found, removed) = table.invalidate(coordinate);
        drop(table);
        if let Some(item) = removed {
            item.item_will_be_invalidated();
        }
        found
    }

    /// Evicts least recently used items until the total cost is at most `cost_limit`.
    ///
    /// Pinned items and items still referenced outside the cache are skipped, so the
    /// resulting cost may remain above the limit.
    pub fn evict_excess(&self, cost_limit: usize) -> EvictionStats {
        let mut eviction = EvictionStats::default();
        let mut table = self.lock_table();
        let evicted = table.evict_until(cost_limit, &mut eviction);
        drop(table);
        self.notify_evicted(evicted, &eviction);
        eviction
    }

    /// Replaces the set of coordinates that eviction must never touch.
    pub fn set_pinned<I>(&self, coordinates: I)
    where
        I: IntoIterator<Item = ChunkCoordinate>,
    {
        self.lock_table().pinned = coordinates.into_iter().collect();
    }

    /// Removes every ready item, pinned or not, calling their eviction hooks, and refuses
    /// all later builds.
    pub fn drain(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let mut table = self.lock_table();
        let coordinates: Vec<ChunkCoordinate> =
            table.recency.iter().map(|(coordinate, _)| *coordinate).collect();
        let mut drained = Vec::with_capacity(coordinates.len());
        for coordinate in coordinates {
            if let Some(item) = table.take_ready(coordinate) {
                table.stats.evictions += 1;
                drained.push(item);
            }
        }
        table.pinned.clear();
        drop(table);

        let count = drained.len();
        for item in drained {
            item.item_will_be_evicted();
        }
        debug!("{}: drained {count} items", self.name);
        count
    }

    pub fn is_resident(&self, coordinate: ChunkCoordinate) -> bool {
        matches!(self.lock_table().slots.get(&coordinate), Some(Slot::Ready(_)))
    }

    /// Coordinates of every ready item.
    pub fn resident_coordinates(&self) -> Vec<ChunkCoordinate> {
        self.lock_table()
            .recency
            .iter()
            .map(|(coordinate, _)| *coordinate)
            .collect()
    }

    /// Coordinates of every ready item and every in-flight build.
    pub fn known_coordinates(&self) -> Vec<ChunkCoordinate> {
        self.lock_table().slots.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock_table().recency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_cost(&self) -> usize {
        self.lock_table().total_cost
    }

    pub fn stats(&self) -> GridStats {
        self.lock_table().stats.clone()
    }

    pub fn info(&self) -> GridInfo {
        let table = self.lock_table();
        GridInfo {
            name: self.name,
            resident: table.recency.len(),
            building: table.slots.len() - table.recency.len(),
            pinned: table.pinned.len(),
            total_cost: table.total_cost,
            cost_limit: self.cost_limit,
            stats: table.stats.clone(),
        }
    }

    fn notify_evicted(&self, evicted: Vec<Arc<T>>, eviction: &EvictionStats) {
        if evicted.is_empty() {
            return;
        }
        debug!(
            "{}: evicted {} items, freed {} bytes, skipped {}",
            self.name, eviction.items_evicted, eviction.cost_freed, eviction.items_skipped
        );
        for item in evicted {
            item.item_will_be_evicted();
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, GridTable<T>> {
        match self.table.lock() {
            Ok(table) => table,
            Err(error) => panic!("{} cache table poisoned: {error}", self.name),
        }
    }

    fn wait_for_change<'a>(
        &self,
        table: MutexGuard<'a, GridTable<T>>,
    ) -> MutexGuard<'a, GridTable<T>> {
        match self.slot_changed.wait(table) {
            Ok(table) => table,
            Err(error) => panic!("{} cache table poisoned: {error}", self.name),
        }
    }
}
