//! Counters and summaries reported by grid caches.

use std::fmt;

/// Lifetime counters for one cache.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GridStats {
    pub hits: u64,
    pub misses: u64,
    pub builds: u64,
    pub failed_builds: u64,
    /// Builds whose result was discarded because the slot was invalidated mid-build.
    pub stale_builds: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

/// Statistics from one eviction pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvictionStats {
    /// Number of items evicted.
    pub items_evicted: usize,
    /// Total cost released.
    pub cost_freed: usize,
    /// Number of items skipped because they were pinned or borrowed.
    pub items_skipped: usize,
}

impl EvictionStats {
    pub fn merge(&mut self, other: &EvictionStats) {
        self.items_evicted += other.items_evicted;
        self.cost_freed += other.cost_freed;
        self.items_skipped += other.items_skipped;
    }
}

/// Point-in-time snapshot of a cache, as logged by `print_info`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridInfo {
    pub name: &'static str,
    pub resident: usize,
    pub building: usize,
    pub pinned: usize,
    pub total_cost: usize,
    pub cost_limit: usize,
    pub stats: GridStats,
}

impl fmt::Display for GridInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} resident ({} building, {} pinned), {:.1}/{:.1} KiB, {} hits, {} misses, {} builds ({} stale, {} failed), {} evictions, {} invalidations",
            self.name,
            self.resident,
            self.building,
            self.pinned,
            self.total_cost as f64 / 1024.0,
            self.cost_limit as f64 / 1024.0,
            self.stats.hits,
            self.stats.misses,
            self.stats.builds,
            self.stats.stale_builds,
            self.stats.failed_builds,
            self.stats.evictions,
            self.stats.invalidations,
        )
    }
}
