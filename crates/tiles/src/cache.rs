use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::TileAddress;

pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 256;

/// A resource held by a cache entry.
pub trait TileResource {
    /// Rows actually populated, which is less than `TILE_LINES` for the last tile of a source.
    fn row_count(&self) -> u32;

    /// Frees the underlying resource. Calling it more than once is a no-op.
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileCacheConfig {
    pub capacity: usize,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_TILE_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug)]
struct CacheEntry<R> {
    resource: R,
    last_used: u64,
}

/// Bounded least-recently-used store of tile resources.
///
/// Recency is a logical tick bumped on every `get` and `put`, so ordering does not
/// depend on clock resolution. The cache owns every resource it holds and releases
/// it on eviction, replacement and `clear`.
#[derive(Debug)]
pub struct TileCache<R> {
    entries: HashMap<TileAddress, CacheEntry<R>>,
    capacity: usize,
    tick: u64,
}

impl<R: TileResource> TileCache<R> {
    pub fn new(config: TileCacheConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
            tick: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Presence check that leaves recency untouched.
    pub fn contains(&self, address: &TileAddress) -> bool {
        self.entries.contains_key(address)
    }

    /// Returns the entry without touching recency.
    pub fn peek(&self, address: &TileAddress) -> Option<&R> {
        self.entries.get(address).map(|entry| &entry.resource)
    }

    /// Returns the entry and marks it most recently used.
    pub fn get(&mut self, address: &TileAddress) -> Option<&R> {
        let tick = self.next_tick();
        let entry = self.entries.get_mut(address)?;
        entry.last_used = tick;
        Some(&entry.resource)
    }

    /// Inserts `resource`, returning the address evicted to make room, if any.
    ///
    /// Replacing an existing address releases the old resource and never evicts.
    pub fn put(&mut self, address: TileAddress, resource: R) -> Option<TileAddress> {
        let tick = self.next_tick();
        if let Some(entry) = self.entries.get_mut(&address) {
            entry.resource.release();
            entry.resource = resource;
            entry.last_used = tick;
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.evict_least_recent()
        } else {
            None
        };
        self.entries.insert(
            address,
            CacheEntry {
                resource,
                last_used: tick,
            },
        );
        evicted
    }

    /// Releases every resource and returns how many entries were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        for (_, mut entry) in self.entries.drain() {
            entry.resource.release();
        }
        count
    }

    pub fn iter_addresses(&self) -> impl Iterator<Item = &TileAddress> {
        self.entries.keys()
    }

    fn evict_least_recent(&mut self) -> Option<TileAddress> {
        let address = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(address, _)| *address)?;
        let mut entry = self.entries.remove(&address)?;
        entry.resource.release();
        tracing::debug!(
            sample_start = address.sample_start,
            fft_size = address.fft_size,
            stride = address.stride,
            "evicted least recently used tile"
        );
        Some(address)
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}
