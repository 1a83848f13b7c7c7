use super::fetch::TilePayload;
use crate::core::geo::TileCoord;
use instant::Instant;
use lru::LruCache;
use std::num::NonZeroUsize;

/// A cached tile and when it was last read or written
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub coord: TileCoord,
    pub payload: TilePayload,
    pub last_access: Instant,
}

/// In-memory tile cache using LRU eviction.
///
/// Bounded by entry count and optionally by summed payload bytes. Eviction
/// happens inside [`TileCache::put`] before the new entry is admitted, so
/// neither bound is ever exceeded. The cache has a single owner (the
/// scheduler); reads take `&mut self` because they refresh recency.
#[derive(Debug)]
pub struct TileCache {
    entries: LruCache<TileCoord, CacheEntry>,
    max_bytes: Option<usize>,
    total_bytes: usize,
}

impl TileCache {
    /// Create a new tile cache with the given capacity (at least one entry)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            max_bytes: None,
            total_bytes: 0,
        }
    }

    /// Additionally bound the summed [`TilePayload::byte_len`] of all entries
    pub fn with_max_bytes(mut self, max_bytes: Option<usize>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Get a tile, marking it most recently used
    pub fn get(&mut self, coord: &TileCoord) -> Option<TilePayload> {
        let entry = self.entries.get_mut(coord)?;
        entry.last_access = Instant::now();
        Some(entry.payload.clone())
    }

    /// Look at an entry without touching recency
    pub fn peek(&self, coord: &TileCoord) -> Option<&CacheEntry> {
        self.entries.peek(coord)
    }

    /// Insert a tile, evicting least-recently-used entries first as needed.
    ///
    /// Returns the coordinates evicted to make room, oldest first. A payload
    /// larger than the byte bound on its own is not admitted, and an existing
    /// entry for `coord` is then left in place.
    pub fn put(&mut self, coord: TileCoord, payload: TilePayload) -> Vec<TileCoord> {
        let size = payload.byte_len();
        let mut evicted = Vec::new();

        if let Some(max_bytes) = self.max_bytes.filter(|max| size > *max) {
            log::warn!(
                "tile {} ({} bytes) exceeds cache byte bound {}, not cached",
                coord,
                size,
                max_bytes
            );
            return evicted;
        }

        if let Some(old) = self.entries.pop(&coord) {
            self.total_bytes -= old.payload.byte_len();
        }

        if let Some(max_bytes) = self.max_bytes {
            while self.total_bytes + size > max_bytes {
                match self.evict_oldest() {
                    Some(old) => evicted.push(old),
                    None => break,
                }
            }
        }

        if self.entries.len() >= self.entries.cap().get() {
            if let Some(old) = self.evict_oldest() {
                evicted.push(old);
            }
        }

        self.total_bytes += size;
        self.entries.put(
            coord,
            CacheEntry {
                coord,
                payload,
                last_access: Instant::now(),
            },
        );
        evicted
    }

    fn evict_oldest(&mut self) -> Option<TileCoord> {
        let (coord, entry) = self.entries.pop_lru()?;
        self.total_bytes -= entry.payload.byte_len();
        log::debug!("evicted tile {} from cache", coord);
        Some(coord)
    }

    /// Check if a tile is in the cache without touching recency
    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.entries.contains(coord)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Coordinates from most to least recently used
    pub fn coords(&self) -> impl Iterator<Item = &TileCoord> {
        self.entries.iter().map(|(coord, _)| coord)
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(crate::core::constants::DEFAULT_CACHE_CAPACITY)
    }
}
