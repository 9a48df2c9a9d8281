//! Sample caches.
//!
//! Two distinct maps live here. The read cache speeds up repeated reads of
//! the same physical block and is keyed by file position. The written-sample
//! map is the write-session dedup table: it maps content keys to the first
//! physical position that content was written to, lives only for the
//! lifetime of one output archive, and is never persisted or re-derived
//! when an archive is reopened.

use super::SampleKey;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Key for read-cache entries (position-based).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Debug)]
pub struct ReadSampleKey {
    /// File position of the sample's data block.
    pub data_pos: u64,
}

impl ReadSampleKey {
    pub fn new(data_pos: u64) -> Self {
        Self { data_pos }
    }
}

/// Cached sample payload.
#[derive(Clone)]
struct CachedSample {
    data: Arc<Vec<u8>>,
    size: usize,
}

/// Thread-safe read cache for sample payloads.
///
/// Uses `parking_lot::RwLock` for non-poisoning locks and `AtomicUsize`
/// for lock-free size tracking. Eviction drops roughly half the entries
/// when the budget is exceeded.
pub struct ReadSampleCache {
    cache: RwLock<HashMap<ReadSampleKey, CachedSample>>,
    max_size: usize,
    current_size: AtomicUsize,
}

impl ReadSampleCache {
    /// Create a new cache with the given maximum size in bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            max_size,
            current_size: AtomicUsize::new(0),
        }
    }

    /// Create a cache with default size (64 MB).
    pub fn default_size() -> Self {
        Self::new(64 * 1024 * 1024)
    }

    /// Get a cached payload if present.
    #[inline]
    pub fn get(&self, key: &ReadSampleKey) -> Option<Arc<Vec<u8>>> {
        let cache = self.cache.read();
        cache.get(key).map(|s| Arc::clone(&s.data))
    }

    /// Insert a payload, sharing it back to the caller.
    pub fn insert(&self, key: ReadSampleKey, data: Vec<u8>) -> Arc<Vec<u8>> {
        let size = data.len();
        let data = Arc::new(data);

        if size > self.max_size {
            return data;
        }

        let current = self.current_size.load(Ordering::Relaxed);
        if current + size > self.max_size {
            self.evict_some();
        }

        let mut cache = self.cache.write();
        if let Some(existing) = cache.get(&key) {
            return Arc::clone(&existing.data);
        }

        cache.insert(
            key,
            CachedSample {
                data: Arc::clone(&data),
                size,
            },
        );
        self.current_size.fetch_add(size, Ordering::Relaxed);
        data
    }

    /// Evict approximately half of the cache.
    fn evict_some(&self) {
        let mut cache = self.cache.write();
        let keys: Vec<_> = cache.keys().cloned().collect();
        let evict_count = keys.len() / 2;

        let mut evicted_size = 0;
        for key in keys.into_iter().take(evict_count) {
            if let Some(sample) = cache.remove(&key) {
                evicted_size += sample.size;
            }
        }

        let _ = self
            .current_size
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(evicted_size))
            });
    }

    /// Clear the entire cache.
    pub fn clear(&self) {
        let mut cache = self.cache.write();
        cache.clear();
        self.current_size.store(0, Ordering::Relaxed);
    }

    /// Number of cached entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current cache size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.current_size.load(Ordering::Relaxed)
    }

    /// Maximum cache size in bytes.
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl Default for ReadSampleCache {
    fn default() -> Self {
        Self::default_size()
    }
}

/// Write-session dedup table: content key to first written position.
///
/// Writing is single-threaded, so no synchronization here.
#[derive(Default)]
pub struct WrittenSampleMap {
    positions: HashMap<SampleKey, u64>,
    enabled: bool,
    hits: usize,
}

impl WrittenSampleMap {
    pub fn new() -> Self {
        Self {
            positions: HashMap::new(),
            enabled: true,
            hits: 0,
        }
    }

    /// Turn deduplication on or off. Entries already recorded are kept.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up the position previously written for this content.
    /// Counts a hit when found.
    pub fn find(&mut self, key: &SampleKey) -> Option<u64> {
        if !self.enabled {
            return None;
        }
        let pos = self.positions.get(key).copied();
        if pos.is_some() {
            self.hits += 1;
        }
        pos
    }

    /// Record the position of freshly written content. First write wins.
    pub fn record(&mut self, key: SampleKey, pos: u64) {
        if self.enabled {
            self.positions.entry(key).or_insert(pos);
        }
    }

    /// Number of distinct content keys recorded.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of dedup hits served so far.
    pub fn hits(&self) -> usize {
        self.hits
    }
}
