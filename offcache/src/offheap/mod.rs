// Copyright 2026 offcache Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fmt::Debug,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use offcache_common::{
    cache::{hit_ratio, Cache, CacheLoader},
    code::Serializer,
    error::Result,
    event::EvictionListener,
    locks::KeyLocks,
};
use offcache_memory::eviction::Eviction;
use offcache_storage::{Pointer, PointerMap, Store};
use parking_lot::Mutex;

/// Off-heap cache builder.
pub mod builder;
/// Compaction pass and background compactor.
pub mod compactor;

pub use builder::{CompactionConfig, OffHeapCacheBuilder};
pub use compactor::{CompactionReport, SegmentCompaction};

use compactor::Compactor;

/// Counters of an [`OffHeapCache`].
#[derive(Debug, Default)]
pub struct CacheStatistics {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    evictions: AtomicU64,
    eviction_failures: AtomicU64,
    invalidations: AtomicU64,
    compactions: AtomicU64,
    relocations: AtomicU64,
}

impl CacheStatistics {
    /// `get` calls served from the store.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// `get` calls that missed the store.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Values produced by the loader and stored.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Entries removed by the capacity bound.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Victims removed from the cache whose value could not be read back for the listener.
    pub fn eviction_failures(&self) -> u64 {
        self.eviction_failures.load(Ordering::Relaxed)
    }

    /// Entries removed by `invalidate`.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Finished compaction passes.
    pub fn compactions(&self) -> u64 {
        self.compactions.load(Ordering::Relaxed)
    }

    /// Entries moved by compaction.
    pub fn relocations(&self) -> u64 {
        self.relocations.load(Ordering::Relaxed)
    }
}

pub(crate) struct OffHeapCacheInner<K, V> {
    name: String,
    capacity: usize,
    entries: AtomicUsize,

    store: Store,
    pointers: PointerMap<K>,
    eviction: Mutex<Box<dyn Eviction<K>>>,
    locks: KeyLocks,

    serializer: Arc<dyn Serializer<V>>,
    loader: Arc<dyn CacheLoader<K, V>>,
    listener: Arc<dyn EvictionListener<K, V>>,

    compaction: CompactionConfig,
    statistics: Arc<CacheStatistics>,
}

impl<K, V> OffHeapCacheInner<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn put_bytes(&self, key: K, bytes: Vec<u8>) -> Result<()> {
        // Nothing is evicted for a value that can never be stored.
        self.store.check_size(bytes.len())?;

        // A new key takes one more slot, make room before allocating.
        if self.pointers.get(&key).is_none() {
            while self.entries.load(Ordering::Acquire) >= self.capacity {
                if !self.evict_one() {
                    break;
                }
            }
        }

        {
            let _guard = self.locks.lock(&key);
            match self.pointers.get(&key) {
                Some(ptr) if bytes.len() <= ptr.len() => {
                    let ptr = self.store.shrink(ptr, bytes.len())?;
                    self.pointers.insert(key.clone(), ptr);
                    self.store.write(ptr, &bytes)?;
                }
                Some(ptr) => {
                    // The old range is freed only after the new one is fully written.
                    let new = self.store.replace(ptr, &bytes)?;
                    self.pointers.insert(key.clone(), new);
                }
                None => {
                    let ptr = self.store.acquire(bytes.len())?;
                    if let Err(e) = self.store.write(ptr, &bytes) {
                        self.store.free(ptr)?;
                        return Err(e);
                    }
                    self.pointers.insert(key.clone(), ptr);
                    self.entries.fetch_add(1, Ordering::AcqRel);
                }
            }
            self.eviction.lock().push(key);
        }

        while self.entries.load(Ordering::Acquire) > self.capacity {
            if !self.evict_one() {
                break;
            }
        }
        Ok(())
    }

    /// Evict the next victim of the eviction policy.
    ///
    /// Returns `false` if the policy has nothing left to evict. A victim whose value cannot be read back is still
    /// removed, counted and logged, but the listener does not see it.
    fn evict_one(&self) -> bool {
        let Some(victim) = self.eviction.lock().pop() else {
            return false;
        };

        let value = {
            let _guard = self.locks.lock(&victim);
            // The victim may have been invalidated since it was popped.
            let Some(ptr) = self.pointers.remove(&victim) else {
                return true;
            };
            self.entries.fetch_sub(1, Ordering::AcqRel);
            self.take(ptr)
        };

        self.statistics.evictions.fetch_add(1, Ordering::Relaxed);
        match value {
            Ok(value) => {
                tracing::trace!("[off-heap cache]: {} evicts an entry", self.name);
                self.listener.on_eviction(victim, value);
            }
            Err(e) => {
                self.statistics.eviction_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("[off-heap cache]: {} evicts an unreadable entry: {e}", self.name);
            }
        }
        true
    }

    /// Read, free and deserialize the value of a pointer already removed from the map.
    fn take(&self, ptr: Pointer) -> Result<V> {
        let data = self.store.read(ptr);
        self.store.free(ptr)?;
        self.serializer.deserialize(&data?)
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        let data = {
            let _guard = self.locks.lock(key);
            match self.pointers.get(key) {
                Some(ptr) => Some(self.store.read(ptr)?),
                None => None,
            }
        };

        if let Some(data) = data {
            self.statistics.hits.fetch_add(1, Ordering::Relaxed);
            self.eviction.lock().access(key);
            return self.serializer.deserialize(&data).map(Some);
        }

        self.statistics.misses.fetch_add(1, Ordering::Relaxed);
        match self.loader.load(key)? {
            Some(value) => {
                let bytes = self.serializer.serialize(&value)?;
                self.put_bytes(key.clone(), bytes)?;
                self.statistics.loads.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn peek(&self, key: &K) -> Result<Option<V>> {
        let data = {
            let _guard = self.locks.lock(key);
            match self.pointers.get(key) {
                Some(ptr) => self.store.read(ptr)?,
                None => return Ok(None),
            }
        };
        self.serializer.deserialize(&data).map(Some)
    }

    fn invalidate(&self, key: &K) -> Result<Option<V>> {
        let value = {
            let _guard = self.locks.lock(key);
            let Some(ptr) = self.pointers.remove(key) else {
                return Ok(None);
            };
            self.entries.fetch_sub(1, Ordering::AcqRel);
            self.eviction.lock().remove(key);
            self.take(ptr)?
        };
        self.statistics.invalidations.fetch_add(1, Ordering::Relaxed);
        self.listener.on_eviction(key.clone(), value.clone());
        Ok(Some(value))
    }

    fn clear(&self) -> Result<()> {
        // Entries inserted while clearing survive.
        for key in self.pointers.keys() {
            let _guard = self.locks.lock(&key);
            if let Some(ptr) = self.pointers.remove(&key) {
                self.entries.fetch_sub(1, Ordering::AcqRel);
                self.eviction.lock().remove(&key);
                self.store.free(ptr)?;
            }
        }
        tracing::debug!("[off-heap cache]: {} cleared", self.name);
        Ok(())
    }
}

/// A cache that keeps serialized values in off-heap segments.
///
/// Keys and pointers live in the heap, value bytes live in the segments of a [`Store`]. Every operation on a key is
/// serialized by the key's stripe lock. A background compactor consolidates the free space of fragmented segments.
pub struct OffHeapCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<OffHeapCacheInner<K, V>>,
    compactor: Mutex<Option<Compactor>>,
}

impl<K, V> Debug for OffHeapCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffHeapCache")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .field("entries", &self.inner.entries.load(Ordering::Relaxed))
            .field("store", &self.inner.store)
            .finish()
    }
}

impl<K, V> OffHeapCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a builder for an off-heap cache named `name`.
    pub fn builder(name: impl Into<String>) -> OffHeapCacheBuilder<K, V> {
        OffHeapCacheBuilder::new(name)
    }

    /// Entry count bound.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// The underlying store.
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// Cache counters.
    pub fn statistics(&self) -> &Arc<CacheStatistics> {
        &self.inner.statistics
    }

    /// Run one compaction pass now with the configured threshold.
    pub fn compact(&self) -> Result<CompactionReport> {
        self.inner.compact(self.inner.compaction.threshold)
    }

    /// Start the background compactor. No-op if it is already running.
    pub fn start_compactor(&self) -> Result<()> {
        let mut compactor = self.compactor.lock();
        if compactor.is_none() {
            *compactor = Some(Compactor::spawn(
                self.inner.clone(),
                self.inner.compaction.period,
                self.inner.compaction.threshold,
            )?);
        }
        Ok(())
    }

    /// Stop the background compactor and wait for it to exit. No-op if it is not running.
    pub fn stop_compactor(&self) {
        if let Some(compactor) = self.compactor.lock().take() {
            compactor.stop();
        }
    }

    /// Returns `true` if the background compactor is running.
    pub fn is_compactor_running(&self) -> bool {
        self.compactor.lock().is_some()
    }

    /// Stop background work. The cache stays usable.
    pub fn close(&self) {
        self.stop_compactor();
        tracing::info!("[off-heap cache]: {} closed", self.inner.name);
    }

    /// Compaction period and threshold.
    pub fn compaction_config(&self) -> &CompactionConfig {
        &self.inner.compaction
    }
}

impl<K, V> Drop for OffHeapCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(compactor) = self.compactor.get_mut().take() {
            compactor.stop();
        }
    }
}

impl<K, V> Cache for OffHeapCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Key = K;
    type Value = V;

    fn name(&self) -> &str {
        &self.inner.name
    }

    fn put(&self, key: K, value: V) -> Result<()> {
        let bytes = self.inner.serializer.serialize(&value)?;
        self.inner.put_bytes(key, bytes)
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        self.inner.get(key)
    }

    fn peek(&self, key: &K) -> Result<Option<V>> {
        self.inner.peek(key)
    }

    fn invalidate(&self, key: &K) -> Result<Option<V>> {
        self.inner.invalidate(key)
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    fn size(&self) -> usize {
        self.inner.entries.load(Ordering::Acquire)
    }

    fn hit_ratio(&self) -> f64 {
        hit_ratio(self.inner.statistics.hits(), self.inner.statistics.misses())
    }
}

#[cfg(test)]
mod tests {
    use offcache_common::{code::RawSerializer, error::ErrorKind};
    use offcache_memory::eviction::EvictionConfig;

    use super::*;

    type Evicted = Arc<Mutex<Vec<(u64, Vec<u8>)>>>;

    fn cache(capacity: usize, segments: usize, segment_capacity: usize) -> (OffHeapCache<u64, Vec<u8>>, Evicted) {
        let evicted: Evicted = Arc::default();
        let listener = {
            let evicted = evicted.clone();
            move |key: u64, value: Vec<u8>| evicted.lock().push((key, value))
        };
        let cache = OffHeapCache::builder("test")
            .with_capacity(capacity)
            .with_segments(segments, segment_capacity)
            .with_eviction_config(EvictionConfig::Fifo)
            .with_serializer(RawSerializer)
            .with_eviction_listener(listener)
            .with_compaction_config(CompactionConfig {
                enabled: false,
                ..Default::default()
            })
            .build()
            .unwrap();
        (cache, evicted)
    }

    #[test_log::test]
    fn test_put_get_overwrite() {
        let (cache, _) = cache(16, 2, 128);

        cache.put(1, vec![1; 8]).unwrap();
        let ptr = cache.inner.pointers.get(&1).unwrap();
        assert_eq!(cache.get(&1).unwrap(), Some(vec![1; 8]));

        // Same length, written in place.
        cache.put(1, vec![2; 8]).unwrap();
        assert_eq!(cache.inner.pointers.get(&1), Some(ptr));
        assert_eq!(cache.get(&1).unwrap(), Some(vec![2; 8]));

        // Longer, replaced.
        cache.put(1, vec![3; 16]).unwrap();
        let new = cache.inner.pointers.get(&1).unwrap();
        assert_ne!(new, ptr);
        assert_eq!(new.len(), 16);
        assert_eq!(cache.get(&1).unwrap(), Some(vec![3; 16]));
        assert_eq!(cache.store().used_bytes(), 16);
        assert_eq!(cache.size(), 1);

        // Shorter, shrunk in place.
        cache.put(1, vec![4; 6]).unwrap();
        let shrunk = cache.inner.pointers.get(&1).unwrap();
        assert_eq!((shrunk.segment(), shrunk.offset(), shrunk.len()), (new.segment(), new.offset(), 6));
        assert_eq!(cache.get(&1).unwrap(), Some(vec![4; 6]));
        assert_eq!(cache.store().used_bytes(), 6);
    }

    #[test_log::test]
    fn test_shrink_in_full_store() {
        let (cache, _) = cache(16, 1, 100);
        cache.put(1, vec![1; 100]).unwrap();

        cache.put(1, vec![2; 50]).unwrap();
        assert_eq!(cache.get(&1).unwrap(), Some(vec![2; 50]));
        assert_eq!(cache.store().free_bytes(), 50);

        // The released tail is usable right away.
        cache.put(2, vec![3; 50]).unwrap();
        assert_eq!(cache.get(&2).unwrap(), Some(vec![3; 50]));
        assert_eq!(cache.size(), 2);
    }

    #[test_log::test]
    fn test_empty_values() {
        let (cache, evicted) = cache(2, 1, 16);
        cache.put(1, vec![]).unwrap();
        assert_eq!(cache.get(&1).unwrap(), Some(vec![]));
        assert_eq!(cache.store().used_bytes(), 0);

        // Empty to non-empty and back.
        cache.put(1, vec![1; 16]).unwrap();
        assert_eq!(cache.get(&1).unwrap(), Some(vec![1; 16]));
        cache.put(1, vec![]).unwrap();
        assert_eq!(cache.get(&1).unwrap(), Some(vec![]));
        assert_eq!(cache.store().free_bytes(), 16);

        cache.put(2, vec![]).unwrap();
        cache.put(3, vec![]).unwrap();
        assert_eq!(*evicted.lock(), vec![(1, vec![])]);
        assert_eq!(cache.invalidate(&2).unwrap(), Some(vec![]));
        assert_eq!(cache.size(), 1);
    }

    #[test_log::test]
    fn test_oversized_put_evicts_nothing() {
        let (cache, evicted) = cache(2, 1, 100);
        cache.put(1, vec![1; 10]).unwrap();
        cache.put(2, vec![2; 10]).unwrap();

        let err = cache.put(3, vec![3; 200]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.statistics().evictions(), 0);
        assert!(evicted.lock().is_empty());
        assert_eq!(cache.get(&1).unwrap(), Some(vec![1; 10]));
        assert_eq!(cache.get(&2).unwrap(), Some(vec![2; 10]));
    }

    #[test_log::test]
    fn test_unreadable_victim_does_not_fail_put() {
        /// Refuses to deserialize buffers starting with `0xff`.
        struct Picky;

        impl Serializer<Vec<u8>> for Picky {
            fn serialize(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
                Ok(value.clone())
            }

            fn deserialize(&self, buf: &[u8]) -> Result<Vec<u8>> {
                match buf.first() {
                    Some(0xff) => Err(offcache_common::error::Error::new(ErrorKind::Serde, "unreadable")),
                    _ => Ok(buf.to_vec()),
                }
            }
        }

        let evicted: Evicted = Arc::default();
        let listener = {
            let evicted = evicted.clone();
            move |key: u64, value: Vec<u8>| evicted.lock().push((key, value))
        };
        let cache = OffHeapCache::builder("picky")
            .with_capacity(1)
            .with_segments(1, 64)
            .with_serializer(Picky)
            .with_eviction_listener(listener)
            .with_compaction_config(CompactionConfig {
                enabled: false,
                ..Default::default()
            })
            .build()
            .unwrap();

        cache.put(1, vec![0xff; 4]).unwrap();
        cache.put(2, vec![2; 4]).unwrap();
        assert_eq!(cache.get(&2).unwrap(), Some(vec![2; 4]));
        assert_eq!(cache.get(&1).unwrap(), None);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.statistics().evictions(), 1);
        assert_eq!(cache.statistics().eviction_failures(), 1);
        assert!(evicted.lock().is_empty());
        assert_eq!(cache.store().used_bytes(), 4);
    }

    #[test_log::test]
    fn test_capacity_eviction() {
        let (cache, evicted) = cache(3, 2, 128);
        for i in 0..5u64 {
            cache.put(i, vec![i as u8; 10]).unwrap();
        }
        assert_eq!(cache.size(), 3);
        assert_eq!(*evicted.lock(), vec![(0, vec![0; 10]), (1, vec![1; 10])]);
        assert_eq!(cache.statistics().evictions(), 2);
        assert_eq!(cache.store().used_bytes(), 30);
        assert_eq!(cache.get(&0).unwrap(), None);
    }

    #[test_log::test]
    fn test_invalidate_and_clear() {
        let (cache, evicted) = cache(16, 2, 128);
        for i in 0..4u64 {
            cache.put(i, vec![i as u8; 4]).unwrap();
        }

        assert_eq!(cache.invalidate(&2).unwrap(), Some(vec![2; 4]));
        assert_eq!(cache.invalidate(&2).unwrap(), None);
        assert_eq!(*evicted.lock(), vec![(2, vec![2; 4])]);
        assert_eq!(cache.size(), 3);

        cache.clear().unwrap();
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.store().used_bytes(), 0);
        assert_eq!(cache.store().free_bytes(), 256);
        assert_eq!(evicted.lock().len(), 1);

        // The policy forgets cleared keys.
        cache.put(9, vec![9; 4]).unwrap();
        assert_eq!(cache.size(), 1);
    }

    #[test_log::test]
    fn test_capacity_exceeded_is_surfaced() {
        let (cache, _) = cache(16, 1, 32);
        cache.put(1, vec![0; 20]).unwrap();
        let err = cache.put(2, vec![0; 20]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        let err = cache.put(3, vec![0; 33]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get(&1).unwrap(), Some(vec![0; 20]));
    }

    #[test_log::test]
    fn test_compact() {
        let (cache, _) = cache(64, 4, 100);
        for i in 0..20u64 {
            cache.put(i, vec![i as u8; 10]).unwrap();
        }
        for i in [1, 3, 5, 7] {
            cache.invalidate(&i).unwrap();
        }
        let fragmentation = cache.store().segment(0).unwrap().fragmentation();
        assert!((fragmentation - 0.3).abs() < 1e-9);

        let report = cache.inner.compact(0.2).unwrap();
        assert_eq!(report.segments.len(), 1);
        let segment = &report.segments[0];
        assert_eq!(segment.segment, 0);
        assert!(segment.after < segment.before);
        assert_eq!(segment.after, 0.0);
        assert!(!segment.blocked);
        assert!(segment.relocated > 0);
        assert_eq!(cache.statistics().relocations(), segment.relocated as u64);

        for i in (0..20u64).filter(|i| ![1, 3, 5, 7].contains(i)) {
            assert_eq!(cache.get(&i).unwrap(), Some(vec![i as u8; 10]));
        }
        assert_eq!(cache.store().used_bytes(), 160);
        assert_eq!(cache.size(), 16);
    }

    #[test_log::test]
    fn test_compact_within_single_segment() {
        let (cache, _) = cache(64, 1, 100);
        for i in 0..10u64 {
            cache.put(i, vec![i as u8; 10]).unwrap();
        }
        cache.invalidate(&2).unwrap();
        cache.invalidate(&6).unwrap();
        assert!((cache.store().segment(0).unwrap().fragmentation() - 0.1).abs() < 1e-9);

        let report = cache.inner.compact(0.05).unwrap();
        assert_eq!(report.relocated(), 1);
        assert!(!report.segments[0].blocked);
        assert_eq!(report.segments[0].after, 0.0);
        assert_eq!(cache.store().segment(0).unwrap().free_ranges(), vec![(10, 20)]);
        for i in (0..10u64).filter(|i| ![2, 6].contains(i)) {
            assert_eq!(cache.get(&i).unwrap(), Some(vec![i as u8; 10]));
        }
    }

    #[test]
    fn test_compact_blocked_without_room() {
        let (cache, _) = cache(64, 1, 100);
        // [0: 10][1: 5][2: 10][3: 10][4: 10][5: 55]
        for (key, len) in [(0u64, 10), (1, 5), (2, 10), (3, 10), (4, 10), (5, 55)] {
            cache.put(key, vec![key as u8; len]).unwrap();
        }
        cache.invalidate(&1).unwrap();
        cache.invalidate(&3).unwrap();

        // Key 2 sits between both holes, and the smaller hole cannot take it.
        let report = cache.inner.compact(0.01).unwrap();
        assert_eq!(report.relocated(), 0);
        assert!(report.segments[0].blocked);
        assert_eq!(report.segments[0].after, report.segments[0].before);
        assert_eq!(cache.get(&2).unwrap(), Some(vec![2; 10]));
    }

    #[test]
    fn test_invalid_builder() {
        let err = OffHeapCache::<u64, Vec<u8>>::builder("no serializer").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = OffHeapCache::<u64, Vec<u8>>::builder("zero")
            .with_serializer(RawSerializer)
            .with_capacity(0)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = OffHeapCache::<u64, Vec<u8>>::builder("threshold")
            .with_serializer(RawSerializer)
            .with_compaction_config(CompactionConfig {
                threshold: 1.5,
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test_log::test]
    fn test_compactor_lifecycle() {
        let (cache, _) = cache(16, 2, 64);
        assert!(!cache.is_compactor_running());
        cache.start_compactor().unwrap();
        cache.start_compactor().unwrap();
        assert!(cache.is_compactor_running());
        cache.close();
        assert!(!cache.is_compactor_running());
        // Still usable.
        cache.put(1, vec![1]).unwrap();
        assert_eq!(cache.get(&1).unwrap(), Some(vec![1]));
    }
}
