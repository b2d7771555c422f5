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
    hash::Hash,
    sync::{atomic::AtomicUsize, Arc},
    time::Duration,
};

use offcache_common::{
    cache::{CacheLoader, NoopCacheLoader},
    code::Serializer,
    error::{Error, Result},
    event::{EvictionListener, NoopEvictionListener},
    locks::KeyLocks,
};
use offcache_memory::eviction::EvictionConfig;
use offcache_storage::{PointerMap, StoreBuilder, StoreConfig};
use parking_lot::Mutex;

use super::{OffHeapCache, OffHeapCacheInner};

/// Background compaction options.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompactionConfig {
    /// Interval between two compaction checks.
    pub period: Duration,
    /// Segments with a fragmentation ratio above it are compacted. Must be in `[0.0, 1.0)`.
    pub threshold: f64,
    /// Start the background compactor when the cache is built.
    pub enabled: bool,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            threshold: 0.5,
            enabled: true,
        }
    }
}

impl CompactionConfig {
    fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            return Err(Error::config("compaction period must be greater than 0"));
        }
        if !(0.0..1.0).contains(&self.threshold) {
            return Err(Error::config("compaction threshold must be in [0.0, 1.0)")
                .with_context("threshold", self.threshold));
        }
        Ok(())
    }
}

/// Builder for [`OffHeapCache`].
pub struct OffHeapCacheBuilder<K, V> {
    name: String,
    capacity: usize,
    store: StoreConfig,
    eviction_config: EvictionConfig,
    serializer: Option<Arc<dyn Serializer<V>>>,
    loader: Arc<dyn CacheLoader<K, V>>,
    listener: Arc<dyn EvictionListener<K, V>>,
    compaction: CompactionConfig,
    key_lock_stripes: usize,
    shards: usize,
}

impl<K, V> OffHeapCacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a builder for an off-heap cache named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: 10000,
            store: StoreConfig::default(),
            eviction_config: EvictionConfig::default(),
            serializer: None,
            loader: Arc::new(NoopCacheLoader::default()),
            listener: Arc::new(NoopEvictionListener::default()),
            compaction: CompactionConfig::default(),
            key_lock_stripes: 64,
            shards: 64,
        }
    }

    /// Set the entry count bound. Exceeding it evicts entries chosen by the eviction policy.
    ///
    /// Default: 10000.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the store config.
    ///
    /// Default: [`StoreConfig::default`].
    pub fn with_store_config(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Use exactly `segments` segments of `segment_capacity` bytes, allocated when the cache is built.
    pub fn with_segments(mut self, segments: usize, segment_capacity: usize) -> Self {
        self.store = StoreConfig {
            segment_capacity,
            initial_segments: segments,
            max_segments: segments,
        };
        self
    }

    /// Set the eviction policy.
    ///
    /// Default: [`EvictionConfig::Lru`].
    pub fn with_eviction_config(mut self, eviction_config: impl Into<EvictionConfig>) -> Self {
        self.eviction_config = eviction_config.into();
        self
    }

    /// Set the serializer between values and stored bytes.
    ///
    /// Required.
    pub fn with_serializer(mut self, serializer: impl Serializer<V>) -> Self {
        self.serializer = Some(Arc::new(serializer));
        self
    }

    /// Set the loader invoked on a miss.
    ///
    /// Default: a loader that never produces a value.
    pub fn with_loader(mut self, loader: impl CacheLoader<K, V>) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    /// Set the listener notified of evicted and invalidated entries.
    ///
    /// Default: a no-op listener.
    pub fn with_eviction_listener(mut self, listener: impl EvictionListener<K, V>) -> Self {
        self.listener = Arc::new(listener);
        self
    }

    /// Set the background compaction options.
    ///
    /// Default: check every 100ms, compact segments with fragmentation above 0.5.
    pub fn with_compaction_config(mut self, compaction: CompactionConfig) -> Self {
        self.compaction = compaction;
        self
    }

    /// Set the count of key lock stripes. Keys of different stripes are operated on in parallel.
    ///
    /// Default: 64.
    pub fn with_key_lock_stripes(mut self, stripes: usize) -> Self {
        self.key_lock_stripes = stripes;
        self
    }

    /// Set the shard count of the pointer map.
    ///
    /// Default: 64.
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Validate the options, allocate the store and start the compactor if enabled.
    pub fn build(self) -> Result<OffHeapCache<K, V>> {
        if self.name.is_empty() {
            return Err(Error::config("cache name must not be empty"));
        }
        if self.capacity == 0 {
            return Err(Error::config("cache capacity must be greater than 0").with_context("name", &self.name));
        }
        if self.key_lock_stripes == 0 || self.shards == 0 {
            return Err(Error::config("key lock stripes and shards must be greater than 0")
                .with_context("key_lock_stripes", self.key_lock_stripes)
                .with_context("shards", self.shards));
        }
        let Some(serializer) = self.serializer else {
            return Err(Error::config("serializer is required").with_context("name", &self.name));
        };
        self.compaction.validate()?;
        let store = StoreBuilder::from_config(self.store).build()?;

        tracing::info!(
            "[off-heap cache]: build {} with capacity {} over {} bytes of segments",
            self.name,
            self.capacity,
            store.max_capacity()
        );

        let enabled = self.compaction.enabled;
        let inner = OffHeapCacheInner {
            name: self.name,
            capacity: self.capacity,
            entries: AtomicUsize::new(0),
            store,
            pointers: PointerMap::new(self.shards),
            eviction: Mutex::new(self.eviction_config.build()),
            locks: KeyLocks::new(self.key_lock_stripes),
            serializer,
            loader: self.loader,
            listener: self.listener,
            compaction: self.compaction,
            statistics: Arc::default(),
        };
        let cache = OffHeapCache {
            inner: Arc::new(inner),
            compactor: Mutex::new(None),
        };
        if enabled {
            cache.start_compactor()?;
        }
        Ok(cache)
    }
}
