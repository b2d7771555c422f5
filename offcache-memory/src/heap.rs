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
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use hashbrown::HashMap;
use offcache_common::{
    cache::{hit_ratio, Cache, CacheLoader, NoopCacheLoader},
    error::{Error, Result},
    event::{EvictionListener, NoopEvictionListener},
};
use parking_lot::Mutex;

use crate::eviction::{Eviction, EvictionConfig};

struct HeapState<K, V> {
    entries: HashMap<K, V>,
    eviction: Box<dyn Eviction<K>>,
}

/// Builder for [`HeapCache`].
pub struct HeapCacheBuilder<K, V> {
    name: String,
    capacity: usize,
    eviction_config: EvictionConfig,
    loader: Arc<dyn CacheLoader<K, V>>,
    listener: Arc<dyn EvictionListener<K, V>>,
}

impl<K, V> HeapCacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a builder for a cache named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: 10000,
            eviction_config: EvictionConfig::default(),
            loader: Arc::new(NoopCacheLoader::default()),
            listener: Arc::new(NoopEvictionListener::default()),
        }
    }

    /// Set the entry count bound.
    ///
    /// Default: 10000.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the eviction policy.
    ///
    /// Default: [`EvictionConfig::Lru`].
    pub fn with_eviction_config(mut self, eviction_config: EvictionConfig) -> Self {
        self.eviction_config = eviction_config;
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

    /// Validate the options and build the cache.
    pub fn build(self) -> Result<HeapCache<K, V>> {
        if self.name.is_empty() {
            return Err(Error::config("cache name must not be empty"));
        }
        if self.capacity == 0 {
            return Err(Error::config("cache capacity must be greater than 0").with_context("name", &self.name));
        }
        tracing::debug!(
            "[heap cache]: build {} with capacity {} and {:?} eviction",
            self.name,
            self.capacity,
            self.eviction_config
        );
        Ok(HeapCache {
            name: self.name,
            capacity: self.capacity,
            state: Mutex::new(HeapState {
                entries: HashMap::new(),
                eviction: self.eviction_config.build(),
            }),
            loader: self.loader,
            listener: self.listener,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }
}

/// An in-heap cache with an entry count bound.
///
/// Values are kept as they are and cloned out on `get`.
pub struct HeapCache<K, V> {
    name: String,
    capacity: usize,
    state: Mutex<HeapState<K, V>>,
    loader: Arc<dyn CacheLoader<K, V>>,
    listener: Arc<dyn EvictionListener<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> Debug for HeapCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapCache")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<K, V> HeapCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Entry count bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<K, V> Cache for HeapCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Key = K;
    type Value = V;

    fn name(&self) -> &str {
        &self.name
    }

    fn put(&self, key: K, value: V) -> Result<()> {
        let mut victims = vec![];
        {
            let mut state = self.state.lock();
            let state = &mut *state;
            match state.entries.insert(key.clone(), value) {
                Some(_) => state.eviction.access(&key),
                None => state.eviction.push(key),
            }
            while state.entries.len() > self.capacity {
                let Some(victim) = state.eviction.pop() else {
                    break;
                };
                if let Some(value) = state.entries.remove(&victim) {
                    victims.push((victim, value));
                }
            }
        }
        for (key, value) in victims {
            tracing::trace!("[heap cache]: {} evicts an entry", self.name);
            self.listener.on_eviction(key, value);
        }
        Ok(())
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        {
            let mut state = self.state.lock();
            let state = &mut *state;
            if let Some(value) = state.entries.get(key) {
                let value = value.clone();
                state.eviction.access(key);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(value));
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        match self.loader.load(key)? {
            Some(value) => {
                self.put(key.clone(), value.clone())?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn peek(&self, key: &K) -> Result<Option<V>> {
        Ok(self.state.lock().entries.get(key).cloned())
    }

    fn invalidate(&self, key: &K) -> Result<Option<V>> {
        let value = {
            let mut state = self.state.lock();
            let value = state.entries.remove(key);
            if value.is_some() {
                state.eviction.remove(key);
            }
            value
        };
        if let Some(value) = &value {
            self.listener.on_eviction(key.clone(), value.clone());
        }
        Ok(value)
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.entries.clear();
        state.eviction.clear();
        Ok(())
    }

    fn size(&self) -> usize {
        self.state.lock().entries.len()
    }

    fn hit_ratio(&self) -> f64 {
        hit_ratio(self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}
