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

use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use itertools::Itertools;
use offcache_common::{
    cache::Cache,
    error::{Error, Result},
};
use parking_lot::RwLock;

/// The part of the cache capability that does not depend on key and value types.
pub trait ManagedCache: Send + Sync + 'static {
    /// Name of the cache instance.
    fn name(&self) -> &str;
    /// Remove all entries without notifying the eviction listener.
    fn clear(&self) -> Result<()>;
    /// Count of live entries.
    fn size(&self) -> usize;
    /// `hits / (hits + misses)` of `get`, `0.0` if `get` has never been called.
    fn hit_ratio(&self) -> f64;
}

impl<C> ManagedCache for C
where
    C: Cache,
{
    fn name(&self) -> &str {
        Cache::name(self)
    }

    fn clear(&self) -> Result<()> {
        Cache::clear(self)
    }

    fn size(&self) -> usize {
        Cache::size(self)
    }

    fn hit_ratio(&self) -> f64 {
        Cache::hit_ratio(self)
    }
}

/// Named caches of an application.
///
/// The registry is a plain value. Share it with an `Arc` where needed.
#[derive(Default)]
pub struct CacheRegistry {
    caches: RwLock<BTreeMap<String, Arc<dyn ManagedCache>>>,
}

impl Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry").field("caches", &self.names()).finish()
    }
}

impl CacheRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cache under its name. A taken name fails with a config error.
    pub fn register(&self, cache: Arc<dyn ManagedCache>) -> Result<()> {
        let name = cache.name().to_string();
        let mut caches = self.caches.write();
        if caches.contains_key(&name) {
            return Err(Error::config("cache name is already registered").with_context("name", name));
        }
        tracing::debug!("[registry]: register {name}");
        caches.insert(name, cache);
        Ok(())
    }

    /// Get a registered cache.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ManagedCache>> {
        self.caches.read().get(name).cloned()
    }

    /// Remove a registered cache.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn ManagedCache>> {
        self.caches.write().remove(name)
    }

    /// Names of the registered caches in order.
    pub fn names(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect_vec()
    }

    /// Clear every registered cache. Stops at the first failure.
    pub fn clear_all(&self) -> Result<()> {
        let caches = self.caches.read().values().cloned().collect_vec();
        for cache in caches {
            cache.clear()?;
        }
        Ok(())
    }

    /// Count of registered caches.
    pub fn len(&self) -> usize {
        self.caches.read().len()
    }

    /// Returns `true` if no cache is registered.
    pub fn is_empty(&self) -> bool {
        self.caches.read().is_empty()
    }
}
