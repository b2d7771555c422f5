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

use std::{fmt::Debug, marker::PhantomData, sync::Arc};

use crate::error::Result;

/// The capability set shared by every cache backend.
///
/// Backends (in-heap, off-heap) implement it independently. Decorators such as the versioned cache wrap any
/// implementation.
pub trait Cache: Send + Sync + 'static {
    /// Key type.
    type Key;
    /// Value type.
    type Value;

    /// Name of the cache instance.
    fn name(&self) -> &str;

    /// Insert or overwrite the value of `key`.
    ///
    /// May evict other entries if the cache exceeds its capacity.
    fn put(&self, key: Self::Key, value: Self::Value) -> Result<()>;

    /// Get the value of `key`.
    ///
    /// On a miss the cache loader is invoked synchronously and its value is stored before it is returned.
    /// Loader failures are propagated.
    fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>>;

    /// Get the stored value of `key`.
    ///
    /// Unlike `get`, it never invokes the loader, never counts towards the hit ratio and leaves the eviction policy
    /// untouched.
    fn peek(&self, key: &Self::Key) -> Result<Option<Self::Value>>;

    /// Remove `key`, notify the eviction listener and return the previous value.
    fn invalidate(&self, key: &Self::Key) -> Result<Option<Self::Value>>;

    /// Returns `true` if `get(key)` returns a value.
    ///
    /// NOTE: Implemented with `get`, so a miss triggers load-through.
    fn contains(&self, key: &Self::Key) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Remove all entries without notifying the eviction listener.
    fn clear(&self) -> Result<()>;

    /// Count of live entries.
    fn size(&self) -> usize;

    /// `hits / (hits + misses)` of `get`, `0.0` if `get` has never been called.
    fn hit_ratio(&self) -> f64;
}

impl<C> Cache for Arc<C>
where
    C: Cache + ?Sized,
{
    type Key = C::Key;
    type Value = C::Value;

    fn name(&self) -> &str {
        self.as_ref().name()
    }

    fn put(&self, key: Self::Key, value: Self::Value) -> Result<()> {
        self.as_ref().put(key, value)
    }

    fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>> {
        self.as_ref().get(key)
    }

    fn peek(&self, key: &Self::Key) -> Result<Option<Self::Value>> {
        self.as_ref().peek(key)
    }

    fn invalidate(&self, key: &Self::Key) -> Result<Option<Self::Value>> {
        self.as_ref().invalidate(key)
    }

    fn contains(&self, key: &Self::Key) -> Result<bool> {
        self.as_ref().contains(key)
    }

    fn clear(&self) -> Result<()> {
        self.as_ref().clear()
    }

    fn size(&self) -> usize {
        self.as_ref().size()
    }

    fn hit_ratio(&self) -> f64 {
        self.as_ref().hit_ratio()
    }
}

/// Ratio of hits over all lookups. Returns `0.0` when there is no lookup at all.
pub fn hit_ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 0.0;
    }
    hits as f64 / total as f64
}

/// Produces the value of a missing key.
///
/// `Ok(None)` means the key has no value; nothing is stored and `get` returns `None`.
pub trait CacheLoader<K, V>: Send + Sync + 'static {
    /// Load the value of `key`.
    fn load(&self, key: &K) -> Result<Option<V>>;
}

impl<K, V, F> CacheLoader<K, V> for F
where
    F: Fn(&K) -> Result<Option<V>> + Send + Sync + 'static,
{
    fn load(&self, key: &K) -> Result<Option<V>> {
        self(key)
    }
}

/// Cache loader that never produces a value.
pub struct NoopCacheLoader<K, V>(PhantomData<fn(&K) -> V>);

impl<K, V> Debug for NoopCacheLoader<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoopCacheLoader").finish()
    }
}

impl<K, V> Default for NoopCacheLoader<K, V> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<K, V> CacheLoader<K, V> for NoopCacheLoader<K, V>
where
    K: 'static,
    V: 'static,
{
    fn load(&self, _: &K) -> Result<Option<V>> {
        Ok(None)
    }
}
