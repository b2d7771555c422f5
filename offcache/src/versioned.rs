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

//! Optimistic concurrency over any cache.
//!
//! Every stored [`VersionedItem`] carries a version. A put must carry the version currently stored (`0` for an
//! absent key) and stores the value with the next version. Once a key leaves the cache it starts over from `0`.

use std::{fmt::Debug, hash::Hash, marker::PhantomData};

use offcache_common::{
    cache::Cache,
    code::Serializer,
    error::{Error, ErrorKind, Result},
    locks::KeyLocks,
};

const VERSION_LEN: usize = 4;

/// A value with its optimistic-lock version.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VersionedItem<V> {
    /// The value.
    pub value: V,
    /// Version the item was read at, or that a put expects to replace.
    pub version: u32,
}

impl<V> VersionedItem<V> {
    /// Create a versioned item.
    pub fn new(value: V, version: u32) -> Self {
        Self { value, version }
    }

    /// Consume the item and return the value.
    pub fn into_value(self) -> V {
        self.value
    }
}

/// Serializes a [`VersionedItem`] as a 4-byte big-endian version followed by the value bytes.
#[derive(Debug, Clone, Default)]
pub struct VersionedSerializer<S> {
    inner: S,
}

impl<S> VersionedSerializer<S> {
    /// Wrap the serializer of the value.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<V, S> Serializer<VersionedItem<V>> for VersionedSerializer<S>
where
    S: Serializer<V>,
    V: 'static,
{
    fn serialize(&self, item: &VersionedItem<V>) -> Result<Vec<u8>> {
        let value = self.inner.serialize(&item.value)?;
        let mut buf = Vec::with_capacity(VERSION_LEN + value.len());
        buf.extend_from_slice(&item.version.to_be_bytes());
        buf.extend_from_slice(&value);
        Ok(buf)
    }

    fn deserialize(&self, buf: &[u8]) -> Result<VersionedItem<V>> {
        let Some((version, value)) = buf.split_first_chunk::<VERSION_LEN>() else {
            return Err(Error::new(ErrorKind::Serde, "versioned envelope is too short").with_context("len", buf.len()));
        };
        Ok(VersionedItem {
            value: self.inner.deserialize(value)?,
            version: u32::from_be_bytes(*version),
        })
    }
}

/// A decorator that rejects puts carrying a stale version.
///
/// Puts of the same key through the decorator are serialized by a stripe lock, so of two puts racing with the same
/// version exactly one succeeds. Writes that bypass the decorator are not checked.
pub struct VersionedCache<C, V> {
    inner: C,
    locks: KeyLocks,
    _marker: PhantomData<fn() -> V>,
}

impl<C, V> Debug for VersionedCache<C, V>
where
    C: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedCache").field("inner", &self.inner).finish()
    }
}

impl<C, V> VersionedCache<C, V>
where
    C: Cache<Value = VersionedItem<V>>,
    C::Key: Hash + Clone,
    V: 'static,
{
    /// Wrap a cache of versioned items.
    pub fn new(inner: C) -> Self {
        Self::with_key_lock_stripes(inner, 64)
    }

    /// Wrap a cache of versioned items with `stripes` key lock stripes.
    pub fn with_key_lock_stripes(inner: C, stripes: usize) -> Self {
        Self {
            inner,
            locks: KeyLocks::new(stripes),
            _marker: PhantomData,
        }
    }

    /// The decorated cache.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Store `value` if `expected` is the stored version. Returns the new version.
    pub fn put_value(&self, key: C::Key, value: V, expected: u32) -> Result<u32> {
        self.put_versioned(key, VersionedItem::new(value, expected))
    }

    fn put_versioned(&self, key: C::Key, item: VersionedItem<V>) -> Result<u32> {
        // Fail fast without the lock.
        Self::validate(item.version, self.stored_version(&key)?)?;

        let _guard = self.locks.lock(&key);
        Self::validate(item.version, self.stored_version(&key)?)?;
        let version = item.version.checked_add(1).ok_or_else(|| {
            Error::new(ErrorKind::OutOfRange, "version overflow").with_context("version", item.version)
        })?;
        self.inner.put(key, VersionedItem::new(item.value, version))?;
        Ok(version)
    }

    fn stored_version(&self, key: &C::Key) -> Result<Option<u32>> {
        Ok(self.inner.peek(key)?.map(|item| item.version))
    }

    fn validate(expected: u32, actual: Option<u32>) -> Result<()> {
        if actual.unwrap_or(0) == expected {
            Ok(())
        } else {
            Err(Error::stale_item(expected, actual))
        }
    }
}

impl<C, V> Cache for VersionedCache<C, V>
where
    C: Cache<Value = VersionedItem<V>>,
    C::Key: Hash + Clone,
    V: 'static,
{
    type Key = C::Key;
    type Value = VersionedItem<V>;

    fn name(&self) -> &str {
        self.inner.name()
    }

    /// Store the item if its version is the stored version, `0` for an absent key.
    ///
    /// The item is stored with the next version. A mismatch fails with [`ErrorKind::StaleItem`] and writes nothing.
    fn put(&self, key: Self::Key, item: Self::Value) -> Result<()> {
        self.put_versioned(key, item).map(|_| ())
    }

    fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>> {
        self.inner.get(key)
    }

    fn peek(&self, key: &Self::Key) -> Result<Option<Self::Value>> {
        self.inner.peek(key)
    }

    fn invalidate(&self, key: &Self::Key) -> Result<Option<Self::Value>> {
        self.inner.invalidate(key)
    }

    fn contains(&self, key: &Self::Key) -> Result<bool> {
        self.inner.contains(key)
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn hit_ratio(&self) -> f64 {
        self.inner.hit_ratio()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use offcache_common::code::RawSerializer;
    use offcache_memory::{HeapCache, HeapCacheBuilder};

    use super::*;
    use crate::offheap::{CompactionConfig, OffHeapCache};

    #[test]
    fn test_envelope() {
        let serializer = VersionedSerializer::new(RawSerializer);
        let buf = serializer.serialize(&VersionedItem::new(b"abc".to_vec(), 258)).unwrap();
        assert_eq!(buf, vec![0, 0, 1, 2, b'a', b'b', b'c']);
        let item: VersionedItem<Vec<u8>> = serializer.deserialize(&buf).unwrap();
        assert_eq!(item, VersionedItem::new(b"abc".to_vec(), 258));

        let err = Serializer::<VersionedItem<Vec<u8>>>::deserialize(&serializer, &[0, 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serde);
    }

    #[test]
    fn test_versions_over_heap_cache() {
        let cache: VersionedCache<HeapCache<u64, VersionedItem<String>>, String> =
            VersionedCache::new(HeapCacheBuilder::new("versioned").build().unwrap());

        assert_eq!(cache.put_value(1u64, "a".to_string(), 0).unwrap(), 1);
        assert_eq!(cache.put_value(1, "b".to_string(), 1).unwrap(), 2);

        let err = cache.put_value(1, "c".to_string(), 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StaleItem);
        assert_eq!(cache.get(&1).unwrap(), Some(VersionedItem::new("b".to_string(), 2)));

        // An absent key only accepts version 0.
        let err = cache.put(2, VersionedItem::new("x".to_string(), 3)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StaleItem);
        assert!(!cache.contains(&2).unwrap());

        // Reinsertion after invalidation starts over.
        cache.invalidate(&1).unwrap();
        assert_eq!(cache.put_value(1, "d".to_string(), 0).unwrap(), 1);
    }

    #[test_log::test]
    fn test_version_check_is_not_a_lookup() {
        let loads = Arc::new(AtomicUsize::new(0));
        let loader = {
            let loads = loads.clone();
            move |_: &u64| -> Result<Option<VersionedItem<String>>> {
                loads.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        };
        let cache: VersionedCache<OffHeapCache<u64, VersionedItem<String>>, String> = VersionedCache::new(
            OffHeapCache::builder("versioned")
                .with_segments(1, 1024)
                .with_serializer(VersionedSerializer::new(RawSerializer))
                .with_loader(loader)
                .with_compaction_config(CompactionConfig {
                    enabled: false,
                    ..Default::default()
                })
                .build()
                .unwrap(),
        );

        assert_eq!(cache.put_value(1, "a".to_string(), 0).unwrap(), 1);
        assert_eq!(cache.put_value(1, "b".to_string(), 1).unwrap(), 2);
        let err = cache.put_value(1, "c".to_string(), 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StaleItem);

        // Version checks neither load nor count as lookups.
        assert_eq!(loads.load(Ordering::Relaxed), 0);
        let statistics = cache.inner().statistics();
        assert_eq!((statistics.hits(), statistics.misses()), (0, 0));
        assert_eq!(cache.hit_ratio(), 0.0);

        assert_eq!(cache.peek(&1).unwrap(), Some(VersionedItem::new("b".to_string(), 2)));
        assert_eq!(cache.peek(&2).unwrap(), None);
        assert_eq!(loads.load(Ordering::Relaxed), 0);
        assert_eq!(cache.get(&2).unwrap(), None);
        assert_eq!(loads.load(Ordering::Relaxed), 1);
    }
}
