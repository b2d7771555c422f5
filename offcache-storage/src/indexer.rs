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

use std::hash::{BuildHasher, Hash};

use hashbrown::{DefaultHashBuilder, HashMap};
use itertools::Itertools;
use parking_lot::RwLock;

use crate::{pointer::Pointer, segment::SegmentId};

type PointerMapShard<K> = HashMap<K, Pointer>;

/// [`PointerMap`] records key to the location of its serialized value.
///
/// The entry of a key is the sole authority for its location.
pub struct PointerMap<K> {
    shards: Box<[RwLock<PointerMapShard<K>>]>,
    hash_builder: DefaultHashBuilder,
}

impl<K> std::fmt::Debug for PointerMap<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointerMap").field("shards", &self.shards.len()).finish()
    }
}

impl<K> PointerMap<K>
where
    K: Hash + Eq,
{
    /// Create a pointer map with `shards` shards.
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| RwLock::new(HashMap::new())).collect_vec();
        Self {
            shards: shards.into_boxed_slice(),
            hash_builder: DefaultHashBuilder::default(),
        }
    }

    /// Get the pointer of `key`.
    pub fn get(&self, key: &K) -> Option<Pointer> {
        self.shards[self.shard(key)].read().get(key).copied()
    }

    /// Insert or overwrite the pointer of `key`, returning the old one.
    pub fn insert(&self, key: K, ptr: Pointer) -> Option<Pointer> {
        self.shards[self.shard(&key)].write().insert(key, ptr)
    }

    /// Remove the pointer of `key`.
    pub fn remove(&self, key: &K) -> Option<Pointer> {
        self.shards[self.shard(key)].write().remove(key)
    }

    /// Point `key` at `new` only if it still points at `expected`.
    pub fn compare_and_swap(&self, key: &K, expected: Pointer, new: Pointer) -> bool {
        let mut shard = self.shards[self.shard(key)].write();
        match shard.get_mut(key) {
            Some(ptr) if *ptr == expected => {
                *ptr = new;
                true
            }
            _ => false,
        }
    }

    /// Remove all entries, returning them.
    pub fn clear(&self) -> Vec<(K, Pointer)> {
        self.shards.iter().flat_map(|shard| shard.write().drain().collect_vec()).collect()
    }

    /// Count of entries.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }

    fn shard(&self, key: &K) -> usize {
        self.hash_builder.hash_one(key) as usize % self.shards.len()
    }
}

impl<K> PointerMap<K>
where
    K: Hash + Eq + Clone,
{
    /// Snapshot of all keys.
    pub fn keys(&self) -> Vec<K> {
        self.shards
            .iter()
            .flat_map(|shard| shard.read().keys().cloned().collect_vec())
            .collect()
    }

    /// Entries that live in `segment`.
    pub fn pointers_in(&self, segment: SegmentId) -> Vec<(K, Pointer)> {
        self.shards
            .iter()
            .flat_map(|shard| {
                shard
                    .read()
                    .iter()
                    .filter(|(_, ptr)| ptr.segment == segment)
                    .map(|(key, ptr)| (key.clone(), *ptr))
                    .collect_vec()
            })
            .collect()
    }
}
